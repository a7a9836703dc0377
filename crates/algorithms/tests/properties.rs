//! End-to-end properties of the post-processing estimators.
//!
//! Signals are synthetic: small voxel cubes with 1 mm isotropic voxels and
//! a 2 s repetition time, so expected values can be derived by hand.

use std::f64::consts::PI;

use boldmetrics_algorithms::prelude::*;
use ndarray::{array, Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const TR: f64 = 2.0;

/// Route estimator warnings to the test output (`RUST_LOG=boldmetrics_algorithms=debug`)
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn cube_domain(n: usize) -> SignalDomain {
    SignalDomain::Volume(VolumeDomain::new(Array3::from_elem((n, n, n), true), Affine3::identity()).unwrap())
}

/// Standard normal samples via Box-Muller
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Shared slow oscillation plus a little independent noise per unit
fn coherent_signal(domain: SignalDomain, timepoints: usize, noise: f64, seed: u64) -> Signal {
    let mut rng = StdRng::seed_from_u64(seed);
    let units = domain.n_units();
    let data = Array2::from_shape_fn((units, timepoints), |(_, t)| {
        (2.0 * PI * t as f64 / 20.0).sin() + noise * gaussian(&mut rng)
    });
    Signal::new(data, domain, Some(TR)).unwrap()
}

/// Halves of a 4x4x4 cube labelled 1 and 2; the reference table also lists 3
fn halves_atlas() -> Atlas {
    let labels = Array3::from_shape_fn((4, 4, 4), |(i, _, _)| if i < 2 { 1 } else { 2 });
    let volume = LabelVolume::new(labels, Affine3::identity()).unwrap();
    Atlas::with_reference("halves", AtlasLabels::Volume(volume), [1, 2, 3]).unwrap()
}

// ---------------------------------------------------------------------------
// Resampling and aggregation
// ---------------------------------------------------------------------------

#[test]
fn identity_resampling_is_exact() {
    let atlas = halves_atlas();
    let target = TargetGeometry::of(&cube_domain(4));
    let out = resample(&atlas, &SpatialTransform::Identity, &target).unwrap();
    assert_eq!(out, atlas);
}

#[test]
fn one_row_per_reference_label() {
    init_tracing();
    let signal = coherent_signal(cube_domain(4), 30, 0.1, 1);
    let ts = aggregate(&signal, &halves_atlas(), &ParcellationParams::default()).unwrap();

    assert_eq!(ts.region_ids, vec![1, 2, 3]);
    assert_eq!(ts.data.dim(), (3, 30));
    assert!(ts.region(3).unwrap().iter().all(|v| v.is_nan()));
    assert!(ts.region(1).unwrap().iter().all(|v| v.is_finite()));
    assert_eq!(ts.degenerate_ids(), vec![3]);
}

#[test]
fn shifted_atlas_loses_boundary_region() {
    init_tracing();
    // moving the atlas 2 mm along i pulls region 2 over the whole first half
    // and region 1 out of the grid
    let shift = SpatialTransform::single(AffineMapping::new(Affine3::translation([2.0, 0.0, 0.0])));
    let signal = coherent_signal(cube_domain(4), 30, 0.1, 2);

    let out = extract_connectivity(
        &signal,
        &[halves_atlas()],
        &shift,
        &ParcellationParams::default(),
        ProcessingMode::Sequential,
    )
    .unwrap();

    let ts = &out[0].timeseries;
    assert_eq!(ts.degenerate_ids(), vec![1, 3]);
    assert_eq!(ts.coverage[1], 1.0);
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

#[test]
fn two_timepoint_anticorrelation() {
    let domain = SignalDomain::Volume(VolumeDomain::new(Array3::from_elem((2, 1, 1), true), Affine3::identity()).unwrap());
    let signal = Signal::new(array![[1.0, 2.0], [2.0, 1.0]], domain, Some(TR)).unwrap();
    let labels = LabelVolume::new(Array3::from_shape_vec((2, 1, 1), vec![1, 2]).unwrap(), Affine3::identity()).unwrap();
    let atlas = Atlas::new("pair", AtlasLabels::Volume(labels)).unwrap();

    let ts = aggregate(&signal, &atlas, &ParcellationParams::default()).unwrap();
    let fc = Correlate.execute_default(ts).unwrap();

    assert_eq!(fc.matrix[(0, 0)], 1.0);
    assert_eq!(fc.matrix[(1, 1)], 1.0);
    assert!((fc.matrix[(0, 1)] + 1.0).abs() < 1e-12);
    assert!((fc.matrix[(1, 0)] + 1.0).abs() < 1e-12);
}

#[test]
fn connectivity_nan_exactly_for_degenerate_regions() {
    let signal = coherent_signal(cube_domain(4), 40, 0.5, 3);
    let out = extract_connectivity(
        &signal,
        &[halves_atlas()],
        &SpatialTransform::Identity,
        &ParcellationParams::default(),
        ProcessingMode::Parallel,
    )
    .unwrap();
    let fc = &out[0].connectivity;

    assert_eq!(fc.degenerate, vec![3]);
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(fc.matrix[(i, j)].to_bits(), fc.matrix[(j, i)].to_bits());
            let degenerate = i == 2 || j == 2;
            assert_eq!(fc.matrix[(i, j)].is_nan(), degenerate);
        }
    }
    assert_eq!(fc.matrix[(0, 0)], 1.0);
    assert_eq!(fc.matrix[(1, 1)], 1.0);
}

#[test]
fn batch_keeps_atlas_order_and_reports_failures() {
    let signal = coherent_signal(cube_domain(4), 20, 0.2, 4);
    let other = {
        let labels = Array3::from_shape_fn((4, 4, 4), |(_, j, _)| j as u32 + 1);
        Atlas::new("rows", AtlasLabels::Volume(LabelVolume::new(labels, Affine3::identity()).unwrap())).unwrap()
    };

    let out = extract_connectivity(
        &signal,
        &[halves_atlas(), other],
        &SpatialTransform::Identity,
        &ParcellationParams::default(),
        ProcessingMode::ParallelWith(2),
    )
    .unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].connectivity.atlas, "halves");
    assert_eq!(out[1].connectivity.atlas, "rows");
    assert_eq!(out[1].connectivity.n_regions(), 4);

    let singular = {
        let labels = Array3::from_elem((2, 2, 2), 1u32);
        let flat = Affine3::from_spacing([1.0, 0.0, 1.0], [0.0; 3]);
        Atlas::new("flat", AtlasLabels::Volume(LabelVolume::new(labels, flat).unwrap())).unwrap()
    };
    let err = extract_connectivity(
        &signal,
        &[halves_atlas(), singular],
        &SpatialTransform::Identity,
        &ParcellationParams::default(),
        ProcessingMode::Parallel,
    )
    .unwrap_err();
    assert!(err.to_string().contains("flat"));
}

#[test]
fn tsv_layout() {
    let signal = coherent_signal(cube_domain(4), 3, 0.1, 5);
    let ts = aggregate(&signal, &halves_atlas(), &ParcellationParams::default()).unwrap();

    let mut buf = Vec::new();
    ts.write_tsv(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "1\t2\t3");
    assert!(lines[1].ends_with("\tn/a"));

    let fc = correlate(&ts);
    let mut buf = Vec::new();
    fc.write_tsv(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Node\t1\t2\t3");
    assert!(lines[1].starts_with("1\t1"));
    assert_eq!(lines[3], "3\tn/a\tn/a\tn/a");
}

// ---------------------------------------------------------------------------
// ALFF
// ---------------------------------------------------------------------------

#[test]
fn alff_rejects_empty_band_before_transform() {
    let signal = coherent_signal(cube_domain(2), 50, 0.1, 6);
    let params = AlffParams {
        low_cut: 0.04,
        high_cut: 0.04,
        ..Default::default()
    };
    assert!(matches!(alff(&signal, &params), Err(Error::InvalidBand { .. })));
}

#[test]
fn alff_increases_with_injected_band_power() {
    let n = 120;
    let mut rng = StdRng::seed_from_u64(7);
    let domain = cube_domain(3);
    let units = domain.n_units();

    // random mixture of cosines that leaves bin 12 (0.05 Hz) empty
    let components: Vec<Vec<(usize, f64, f64)>> = (0..units)
        .map(|_| {
            [3usize, 7, 20, 35, 50]
                .iter()
                .map(|&k| (k, rng.random::<f64>() * 2.0 + 0.1, rng.random::<f64>() * 2.0 * PI))
                .collect()
        })
        .collect();
    let base = Array2::from_shape_fn((units, n), |(u, t)| {
        components[u]
            .iter()
            .map(|&(k, a, phase)| a * (2.0 * PI * k as f64 * t as f64 / n as f64 + phase).cos())
            .sum::<f64>()
    });
    let injected = Array2::from_shape_fn((units, n), |(u, t)| {
        base[(u, t)] + 0.5 * (2.0 * PI * 12.0 * t as f64 / n as f64).cos()
    });

    let before = alff(&Signal::new(base, domain.clone(), Some(TR)).unwrap(), &AlffParams::default()).unwrap();
    let after = alff(&Signal::new(injected, domain, Some(TR)).unwrap(), &AlffParams::default()).unwrap();

    for u in 0..units {
        assert!(after.values[u] > before.values[u], "unit {u} did not increase");
        assert!(after.fractional[u] > before.fractional[u]);
    }
}

/// Add `gain` times the mean non-DC coefficient magnitude to the first
/// `count` bins of the band, in phase with each bin, and transform back
fn inject_band_amplitude(data: &mut Array2<f64>, bins: std::ops::RangeInclusive<usize>, count: usize, gain: f64) {
    let n = data.ncols();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    for mut row in data.rows_mut() {
        let mut spectrum: Vec<Complex<f64>> = row.iter().map(|&v| Complex::new(v, 0.0)).collect();
        forward.process(&mut spectrum);
        let mean_magnitude = spectrum[1..=n / 2].iter().map(|c| c.norm()).sum::<f64>() / (n / 2) as f64;
        for k in *bins.start()..*bins.start() + count {
            let phase = spectrum[k].arg();
            spectrum[k] += Complex::from_polar(gain * mean_magnitude, phase);
            spectrum[n - k] = spectrum[k].conj();
        }
        inverse.process(&mut spectrum);
        for (v, c) in row.iter_mut().zip(&spectrum) {
            *v = c.re / n as f64;
        }
    }
}

#[test]
fn alff_increases_with_injected_fourier_amplitude() {
    let n = 120;
    let domain = cube_domain(3);
    let mut rng = StdRng::seed_from_u64(14);
    let base = Array2::from_shape_fn((domain.n_units(), n), |_| gaussian(&mut rng));

    for (low_cut, high_cut) in [(0.01, 0.08), (0.02, 0.1), (0.0, 0.25)] {
        let params = AlffParams {
            low_cut,
            high_cut,
            ..Default::default()
        };
        // skip DC so the injection survives demeaning
        let bins = params.band().bins(n, TR).unwrap();
        let bins = (*bins.start()).max(1)..=*bins.end();

        let mut injected = base.clone();
        inject_band_amplitude(&mut injected, bins, 3, 2.0);

        let before = alff(&Signal::new(base.clone(), domain.clone(), Some(TR)).unwrap(), &params).unwrap();
        let after = alff(&Signal::new(injected, domain.clone(), Some(TR)).unwrap(), &params).unwrap();
        for u in 0..domain.n_units() {
            assert!(after.values[u] > before.values[u], "band {low_cut}-{high_cut}: unit {u} did not increase");
        }
    }
}

#[test]
fn alff_smoothed_map_is_additional() {
    let signal = coherent_signal(cube_domain(3), 60, 1.0, 8);
    let plain = alff(&signal, &AlffParams::default()).unwrap();
    let params = AlffParams {
        smoothing_fwhm: Some(4.0),
        ..Default::default()
    };
    let smoothed = Alff.execute(signal, params).unwrap();

    assert_eq!(smoothed.values, plain.values);
    let map = smoothed.smoothed.unwrap();
    let spread = |a: &ndarray::Array1<f64>| {
        let max = a.iter().cloned().fold(f64::MIN, f64::max);
        let min = a.iter().cloned().fold(f64::MAX, f64::min);
        max - min
    };
    assert!(spread(&map) < spread(&plain.values));
}

// ---------------------------------------------------------------------------
// ReHo
// ---------------------------------------------------------------------------

#[test]
fn reho_does_not_increase_under_noise() {
    let domain = cube_domain(4);
    let clean = coherent_signal(domain.clone(), 60, 0.2, 9);

    let mut rng = StdRng::seed_from_u64(10);
    let noisy_data = clean.data().mapv(|v| v + 5.0 * gaussian(&mut rng));
    let noisy = clean.with_data(noisy_data).unwrap();

    let graph = neighborhood_graph(&domain, &RehoParams::default());
    let before = reho(&clean, &graph).unwrap();
    let after = reho(&noisy, &graph).unwrap();

    assert!(before.mean() > 0.8);
    assert!(after.mean() < before.mean());
}

#[test]
fn reho_isolated_unit_is_nan() {
    init_tracing();
    let mut mask = Array3::from_elem((3, 3, 3), false);
    for j in 0..3 {
        mask[[0, j, 0]] = true;
    }
    mask[[2, 2, 2]] = true;
    let domain = SignalDomain::Volume(VolumeDomain::new(mask, Affine3::identity()).unwrap());
    let signal = coherent_signal(domain, 25, 0.3, 11);

    let map = Reho.execute_default(signal).unwrap();
    assert_eq!(map.isolated, vec![3]);
    for u in 0..3 {
        assert!(map.values[u].is_finite());
    }
    assert!(map.values[3].is_nan());
}

#[test]
fn reho_reports_undefined_units() {
    init_tracing();
    let signal = coherent_signal(cube_domain(3), 30, 0.3, 15);
    let mut data = signal.data().clone();
    data[(13, 4)] = f64::NAN;
    let map = Reho.execute_default(signal.with_data(data).unwrap()).unwrap();

    assert_eq!(map.undefined, vec![13]);
    assert!(map.isolated.is_empty());
    for u in (0..27).filter(|&u| u != 13) {
        assert!(map.values[u].is_finite(), "unit {u}");
    }
}

#[test]
fn parcellated_reho_skips_isolated_units() {
    let signal = coherent_signal(cube_domain(4), 30, 0.2, 12);
    let map = reho(&signal, &neighborhood_graph(signal.domain(), &RehoParams::default())).unwrap();
    let regions = parcellate_map(map.values.view(), signal.domain(), &halves_atlas(), &ParcellationParams::default()).unwrap();

    assert_eq!(regions.region_ids, vec![1, 2, 3]);
    assert!(regions.values[0].is_finite() && regions.values[1].is_finite());
    assert!(regions.values[2].is_nan());
}

#[test]
fn config_drives_the_estimators() {
    let config = PostprocConfig::from_json_str(
        r#"{ "alff": { "high_cut": 0.1 }, "reho": { "connectivity": "faces" } }"#,
    )
    .unwrap();
    let signal = coherent_signal(cube_domain(3), 40, 0.2, 13);

    let map = alff(&signal, &config.alff).unwrap();
    assert_eq!(map.band, FrequencyBand::new(0.01, 0.1));

    let graph = neighborhood_graph(signal.domain(), &config.reho);
    assert_eq!(graph.degree(13), 6);
}
