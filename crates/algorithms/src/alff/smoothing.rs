//! Gaussian smoothing of unit maps
//!
//! Volumetric maps are blurred within the brain mask with a separable
//! Gaussian kernel truncated at 3σ. Each pass renormalises by the weights of
//! the valid neighbours, so voxels outside the mask and NaN units neither
//! contribute nor receive values.
//!
//! Dense maps are blurred per brain model: surface vertices over the
//! mesh-reachable vertices within 3σ (Euclidean distance between vertex
//! coordinates), structure voxels over the voxels of the same structure.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::maybe_rayon::*;
use boldmetrics_core::geometry::{BrainModel, DenseGeometry, StructureVoxels, SurfaceModel, VolumeDomain};
use boldmetrics_core::signal::SignalDomain;
use boldmetrics_core::{Error, Result};
use ndarray::{Array1, Array3, ArrayView1};

/// Convert a full width at half maximum to a Gaussian σ
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt())
}

/// Fail early when `domain` cannot be smoothed (surfaces without coordinates)
pub fn check_smoothable(domain: &SignalDomain) -> Result<()> {
    if let SignalDomain::Dense(dense) = domain {
        for model in dense.models() {
            if let BrainModel::Surface(s) = model {
                if s.coordinates.is_none() {
                    return Err(Error::InvalidParameter {
                        name: "smoothing_fwhm",
                        value: s.structure.clone(),
                        reason: "surface smoothing needs vertex coordinates".into(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Smooth a unit map with a Gaussian of the given FWHM in millimetres
pub fn smooth_map(values: ArrayView1<'_, f64>, domain: &SignalDomain, fwhm: f64) -> Result<Array1<f64>> {
    if values.len() != domain.n_units() {
        return Err(Error::ShapeMismatch {
            what: "map to smooth".into(),
            expected: format!("{} units", domain.n_units()),
            actual: format!("{} values", values.len()),
        });
    }
    if !(fwhm.is_finite() && fwhm > 0.0) {
        return Err(Error::InvalidParameter {
            name: "smoothing_fwhm",
            value: fwhm.to_string(),
            reason: "must be a positive number of millimetres".into(),
        });
    }
    check_smoothable(domain)?;

    let sigma = fwhm_to_sigma(fwhm);
    match domain {
        SignalDomain::Volume(v) => smooth_volume(values, v, sigma),
        SignalDomain::Dense(d) => smooth_dense(values, d, sigma),
    }
}

fn smooth_volume(values: ArrayView1<'_, f64>, domain: &VolumeDomain, sigma: f64) -> Result<Array1<f64>> {
    let mut grid = domain.scatter(values)?;
    let sizes = domain.geometry().voxel_sizes();

    for (axis, &size) in sizes.iter().enumerate() {
        if !(size.is_finite() && size > 0.0) {
            continue;
        }
        let kernel = gaussian_kernel(sigma / size);
        if kernel.len() > 1 {
            grid = convolve_axis(&grid, axis, &kernel)?;
        }
    }

    Ok(domain.voxels().iter().map(|&[i, j, k]| grid[[i, j, k]]).collect())
}

/// Normalised Gaussian kernel truncated at 3σ (σ in samples)
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let half = (3.0 * sigma).floor() as usize;
    if half == 0 {
        return vec![1.0];
    }
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..=2 * half)
        .map(|i| {
            let x = i as f64 - half as f64;
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// One separable pass along `axis`, skipping non-finite cells
fn convolve_axis(data: &Array3<f64>, axis: usize, kernel: &[f64]) -> Result<Array3<f64>> {
    let (ni, nj, nk) = data.dim();
    let extent = [ni, nj, nk][axis] as isize;
    let half = (kernel.len() / 2) as isize;

    let out: Vec<f64> = (0..ni)
        .into_par_iter()
        .flat_map(|i| {
            let mut plane = vec![f64::NAN; nj * nk];
            for j in 0..nj {
                for k in 0..nk {
                    if !data[[i, j, k]].is_finite() {
                        continue;
                    }
                    let mut sum = 0.0;
                    let mut wsum = 0.0;
                    for (ki, &w) in kernel.iter().enumerate() {
                        let mut p = [i as isize, j as isize, k as isize];
                        p[axis] += ki as isize - half;
                        if p[axis] < 0 || p[axis] >= extent {
                            continue;
                        }
                        let v = data[[p[0] as usize, p[1] as usize, p[2] as usize]];
                        if v.is_finite() {
                            sum += w * v;
                            wsum += w;
                        }
                    }
                    if wsum > 0.0 {
                        plane[j * nk + k] = sum / wsum;
                    }
                }
            }
            plane
        })
        .collect();

    Ok(Array3::from_shape_vec((ni, nj, nk), out)?)
}

fn smooth_dense(values: ArrayView1<'_, f64>, dense: &DenseGeometry, sigma: f64) -> Result<Array1<f64>> {
    let mut out = Array1::from_elem(values.len(), f64::NAN);

    for (range, model) in dense.blocks() {
        let block = values.slice(ndarray::s![range.clone()]);
        let smoothed = match model {
            BrainModel::Surface(s) => smooth_surface(block, s, sigma)?,
            BrainModel::Volume(v) => {
                let sizes = dense.volume().map(|g| g.voxel_sizes()).unwrap_or([1.0; 3]);
                smooth_structure(block, v, sizes, sigma)
            }
        };
        out.slice_mut(ndarray::s![range]).assign(&ArrayView1::from(smoothed.as_slice()));
    }
    Ok(out)
}

fn smooth_surface(values: ArrayView1<'_, f64>, model: &SurfaceModel, sigma: f64) -> Result<Vec<f64>> {
    let coords = model.coordinates.as_ref().ok_or_else(|| Error::InvalidParameter {
        name: "smoothing_fwhm",
        value: model.structure.clone(),
        reason: "surface smoothing needs vertex coordinates".into(),
    })?;
    let adjacency = model.vertex_adjacency();
    let unit_of = model.unit_of_vertex();
    let cutoff = 3.0 * sigma;
    let denom = 2.0 * sigma * sigma;

    let smoothed = (0..model.vertex_indices.len())
        .into_par_iter()
        .map(|u| {
            if !values[u].is_finite() {
                return f64::NAN;
            }
            let source = model.vertex_indices[u];
            let origin = coords[source as usize];

            let mut seen = HashSet::from([source]);
            let mut queue = VecDeque::from([source]);
            let mut sum = 0.0;
            let mut wsum = 0.0;

            while let Some(v) = queue.pop_front() {
                let d = distance(origin, coords[v as usize]);
                if let Some(unit) = unit_of[v as usize] {
                    if values[unit].is_finite() {
                        let w = (-d * d / denom).exp();
                        sum += w * values[unit];
                        wsum += w;
                    }
                }
                for &next in &adjacency[v as usize] {
                    if distance(origin, coords[next as usize]) <= cutoff && seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
            sum / wsum
        })
        .collect();
    Ok(smoothed)
}

fn smooth_structure(values: ArrayView1<'_, f64>, model: &StructureVoxels, sizes: [f64; 3], sigma: f64) -> Vec<f64> {
    let lookup: HashMap<[usize; 3], usize> = model.voxels.iter().enumerate().map(|(u, &p)| (p, u)).collect();
    let cutoff = 3.0 * sigma;
    let denom = 2.0 * sigma * sigma;
    let radius: Vec<isize> = sizes
        .iter()
        .map(|&s| if s > 0.0 { (cutoff / s).floor() as isize } else { 0 })
        .collect();

    (0..model.voxels.len())
        .into_par_iter()
        .map(|u| {
            if !values[u].is_finite() {
                return f64::NAN;
            }
            let centre = model.voxels[u];
            let mut sum = 0.0;
            let mut wsum = 0.0;
            for di in -radius[0]..=radius[0] {
                for dj in -radius[1]..=radius[1] {
                    for dk in -radius[2]..=radius[2] {
                        let delta = [di, dj, dk];
                        let mut p = [0usize; 3];
                        let mut inside = true;
                        for a in 0..3 {
                            let c = centre[a] as isize + delta[a];
                            if c < 0 {
                                inside = false;
                                break;
                            }
                            p[a] = c as usize;
                        }
                        if !inside {
                            continue;
                        }
                        let Some(&other) = lookup.get(&p) else {
                            continue;
                        };
                        let d2: f64 = (0..3).map(|a| (delta[a] as f64 * sizes[a]).powi(2)).sum();
                        if d2.sqrt() > cutoff || !values[other].is_finite() {
                            continue;
                        }
                        let w = (-d2 / denom).exp();
                        sum += w * values[other];
                        wsum += w;
                    }
                }
            }
            sum / wsum
        })
        .collect()
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}
