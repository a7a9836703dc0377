//! Amplitude of low-frequency fluctuation (ALFF)
//!
//! - **spectrum**: band validation and per-unit FFT amplitudes
//! - **smoothing**: Gaussian smoothing of the resulting map
//!
//! The ALFF of a unit is the mean amplitude of its demeaned time series over
//! the FFT bins inside the pass band. The fractional variant (fALFF) divides
//! the band amplitude by the amplitude over all non-DC bins.

pub mod smoothing;
pub mod spectrum;

pub use smoothing::{fwhm_to_sigma, smooth_map};
pub use spectrum::FrequencyBand;

use crate::maybe_rayon::*;
use boldmetrics_core::signal::Signal;
use boldmetrics_core::{Algorithm, Error, Result};
use ndarray::Array1;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use spectrum::band_amplitude;

/// Units reported by index in each NaN warning
const REPORTED_UNITS: usize = 5;

/// Normalisation applied to the ALFF map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlffNormalization {
    /// Raw amplitudes
    #[default]
    None,
    /// Divided by the mean over finite units (mALFF)
    MeanScaled,
    /// Standardised to zero mean and unit variance over finite units
    ZScore,
}

/// Parameters for ALFF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlffParams {
    /// Lower band edge in Hz
    pub low_cut: f64,
    /// Upper band edge in Hz
    pub high_cut: f64,
    /// Smoothing kernel width in mm (None or ≤ 0 disables smoothing)
    pub smoothing_fwhm: Option<f64>,
    pub normalization: AlffNormalization,
}

impl Default for AlffParams {
    fn default() -> Self {
        Self {
            low_cut: 0.01,
            high_cut: 0.08,
            smoothing_fwhm: None,
            normalization: AlffNormalization::None,
        }
    }
}

impl AlffParams {
    pub fn band(&self) -> FrequencyBand {
        FrequencyBand::new(self.low_cut, self.high_cut)
    }

    /// Smoothing width if smoothing is enabled
    pub fn smoothing(&self) -> Option<f64> {
        self.smoothing_fwhm.filter(|&fwhm| fwhm > 0.0)
    }

    /// Range checks that do not need the repetition time
    pub fn validate(&self) -> Result<()> {
        if let Some(fwhm) = self.smoothing_fwhm {
            if fwhm.is_nan() || fwhm.is_infinite() {
                return Err(Error::InvalidParameter {
                    name: "smoothing_fwhm",
                    value: fwhm.to_string(),
                    reason: "must be a finite number of millimetres".into(),
                });
            }
        }
        Ok(())
    }
}

/// ALFF maps in signal unit order
#[derive(Debug, Clone)]
pub struct AlffMap {
    /// Band amplitude, normalised as requested
    pub values: Array1<f64>,
    /// Fractional ALFF (band over total amplitude)
    pub fractional: Array1<f64>,
    /// Smoothed copy of `values`, when smoothing was requested
    pub smoothed: Option<Array1<f64>>,
    pub band: FrequencyBand,
    /// Units whose series contained non-finite samples
    pub invalid_units: usize,
    /// Units without any non-DC amplitude, whose fALFF is NaN
    pub flat_units: usize,
}

/// ALFF algorithm
#[derive(Debug, Clone, Default)]
pub struct Alff;

impl Algorithm for Alff {
    type Input = Signal;
    type Output = AlffMap;
    type Params = AlffParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "ALFF"
    }

    fn description(&self) -> &'static str {
        "Amplitude of low-frequency fluctuation per unit"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        alff(&input, &params)
    }
}

/// Compute ALFF for every unit of a signal.
///
/// # Arguments
/// * `signal` - Cleaned signal with a known repetition time
/// * `params` - Band, normalisation and smoothing
///
/// # Errors
/// `MissingRepetitionTime` comes first, then `InvalidBand` (including a band
/// with no frequency bin), all before any transform is computed.
pub fn alff(signal: &Signal, params: &AlffParams) -> Result<AlffMap> {
    let tr = signal.repetition_time().ok_or(Error::MissingRepetitionTime)?;
    let band = params.band();
    band.validate(tr)?;
    params.validate()?;

    let n = signal.n_timepoints();
    let bins = band.bins(n, tr)?;
    if params.smoothing().is_some() {
        smoothing::check_smoothable(signal.domain())?;
    }
    debug!(timepoints = n, first_bin = *bins.start(), last_bin = *bins.end(), "ALFF band bins");

    let fft = FftPlanner::<f64>::new().plan_fft_forward(n);
    let data = signal.data();
    let amplitudes: Vec<_> = (0..signal.n_units())
        .into_par_iter()
        .map(|u| band_amplitude(data.row(u), fft.as_ref(), &bins))
        .collect();

    let invalid: Vec<usize> = amplitudes
        .iter()
        .enumerate()
        .filter_map(|(u, a)| a.is_none().then_some(u))
        .collect();
    if !invalid.is_empty() {
        warn!(
            count = invalid.len(),
            first = ?&invalid[..invalid.len().min(REPORTED_UNITS)],
            "units with non-finite samples; ALFF set to NaN"
        );
    }

    let flat: Vec<usize> = amplitudes
        .iter()
        .enumerate()
        .filter_map(|(u, a)| matches!(a, Some(a) if a.fraction.is_nan()).then_some(u))
        .collect();
    if !flat.is_empty() {
        warn!(
            count = flat.len(),
            first = ?&flat[..flat.len().min(REPORTED_UNITS)],
            "units with zero total amplitude; fALFF set to NaN"
        );
    }

    let mut values: Array1<f64> = amplitudes.iter().map(|a| a.map_or(f64::NAN, |a| a.mean)).collect();
    let fractional: Array1<f64> = amplitudes.iter().map(|a| a.map_or(f64::NAN, |a| a.fraction)).collect();
    normalize(&mut values, params.normalization);

    let smoothed = match params.smoothing() {
        Some(fwhm) => Some(smooth_map(values.view(), signal.domain(), fwhm)?),
        None => None,
    };

    info!(
        units = signal.n_units(),
        low = band.low,
        high = band.high,
        smoothed = smoothed.is_some(),
        "computed ALFF"
    );

    Ok(AlffMap {
        values,
        fractional,
        smoothed,
        band,
        invalid_units: invalid.len(),
        flat_units: flat.len(),
    })
}

fn normalize(values: &mut Array1<f64>, normalization: AlffNormalization) {
    if normalization == AlffNormalization::None {
        return;
    }
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;

    match normalization {
        AlffNormalization::None => {}
        AlffNormalization::MeanScaled => {
            if mean == 0.0 {
                warn!("mean ALFF is zero; mean scaling yields NaN");
                values.fill(f64::NAN);
            } else {
                values.mapv_inplace(|v| v / mean);
            }
        }
        AlffNormalization::ZScore => {
            let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / finite.len() as f64;
            let std = var.sqrt();
            if std == 0.0 {
                warn!("ALFF has zero spread; z-scoring yields NaN");
                values.fill(f64::NAN);
            } else {
                values.mapv_inplace(|v| (v - mean) / std);
            }
        }
    }
}
