//! Band-limited amplitude spectrum of a single unit
//!
//! The amplitude at bin `k` is the square root of the one-sided periodogram
//! power: `√2·|X_k|/N`, except for the DC and Nyquist bins which are not
//! folded and use `|X_k|/N`.

use std::ops::RangeInclusive;

use boldmetrics_core::{Error, Result};
use ndarray::ArrayView1;
use rustfft::num_complex::Complex;
use rustfft::Fft;
use serde::{Deserialize, Serialize};

/// Slack when comparing bin frequencies to the band edges
const BAND_EDGE_TOLERANCE: f64 = 1e-9;

/// Pass band in Hz
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low: f64,
    pub high: f64,
}

impl FrequencyBand {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Nyquist frequency for a repetition time in seconds
    pub fn nyquist(repetition_time: f64) -> f64 {
        0.5 / repetition_time
    }

    /// Check `0 ≤ low < high ≤ Nyquist`
    pub fn validate(&self, repetition_time: f64) -> Result<()> {
        let nyquist = Self::nyquist(repetition_time);
        let reject = |reason: &str| Error::InvalidBand {
            low: self.low,
            high: self.high,
            nyquist,
            reason: reason.to_string(),
        };

        if !(self.low.is_finite() && self.high.is_finite()) {
            return Err(reject("band edges must be finite"));
        }
        if self.low < 0.0 {
            return Err(reject("low cut must not be negative"));
        }
        if self.low >= self.high {
            return Err(reject("low cut must be below high cut"));
        }
        if self.high > nyquist * (1.0 + BAND_EDGE_TOLERANCE) {
            return Err(reject("high cut exceeds the Nyquist frequency"));
        }
        Ok(())
    }

    /// FFT bins whose frequency lies inside the band, for `n` samples.
    ///
    /// Fails when the frequency resolution is too coarse for any bin to
    /// land in the band.
    pub fn bins(&self, n: usize, repetition_time: f64) -> Result<RangeInclusive<usize>> {
        let resolution = 1.0 / (n as f64 * repetition_time);
        let last = n / 2;

        let first = (self.low / resolution - BAND_EDGE_TOLERANCE).ceil().max(0.0) as usize;
        let end = (self.high / resolution + BAND_EDGE_TOLERANCE).floor() as usize;
        let end = end.min(last);

        if n < 2 || first > end {
            return Err(Error::InvalidBand {
                low: self.low,
                high: self.high,
                nyquist: Self::nyquist(repetition_time),
                reason: format!(
                    "no frequency bin inside the band at a resolution of {:.5} Hz ({} timepoints)",
                    resolution, n
                ),
            });
        }
        Ok(first..=end)
    }
}

/// Amplitude summary of one unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BandAmplitude {
    /// Mean amplitude over the band bins
    pub mean: f64,
    /// Band amplitude sum over the sum of all non-DC amplitudes
    pub fraction: f64,
}

/// Amplitude of bin `k` out of `n`
fn amplitude(value: Complex<f64>, k: usize, n: usize) -> f64 {
    let scale = if k == 0 || (n % 2 == 0 && k == n / 2) {
        1.0
    } else {
        std::f64::consts::SQRT_2
    };
    scale * value.norm() / n as f64
}

/// Demean and transform one series. `None` for non-finite input.
pub(crate) fn band_amplitude(
    series: ArrayView1<'_, f64>,
    fft: &dyn Fft<f64>,
    bins: &RangeInclusive<usize>,
) -> Option<BandAmplitude> {
    if series.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let n = series.len();
    let mean = series.sum() / n as f64;
    let mut buffer: Vec<Complex<f64>> = series.iter().map(|&v| Complex::new(v - mean, 0.0)).collect();
    fft.process(&mut buffer);

    let amplitudes: Vec<f64> = buffer[..=n / 2]
        .iter()
        .enumerate()
        .map(|(k, &x)| amplitude(x, k, n))
        .collect();

    let band = &amplitudes[*bins.start()..=*bins.end()];
    let band_sum: f64 = band.iter().sum();
    let total: f64 = amplitudes[1..].iter().sum();

    Some(BandAmplitude {
        mean: band_sum / band.len() as f64,
        fraction: if total > 0.0 { band_sum / total } else { f64::NAN },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;
    use rustfft::FftPlanner;

    #[test]
    fn test_band_validation() {
        assert!(FrequencyBand::new(0.01, 0.08).validate(2.0).is_ok());
        assert!(FrequencyBand::new(0.0, 0.25).validate(2.0).is_ok());
        assert!(FrequencyBand::new(0.05, 0.05).validate(2.0).is_err());
        assert!(FrequencyBand::new(0.08, 0.01).validate(2.0).is_err());
        assert!(FrequencyBand::new(-0.01, 0.08).validate(2.0).is_err());
        assert!(FrequencyBand::new(0.01, 0.3).validate(2.0).is_err());
        assert!(FrequencyBand::new(f64::NAN, 0.08).validate(2.0).is_err());
    }

    #[test]
    fn test_band_bins() {
        // 100 samples at 2 s: 0.005 Hz per bin
        let bins = FrequencyBand::new(0.01, 0.08).bins(100, 2.0).unwrap();
        assert_eq!(bins, 2..=16);

        // 4 samples at 2 s: bins at 0, 0.125, 0.25 Hz
        let err = FrequencyBand::new(0.01, 0.08).bins(4, 2.0).unwrap_err();
        assert!(err.to_string().contains("resolution"));
    }

    #[test]
    fn test_pure_cosine_amplitude() {
        let n = 100;
        let a = 3.0;
        let series = Array1::from_shape_fn(n, |t| {
            a * (2.0 * std::f64::consts::PI * 10.0 * t as f64 / n as f64).cos() + 7.0
        });
        let fft = FftPlanner::<f64>::new().plan_fft_forward(n);
        let bins = 2..=16;

        let amp = band_amplitude(series.view(), fft.as_ref(), &bins).unwrap();
        assert_relative_eq!(amp.mean, a / std::f64::consts::SQRT_2 / 15.0, epsilon = 1e-9);
        assert_relative_eq!(amp.fraction, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_non_finite_series() {
        let series = Array1::from_vec(vec![1.0, f64::NAN, 2.0, 3.0]);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(4);
        assert!(band_amplitude(series.view(), fft.as_ref(), &(1..=2)).is_none());
    }
}
