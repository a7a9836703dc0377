//! Cleaned signal matrices and the spatial domain they live on

use std::fmt;

use ndarray::{Array2, ArrayView1, ArrayView2};
use num_traits::ToPrimitive;

use crate::error::{Error, Result};
use crate::geometry::{DenseGeometry, VolumeDomain};

/// Spatial domain of a signal's units
#[derive(Debug, Clone, PartialEq)]
pub enum SignalDomain {
    /// In-mask voxels of a volumetric image
    Volume(VolumeDomain),
    /// Surface vertices and subcortical voxels of a dense time series
    Dense(DenseGeometry),
}

impl SignalDomain {
    /// Number of units in the domain
    pub fn n_units(&self) -> usize {
        match self {
            SignalDomain::Volume(v) => v.n_units(),
            SignalDomain::Dense(d) => d.n_units(),
        }
    }
}

impl fmt::Display for SignalDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalDomain::Volume(v) => write!(f, "{} with {} in-mask voxels", v.geometry(), v.n_units()),
            SignalDomain::Dense(d) => write!(f, "{}", d),
        }
    }
}

/// A cleaned signal: one row per unit, one column per timepoint.
///
/// # Example
///
/// ```ignore
/// use boldmetrics_core::{Signal, SignalDomain};
///
/// let signal = Signal::new(data, SignalDomain::Volume(domain), Some(2.0))?;
/// assert_eq!(signal.n_units(), signal.domain().n_units());
/// ```
#[derive(Debug, Clone)]
pub struct Signal {
    data: Array2<f64>,
    domain: SignalDomain,
    repetition_time: Option<f64>,
}

impl Signal {
    /// Create a signal, checking unit count against the domain
    pub fn new(data: Array2<f64>, domain: SignalDomain, repetition_time: Option<f64>) -> Result<Self> {
        let (units, timepoints) = data.dim();
        if units == 0 || timepoints == 0 {
            return Err(Error::InvalidDimensions {
                what: "signal",
                dims: format!("{} units x {} timepoints", units, timepoints),
            });
        }
        if units != domain.n_units() {
            return Err(Error::ShapeMismatch {
                what: "signal units".into(),
                expected: format!("{} units ({})", domain.n_units(), domain),
                actual: format!("{} rows", units),
            });
        }
        if let Some(tr) = repetition_time {
            if !(tr.is_finite() && tr > 0.0) {
                return Err(Error::InvalidParameter {
                    name: "repetition_time",
                    value: tr.to_string(),
                    reason: "must be a positive number of seconds".into(),
                });
            }
        }
        Ok(Self {
            data,
            domain,
            repetition_time,
        })
    }

    /// Create a signal from samples of any numeric type (e.g. `f32` or
    /// `i16` images). Samples that cannot be represented become NaN.
    pub fn from_samples<T: ToPrimitive + Copy>(
        samples: ArrayView2<'_, T>,
        domain: SignalDomain,
        repetition_time: Option<f64>,
    ) -> Result<Self> {
        let data = samples.mapv(|v| v.to_f64().unwrap_or(f64::NAN));
        Self::new(data, domain, repetition_time)
    }

    /// Signal matrix (units × timepoints)
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Spatial domain
    pub fn domain(&self) -> &SignalDomain {
        &self.domain
    }

    /// Seconds per sample, if known
    pub fn repetition_time(&self) -> Option<f64> {
        self.repetition_time
    }

    /// Number of units
    pub fn n_units(&self) -> usize {
        self.data.nrows()
    }

    /// Number of timepoints
    pub fn n_timepoints(&self) -> usize {
        self.data.ncols()
    }

    /// Time series of one unit
    pub fn unit(&self, index: usize) -> ArrayView1<'_, f64> {
        self.data.row(index)
    }

    /// Same domain and repetition time, different data
    pub fn with_data(&self, data: Array2<f64>) -> Result<Self> {
        Self::new(data, self.domain.clone(), self.repetition_time)
    }
}
