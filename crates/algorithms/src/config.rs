//! Post-processing configuration
//!
//! Bundles the parameters of every estimator so a run can be described by a
//! single JSON document. Missing fields take their defaults.
//!
//! ```json
//! {
//!   "alff": { "low_cut": 0.01, "high_cut": 0.08, "smoothing_fwhm": 6.0 },
//!   "reho": { "connectivity": "faces" },
//!   "parcellation": { "min_coverage": 0.5 },
//!   "processing_mode": { "parallel_with": 2 }
//! }
//! ```

use boldmetrics_core::{Error, Result};
use boldmetrics_parallel::ProcessingMode;
use serde::{Deserialize, Serialize};

use crate::alff::AlffParams;
use crate::parcellation::ParcellationParams;
use crate::reho::RehoParams;

/// Parameters of a post-processing run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocConfig {
    pub alff: AlffParams,
    pub reho: RehoParams,
    pub parcellation: ParcellationParams,
    /// How many atlases are processed at once
    pub processing_mode: ProcessingMode,
}

impl PostprocConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Range checks that do not depend on the data.
    ///
    /// The upper band edge can only be checked against Nyquist once the
    /// repetition time is known, in [`crate::alff::alff`].
    pub fn validate(&self) -> Result<()> {
        let band = self.alff.band();
        if !(band.low.is_finite() && band.high.is_finite() && 0.0 <= band.low && band.low < band.high) {
            return Err(Error::Config(format!(
                "ALFF band [{}, {}] Hz must satisfy 0 <= low < high",
                band.low, band.high
            )));
        }
        self.alff.validate()?;
        self.parcellation.validate()?;
        if self.processing_mode == ProcessingMode::ParallelWith(0) {
            return Err(Error::Config("processing_mode parallel_with needs at least one thread".into()));
        }
        Ok(())
    }
}
