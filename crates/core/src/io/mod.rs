//! Tabular output for region-level results
//!
//! Container formats (NIfTI, CIFTI) are read and written by the caller; this
//! module only covers the tab-separated tables derived from region results.

mod tsv;

pub use tsv::{write_connectivity, write_region_timeseries, MISSING_VALUE};
