//! # boldmetrics algorithms
//!
//! Estimators for cleaned BOLD signals.
//!
//! ## Available Estimators
//!
//! - **resample**: Nearest-neighbour atlas resampling into signal space
//! - **parcellation**: Region mean time series and parcellated maps
//! - **connectivity**: Pearson connectivity, batched over atlases
//! - **alff**: Amplitude of low-frequency fluctuation (ALFF, fALFF)
//! - **reho**: Regional homogeneity (Kendall's W)
//! - **config**: JSON configuration of a post-processing run

pub(crate) mod maybe_rayon;

pub mod alff;
pub mod config;
pub mod connectivity;
pub mod parcellation;
pub mod reho;
pub mod resample;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::alff::{alff, smooth_map, Alff, AlffMap, AlffNormalization, AlffParams, FrequencyBand};
    pub use crate::config::PostprocConfig;
    pub use crate::connectivity::{
        correlate, extract_connectivity, pearson_matrix, AtlasConnectivity, ConnectivityMatrix, Correlate,
    };
    pub use crate::parcellation::{
        aggregate, parcellate_map, DegenerateReason, Parcellate, ParcellationParams, RegionTimeSeries, RegionValues,
    };
    pub use crate::reho::{neighborhood_graph, reho, NeighborhoodGraph, RankArena, Reho, RehoMap, RehoParams};
    pub use crate::resample::{resample, Resample, ResampleInput, TargetGeometry};
    pub use boldmetrics_core::prelude::*;
    pub use boldmetrics_parallel::{ParallelStrategy, ProcessingMode};
}
