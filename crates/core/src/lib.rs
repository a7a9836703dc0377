//! # boldmetrics core
//!
//! Shared types, geometry and errors for post-processing cleaned BOLD signals.
//!
//! This crate provides:
//! - [`Signal`]: a units × timepoints matrix tied to a volumetric or dense domain
//! - [`Atlas`]: discrete region labels with their reference label table
//! - [`SpatialTransform`]: explicit identity / single / composed point mappings
//! - Voxel and dense (surface + subcortical) geometry
//! - Tabular output helpers for region time series and connectivity

pub mod atlas;
pub mod error;
pub mod geometry;
pub mod io;
pub mod signal;
pub mod transform;

pub use atlas::{Atlas, AtlasLabels, DenseLabels};
pub use error::{Error, Result};
pub use geometry::{Affine3, DenseGeometry, LabelVolume, VolumeDomain, VolumeGeometry};
pub use signal::{Signal, SignalDomain};
pub use transform::{AffineMapping, DisplacementField, PointMapping, SpatialTransform};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::atlas::{Atlas, AtlasLabels, DenseLabels};
    pub use crate::error::{Error, Result};
    pub use crate::geometry::{
        Affine3, BrainModel, DenseGeometry, LabelVolume, StructureVoxels, SurfaceModel,
        VolumeDomain, VolumeGeometry, VoxelConnectivity,
    };
    pub use crate::signal::{Signal, SignalDomain};
    pub use crate::transform::{AffineMapping, DisplacementField, PointMapping, SpatialTransform};
    pub use crate::Algorithm;
}

/// Core trait for all estimators in boldmetrics.
///
/// Estimators are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the estimator
    type Input;
    /// Output type for the estimator
    type Output;
    /// Parameters controlling estimator behavior
    type Params: Default;
    /// Error type for estimator execution
    type Error: std::error::Error;

    /// Returns the estimator name
    fn name(&self) -> &'static str;

    /// Returns a description of what the estimator computes
    fn description(&self) -> &'static str;

    /// Execute the estimator
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
