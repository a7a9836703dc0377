//! Atlas resampling into signal space
//!
//! Labels are carried across with nearest-neighbour lookup only. Any
//! blending interpolation would invent label values on region borders.

use crate::maybe_rayon::*;
use boldmetrics_core::atlas::{Atlas, AtlasLabels};
use boldmetrics_core::geometry::{DenseGeometry, LabelVolume, VolumeGeometry};
use boldmetrics_core::signal::SignalDomain;
use boldmetrics_core::transform::SpatialTransform;
use boldmetrics_core::{Algorithm, Error, Result};
use tracing::debug;

/// Geometry an atlas must be conformed to
#[derive(Debug, Clone, PartialEq)]
pub enum TargetGeometry {
    Volume(VolumeGeometry),
    Dense(DenseGeometry),
}

impl TargetGeometry {
    /// Target geometry of a signal's domain
    pub fn of(domain: &SignalDomain) -> Self {
        match domain {
            SignalDomain::Volume(v) => TargetGeometry::Volume(*v.geometry()),
            SignalDomain::Dense(d) => TargetGeometry::Dense(d.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            TargetGeometry::Volume(g) => g.to_string(),
            TargetGeometry::Dense(d) => d.to_string(),
        }
    }
}

/// Input bundle for [`Resample`]
#[derive(Debug, Clone)]
pub struct ResampleInput {
    pub atlas: Atlas,
    pub transform: SpatialTransform,
    pub target: TargetGeometry,
}

/// Atlas resampling algorithm
#[derive(Debug, Clone, Default)]
pub struct Resample;

impl Algorithm for Resample {
    type Input = ResampleInput;
    type Output = Atlas;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Resample"
    }

    fn description(&self) -> &'static str {
        "Nearest-neighbour resampling of a label atlas into signal space"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        resample(&input.atlas, &input.transform, &input.target)
    }
}

/// Resample an atlas onto a target geometry.
///
/// # Arguments
/// * `atlas` - Label atlas with its reference label table
/// * `transform` - Mapping from signal space back to atlas space
/// * `target` - Grid or dense layout the result must align to
///
/// # Returns
/// An atlas with the same name and reference table, defined on `target`.
/// With the identity transform and an identical grid, the atlas is returned
/// unchanged.
pub fn resample(atlas: &Atlas, transform: &SpatialTransform, target: &TargetGeometry) -> Result<Atlas> {
    let mismatch = |actual: String| Error::GeometryMismatch {
        atlas: atlas.name().to_string(),
        expected: target.describe(),
        actual,
    };

    match (atlas.labels(), target) {
        (AtlasLabels::Volume(labels), TargetGeometry::Volume(grid)) => {
            if transform.is_identity() && labels.geometry().matches(grid) {
                debug!(atlas = atlas.name(), "atlas already in signal space");
                return Ok(atlas.clone());
            }
            let resampled = resample_volume(labels, transform, grid)
                .ok_or_else(|| mismatch(format!("{} with a singular affine", labels.geometry())))?;
            debug!(
                atlas = atlas.name(),
                transform = %transform,
                target = %grid,
                "resampled atlas with nearest-neighbour lookup"
            );
            Ok(atlas.with_labels(AtlasLabels::Volume(resampled)))
        }
        (AtlasLabels::Dense(labels), TargetGeometry::Dense(dense)) => {
            if !transform.is_identity() {
                return Err(mismatch(format!(
                    "{} (dense labels cannot be moved by a {} transform)",
                    labels.geometry(),
                    transform
                )));
            }
            if !labels.geometry().matches(dense) {
                return Err(mismatch(labels.geometry().to_string()));
            }
            Ok(atlas.clone())
        }
        (labels, _) => Err(mismatch(labels.describe())),
    }
}

/// Pull every target voxel centre back into the atlas grid and copy the
/// nearest label. `None` if the atlas affine cannot be inverted.
fn resample_volume(
    labels: &LabelVolume,
    transform: &SpatialTransform,
    grid: &VolumeGeometry,
) -> Option<LabelVolume> {
    let to_atlas_voxel = labels.geometry().affine().inverse()?;
    let [ni, nj, nk] = grid.dims();

    let data: Vec<u32> = (0..ni)
        .into_par_iter()
        .flat_map(|i| {
            let mut plane = vec![0u32; nj * nk];
            for j in 0..nj {
                for k in 0..nk {
                    let world = grid.affine().voxel_to_world([i, j, k]);
                    plane[j * nk + k] = transform
                        .map_point(world)
                        .and_then(|p| labels.geometry().nearest_voxel(to_atlas_voxel.apply(p)))
                        .and_then(|v| labels.get(v))
                        .unwrap_or(0);
                }
            }
            plane
        })
        .collect();

    LabelVolume::from_vec(data, *grid).ok()
}
