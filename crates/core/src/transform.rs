//! Spatial transforms applied when resampling atlases.
//!
//! Transforms are estimated elsewhere; this module only represents and
//! applies them. Mappings are pull-back point maps: they take a world point in
//! the space being resampled *into* (the signal) and return the world point in
//! the space being resampled *from* (the atlas).

use std::fmt;
use std::sync::Arc;

use ndarray::Array4;

use crate::error::{Error, Result};
use crate::geometry::{Affine3, VolumeGeometry};

/// An opaque world-to-world point mapping
pub trait PointMapping: fmt::Debug + Send + Sync {
    /// Map a target-space point to source space, `None` where undefined
    fn map_point(&self, p: [f64; 3]) -> Option<[f64; 3]>;

    /// Short description used in logs
    fn describe(&self) -> String;
}

/// Linear mapping in world coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMapping {
    affine: Affine3,
}

impl AffineMapping {
    pub fn new(affine: Affine3) -> Self {
        Self { affine }
    }

    pub fn affine(&self) -> &Affine3 {
        &self.affine
    }
}

impl PointMapping for AffineMapping {
    fn map_point(&self, p: [f64; 3]) -> Option<[f64; 3]> {
        Some(self.affine.apply(p))
    }

    fn describe(&self) -> String {
        "affine".into()
    }
}

/// Deformable mapping stored as a world-space displacement per grid voxel.
///
/// The displacement at a point is trilinearly interpolated from the grid and
/// added to the point. Points outside the grid are undefined.
#[derive(Debug, Clone)]
pub struct DisplacementField {
    grid: VolumeGeometry,
    to_voxel: Affine3,
    displacements: Array4<f64>,
}

impl DisplacementField {
    /// Create from a grid and an `(i, j, k, 3)` displacement array in millimetres
    pub fn new(grid: VolumeGeometry, displacements: Array4<f64>) -> Result<Self> {
        let d = grid.dims();
        let shape = displacements.dim();
        if shape != (d[0], d[1], d[2], 3) {
            return Err(Error::ShapeMismatch {
                what: "displacement field".into(),
                expected: format!("{}x{}x{}x3", d[0], d[1], d[2]),
                actual: format!("{}x{}x{}x{}", shape.0, shape.1, shape.2, shape.3),
            });
        }
        let to_voxel = grid.affine().inverse().ok_or_else(|| Error::InvalidParameter {
            name: "displacement_grid",
            value: grid.to_string(),
            reason: "grid affine is singular".into(),
        })?;
        Ok(Self {
            grid,
            to_voxel,
            displacements,
        })
    }

    fn displacement_at(&self, p: [f64; 3]) -> Option<[f64; 3]> {
        let c = self.to_voxel.apply(p);
        let dims = self.grid.dims();

        let mut base = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            if !c[axis].is_finite() || c[axis] < 0.0 || c[axis] > (dims[axis] - 1) as f64 {
                return None;
            }
            let f = c[axis].floor();
            base[axis] = (f as usize).min(dims[axis].saturating_sub(2));
            frac[axis] = c[axis] - base[axis] as f64;
            if dims[axis] == 1 {
                base[axis] = 0;
                frac[axis] = 0.0;
            }
        }

        let mut out = [0.0; 3];
        for corner in 0..8usize {
            let offs = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
            let mut weight = 1.0;
            let mut idx = [0usize; 3];
            for axis in 0..3 {
                weight *= if offs[axis] == 1 { frac[axis] } else { 1.0 - frac[axis] };
                idx[axis] = (base[axis] + offs[axis]).min(dims[axis] - 1);
            }
            if weight == 0.0 {
                continue;
            }
            for (component, value) in out.iter_mut().enumerate() {
                *value += weight * self.displacements[(idx[0], idx[1], idx[2], component)];
            }
        }
        Some(out)
    }
}

impl PointMapping for DisplacementField {
    fn map_point(&self, p: [f64; 3]) -> Option<[f64; 3]> {
        let d = self.displacement_at(p)?;
        Some([p[0] + d[0], p[1] + d[1], p[2] + d[2]])
    }

    fn describe(&self) -> String {
        format!("displacement field on {}", self.grid)
    }
}

/// The transform bringing an atlas into signal space.
///
/// `Composed` stages are listed in image direction: `first` carries the atlas
/// into an intermediate space (e.g. template to subject anatomy), `second`
/// carries that into signal space. Points therefore travel through `second`
/// before `first`.
#[derive(Debug, Clone, Default)]
pub enum SpatialTransform {
    /// Atlas and signal share a coordinate frame
    #[default]
    Identity,
    Single(Arc<dyn PointMapping>),
    Composed {
        first: Arc<dyn PointMapping>,
        second: Arc<dyn PointMapping>,
    },
}

impl SpatialTransform {
    /// Wrap a single mapping
    pub fn single(mapping: impl PointMapping + 'static) -> Self {
        SpatialTransform::Single(Arc::new(mapping))
    }

    /// Compose two mappings, in image direction
    pub fn composed(first: impl PointMapping + 'static, second: impl PointMapping + 'static) -> Self {
        SpatialTransform::Composed {
            first: Arc::new(first),
            second: Arc::new(second),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, SpatialTransform::Identity)
    }

    /// Map a signal-space world point to atlas-space world coordinates
    pub fn map_point(&self, p: [f64; 3]) -> Option<[f64; 3]> {
        match self {
            SpatialTransform::Identity => Some(p),
            SpatialTransform::Single(m) => m.map_point(p),
            SpatialTransform::Composed { first, second } => {
                let intermediate = second.map_point(p)?;
                first.map_point(intermediate)
            }
        }
    }
}

impl fmt::Display for SpatialTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialTransform::Identity => write!(f, "identity"),
            SpatialTransform::Single(m) => write!(f, "{}", m.describe()),
            SpatialTransform::Composed { first, second } => {
                write!(f, "{} then {}", first.describe(), second.describe())
            }
        }
    }
}
