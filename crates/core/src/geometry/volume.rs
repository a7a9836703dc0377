//! Voxel grids, label volumes and masked volumetric domains

use std::fmt;

use ndarray::{Array3, ArrayView1, ArrayView3};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Affine3;

/// Affine tolerance used when deciding whether two grids are the same
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// A 3-D voxel grid: dimensions plus voxel-to-world affine.
///
/// Linear voxel indices follow C order over `(i, j, k)`, `k` varying fastest,
/// matching the memory order of `ndarray::Array3`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeGeometry {
    dims: [usize; 3],
    affine: Affine3,
}

impl VolumeGeometry {
    /// Create a grid, rejecting empty dimensions
    pub fn new(dims: [usize; 3], affine: Affine3) -> Result<Self> {
        if dims.iter().any(|&d| d == 0) {
            return Err(Error::InvalidDimensions {
                what: "volume",
                dims: format!("{}x{}x{}", dims[0], dims[1], dims[2]),
            });
        }
        Ok(Self { dims, affine })
    }

    /// Grid dimensions (i, j, k)
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Voxel-to-world affine
    pub fn affine(&self) -> &Affine3 {
        &self.affine
    }

    /// Total number of voxels
    pub fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Whether the grid has no voxels (never true for a validated grid)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Voxel size in millimetres along each axis
    pub fn voxel_sizes(&self) -> [f64; 3] {
        self.affine.voxel_sizes()
    }

    /// Voxel (i, j, k) of a linear C-order index
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let k = index % self.dims[2];
        let rest = index / self.dims[2];
        [rest / self.dims[1], rest % self.dims[1], k]
    }

    /// Checked signed offset of a voxel, `None` outside the grid
    pub fn offset(&self, ijk: [usize; 3], delta: [isize; 3]) -> Option<[usize; 3]> {
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let v = ijk[axis] as isize + delta[axis];
            if v < 0 || v >= self.dims[axis] as isize {
                return None;
            }
            out[axis] = v as usize;
        }
        Some(out)
    }

    /// Round continuous voxel coordinates to the nearest voxel, `None` outside
    pub fn nearest_voxel(&self, continuous: [f64; 3]) -> Option<[usize; 3]> {
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let v = continuous[axis];
            if !v.is_finite() {
                return None;
            }
            let r = v.round();
            if r < 0.0 || r >= self.dims[axis] as f64 {
                return None;
            }
            out[axis] = r as usize;
        }
        Some(out)
    }

    /// Same dimensions and affine (within [`GEOMETRY_TOLERANCE`])
    pub fn matches(&self, other: &VolumeGeometry) -> bool {
        self.dims == other.dims && self.affine.approx_eq(&other.affine, GEOMETRY_TOLERANCE)
    }
}

impl fmt::Display for VolumeGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [sx, sy, sz] = self.voxel_sizes();
        write!(
            f,
            "volume {}x{}x{} ({:.2}x{:.2}x{:.2} mm)",
            self.dims[0], self.dims[1], self.dims[2], sx, sy, sz
        )
    }
}

/// A discrete label volume (0 = unassigned)
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVolume {
    geometry: VolumeGeometry,
    labels: Array3<u32>,
}

impl LabelVolume {
    /// Create from a label array and its voxel-to-world affine
    pub fn new(labels: Array3<u32>, affine: Affine3) -> Result<Self> {
        let (ni, nj, nk) = labels.dim();
        let geometry = VolumeGeometry::new([ni, nj, nk], affine)?;
        Ok(Self { geometry, labels })
    }

    /// Create from a label image of any numeric type.
    ///
    /// Atlases are often stored as floating-point images; every voxel must
    /// hold a non-negative whole number that fits in `u32`.
    pub fn from_numeric<T: ToPrimitive + Copy>(values: ArrayView3<'_, T>, affine: Affine3) -> Result<Self> {
        let mut labels = Array3::<u32>::zeros(values.raw_dim());
        for (dst, &v) in labels.iter_mut().zip(values.iter()) {
            let x = v.to_f64().unwrap_or(f64::NAN);
            if !(x.is_finite() && x >= 0.0 && x.fract() == 0.0 && x <= u32::MAX as f64) {
                return Err(Error::InvalidParameter {
                    name: "labels",
                    value: x.to_string(),
                    reason: "labels must be non-negative whole numbers".into(),
                });
            }
            *dst = x as u32;
        }
        Self::new(labels, affine)
    }

    /// Create from C-order label data
    pub fn from_vec(data: Vec<u32>, geometry: VolumeGeometry) -> Result<Self> {
        if data.len() != geometry.len() {
            return Err(Error::ShapeMismatch {
                what: "label volume data".into(),
                expected: format!("{} voxels", geometry.len()),
                actual: format!("{} values", data.len()),
            });
        }
        let d = geometry.dims();
        let labels = Array3::from_shape_vec((d[0], d[1], d[2]), data)?;
        Ok(Self { geometry, labels })
    }

    /// Grid of the label volume
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// Label array
    pub fn labels(&self) -> &Array3<u32> {
        &self.labels
    }

    /// Label of voxel (i, j, k), `None` outside the grid
    pub fn get(&self, ijk: [usize; 3]) -> Option<u32> {
        self.labels.get((ijk[0], ijk[1], ijk[2])).copied()
    }

    /// Sorted distinct positive labels present in the volume
    pub fn label_set(&self) -> Vec<u32> {
        distinct_labels(self.labels.iter().copied())
    }
}

/// Sorted distinct labels with the background (0) removed
pub(crate) fn distinct_labels(labels: impl IntoIterator<Item = u32>) -> Vec<u32> {
    let mut set: Vec<u32> = labels.into_iter().filter(|&l| l != 0).collect();
    set.sort_unstable();
    set.dedup();
    set
}

/// A masked volumetric domain.
///
/// Units are the in-mask voxels enumerated in C order; unit `u` lives at
/// `voxels()[u]`.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeDomain {
    geometry: VolumeGeometry,
    mask: Array3<bool>,
    voxels: Vec<[usize; 3]>,
}

impl VolumeDomain {
    /// Build from a boolean brain mask
    pub fn new(mask: Array3<bool>, affine: Affine3) -> Result<Self> {
        let (ni, nj, nk) = mask.dim();
        let geometry = VolumeGeometry::new([ni, nj, nk], affine)?;

        let voxels: Vec<[usize; 3]> = mask
            .indexed_iter()
            .filter(|(_, &inside)| inside)
            .map(|((i, j, k), _)| [i, j, k])
            .collect();

        if voxels.is_empty() {
            return Err(Error::InvalidDimensions {
                what: "brain mask",
                dims: format!("{} (no voxels inside the mask)", geometry),
            });
        }

        Ok(Self {
            geometry,
            mask,
            voxels,
        })
    }

    /// Domain covering every voxel of the grid
    pub fn full(geometry: VolumeGeometry) -> Self {
        let d = geometry.dims();
        let mask = Array3::from_elem((d[0], d[1], d[2]), true);
        let voxels = (0..geometry.len()).map(|idx| geometry.coords(idx)).collect();
        Self {
            geometry,
            mask,
            voxels,
        }
    }

    /// Grid of the domain
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// Brain mask
    pub fn mask(&self) -> &Array3<bool> {
        &self.mask
    }

    /// In-mask voxel coordinates, in unit order
    pub fn voxels(&self) -> &[[usize; 3]] {
        &self.voxels
    }

    /// Number of units (in-mask voxels)
    pub fn n_units(&self) -> usize {
        self.voxels.len()
    }

    /// Volume mapping each voxel to its unit index (`None` outside the mask)
    pub fn unit_lookup(&self) -> Array3<Option<usize>> {
        let d = self.geometry.dims();
        let mut lookup = Array3::from_elem((d[0], d[1], d[2]), None);
        for (unit, v) in self.voxels.iter().enumerate() {
            lookup[(v[0], v[1], v[2])] = Some(unit);
        }
        lookup
    }

    /// Place a unit-indexed map back into the grid, NaN outside the mask
    pub fn scatter(&self, values: ArrayView1<'_, f64>) -> Result<Array3<f64>> {
        if values.len() != self.n_units() {
            return Err(Error::ShapeMismatch {
                what: "unit map".into(),
                expected: format!("{} units", self.n_units()),
                actual: format!("{} values", values.len()),
            });
        }
        let d = self.geometry.dims();
        let mut out = Array3::from_elem((d[0], d[1], d[2]), f64::NAN);
        for (v, &value) in self.voxels.iter().zip(values.iter()) {
            out[(v[0], v[1], v[2])] = value;
        }
        Ok(out)
    }
}
