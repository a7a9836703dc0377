//! Discrete-label atlases and their reference label tables

use crate::error::{Error, Result};
use crate::geometry::{distinct_labels, DenseGeometry, LabelVolume};
use tracing::debug;

/// One label per unit of a dense domain
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLabels {
    geometry: DenseGeometry,
    labels: Vec<u32>,
}

impl DenseLabels {
    /// Create, checking one label per dense unit
    pub fn new(geometry: DenseGeometry, labels: Vec<u32>) -> Result<Self> {
        if labels.len() != geometry.n_units() {
            return Err(Error::ShapeMismatch {
                what: "dense atlas labels".into(),
                expected: format!("{} units ({})", geometry.n_units(), geometry),
                actual: format!("{} labels", labels.len()),
            });
        }
        Ok(Self { geometry, labels })
    }

    /// Dense domain the labels are defined on
    pub fn geometry(&self) -> &DenseGeometry {
        &self.geometry
    }

    /// Label per unit
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }
}

/// Label storage of an atlas
#[derive(Debug, Clone, PartialEq)]
pub enum AtlasLabels {
    Volume(LabelVolume),
    Dense(DenseLabels),
}

impl AtlasLabels {
    fn label_set(&self) -> Vec<u32> {
        match self {
            AtlasLabels::Volume(v) => v.label_set(),
            AtlasLabels::Dense(d) => distinct_labels(d.labels.iter().copied()),
        }
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            AtlasLabels::Volume(v) => v.geometry().to_string(),
            AtlasLabels::Dense(d) => d.geometry.to_string(),
        }
    }
}

/// A named atlas: labels plus the reference set of region ids.
///
/// The reference table fixes the region rows produced for this atlas, so
/// region counts stay stable even when resampling loses a region.
#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    name: String,
    labels: AtlasLabels,
    reference: Vec<u32>,
}

impl Atlas {
    /// Create an atlas whose reference table is the set of labels present
    pub fn new(name: impl Into<String>, labels: AtlasLabels) -> Result<Self> {
        let name = name.into();
        let reference = labels.label_set();
        if reference.is_empty() {
            return Err(Error::InvalidParameter {
                name: "atlas",
                value: name,
                reason: "atlas has no positive labels".into(),
            });
        }
        Ok(Self {
            name,
            labels,
            reference,
        })
    }

    /// Create an atlas with an explicit reference label table
    pub fn with_reference(
        name: impl Into<String>,
        labels: AtlasLabels,
        reference: impl IntoIterator<Item = u32>,
    ) -> Result<Self> {
        let name = name.into();
        let reference = distinct_labels(reference);
        if reference.is_empty() {
            return Err(Error::InvalidParameter {
                name: "reference_labels",
                value: name,
                reason: "reference label table has no positive labels".into(),
            });
        }
        let present = labels.label_set();
        let absent = reference.iter().filter(|&&l| present.binary_search(&l).is_err()).count();
        if absent > 0 {
            debug!(atlas = %name, absent, "reference labels missing from the label image");
        }
        Ok(Self {
            name,
            labels,
            reference,
        })
    }

    /// Atlas name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label storage
    pub fn labels(&self) -> &AtlasLabels {
        &self.labels
    }

    /// Sorted reference region ids
    pub fn reference(&self) -> &[u32] {
        &self.reference
    }

    /// Number of reference regions
    pub fn n_regions(&self) -> usize {
        self.reference.len()
    }

    /// Same name and reference table over new labels
    pub fn with_labels(&self, labels: AtlasLabels) -> Atlas {
        Atlas {
            name: self.name.clone(),
            labels,
            reference: self.reference.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Affine3, BrainModel, StructureVoxels, VolumeGeometry};
    use ndarray::Array3;

    fn volume(values: &[u32]) -> AtlasLabels {
        let labels = Array3::from_shape_vec((1, 1, values.len()), values.to_vec()).unwrap();
        AtlasLabels::Volume(LabelVolume::new(labels, Affine3::identity()).unwrap())
    }

    #[test]
    fn test_reference_from_labels() {
        let atlas = Atlas::new("toy", volume(&[0, 3, 1, 3, 0])).unwrap();
        assert_eq!(atlas.reference(), &[1, 3]);
    }

    #[test]
    fn test_explicit_reference_sorted() {
        let atlas = Atlas::with_reference("toy", volume(&[1, 1]), [5, 0, 2, 5]).unwrap();
        assert_eq!(atlas.reference(), &[2, 5]);
        assert_eq!(atlas.n_regions(), 2);
    }

    #[test]
    fn test_dense_reference_from_labels() {
        let grid = VolumeGeometry::new([4, 1, 1], Affine3::identity()).unwrap();
        let model = BrainModel::Volume(StructureVoxels {
            structure: "THALAMUS_LEFT".into(),
            voxels: vec![[0, 0, 0], [1, 0, 0], [2, 0, 0], [3, 0, 0]],
        });
        let geometry = DenseGeometry::new(vec![model], Some(grid)).unwrap();
        let labels = AtlasLabels::Dense(DenseLabels::new(geometry, vec![7, 0, 2, 7]).unwrap());
        let atlas = Atlas::new("dense", labels).unwrap();
        assert_eq!(atlas.reference(), &[2, 7]);
    }

    #[test]
    fn test_unlabelled_atlas_rejected() {
        assert!(Atlas::new("empty", volume(&[0, 0])).is_err());
    }
}
