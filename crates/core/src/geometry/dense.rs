//! Dense surface + subcortical domains (CIFTI-style brain models)
//!
//! A dense domain is an ordered list of brain models. Each model contributes
//! a contiguous block of units:
//! - a cortical surface contributes one unit per included mesh vertex
//!   (vertices outside the model, e.g. the medial wall, carry no unit);
//! - a subcortical structure contributes one unit per voxel.

use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::geometry::VolumeGeometry;

/// A cortical surface brain model
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceModel {
    /// Structure name, e.g. `CORTEX_LEFT`
    pub structure: String,
    /// Number of vertices of the full mesh
    pub surface_vertices: usize,
    /// Mesh vertex of each unit, in unit order
    pub vertex_indices: Vec<u32>,
    /// Mesh triangles, as mesh vertex indices
    pub triangles: Vec<[u32; 3]>,
    /// Mesh vertex coordinates in millimetres, needed only for smoothing
    pub coordinates: Option<Vec<[f64; 3]>>,
}

impl SurfaceModel {
    /// Mesh adjacency: sorted neighbouring mesh vertices of every mesh vertex
    pub fn vertex_adjacency(&self) -> Vec<Vec<u32>> {
        let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); self.surface_vertices];
        for t in &self.triangles {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                if a != b {
                    adjacency[a as usize].push(b);
                    adjacency[b as usize].push(a);
                }
            }
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }
        adjacency
    }

    /// Model-local unit index of every mesh vertex (`None` for vertices
    /// without a unit, such as the medial wall)
    pub fn unit_of_vertex(&self) -> Vec<Option<usize>> {
        let mut lookup = vec![None; self.surface_vertices];
        for (unit, &v) in self.vertex_indices.iter().enumerate() {
            lookup[v as usize] = Some(unit);
        }
        lookup
    }
}

/// A subcortical volumetric brain model
#[derive(Debug, Clone, PartialEq)]
pub struct StructureVoxels {
    /// Structure name, e.g. `THALAMUS_LEFT`
    pub structure: String,
    /// Voxel of each unit, in unit order
    pub voxels: Vec<[usize; 3]>,
}

/// One block of a dense domain
#[derive(Debug, Clone, PartialEq)]
pub enum BrainModel {
    Surface(SurfaceModel),
    Volume(StructureVoxels),
}

impl BrainModel {
    /// Structure name
    pub fn structure(&self) -> &str {
        match self {
            BrainModel::Surface(s) => &s.structure,
            BrainModel::Volume(v) => &v.structure,
        }
    }

    /// Number of units contributed by this model
    pub fn n_units(&self) -> usize {
        match self {
            BrainModel::Surface(s) => s.vertex_indices.len(),
            BrainModel::Volume(v) => v.voxels.len(),
        }
    }
}

/// Ordered brain models plus the voxel grid shared by the subcortical models
#[derive(Debug, Clone, PartialEq)]
pub struct DenseGeometry {
    models: Vec<BrainModel>,
    volume: Option<VolumeGeometry>,
    offsets: Vec<usize>,
}

impl DenseGeometry {
    /// Validate and build a dense geometry
    pub fn new(models: Vec<BrainModel>, volume: Option<VolumeGeometry>) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::InvalidDimensions {
                what: "dense geometry",
                dims: "no brain models".into(),
            });
        }

        let mut offsets = Vec::with_capacity(models.len() + 1);
        offsets.push(0);

        for model in &models {
            match model {
                BrainModel::Surface(s) => validate_surface(s)?,
                BrainModel::Volume(v) => validate_structure(v, volume.as_ref())?,
            }
            let last = offsets[offsets.len() - 1];
            offsets.push(last + model.n_units());
        }

        if offsets[offsets.len() - 1] == 0 {
            return Err(Error::InvalidDimensions {
                what: "dense geometry",
                dims: "brain models contain no units".into(),
            });
        }

        Ok(Self {
            models,
            volume,
            offsets,
        })
    }

    /// Brain models in unit order
    pub fn models(&self) -> &[BrainModel] {
        &self.models
    }

    /// Voxel grid of the subcortical models, if any
    pub fn volume(&self) -> Option<&VolumeGeometry> {
        self.volume.as_ref()
    }

    /// Total number of units
    pub fn n_units(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Unit index range of model `index`
    pub fn unit_range(&self, index: usize) -> Range<usize> {
        self.offsets[index]..self.offsets[index + 1]
    }

    /// Iterate over (unit range, model)
    pub fn blocks(&self) -> impl Iterator<Item = (Range<usize>, &BrainModel)> {
        self.models
            .iter()
            .enumerate()
            .map(move |(i, m)| (self.unit_range(i), m))
    }

    /// Same brain models with the same unit layout
    pub fn matches(&self, other: &DenseGeometry) -> bool {
        if self.models.len() != other.models.len() || self.offsets != other.offsets {
            return false;
        }
        self.models.iter().zip(&other.models).all(|(a, b)| match (a, b) {
            (BrainModel::Surface(x), BrainModel::Surface(y)) => {
                x.structure == y.structure
                    && x.surface_vertices == y.surface_vertices
                    && x.vertex_indices == y.vertex_indices
            }
            (BrainModel::Volume(x), BrainModel::Volume(y)) => {
                x.structure == y.structure && x.voxels == y.voxels
            }
            _ => false,
        })
    }
}

impl fmt::Display for DenseGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dense {} units [", self.n_units())?;
        for (i, model) in self.models.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", model.structure(), model.n_units())?;
        }
        write!(f, "]")
    }
}

fn validate_surface(s: &SurfaceModel) -> Result<()> {
    let n = s.surface_vertices;
    let invalid = |value: String, reason: &str| Error::InvalidParameter {
        name: "surface_model",
        value,
        reason: format!("{}: {}", s.structure, reason),
    };

    if let Some(&v) = s.vertex_indices.iter().find(|&&v| v as usize >= n) {
        return Err(invalid(v.to_string(), "vertex index beyond the mesh"));
    }
    let mut seen = vec![false; n];
    for &v in &s.vertex_indices {
        if seen[v as usize] {
            return Err(invalid(v.to_string(), "vertex listed twice"));
        }
        seen[v as usize] = true;
    }
    if let Some(t) = s.triangles.iter().find(|t| t.iter().any(|&v| v as usize >= n)) {
        return Err(invalid(format!("{:?}", t), "triangle references a vertex beyond the mesh"));
    }
    if let Some(coords) = &s.coordinates {
        if coords.len() != n {
            return Err(invalid(
                format!("{} coordinates", coords.len()),
                "coordinate count must equal the mesh vertex count",
            ));
        }
    }
    Ok(())
}

fn validate_structure(v: &StructureVoxels, volume: Option<&VolumeGeometry>) -> Result<()> {
    let Some(grid) = volume else {
        return Err(Error::InvalidParameter {
            name: "volume",
            value: "none".into(),
            reason: format!("structure {} needs the subcortical voxel grid", v.structure),
        });
    };
    let dims = grid.dims();
    if let Some(bad) = v.voxels.iter().find(|p| (0..3).any(|a| p[a] >= dims[a])) {
        return Err(Error::InvalidParameter {
            name: "structure_voxels",
            value: format!("{:?}", bad),
            reason: format!("{}: voxel outside {}", v.structure, grid),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Affine3;

    fn surface(n: usize, vertices: Vec<u32>) -> BrainModel {
        BrainModel::Surface(SurfaceModel {
            structure: "CORTEX_LEFT".into(),
            surface_vertices: n,
            vertex_indices: vertices,
            triangles: vec![[0, 1, 2]],
            coordinates: None,
        })
    }

    #[test]
    fn test_unit_ranges() {
        let grid = VolumeGeometry::new([4, 4, 4], Affine3::identity()).unwrap();
        let dense = DenseGeometry::new(
            vec![
                surface(4, vec![0, 2, 3]),
                BrainModel::Volume(StructureVoxels {
                    structure: "THALAMUS_LEFT".into(),
                    voxels: vec![[1, 1, 1], [1, 1, 2]],
                }),
            ],
            Some(grid),
        )
        .unwrap();

        assert_eq!(dense.n_units(), 5);
        assert_eq!(dense.unit_range(0), 0..3);
        assert_eq!(dense.unit_range(1), 3..5);
        assert!(dense.matches(&dense.clone()));
    }

    #[test]
    fn test_vertex_adjacency() {
        let model = SurfaceModel {
            structure: "CORTEX_RIGHT".into(),
            surface_vertices: 4,
            vertex_indices: vec![0, 1, 3],
            triangles: vec![[0, 1, 2], [1, 2, 3]],
            coordinates: None,
        };
        let adj = model.vertex_adjacency();
        assert_eq!(adj[0], vec![1, 2]);
        assert_eq!(adj[1], vec![0, 2, 3]);
        assert_eq!(adj[3], vec![1, 2]);

        let units = model.unit_of_vertex();
        assert_eq!(units, vec![Some(0), Some(1), None, Some(2)]);
    }

    #[test]
    fn test_vertex_beyond_mesh_rejected() {
        assert!(DenseGeometry::new(vec![surface(3, vec![0, 5])], None).is_err());
    }

    #[test]
    fn test_duplicate_vertex_rejected() {
        assert!(DenseGeometry::new(vec![surface(3, vec![1, 1])], None).is_err());
    }

    #[test]
    fn test_structure_requires_grid() {
        let model = BrainModel::Volume(StructureVoxels {
            structure: "PUTAMEN_RIGHT".into(),
            voxels: vec![[0, 0, 0]],
        });
        assert!(DenseGeometry::new(vec![model], None).is_err());
    }
}
