//! Voxel neighbourhood patterns

use serde::{Deserialize, Serialize};

/// Which voxels count as adjacent to a centre voxel in a 3×3×3 cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoxelConnectivity {
    /// Voxels sharing a face (6 neighbours, 7 with centre)
    Faces,
    /// Voxels sharing a face or an edge (18 neighbours, 19 with centre)
    Edges,
    /// Voxels sharing a face, an edge or a corner (26 neighbours, 27 with centre)
    #[default]
    Vertices,
}

impl VoxelConnectivity {
    /// Neighbourhood size including the centre voxel
    pub fn size(&self) -> usize {
        match self {
            VoxelConnectivity::Faces => 7,
            VoxelConnectivity::Edges => 19,
            VoxelConnectivity::Vertices => 27,
        }
    }

    /// Check if a relative position is within this neighbourhood (centre included)
    pub fn contains(&self, delta: [isize; 3]) -> bool {
        if delta.iter().any(|d| d.abs() > 1) {
            return false;
        }
        let nonzero = delta.iter().filter(|&&d| d != 0).count();
        match self {
            VoxelConnectivity::Faces => nonzero <= 1,
            VoxelConnectivity::Edges => nonzero <= 2,
            VoxelConnectivity::Vertices => true,
        }
    }

    /// Relative positions of the neighbours, centre excluded
    pub fn offsets(&self) -> Vec<[isize; 3]> {
        let mut offsets = Vec::with_capacity(self.size() - 1);
        for di in -1..=1 {
            for dj in -1..=1 {
                for dk in -1..=1 {
                    let delta = [di, dj, dk];
                    if delta != [0, 0, 0] && self.contains(delta) {
                        offsets.push(delta);
                    }
                }
            }
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_counts() {
        assert_eq!(VoxelConnectivity::Faces.offsets().len(), 6);
        assert_eq!(VoxelConnectivity::Edges.offsets().len(), 18);
        assert_eq!(VoxelConnectivity::Vertices.offsets().len(), 26);
    }

    #[test]
    fn test_faces_exclude_diagonals() {
        let offsets = VoxelConnectivity::Faces.offsets();
        assert!(offsets.contains(&[1, 0, 0]));
        assert!(!offsets.contains(&[1, 1, 0]));
        assert!(!offsets.contains(&[0, 0, 0]));
    }

    #[test]
    fn test_sizes_include_centre() {
        assert_eq!(VoxelConnectivity::Faces.size(), 7);
        assert_eq!(VoxelConnectivity::Edges.size(), 19);
        assert_eq!(VoxelConnectivity::default().size(), 27);
    }
}
