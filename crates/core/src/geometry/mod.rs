//! Spatial domains: voxel grids, masks, dense brain models and neighbourhoods

mod affine;
mod dense;
mod neighborhood;
mod volume;

pub use affine::Affine3;
pub use dense::{BrainModel, DenseGeometry, StructureVoxels, SurfaceModel};
pub use neighborhood::VoxelConnectivity;
pub(crate) use volume::distinct_labels;
pub use volume::{LabelVolume, VolumeDomain, VolumeGeometry, GEOMETRY_TOLERANCE};
