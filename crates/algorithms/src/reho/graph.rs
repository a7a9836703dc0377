//! Unit neighbourhoods for ReHo
//!
//! Neighbour lists are stored in compressed rows: one offset table plus a
//! flat neighbour array, built once per domain and shared by every unit.

use std::collections::HashMap;
use std::ops::Range;

use crate::maybe_rayon::*;
use boldmetrics_core::geometry::{BrainModel, DenseGeometry, StructureVoxels, SurfaceModel, VolumeDomain, VoxelConnectivity};
use boldmetrics_core::signal::SignalDomain;
use boldmetrics_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters for ReHo neighbourhoods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RehoParams {
    /// Voxel neighbourhood for volumetric units (surface units use the mesh)
    pub connectivity: VoxelConnectivity,
}

/// Neighbours of every unit, centre excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborhoodGraph {
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
}

impl NeighborhoodGraph {
    /// Build from one neighbour list per unit.
    ///
    /// Self references and repeated neighbours are dropped. Fails when a
    /// list names a unit outside `0..lists.len()`.
    pub fn from_lists(lists: Vec<Vec<usize>>) -> Result<Self> {
        let n_units = lists.len();
        let mut cleaned = Vec::with_capacity(n_units);
        for (unit, mut list) in lists.into_iter().enumerate() {
            if let Some(&bad) = list.iter().find(|&&v| v >= n_units) {
                return Err(Error::ShapeMismatch {
                    what: format!("neighbour {} of unit {}", bad, unit),
                    expected: format!("index below {}", n_units),
                    actual: bad.to_string(),
                });
            }
            list.retain(|&v| v != unit);
            list.sort_unstable();
            list.dedup();
            cleaned.push(list);
        }
        Ok(Self::from_checked_lists(cleaned))
    }

    /// Lists produced by the domain builders: in range, no self references
    fn from_checked_lists(lists: Vec<Vec<usize>>) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        offsets.push(0);
        let mut neighbors = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        for list in lists {
            neighbors.extend(list);
            offsets.push(neighbors.len());
        }
        Self { offsets, neighbors }
    }

    pub fn n_units(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Neighbours of `unit`
    pub fn neighbors(&self, unit: usize) -> &[usize] {
        &self.neighbors[self.offsets[unit]..self.offsets[unit + 1]]
    }

    pub fn degree(&self, unit: usize) -> usize {
        self.offsets[unit + 1] - self.offsets[unit]
    }

    /// Units without any neighbour
    pub fn isolated(&self) -> Vec<usize> {
        (0..self.n_units()).filter(|&u| self.degree(u) == 0).collect()
    }
}

/// Build the neighbourhood graph of a domain.
///
/// Volumetric units are linked to the in-mask voxels of their
/// neighbourhood. In a dense domain, surface vertices are linked along mesh
/// edges and structure voxels to voxels of the same structure; no edge
/// crosses two brain models.
pub fn neighborhood_graph(domain: &SignalDomain, params: &RehoParams) -> NeighborhoodGraph {
    match domain {
        SignalDomain::Volume(v) => volume_graph(v, params.connectivity),
        SignalDomain::Dense(d) => dense_graph(d, params.connectivity),
    }
}

fn volume_graph(domain: &VolumeDomain, connectivity: VoxelConnectivity) -> NeighborhoodGraph {
    let lookup = domain.unit_lookup();
    let geometry = domain.geometry();
    let offsets = connectivity.offsets();

    let lists: Vec<Vec<usize>> = domain
        .voxels()
        .into_par_iter()
        .map(|&voxel| {
            offsets
                .iter()
                .filter_map(|&delta| geometry.offset(voxel, delta))
                .filter_map(|[i, j, k]| lookup[[i, j, k]])
                .collect()
        })
        .collect();

    NeighborhoodGraph::from_checked_lists(lists)
}

fn dense_graph(dense: &DenseGeometry, connectivity: VoxelConnectivity) -> NeighborhoodGraph {
    let mut lists = Vec::with_capacity(dense.n_units());
    for (range, model) in dense.blocks() {
        match model {
            BrainModel::Surface(s) => lists.extend(surface_lists(s, &range)),
            BrainModel::Volume(v) => lists.extend(structure_lists(v, &range, connectivity)),
        }
    }
    NeighborhoodGraph::from_checked_lists(lists)
}

fn surface_lists(model: &SurfaceModel, range: &Range<usize>) -> Vec<Vec<usize>> {
    let adjacency = model.vertex_adjacency();
    let unit_of = model.unit_of_vertex();
    model
        .vertex_indices
        .iter()
        .map(|&v| {
            adjacency[v as usize]
                .iter()
                .filter_map(|&n| unit_of[n as usize])
                .map(|unit| range.start + unit)
                .collect()
        })
        .collect()
}

fn structure_lists(model: &StructureVoxels, range: &Range<usize>, connectivity: VoxelConnectivity) -> Vec<Vec<usize>> {
    let lookup: HashMap<[usize; 3], usize> = model.voxels.iter().enumerate().map(|(u, &p)| (p, u)).collect();
    let offsets = connectivity.offsets();

    model
        .voxels
        .as_slice()
        .into_par_iter()
        .map(|voxel| {
            offsets
                .iter()
                .filter_map(|delta| {
                    let mut p = [0usize; 3];
                    for a in 0..3 {
                        let c = voxel[a] as isize + delta[a];
                        if c < 0 {
                            return None;
                        }
                        p[a] = c as usize;
                    }
                    lookup.get(&p).map(|&unit| range.start + unit)
                })
                .collect()
        })
        .collect()
}
