//! Functional connectivity between atlas regions
//!
//! - **correlate**: full Pearson correlation matrix of region time series
//! - **extract_connectivity**: resample → aggregate → correlate for a set of atlases

use std::io::Write;

use boldmetrics_core::atlas::Atlas;
use boldmetrics_core::io::write_connectivity;
use boldmetrics_core::signal::Signal;
use boldmetrics_core::transform::SpatialTransform;
use boldmetrics_core::{Algorithm, Error, Result};
use boldmetrics_parallel::{ParallelStrategy, ProcessingMode};
use ndarray::{Array2, ArrayView2};
use tracing::{info, warn};

use crate::parcellation::{aggregate, ParcellationParams, RegionTimeSeries};
use crate::resample::{resample, TargetGeometry};

/// Relative norm below which a centred row counts as constant
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-10;

/// Region × region Pearson correlation matrix of one atlas
#[derive(Debug, Clone)]
pub struct ConnectivityMatrix {
    pub atlas: String,
    /// Region ids labelling both rows and columns
    pub region_ids: Vec<u32>,
    pub matrix: Array2<f64>,
    /// Regions whose row and column are NaN
    pub degenerate: Vec<u32>,
}

impl ConnectivityMatrix {
    pub fn n_regions(&self) -> usize {
        self.region_ids.len()
    }

    /// Correlation between two regions by id
    pub fn get(&self, a: u32, b: u32) -> Option<f64> {
        let i = self.region_ids.binary_search(&a).ok()?;
        let j = self.region_ids.binary_search(&b).ok()?;
        Some(self.matrix[(i, j)])
    }

    /// Write as a TSV table with region ids as header and first column
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_connectivity(writer, &self.region_ids, self.matrix.view())
    }
}

/// Pearson correlation algorithm
#[derive(Debug, Clone, Default)]
pub struct Correlate;

impl Algorithm for Correlate {
    type Input = RegionTimeSeries;
    type Output = ConnectivityMatrix;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Correlate"
    }

    fn description(&self) -> &'static str {
        "Pearson correlation between all pairs of region time series"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        Ok(correlate(&input))
    }
}

/// Correlate every pair of regions.
///
/// NaN rows and constant rows yield NaN rows and columns (diagonal
/// included) instead of an error, so missing regions can be tabulated later.
pub fn correlate(timeseries: &RegionTimeSeries) -> ConnectivityMatrix {
    let (matrix, invalid) = pearson_rows(timeseries.data.view());

    let known = timeseries.degenerate_ids();
    let mut degenerate = Vec::new();
    for (row, &bad) in invalid.iter().enumerate() {
        if !bad {
            continue;
        }
        let id = timeseries.region_ids[row];
        if known.binary_search(&id).is_err() {
            warn!(atlas = %timeseries.atlas, region = id, "region time series has zero variance; correlations set to NaN");
        }
        degenerate.push(id);
    }

    ConnectivityMatrix {
        atlas: timeseries.atlas.clone(),
        region_ids: timeseries.region_ids.clone(),
        matrix,
        degenerate,
    }
}

/// Pearson correlation matrix between the rows of `x`.
///
/// Rows are mean-centred and scaled to unit norm; the matrix is `Z·Zᵗ`.
pub fn pearson_matrix(x: ArrayView2<'_, f64>) -> Array2<f64> {
    pearson_rows(x).0
}

fn pearson_rows(x: ArrayView2<'_, f64>) -> (Array2<f64>, Vec<bool>) {
    let (n, t) = x.dim();
    let mut z = Array2::<f64>::zeros((n, t));
    let mut invalid = vec![false; n];

    for (i, row) in x.outer_iter().enumerate() {
        if t < 2 || row.iter().any(|v| !v.is_finite()) {
            invalid[i] = true;
            continue;
        }
        let mean = row.sum() / t as f64;
        let scale = row.iter().fold(0.0f64, |m, v| m.max(v.abs())) * (t as f64).sqrt();
        let norm = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>().sqrt();
        if scale == 0.0 || norm <= ZERO_VARIANCE_TOLERANCE * scale {
            invalid[i] = true;
            continue;
        }
        for (dst, &v) in z.row_mut(i).iter_mut().zip(row.iter()) {
            *dst = (v - mean) / norm;
        }
    }

    let mut corr = z.dot(&z.t());

    for i in 0..n {
        for j in i..n {
            let value = if invalid[i] || invalid[j] {
                f64::NAN
            } else if i == j {
                1.0
            } else {
                (0.5 * (corr[(i, j)] + corr[(j, i)])).clamp(-1.0, 1.0)
            };
            corr[(i, j)] = value;
            corr[(j, i)] = value;
        }
    }

    (corr, invalid)
}

/// Region time series and connectivity of one atlas
#[derive(Debug, Clone)]
pub struct AtlasConnectivity {
    pub timeseries: RegionTimeSeries,
    pub connectivity: ConnectivityMatrix,
}

/// Resample, aggregate and correlate a signal under several atlases.
///
/// Atlases are processed independently under `mode`; results come back in
/// input order. The first failing atlas (in input order) aborts the batch.
///
/// # Arguments
/// * `signal` - Cleaned signal
/// * `atlases` - Atlases in their own space
/// * `transform` - Mapping from signal space to atlas space, shared by all atlases
/// * `params` - Aggregation parameters
/// * `mode` - How many atlases may be processed at once
pub fn extract_connectivity(
    signal: &Signal,
    atlases: &[Atlas],
    transform: &SpatialTransform,
    params: &ParcellationParams,
    mode: ProcessingMode,
) -> Result<Vec<AtlasConnectivity>> {
    params.validate()?;
    let target = TargetGeometry::of(signal.domain());

    mode.try_par_map(0..atlases.len(), |a| {
        let atlas = &atlases[a];
        let resampled = resample(atlas, transform, &target)?;
        let timeseries = aggregate(signal, &resampled, params)?;
        let connectivity = correlate(&timeseries);
        info!(
            atlas = atlas.name(),
            regions = timeseries.n_regions(),
            missing = connectivity.degenerate.len(),
            "extracted region time series and connectivity"
        );
        Ok(AtlasConnectivity {
            timeseries,
            connectivity,
        })
    })
}
