//! Region aggregation ("parcellation")
//!
//! Computes one mean time series per atlas region. Units are grouped by
//! label with a stable sort, so region order and membership do not depend on
//! the array layout of the signal.
//!
//! Every label of the atlas' reference table yields a row. Regions that end
//! up with no usable units (lost at the image boundary, outside the brain
//! mask, or below the coverage threshold) are kept as NaN rows and reported.

use std::collections::BTreeMap;
use std::io::Write;

use crate::maybe_rayon::*;
use boldmetrics_core::atlas::{Atlas, AtlasLabels};
use boldmetrics_core::io::write_region_timeseries;
use boldmetrics_core::signal::{Signal, SignalDomain};
use boldmetrics_core::{Algorithm, Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Parameters for region aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParcellationParams {
    /// Minimum fraction of a region's units that must carry usable data
    /// (0 disables the threshold)
    pub min_coverage: f64,
}

impl Default for ParcellationParams {
    fn default() -> Self {
        Self { min_coverage: 0.0 }
    }
}

impl ParcellationParams {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(Error::InvalidParameter {
                name: "min_coverage",
                value: self.min_coverage.to_string(),
                reason: "must lie in [0, 1]".into(),
            });
        }
        Ok(())
    }
}

/// Why a region row is all-NaN
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DegenerateReason {
    /// No units carry the label after resampling/masking
    Empty,
    /// Some units carry the label but too few hold usable data
    LowCoverage(f64),
}

/// Mean time series per region of one atlas
#[derive(Debug, Clone)]
pub struct RegionTimeSeries {
    /// Atlas name
    pub atlas: String,
    /// Region ids, ascending; row `r` of `data` belongs to `region_ids[r]`
    pub region_ids: Vec<u32>,
    /// Regions × timepoints
    pub data: Array2<f64>,
    /// Fraction of each region's units with usable data
    pub coverage: Vec<f64>,
    /// Regions whose row is NaN
    pub degenerate: Vec<(u32, DegenerateReason)>,
}

impl RegionTimeSeries {
    pub fn n_regions(&self) -> usize {
        self.region_ids.len()
    }

    /// Time series of a region by id
    pub fn region(&self, id: u32) -> Option<ArrayView1<'_, f64>> {
        let row = self.region_ids.binary_search(&id).ok()?;
        Some(self.data.row(row))
    }

    /// Ids of the NaN regions
    pub fn degenerate_ids(&self) -> Vec<u32> {
        self.degenerate.iter().map(|(id, _)| *id).collect()
    }

    /// Write as a TSV table (one column per region)
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_region_timeseries(writer, &self.region_ids, self.data.view())
    }
}

/// One value per region, e.g. parcellated ALFF or ReHo
#[derive(Debug, Clone)]
pub struct RegionValues {
    pub atlas: String,
    pub region_ids: Vec<u32>,
    pub values: Array1<f64>,
    pub coverage: Vec<f64>,
    pub degenerate: Vec<(u32, DegenerateReason)>,
}

/// Input bundle for [`Parcellate`]
#[derive(Debug, Clone)]
pub struct ParcellateInput {
    pub signal: Signal,
    pub atlas: Atlas,
}

/// Region aggregation algorithm
#[derive(Debug, Clone, Default)]
pub struct Parcellate;

impl Algorithm for Parcellate {
    type Input = ParcellateInput;
    type Output = RegionTimeSeries;
    type Params = ParcellationParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Parcellate"
    }

    fn description(&self) -> &'static str {
        "Mean time series per atlas region"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        aggregate(&input.signal, &input.atlas, &params)
    }
}

/// Compute the mean time series of every reference region.
///
/// The atlas must already be in signal space (see [`crate::resample`]).
///
/// # Arguments
/// * `signal` - Cleaned signal (units × timepoints)
/// * `atlas` - Atlas conformed to the signal's domain
/// * `params` - Coverage threshold
///
/// # Returns
/// [`RegionTimeSeries`] with one row per reference label, ascending.
pub fn aggregate(signal: &Signal, atlas: &Atlas, params: &ParcellationParams) -> Result<RegionTimeSeries> {
    aggregate_matrix(signal.data().view(), signal.domain(), atlas, params)
}

/// Mean of a unit-indexed scalar map per reference region.
///
/// NaN units (e.g. ReHo units without neighbours) are left out of the mean.
pub fn parcellate_map(
    map: ArrayView1<'_, f64>,
    domain: &SignalDomain,
    atlas: &Atlas,
    params: &ParcellationParams,
) -> Result<RegionValues> {
    let table = aggregate_matrix(map.insert_axis(Axis(1)), domain, atlas, params)?;
    Ok(RegionValues {
        atlas: table.atlas,
        region_ids: table.region_ids,
        values: table.data.column(0).to_owned(),
        coverage: table.coverage,
        degenerate: table.degenerate,
    })
}

/// Per-unit labels plus the coverage denominator of each label
struct UnitLabels {
    labels: Vec<u32>,
    totals: BTreeMap<u32, usize>,
}

fn aggregate_matrix(
    data: ArrayView2<'_, f64>,
    domain: &SignalDomain,
    atlas: &Atlas,
    params: &ParcellationParams,
) -> Result<RegionTimeSeries> {
    params.validate()?;

    if data.nrows() != domain.n_units() {
        return Err(Error::ShapeMismatch {
            what: format!("data aggregated with atlas '{}'", atlas.name()),
            expected: format!("{} units", domain.n_units()),
            actual: format!("{} rows", data.nrows()),
        });
    }

    let units = match domain {
        SignalDomain::Volume(_) => volume_unit_labels(domain, atlas)?,
        SignalDomain::Dense(_) => dense_unit_labels(domain, atlas)?,
    };

    let groups = group_units(&units.labels);
    let reference = atlas.reference();

    let unreferenced = groups
        .iter()
        .filter(|(label, _)| reference.binary_search(label).is_err())
        .count();
    if unreferenced > 0 {
        debug!(atlas = atlas.name(), unreferenced, "ignoring labels outside the reference table");
    }

    let n_time = data.ncols();
    let min_coverage = params.min_coverage;

    let rows: Vec<(Vec<f64>, f64, Option<DegenerateReason>)> = (0..reference.len())
        .into_par_iter()
        .map(|r| {
            let label = reference[r];
            let members: &[usize] = groups
                .binary_search_by_key(&label, |(l, _)| *l)
                .map(|g| groups[g].1.as_slice())
                .unwrap_or(&[]);

            let usable: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&u| data.row(u).iter().all(|v| v.is_finite()))
                .collect();

            let denominator = units.totals.get(&label).copied().unwrap_or(members.len());
            let coverage = if denominator > 0 {
                usable.len() as f64 / denominator as f64
            } else {
                0.0
            };

            if usable.is_empty() {
                let reason = if members.is_empty() {
                    DegenerateReason::Empty
                } else {
                    DegenerateReason::LowCoverage(coverage)
                };
                return (vec![f64::NAN; n_time], coverage, Some(reason));
            }
            if coverage < min_coverage {
                return (vec![f64::NAN; n_time], coverage, Some(DegenerateReason::LowCoverage(coverage)));
            }

            let mut mean = vec![0.0; n_time];
            for &u in &usable {
                for (acc, &v) in mean.iter_mut().zip(data.row(u).iter()) {
                    *acc += v;
                }
            }
            let n = usable.len() as f64;
            mean.iter_mut().for_each(|m| *m /= n);
            (mean, coverage, None)
        })
        .collect();

    let mut out = Array2::from_elem((reference.len(), n_time), f64::NAN);
    let mut coverage = Vec::with_capacity(reference.len());
    let mut degenerate = Vec::new();

    for (r, (values, cov, status)) in rows.into_iter().enumerate() {
        out.row_mut(r).assign(&ArrayView1::from(values.as_slice()));
        coverage.push(cov);
        if let Some(reason) = status {
            match reason {
                DegenerateReason::Empty => {
                    warn!(atlas = atlas.name(), region = reference[r], "region has no units in signal space; row set to NaN")
                }
                DegenerateReason::LowCoverage(c) => warn!(
                    atlas = atlas.name(),
                    region = reference[r],
                    coverage = c,
                    min_coverage,
                    "region coverage below threshold; row set to NaN"
                ),
            }
            degenerate.push((reference[r], reason));
        }
    }

    Ok(RegionTimeSeries {
        atlas: atlas.name().to_string(),
        region_ids: reference.to_vec(),
        data: out,
        coverage,
        degenerate,
    })
}

/// Volumetric path: read labels at the in-mask voxels, in unit order
fn volume_unit_labels(domain: &SignalDomain, atlas: &Atlas) -> Result<UnitLabels> {
    let (SignalDomain::Volume(volume), AtlasLabels::Volume(labels)) = (domain, atlas.labels()) else {
        return Err(geometry_mismatch(domain, atlas));
    };
    if !labels.geometry().matches(volume.geometry()) {
        return Err(geometry_mismatch(domain, atlas));
    }

    let unit_labels = volume
        .voxels()
        .iter()
        .map(|&v| labels.get(v).unwrap_or(0))
        .collect();

    let mut totals = BTreeMap::new();
    for &l in labels.labels().iter().filter(|&&l| l != 0) {
        *totals.entry(l).or_insert(0usize) += 1;
    }

    Ok(UnitLabels {
        labels: unit_labels,
        totals,
    })
}

/// Dense path: labels are already one per unit
fn dense_unit_labels(domain: &SignalDomain, atlas: &Atlas) -> Result<UnitLabels> {
    let (SignalDomain::Dense(dense), AtlasLabels::Dense(labels)) = (domain, atlas.labels()) else {
        return Err(geometry_mismatch(domain, atlas));
    };
    if !labels.geometry().matches(dense) {
        return Err(geometry_mismatch(domain, atlas));
    }

    Ok(UnitLabels {
        labels: labels.labels().to_vec(),
        totals: BTreeMap::new(),
    })
}

fn geometry_mismatch(domain: &SignalDomain, atlas: &Atlas) -> Error {
    Error::GeometryMismatch {
        atlas: atlas.name().to_string(),
        expected: domain.to_string(),
        actual: format!("{} (resample the atlas into signal space first)", atlas.labels().describe()),
    }
}

/// Group unit indices by positive label: ascending labels, units ascending
/// within each label
fn group_units(labels: &[u32]) -> Vec<(u32, Vec<usize>)> {
    let mut order: Vec<usize> = (0..labels.len()).filter(|&u| labels[u] != 0).collect();
    order.sort_by_key(|&u| labels[u]);

    let mut groups: Vec<(u32, Vec<usize>)> = Vec::new();
    for u in order {
        match groups.last_mut() {
            Some((label, members)) if *label == labels[u] => members.push(u),
            _ => groups.push((labels[u], vec![u])),
        }
    }
    groups
}
