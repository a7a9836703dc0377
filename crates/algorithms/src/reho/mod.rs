//! Regional homogeneity (ReHo)
//!
//! - **rank**: per-unit temporal ranks, computed once
//! - **graph**: unit neighbourhoods (voxel cube, mesh edges, structures)
//!
//! ReHo of a unit is Kendall's coefficient of concordance W between the
//! time series of the unit and its neighbours, with tie correction:
//!
//! ```text
//! W = 12·S / (m²(n³ − n) − m·ΣT)
//! ```
//!
//! where `m` is the number of series, `n` the number of timepoints,
//! `S = Σ_t (R_t − m(n + 1)/2)²` with `R_t` the rank sum at timepoint `t`,
//! and `T = Σ(t³ − t)` per series over its tie groups.

pub mod graph;
pub mod rank;

pub use graph::{neighborhood_graph, NeighborhoodGraph, RehoParams};
pub use rank::RankArena;

use crate::maybe_rayon::*;
use boldmetrics_core::signal::Signal;
use boldmetrics_core::{Algorithm, Error, Result};
use ndarray::Array1;
use tracing::{info, warn};

/// Units reported by index in each NaN warning
const REPORTED_UNITS: usize = 5;

/// ReHo map in signal unit order
#[derive(Debug, Clone)]
pub struct RehoMap {
    pub values: Array1<f64>,
    /// Units without any usable neighbour
    pub isolated: Vec<usize>,
    /// Units with non-finite samples or a tie-only neighbourhood
    pub undefined: Vec<usize>,
}

impl RehoMap {
    /// Mean over finite units
    pub fn mean(&self) -> f64 {
        let (sum, count) = self
            .values
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }
}

/// ReHo algorithm; builds the neighbourhood graph from the signal's domain
#[derive(Debug, Clone, Default)]
pub struct Reho;

impl Algorithm for Reho {
    type Input = Signal;
    type Output = RehoMap;
    type Params = RehoParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "ReHo"
    }

    fn description(&self) -> &'static str {
        "Kendall's W between each unit and its neighbours"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let graph = neighborhood_graph(input.domain(), &params);
        reho(&input, &graph)
    }
}

/// Compute ReHo for every unit.
///
/// Units whose neighbourhood is empty (or whose neighbours all carry
/// non-finite samples) get NaN and are listed in `isolated`. Units with
/// non-finite samples, or whose neighbourhood is constant over time, get NaN
/// and are listed in `undefined`; non-finite units are also left out of
/// their neighbours' concordance. Each list is reported in one warning.
pub fn reho(signal: &Signal, graph: &NeighborhoodGraph) -> Result<RehoMap> {
    if graph.n_units() != signal.n_units() {
        return Err(Error::ShapeMismatch {
            what: "neighbourhood graph".into(),
            expected: format!("{} units", signal.n_units()),
            actual: format!("{} units", graph.n_units()),
        });
    }

    let arena = RankArena::from_signal(signal.data().view());
    let results: Vec<Concordance> = (0..signal.n_units())
        .into_par_iter()
        .map(|u| kendall_w(&arena, u, graph.neighbors(u)))
        .collect();

    let mut values = Array1::from_elem(results.len(), f64::NAN);
    let mut isolated = Vec::new();
    let mut undefined = Vec::new();
    for (u, result) in results.into_iter().enumerate() {
        match result {
            Concordance::Value(w) => values[u] = w,
            Concordance::Isolated => isolated.push(u),
            Concordance::Undefined => undefined.push(u),
        }
    }

    if !isolated.is_empty() {
        warn!(
            count = isolated.len(),
            first = ?&isolated[..isolated.len().min(REPORTED_UNITS)],
            "units without usable neighbours; ReHo set to NaN"
        );
    }
    if !undefined.is_empty() {
        warn!(
            count = undefined.len(),
            first = ?&undefined[..undefined.len().min(REPORTED_UNITS)],
            "units with non-finite samples or constant neighbourhoods; ReHo set to NaN"
        );
    }

    let map = RehoMap {
        values,
        isolated,
        undefined,
    };
    info!(units = signal.n_units(), mean = map.mean(), "computed ReHo");
    Ok(map)
}

enum Concordance {
    Value(f64),
    Isolated,
    Undefined,
}

fn kendall_w(arena: &RankArena, unit: usize, neighbors: &[usize]) -> Concordance {
    if !arena.is_valid(unit) {
        return Concordance::Undefined;
    }
    let raters: Vec<usize> = std::iter::once(unit)
        .chain(neighbors.iter().copied().filter(|&v| arena.is_valid(v)))
        .collect();
    if raters.len() < 2 {
        return Concordance::Isolated;
    }

    let n = arena.n_timepoints() as f64;
    let m = raters.len() as f64;

    let mut rank_sums = Array1::<f64>::zeros(arena.n_timepoints());
    let mut ties = 0.0;
    for &r in &raters {
        rank_sums += &arena.ranks(r);
        ties += arena.tie_correction(r);
    }

    let expected = m * (n + 1.0) / 2.0;
    let s: f64 = rank_sums.iter().map(|r| (r - expected).powi(2)).sum();
    let denominator = m * m * (n * n * n - n) - m * ties;
    if denominator <= 0.0 {
        return Concordance::Undefined;
    }
    Concordance::Value((12.0 * s / denominator).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use boldmetrics_core::geometry::{Affine3, VolumeDomain};
    use boldmetrics_core::signal::SignalDomain;
    use ndarray::{array, Array2, Array3};

    fn line_signal(data: Array2<f64>) -> Signal {
        let mask = Array3::from_elem((data.nrows(), 1, 1), true);
        let domain = SignalDomain::Volume(VolumeDomain::new(mask, Affine3::identity()).unwrap());
        Signal::new(data, domain, Some(2.0)).unwrap()
    }

    #[test]
    fn test_perfect_agreement() {
        let signal = line_signal(array![[1.0, 2.0, 3.0, 4.0], [2.0, 4.0, 6.0, 8.0], [0.5, 0.6, 0.7, 0.8]]);
        let map = Reho.execute_default(signal).unwrap();
        for v in map.values.iter() {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_complete_disagreement() {
        // two raters with reversed rankings: every rank sum equals m(n+1)/2
        let signal = line_signal(array![[1.0, 2.0, 3.0], [3.0, 2.0, 1.0]]);
        let map = Reho.execute_default(signal).unwrap();
        assert_relative_eq!(map.values[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(map.values[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_known_value_with_ties() {
        let signal = line_signal(array![[1.0, 2.0, 3.0, 4.0], [1.0, 1.0, 2.0, 3.0]]);
        let map = Reho.execute_default(signal).unwrap();
        // ranks [1,2,3,4] and [1.5,1.5,3,4]; R = [2.5,3.5,6,8], mean 5
        // S = 6.25 + 2.25 + 1 + 9 = 18.5; T = 6; denom = 4*60 - 2*6 = 228
        assert_relative_eq!(map.values[0], 12.0 * 18.5 / 228.0, epsilon = 1e-12);
    }

    #[test]
    fn test_isolated_unit_is_nan() {
        let mut mask = Array3::from_elem((4, 1, 1), true);
        mask[[2, 0, 0]] = false;
        let domain = SignalDomain::Volume(VolumeDomain::new(mask, Affine3::identity()).unwrap());
        let data = array![[1.0, 3.0, 2.0], [1.0, 2.0, 3.0], [3.0, 1.0, 2.0]];
        let signal = Signal::new(data, domain, Some(2.0)).unwrap();

        let map = Reho.execute_default(signal).unwrap();
        assert!(map.values[0].is_finite());
        assert!(map.values[1].is_finite());
        assert!(map.values[2].is_nan());
        assert_eq!(map.isolated, vec![2]);
    }

    #[test]
    fn test_constant_neighbourhood_is_nan() {
        let signal = line_signal(array![[5.0, 5.0, 5.0], [5.0, 5.0, 5.0]]);
        let map = Reho.execute_default(signal).unwrap();
        assert!(map.values.iter().all(|v| v.is_nan()));
        assert!(map.isolated.is_empty());
        assert_eq!(map.undefined, vec![0, 1]);
    }

    #[test]
    fn test_non_finite_unit_is_undefined() {
        let signal = line_signal(array![
            [1.0, f64::NAN, 3.0, 4.0],
            [1.0, 2.0, 3.0, 4.0],
            [2.0, 1.0, 4.0, 3.0]
        ]);
        let map = Reho.execute_default(signal).unwrap();
        assert!(map.values[0].is_nan());
        assert!(map.values[1].is_finite());
        assert!(map.values[2].is_finite());
        assert_eq!(map.undefined, vec![0]);
        assert!(map.isolated.is_empty());
    }

    #[test]
    fn test_graph_size_checked() {
        let signal = line_signal(array![[1.0, 2.0], [2.0, 1.0]]);
        let graph = NeighborhoodGraph::from_lists(vec![vec![]]).unwrap();
        assert!(matches!(reho(&signal, &graph), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_self_reference_is_not_a_rater() {
        let signal = line_signal(array![[1.0, 2.0, 3.0], [3.0, 1.0, 2.0]]);
        let graph = NeighborhoodGraph::from_lists(vec![vec![0, 0], vec![]]).unwrap();
        let map = reho(&signal, &graph).unwrap();
        assert!(map.values[0].is_nan());
        assert!(map.values[1].is_nan());
        assert_eq!(map.isolated, vec![0, 1]);
    }
}
