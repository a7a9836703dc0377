//! Per-unit temporal ranks
//!
//! Every unit's time series is ranked once. Neighbourhoods then only sum
//! rows of the arena, so a unit shared by many neighbourhoods is never
//! re-ranked.

use crate::maybe_rayon::*;
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Ranks (1-based, ties averaged) of every unit's time series
#[derive(Debug, Clone)]
pub struct RankArena {
    ranks: Array2<f64>,
    tie_correction: Vec<f64>,
    valid: Vec<bool>,
}

impl RankArena {
    /// Rank every row of a units × timepoints matrix.
    ///
    /// Rows with non-finite samples are marked invalid and hold zeros.
    pub fn from_signal(data: ArrayView2<'_, f64>) -> Self {
        let (units, timepoints) = data.dim();

        let ranked: Vec<Option<(Vec<f64>, f64)>> = (0..units)
            .into_par_iter()
            .map(|u| {
                let row = data.row(u);
                if row.iter().all(|v| v.is_finite()) {
                    Some(average_ranks(row))
                } else {
                    None
                }
            })
            .collect();

        let mut ranks = Array2::<f64>::zeros((units, timepoints));
        let mut tie_correction = vec![0.0; units];
        let mut valid = vec![false; units];
        for (u, entry) in ranked.into_iter().enumerate() {
            if let Some((r, ties)) = entry {
                ranks.row_mut(u).assign(&ArrayView1::from(r.as_slice()));
                tie_correction[u] = ties;
                valid[u] = true;
            }
        }

        Self {
            ranks,
            tie_correction,
            valid,
        }
    }

    pub fn n_units(&self) -> usize {
        self.ranks.nrows()
    }

    pub fn n_timepoints(&self) -> usize {
        self.ranks.ncols()
    }

    /// Ranks of one unit
    pub fn ranks(&self, unit: usize) -> ArrayView1<'_, f64> {
        self.ranks.row(unit)
    }

    /// Σ(t³ − t) over the tie groups of one unit
    pub fn tie_correction(&self, unit: usize) -> f64 {
        self.tie_correction[unit]
    }

    /// Whether the unit's series was finite and could be ranked
    pub fn is_valid(&self, unit: usize) -> bool {
        self.valid[unit]
    }
}

/// Average ranks of a series and its tie term Σ(t³ − t)
pub fn average_ranks(series: ArrayView1<'_, f64>) -> (Vec<f64>, f64) {
    let n = series.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| series[a].total_cmp(&series[b]));

    let mut ranks = vec![0.0; n];
    let mut ties = 0.0;
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && series[order[end]] == series[order[start]] {
            end += 1;
        }
        // positions start..end share the mean of ranks start+1..=end
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        let t = (end - start) as f64;
        ties += t * t * t - t;
        start = end;
    }
    (ranks, ties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_distinct_values() {
        let (r, ties) = average_ranks(array![3.0, 1.0, 2.0].view());
        assert_eq!(r, vec![3.0, 1.0, 2.0]);
        assert_eq!(ties, 0.0);
    }

    #[test]
    fn test_ties_share_average_rank() {
        let (r, ties) = average_ranks(array![5.0, 2.0, 5.0, 2.0, 9.0].view());
        assert_eq!(r, vec![3.5, 1.5, 3.5, 1.5, 5.0]);
        // two pairs: 2 * (8 - 2)
        assert_eq!(ties, 12.0);
    }

    #[test]
    fn test_constant_series() {
        let (r, ties) = average_ranks(array![4.0, 4.0, 4.0].view());
        assert_eq!(r, vec![2.0, 2.0, 2.0]);
        assert_eq!(ties, 24.0);
    }

    #[test]
    fn test_arena_marks_non_finite_rows() {
        let data = array![[1.0, 3.0, 2.0], [1.0, f64::NAN, 0.0]];
        let arena = RankArena::from_signal(data.view());
        assert!(arena.is_valid(0));
        assert!(!arena.is_valid(1));
        assert_eq!(arena.ranks(0).to_vec(), vec![1.0, 3.0, 2.0]);
        assert_eq!(arena.n_timepoints(), 3);
    }
}
