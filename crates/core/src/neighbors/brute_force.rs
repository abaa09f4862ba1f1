//! All-pairs reference enumeration.

use rayon::prelude::*;

use super::{accept_pair, validate_inputs, PairRecord};
use crate::error::Result;
use crate::periodic::PeriodicBox;

/// Test every `i < j` pair. Ground truth for the other strategies.
pub fn brute_force_pairs(
    positions: &[[f64; 3]],
    pbc: &PeriodicBox,
    cutoff: f64,
) -> Result<Vec<PairRecord>> {
    validate_inputs(positions, pbc, cutoff)?;
    Ok(pairs_unchecked(positions, pbc, cutoff))
}

/// Parallel over the outer index; each row is built privately and the rows
/// are concatenated in index order, so the output is already canonical.
pub(crate) fn pairs_unchecked(
    positions: &[[f64; 3]],
    pbc: &PeriodicBox,
    cutoff: f64,
) -> Vec<PairRecord> {
    let n = positions.len();
    let cutoff_sq = cutoff * cutoff;

    let rows: Vec<Vec<PairRecord>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .filter_map(|j| accept_pair(positions, pbc, cutoff_sq, i, j))
                .collect()
        })
        .collect();

    rows.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pairs_across_boundary() {
        let pbc = PeriodicBox::cubic(10.0).unwrap();
        let positions = vec![[0.5, 5.0, 5.0], [9.5, 5.0, 5.0], [5.0, 5.0, 5.0]];
        let pairs = brute_force_pairs(&positions, &pbc, 1.5).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key(), (0, 1));
        assert_relative_eq!(pairs[0].distance, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let pbc = PeriodicBox::cubic(10.0).unwrap();
        let positions = vec![[1.0, 1.0, 1.0], [3.0, 1.0, 1.0]];
        let pairs = brute_force_pairs(&positions, &pbc, 2.0).unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_output_is_canonical() {
        let pbc = PeriodicBox::cubic(4.0).unwrap();
        let positions: Vec<[f64; 3]> = (0..20)
            .map(|k| [(k as f64 * 0.37) % 4.0, (k as f64 * 0.71) % 4.0, (k as f64 * 1.13) % 4.0])
            .collect();
        let pairs = brute_force_pairs(&positions, &pbc, 2.0).unwrap();
        assert!(pairs.windows(2).all(|w| w[0].key() < w[1].key()));
        assert!(pairs.iter().all(|p| p.i < p.j));
    }
}
