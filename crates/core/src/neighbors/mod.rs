//! Periodic neighbor-pair enumeration.
//!
//! Three interchangeable strategies find every unordered pair `(i, j)` with
//! `i < j` whose minimum-image distance is at most the cutoff:
//! - [`NeighborStrategy::BruteForce`]: O(N²) reference
//! - [`NeighborStrategy::CellList`]: uniform binning, O(N) at fixed density
//! - [`NeighborStrategy::KdTree`]: spatial index over periodic images
//!
//! All strategies apply the same inclusion test to their candidates, so they
//! return the same pair set. Output is sorted by `(i, j)`.

pub mod brute_force;
pub mod cell_list;
pub mod kdtree;

pub use cell_list::CellGrid;
pub use kdtree::PeriodicKdTree;

use crate::error::Result;
use crate::periodic::PeriodicBox;
use crate::util::ensure_finite;

/// One neighbor relationship within the cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairRecord {
    /// Lower particle index.
    pub i: usize,
    /// Higher particle index.
    pub j: usize,
    /// Minimum-image distance.
    pub distance: f64,
}

impl PairRecord {
    /// Create a record with indices normalised so that `i < j`.
    #[inline]
    pub fn new(a: usize, b: usize, distance: f64) -> Self {
        Self {
            i: a.min(b),
            j: a.max(b),
            distance,
        }
    }

    /// Canonical ordering key.
    #[inline]
    pub fn key(&self) -> (usize, usize) {
        (self.i, self.j)
    }
}

/// Pair enumeration algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NeighborStrategy {
    /// Test every pair.
    BruteForce,
    /// Uniform cell list with a 3x3x3 scan.
    #[default]
    CellList,
    /// k-d tree over the 27 periodic images.
    KdTree,
}

/// Find all pairs within `cutoff` using the chosen strategy.
///
/// # Arguments
/// * `positions` - Particle positions (need not be wrapped)
/// * `pbc` - Periodic box
/// * `cutoff` - Inclusive distance cutoff, at most `pbc.max_cutoff()`
/// * `strategy` - Enumeration algorithm
///
/// # Returns
/// Pairs sorted by `(i, j)`
pub fn find_pairs(
    positions: &[[f64; 3]],
    pbc: &PeriodicBox,
    cutoff: f64,
    strategy: NeighborStrategy,
) -> Result<Vec<PairRecord>> {
    validate_inputs(positions, pbc, cutoff)?;

    let pairs = match strategy {
        NeighborStrategy::BruteForce => brute_force::pairs_unchecked(positions, pbc, cutoff),
        NeighborStrategy::CellList => CellGrid::build(positions, pbc, cutoff)?.pairs(),
        NeighborStrategy::KdTree => PeriodicKdTree::build(positions, pbc).pairs_within(cutoff),
    };

    log::info!(
        "{:?}: {} pairs within {} among {} particles",
        strategy,
        pairs.len(),
        cutoff,
        positions.len()
    );
    Ok(pairs)
}

/// Entry checks shared by every strategy.
pub(crate) fn validate_inputs(positions: &[[f64; 3]], pbc: &PeriodicBox, cutoff: f64) -> Result<()> {
    pbc.validate_cutoff(cutoff)?;
    ensure_finite(positions, "Positions")
}

/// The inclusion predicate every strategy applies to its candidates.
#[inline(always)]
pub(crate) fn accept_pair(
    positions: &[[f64; 3]],
    pbc: &PeriodicBox,
    cutoff_sq: f64,
    i: usize,
    j: usize,
) -> Option<PairRecord> {
    let d2 = pbc.distance_squared(&positions[i], &positions[j]);
    if d2 <= cutoff_sq {
        Some(PairRecord::new(i, j, d2.sqrt()))
    } else {
        None
    }
}

/// Sort pairs by `(min(i, j), max(i, j))`.
pub fn sort_pairs(pairs: &mut [PairRecord]) {
    pairs.sort_unstable_by_key(|p| p.key());
}

/// Whether two canonical pair lists contain the same pairs with distances
/// equal to within `tolerance`.
pub fn pair_sets_match(a: &[PairRecord], b: &[PairRecord], tolerance: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.key() == y.key() && (x.distance - y.distance).abs() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_record_normalises() {
        let p = PairRecord::new(7, 2, 1.5);
        assert_eq!(p.key(), (2, 7));
    }

    #[test]
    fn test_sort_pairs() {
        let mut pairs = vec![
            PairRecord::new(3, 4, 1.0),
            PairRecord::new(0, 9, 1.0),
            PairRecord::new(0, 2, 1.0),
        ];
        sort_pairs(&mut pairs);
        let keys: Vec<_> = pairs.iter().map(PairRecord::key).collect();
        assert_eq!(keys, vec![(0, 2), (0, 9), (3, 4)]);
    }

    #[test]
    fn test_pair_sets_match() {
        let a = vec![PairRecord::new(0, 1, 1.0)];
        let b = vec![PairRecord::new(0, 1, 1.0 + 1e-12)];
        let c = vec![PairRecord::new(0, 2, 1.0)];
        assert!(pair_sets_match(&a, &b, 1e-9));
        assert!(!pair_sets_match(&a, &c, 1e-9));
        assert!(!pair_sets_match(&a, &[], 1e-9));
    }

    #[test]
    fn test_find_pairs_rejects_bad_input() {
        let pbc = PeriodicBox::cubic(10.0).unwrap();
        let positions = vec![[0.0; 3], [1.0; 3]];
        for strategy in [
            NeighborStrategy::BruteForce,
            NeighborStrategy::CellList,
            NeighborStrategy::KdTree,
        ] {
            assert!(find_pairs(&positions, &pbc, 0.0, strategy).is_err());
            assert!(find_pairs(&positions, &pbc, 6.0, strategy).is_err());
            assert!(find_pairs(&[[f64::NAN, 0.0, 0.0]], &pbc, 1.0, strategy).is_err());
        }
    }

    #[test]
    fn test_empty_and_single_particle() {
        let pbc = PeriodicBox::cubic(10.0).unwrap();
        for strategy in [
            NeighborStrategy::BruteForce,
            NeighborStrategy::CellList,
            NeighborStrategy::KdTree,
        ] {
            assert!(find_pairs(&[], &pbc, 2.0, strategy).unwrap().is_empty());
            assert!(find_pairs(&[[1.0; 3]], &pbc, 2.0, strategy).unwrap().is_empty());
        }
    }
}
