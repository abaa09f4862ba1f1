//! KD-tree neighbor search under periodic boundary conditions.
//!
//! Positions are wrapped into the primary cell and replicated into the 27
//! images with shifts in {-1, 0, 1}³. A radius query around a wrapped point
//! then sees every periodic replica that can lie within half a box width.

use rayon::prelude::*;

use super::{accept_pair, validate_inputs, PairRecord};
use crate::error::Result;
use crate::periodic::PeriodicBox;
use crate::util::{add, distance_squared};

/// Relative enlargement of the query radius so that replicas sitting exactly
/// on the cutoff are not lost to round-off; candidates are re-tested with the
/// exact predicate afterwards.
const QUERY_MARGIN: f64 = 1e-9;

/// Balanced 3-d tree stored implicitly in a permutation of point indices.
///
/// The subtree over `order[lo..hi]` has its splitting point at the middle
/// slot; points left of it are not greater along the split axis, points
/// right of it are not smaller. The split axis cycles x, y, z with depth.
#[derive(Debug, Clone)]
pub struct ImageTree {
    points: Vec<[f64; 3]>,
    order: Vec<usize>,
}

impl ImageTree {
    /// Index `points`.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        let mut order: Vec<usize> = (0..points.len()).collect();
        Self::partition(&points, &mut order, 0);
        Self { points, order }
    }

    fn partition(points: &[[f64; 3]], order: &mut [usize], depth: usize) {
        if order.len() <= 1 {
            return;
        }
        let axis = depth % 3;
        let mid = order.len() / 2;
        // Only the median needs to be in place
        order.select_nth_unstable_by(mid, |&a, &b| points[a][axis].total_cmp(&points[b][axis]));
        let (below, rest) = order.split_at_mut(mid);
        Self::partition(points, below, depth + 1);
        Self::partition(points, &mut rest[1..], depth + 1);
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Collect the indices of all points within `radius` of `target` into
    /// `out`, which is cleared first.
    #[inline]
    pub fn query_radius_into(&self, target: &[f64; 3], radius: f64, out: &mut Vec<usize>) {
        out.clear();
        self.visit(0, self.order.len(), 0, target, radius * radius, out);
    }

    fn visit(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        target: &[f64; 3],
        radius_sq: f64,
        out: &mut Vec<usize>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let idx = self.order[mid];
        let pivot = &self.points[idx];
        if distance_squared(pivot, target) <= radius_sq {
            out.push(idx);
        }

        let axis = depth % 3;
        let gap = target[axis] - pivot[axis];
        let (near, far) = if gap < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.visit(near.0, near.1, depth + 1, target, radius_sq, out);
        // Ties on the split value may sit on either side
        if gap * gap <= radius_sq {
            self.visit(far.0, far.1, depth + 1, target, radius_sq, out);
        }
    }
}

/// KD-tree over the 27 periodic images of a particle set.
pub struct PeriodicKdTree<'a> {
    positions: &'a [[f64; 3]],
    wrapped: Vec<[f64; 3]>,
    pbc: PeriodicBox,
    tree: ImageTree,
}

impl<'a> PeriodicKdTree<'a> {
    /// Index `positions` and their periodic images.
    ///
    /// Image `k` in the tree is particle `k % n`.
    pub fn build(positions: &'a [[f64; 3]], pbc: &PeriodicBox) -> Self {
        let n = positions.len();
        let wrapped: Vec<[f64; 3]> = positions.iter().map(|p| pbc.wrap_position(p)).collect();

        let mut images = Vec::with_capacity(27 * n);
        for sx in -1..=1 {
            for sy in -1..=1 {
                for sz in -1..=1 {
                    let shift = pbc.image_shift([sx, sy, sz]);
                    images.extend(wrapped.iter().map(|p| add(p, &shift)));
                }
            }
        }

        log::debug!("Periodic KD-tree over {} images of {} particles", images.len(), n);
        Self {
            positions,
            wrapped,
            pbc: *pbc,
            tree: ImageTree::new(images),
        }
    }

    /// Particles with a periodic image within `radius` of `target`, each
    /// listed once in ascending order. Valid for radii up to half the
    /// smallest box width.
    pub fn query_radius(&self, target: &[f64; 3], radius: f64) -> Vec<usize> {
        let n = self.positions.len();
        let center = self.pbc.wrap_position(target);
        let radius_sq = radius * radius;
        let mut hits = Vec::new();
        self.tree
            .query_radius_into(&center, radius * (1.0 + QUERY_MARGIN), &mut hits);

        let mut found: Vec<usize> = hits
            .into_iter()
            .map(|k| k % n)
            .filter(|&j| self.pbc.distance_squared(target, &self.positions[j]) <= radius_sq)
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Enumerate every pair within `cutoff`, sorted by `(i, j)`.
    pub fn pairs_within(&self, cutoff: f64) -> Vec<PairRecord> {
        let n = self.positions.len();
        let cutoff_sq = cutoff * cutoff;
        let query_radius = cutoff * (1.0 + QUERY_MARGIN);

        let rows: Vec<Vec<PairRecord>> = (0..n)
            .into_par_iter()
            .map_init(
                || Vec::with_capacity(64), // Thread-local neighbor buffer
                |hits, i| {
                    self.tree
                        .query_radius_into(&self.wrapped[i], query_radius, hits);
                    let mut partners: Vec<usize> =
                        hits.iter().map(|&k| k % n).filter(|&j| j > i).collect();
                    // A particle may be hit through two images at exactly half a box
                    partners.sort_unstable();
                    partners.dedup();
                    partners
                        .into_iter()
                        .filter_map(|j| accept_pair(self.positions, &self.pbc, cutoff_sq, i, j))
                        .collect()
                },
            )
            .collect();

        rows.into_iter().flatten().collect()
    }
}

/// Find all pairs within `cutoff` with a periodic KD-tree.
pub fn kdtree_pairs(positions: &[[f64; 3]], pbc: &PeriodicBox, cutoff: f64) -> Result<Vec<PairRecord>> {
    validate_inputs(positions, pbc, cutoff)?;
    Ok(PeriodicKdTree::build(positions, pbc).pairs_within(cutoff))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_matches_linear_scan() {
        let points: Vec<[f64; 3]> = (0..200)
            .map(|k| {
                let f = k as f64;
                [(f * 0.61) % 5.0, (f * 1.37) % 4.0, (f * 2.03) % 6.0]
            })
            .collect();
        let tree = ImageTree::new(points.clone());
        assert_eq!(tree.len(), 200);

        let mut found = Vec::new();
        for target in [[0.0, 0.0, 0.0], [2.5, 2.0, 3.0], [4.9, 0.1, 5.5]] {
            tree.query_radius_into(&target, 1.3, &mut found);
            found.sort_unstable();
            let expected: Vec<usize> = (0..points.len())
                .filter(|&k| distance_squared(&points[k], &target) <= 1.3 * 1.3)
                .collect();
            assert_eq!(found, expected);
        }
        assert!(ImageTree::new(Vec::new()).is_empty());
    }

    #[test]
    fn test_tree_with_repeated_coordinates() {
        let tree = ImageTree::new(vec![[1.0, 0.0, 0.0]; 9]);
        let mut found = Vec::new();
        tree.query_radius_into(&[1.0, 0.0, 0.0], 0.1, &mut found);
        assert_eq!(found.len(), 9);
        tree.query_radius_into(&[2.0, 0.0, 0.0], 0.5, &mut found);
        assert!(found.is_empty());
    }

    #[test]
    fn test_periodic_query_sees_images() {
        let pbc = PeriodicBox::cubic(10.0).unwrap();
        let positions = vec![[0.2, 5.0, 5.0], [9.9, 5.0, 5.0], [5.0, 5.0, 5.0]];
        let tree = PeriodicKdTree::build(&positions, &pbc);
        assert_eq!(tree.query_radius(&[0.0, 5.0, 5.0], 0.5), vec![0, 1]);
        assert_eq!(tree.query_radius(&[10.0, 5.0, 5.0], 0.5), vec![0, 1]);
    }

    #[test]
    fn test_periodic_pairs_across_corner() {
        let pbc = PeriodicBox::cubic(10.0).unwrap();
        let positions = vec![[0.5, 0.5, 0.5], [9.5, 9.5, 9.5]];
        let pairs = kdtree_pairs(&positions, &pbc, 2.0).unwrap();
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].distance - 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_pair_at_half_box_found_once() {
        // Both the +L and -L images of particle 1 lie exactly on the cutoff
        let pbc = PeriodicBox::cubic(4.0).unwrap();
        let positions = vec![[1.0, 1.0, 1.0], [3.0, 1.0, 1.0]];
        let pairs = kdtree_pairs(&positions, &pbc, 2.0).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].distance, 2.0);
    }
}
