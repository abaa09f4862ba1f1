//! Uniform cell list with periodic wraparound.
//!
//! Particles are binned by their fractional coordinates into
//! `n_axis = floor(width_axis / cutoff)` cells per axis, where `width_axis`
//! is the perpendicular box width. Every cell is at least `cutoff` wide, so
//! all neighbors of a particle lie in the 3x3x3 block around its cell.
//!
//! The grid is built in one serial pass and then scanned in parallel,
//! read-only.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::{accept_pair, sort_pairs, validate_inputs, PairRecord};
use crate::error::{KernelError, Result};
use crate::periodic::PeriodicBox;

type CellIndex = (i32, i32, i32);

/// Spatial hash from cell index to the particles it contains.
/// Uses FxHashMap for fast integer-tuple hashing.
pub struct CellGrid<'a> {
    positions: &'a [[f64; 3]],
    pbc: PeriodicBox,
    cutoff: f64,
    dims: [i32; 3],
    cell_widths: [f64; 3],
    cells: FxHashMap<CellIndex, Vec<usize>>,
}

impl<'a> CellGrid<'a> {
    /// Bin `positions` into a grid sized for `cutoff`.
    pub fn build(positions: &'a [[f64; 3]], pbc: &PeriodicBox, cutoff: f64) -> Result<Self> {
        validate_inputs(positions, pbc, cutoff)?;

        let widths = pbc.perpendicular_widths();
        let mut dims = [1i32; 3];
        let mut cell_widths = [0.0f64; 3];
        for axis in 0..3 {
            let mut n = ((widths[axis] / cutoff).floor() as i32).max(1);
            // floor() of a rounded quotient can overshoot by one
            while n > 1 && widths[axis] / f64::from(n) < cutoff {
                n -= 1;
            }
            let cell_width = widths[axis] / f64::from(n);
            if cell_width < cutoff {
                return Err(KernelError::CellTooSmall {
                    axis,
                    cell_width,
                    cutoff,
                });
            }
            dims[axis] = n;
            cell_widths[axis] = cell_width;
        }

        let mut cells: FxHashMap<CellIndex, Vec<usize>> = FxHashMap::default();
        for (idx, pos) in positions.iter().enumerate() {
            let cell = Self::cell_for(pbc, &dims, pos);
            cells.entry(cell).or_default().push(idx);
        }

        if dims.iter().any(|&n| n < 3) {
            log::warn!(
                "Cell grid {:?} has fewer than 3 cells on some axis; neighbor cells overlap",
                dims
            );
        }
        log::debug!(
            "Cell grid {:?} (cell widths {:?}), {} occupied cells for {} particles",
            dims,
            cell_widths,
            cells.len(),
            positions.len()
        );

        Ok(Self {
            positions,
            pbc: *pbc,
            cutoff,
            dims,
            cell_widths,
            cells,
        })
    }

    #[inline(always)]
    fn cell_for(pbc: &PeriodicBox, dims: &[i32; 3], pos: &[f64; 3]) -> CellIndex {
        let s = pbc.wrapped_fractional(pos);
        let bin = |axis: usize| ((s[axis] * f64::from(dims[axis])).floor() as i32).min(dims[axis] - 1);
        (bin(0), bin(1), bin(2))
    }

    /// Number of cells along each box vector.
    pub fn dims(&self) -> [usize; 3] {
        [self.dims[0] as usize, self.dims[1] as usize, self.dims[2] as usize]
    }

    /// Perpendicular width of a cell along each box vector.
    pub fn cell_widths(&self) -> [f64; 3] {
        self.cell_widths
    }

    /// Number of cells holding at least one particle.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Cell containing `pos`.
    pub fn cell_of(&self, pos: &[f64; 3]) -> CellIndex {
        Self::cell_for(&self.pbc, &self.dims, pos)
    }

    /// Particles binned into `cell`.
    pub fn members(&self, cell: CellIndex) -> &[usize] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The 3x3x3 block around `cell` with periodic wraparound, each distinct
    /// cell listed once.
    pub fn neighbor_cells(&self, cell: CellIndex) -> Vec<CellIndex> {
        let [nx, ny, nz] = self.dims;
        let mut neighbors = Vec::with_capacity(27);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    neighbors.push((
                        (cell.0 + dx).rem_euclid(nx),
                        (cell.1 + dy).rem_euclid(ny),
                        (cell.2 + dz).rem_euclid(nz),
                    ));
                }
            }
        }
        // Axes with fewer than 3 cells map several offsets onto one cell
        neighbors.sort_unstable();
        neighbors.dedup();
        neighbors
    }

    /// Enumerate every pair within the cutoff, sorted by `(i, j)`.
    pub fn pairs(&self) -> Vec<PairRecord> {
        let cutoff_sq = self.cutoff * self.cutoff;
        let occupied: Vec<(&CellIndex, &Vec<usize>)> = self.cells.iter().collect();

        let per_cell: Vec<Vec<PairRecord>> = occupied
            .par_iter()
            .map(|&(&cell, members)| {
                let mut local = Vec::new();
                for neighbor in self.neighbor_cells(cell) {
                    let Some(others) = self.cells.get(&neighbor) else {
                        continue;
                    };
                    for &p in members {
                        for &q in others {
                            // Also excludes self-pairs when neighbor == cell
                            if p < q {
                                if let Some(rec) =
                                    accept_pair(self.positions, &self.pbc, cutoff_sq, p, q)
                                {
                                    local.push(rec);
                                }
                            }
                        }
                    }
                }
                local
            })
            .collect();

        let mut pairs: Vec<PairRecord> = per_cell.into_iter().flatten().collect();
        sort_pairs(&mut pairs);
        pairs
    }
}
