//! Radial distribution function from neighbor pairs.
//!
//! Pair distances are histogrammed into uniform shells and normalised by the
//! ideal-gas count `N·ρ·(4/3)π(r_hi³ - r_lo³) / 2` per frame.

use std::f64::consts::PI;

use crate::error::{KernelError, Result};
use crate::neighbors::{find_pairs, NeighborStrategy, PairRecord};
use crate::periodic::PeriodicBox;
use crate::trajectory::Trajectory;

/// Histogram parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RdfParams {
    /// Outer radius; `None` uses half the smallest box width.
    pub r_max: Option<f64>,
    /// Number of shells over `[0, r_max)`.
    pub n_bins: usize,
}

impl Default for RdfParams {
    fn default() -> Self {
        Self {
            r_max: None,
            n_bins: 100,
        }
    }
}

impl RdfParams {
    /// Outer radius for `pbc`, validated against the minimum-image limit.
    pub fn resolve_r_max(&self, pbc: &PeriodicBox) -> Result<f64> {
        if self.n_bins == 0 {
            return Err(KernelError::invalid("RDF needs at least one bin"));
        }
        match self.r_max {
            None => Ok(pbc.max_cutoff()),
            Some(r_max) => {
                pbc.validate_cutoff(r_max)?;
                Ok(r_max)
            }
        }
    }
}

/// g(r) sampled at shell centres.
#[derive(Debug, Clone, PartialEq)]
pub struct Rdf {
    /// Bin centres.
    pub r_values: Vec<f64>,
    /// Radial distribution function g(r).
    pub g_values: Vec<f64>,
    /// Bin width.
    pub dr: f64,
}

struct Histogram {
    counts: Vec<u64>,
    dr: f64,
    frames: usize,
}

impl Histogram {
    fn new(r_max: f64, n_bins: usize) -> Self {
        Self {
            counts: vec![0; n_bins],
            dr: r_max / n_bins as f64,
            frames: 0,
        }
    }

    fn add_frame(&mut self, pairs: &[PairRecord]) {
        let n_bins = self.counts.len();
        for pair in pairs {
            let bin = (pair.distance / self.dr) as usize;
            if bin < n_bins {
                self.counts[bin] += 1;
            }
        }
        self.frames += 1;
    }

    fn normalise(self, n_particles: usize, volume: f64) -> Rdf {
        let n = n_particles as f64;
        let density = n / volume;
        let dr = self.dr;
        let r_values: Vec<f64> = (0..self.counts.len())
            .map(|k| (k as f64 + 0.5) * dr)
            .collect();
        let g_values = self
            .counts
            .iter()
            .enumerate()
            .map(|(k, &count)| {
                let r_lo = k as f64 * dr;
                let r_hi = r_lo + dr;
                let shell = 4.0 / 3.0 * PI * (r_hi.powi(3) - r_lo.powi(3));
                // Pairs were counted once each
                2.0 * count as f64 / (self.frames as f64 * n * density * shell)
            })
            .collect();
        Rdf {
            r_values,
            g_values,
            dr,
        }
    }
}

/// g(r) of a single configuration from its pair list.
///
/// `pairs` must have been enumerated with a cutoff of at least `r_max`;
/// distances beyond `r_max` are ignored.
pub fn radial_distribution(
    pairs: &[PairRecord],
    n_particles: usize,
    pbc: &PeriodicBox,
    params: &RdfParams,
) -> Result<Rdf> {
    let r_max = params.resolve_r_max(pbc)?;
    if n_particles < 2 {
        return Err(KernelError::invalid(format!(
            "RDF needs at least 2 particles, got {}",
            n_particles
        )));
    }
    if let Some(bad) = pairs.iter().find(|p| p.j >= n_particles) {
        return Err(KernelError::invalid(format!(
            "Pair ({}, {}) refers to a particle outside 0..{}",
            bad.i, bad.j, n_particles
        )));
    }

    let mut histogram = Histogram::new(r_max, params.n_bins);
    histogram.add_frame(pairs);
    Ok(histogram.normalise(n_particles, pbc.volume()))
}

/// g(r) averaged over every frame of a trajectory in a fixed box.
pub fn trajectory_rdf(
    trajectory: &Trajectory,
    pbc: &PeriodicBox,
    params: &RdfParams,
    strategy: NeighborStrategy,
) -> Result<Rdf> {
    let r_max = params.resolve_r_max(pbc)?;
    let n_particles = trajectory.n_particles();
    if n_particles < 2 {
        return Err(KernelError::invalid(format!(
            "RDF needs at least 2 particles, got {}",
            n_particles
        )));
    }

    let mut histogram = Histogram::new(r_max, params.n_bins);
    for frame in trajectory.frames() {
        let pairs = find_pairs(frame, pbc, r_max, strategy)?;
        histogram.add_frame(&pairs);
    }
    log::info!(
        "RDF over {} frames, {} bins up to {}",
        trajectory.n_frames(),
        params.n_bins,
        r_max
    );
    Ok(histogram.normalise(n_particles, pbc.volume()))
}
