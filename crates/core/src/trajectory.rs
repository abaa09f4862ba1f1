//! Validated in-memory trajectories.
//!
//! Positions are stored frame-major in one flat buffer: frame `t` occupies
//! `positions[t * n_particles..(t + 1) * n_particles]`.

use ndarray::{Array3, ArrayView2, ArrayView3};

use crate::error::{KernelError, Result};
use crate::util::ensure_finite;

/// Immutable particle trajectory with at least two frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    positions: Vec<[f64; 3]>,
    n_frames: usize,
    n_particles: usize,
}

impl Trajectory {
    /// Build a trajectory from a list of frames.
    ///
    /// Fails on fewer than two frames, empty frames, ragged particle counts
    /// or non-finite coordinates.
    pub fn from_frames(frames: &[Vec<[f64; 3]>]) -> Result<Self> {
        let n_frames = frames.len();
        if n_frames < 2 {
            return Err(KernelError::invalid(format!(
                "Trajectory needs at least 2 frames, got {}",
                n_frames
            )));
        }
        let n_particles = frames[0].len();
        if n_particles == 0 {
            return Err(KernelError::invalid("Trajectory frames contain no particles"));
        }

        let mut positions = Vec::with_capacity(n_frames * n_particles);
        for (frame_idx, frame) in frames.iter().enumerate() {
            if frame.len() != n_particles {
                return Err(KernelError::invalid(format!(
                    "Frame {} has {} particles, expected {}",
                    frame_idx,
                    frame.len(),
                    n_particles
                )));
            }
            positions.extend_from_slice(frame);
        }
        ensure_finite(&positions, "Trajectory")?;

        Ok(Self {
            positions,
            n_frames,
            n_particles,
        })
    }

    /// Build a single-particle trajectory from its position series.
    pub fn from_series(series: &[[f64; 3]]) -> Result<Self> {
        let frames: Vec<Vec<[f64; 3]>> = series.iter().map(|p| vec![*p]).collect();
        Self::from_frames(&frames)
    }

    /// Build from a dense `[frames, particles, 3]` array.
    pub fn from_array(array: ArrayView3<'_, f64>) -> Result<Self> {
        let shape = array.shape();
        if shape[2] != 3 {
            return Err(KernelError::invalid(format!(
                "Trajectory array must have shape [frames, particles, 3], got {:?}",
                shape
            )));
        }
        let (n_frames, n_particles) = (shape[0], shape[1]);
        let frames: Vec<Vec<[f64; 3]>> = (0..n_frames)
            .map(|t| {
                (0..n_particles)
                    .map(|i| [array[[t, i, 0]], array[[t, i, 1]], array[[t, i, 2]]])
                    .collect()
            })
            .collect();
        Self::from_frames(&frames)
    }

    /// Build from a single-precision `[frames, particles, 3]` array.
    pub fn from_array_f32(array: ArrayView3<'_, f32>) -> Result<Self> {
        Self::from_array(array.mapv(f64::from).view())
    }

    /// Build a single-particle trajectory from a `[frames, 3]` array.
    pub fn from_series_array(array: ArrayView2<'_, f64>) -> Result<Self> {
        if array.shape()[1] != 3 {
            return Err(KernelError::invalid(format!(
                "Series array must have shape [frames, 3], got {:?}",
                array.shape()
            )));
        }
        let series: Vec<[f64; 3]> = array
            .outer_iter()
            .map(|row| [row[0], row[1], row[2]])
            .collect();
        Self::from_series(&series)
    }

    /// Number of frames.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Number of particles per frame.
    pub fn n_particles(&self) -> usize {
        self.n_particles
    }

    /// Positions of every particle at frame `t`.
    #[inline]
    pub fn frame(&self, t: usize) -> &[[f64; 3]] {
        let start = t * self.n_particles;
        &self.positions[start..start + self.n_particles]
    }

    /// Iterator over frames in time order.
    pub fn frames(&self) -> impl Iterator<Item = &[[f64; 3]]> + '_ {
        self.positions.chunks_exact(self.n_particles)
    }

    /// Position of `particle` at frame `t`.
    #[inline]
    pub fn position(&self, t: usize, particle: usize) -> [f64; 3] {
        self.positions[t * self.n_particles + particle]
    }

    /// Time series of a single particle.
    pub fn particle_series(&self, particle: usize) -> Vec<[f64; 3]> {
        (0..self.n_frames)
            .map(|t| self.position(t, particle))
            .collect()
    }

    /// Copy into a dense `[frames, particles, 3]` array.
    pub fn to_array(&self) -> Array3<f64> {
        Array3::from_shape_fn((self.n_frames, self.n_particles, 3), |(t, i, k)| {
            self.position(t, i)[k]
        })
    }

    pub(crate) fn from_validated(positions: Vec<[f64; 3]>, n_frames: usize, n_particles: usize) -> Self {
        debug_assert_eq!(positions.len(), n_frames * n_particles);
        Self {
            positions,
            n_frames,
            n_particles,
        }
    }
}
