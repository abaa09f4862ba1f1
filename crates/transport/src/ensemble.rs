//! Per-particle moments across a whole trajectory and their ensemble average.
//!
//! The kernel choice is made here, once per trajectory, from
//! [`TransportConfig`]; the direct and FFT kernels themselves carry no policy.

use ndarray::{Array2, Axis};
use rayon::prelude::*;
use rtk_core::error::Result;
use rtk_core::trajectory::Trajectory;

use crate::config::{MomentMethod, TransportConfig};
use crate::direct::direct_series_unchecked;
use crate::fft::CorrelationPlan;
use crate::moments::non_gaussian_parameter;

/// Frame count above which an explicit direct request is reported as slow.
const DIRECT_WARN_FRAMES: usize = 20_000;

/// Moments of every particle, one row per lag.
///
/// Row `k` holds lag `k + 1`; column `i` holds particle `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleMoments {
    pub msd: Array2<f64>,
    /// Present when the fourth moment was requested.
    pub fourth_moment: Option<Array2<f64>>,
    /// Kernel that produced the values.
    pub method: MomentMethod,
    /// Time between frames.
    pub timestep: f64,
}

impl ParticleMoments {
    /// Number of lags (rows).
    pub fn n_lags(&self) -> usize {
        self.msd.nrows()
    }

    /// Number of particles (columns).
    pub fn n_particles(&self) -> usize {
        self.msd.ncols()
    }

    /// Per-particle non-Gaussian parameter, when the fourth moment exists.
    pub fn ngp(&self) -> Option<Array2<f64>> {
        let fourth = self.fourth_moment.as_ref()?;
        let mut out = Array2::zeros(self.msd.raw_dim());
        ndarray::Zip::from(&mut out)
            .and(&self.msd)
            .and(fourth)
            .for_each(|o, &m2, &m4| *o = non_gaussian_parameter(m2, m4));
        Some(out)
    }

    /// Average over particles for every lag.
    pub fn ensemble(&self) -> EnsembleMoments {
        let n_lags = self.n_lags();
        let msd = row_means(&self.msd);
        let fourth_moment = self.fourth_moment.as_ref().map(row_means);
        let ngp = fourth_moment.as_ref().map(|fourth| {
            msd.iter()
                .zip(fourth)
                .map(|(&m2, &m4)| non_gaussian_parameter(m2, m4))
                .collect()
        });
        EnsembleMoments {
            time: (1..=n_lags).map(|lag| lag as f64 * self.timestep).collect(),
            msd,
            fourth_moment,
            ngp,
        }
    }
}

fn row_means(values: &Array2<f64>) -> Vec<f64> {
    let n = values.ncols() as f64;
    values.axis_iter(Axis(0)).map(|row| row.sum() / n).collect()
}

/// Particle-averaged moments with a time axis; entry `k` is lag `k + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleMoments {
    pub time: Vec<f64>,
    pub msd: Vec<f64>,
    pub fourth_moment: Option<Vec<f64>>,
    /// NGP of the averaged moments.
    pub ngp: Option<Vec<f64>>,
}

impl EnsembleMoments {
    pub fn len(&self) -> usize {
        self.msd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msd.is_empty()
    }
}

/// Compute MSD (and optionally the fourth moment) of every particle.
///
/// # Arguments
/// * `trajectory` - Unwrapped trajectory
/// * `config` - Kernel selection, lag range and time step
///
/// # Returns
/// Arrays of shape `[lags, particles]`, row `k` holding lag `k + 1`
pub fn compute_particle_moments(
    trajectory: &Trajectory,
    config: &TransportConfig,
) -> Result<ParticleMoments> {
    config.validate()?;
    let n_frames = trajectory.n_frames();
    let n_particles = trajectory.n_particles();
    let n_lags = config.lag_count(n_frames)?;
    let method = config.resolve_method(n_frames);
    let with_fourth = config.compute_fourth_moment;

    log::info!(
        "Computing displacement moments for {} particles over {} frames ({:?}, {} lags)",
        n_particles,
        n_frames,
        method,
        n_lags
    );
    if method == MomentMethod::Direct && n_frames >= DIRECT_WARN_FRAMES {
        log::warn!(
            "Direct moments over {} frames scale quadratically; consider MomentMethod::Fft",
            n_frames
        );
    }

    // Each worker owns its particle's column until the gather below
    let columns: Vec<(Vec<f64>, Option<Vec<f64>>)> = match method {
        MomentMethod::Fft | MomentMethod::Auto => (0..n_particles)
            .into_par_iter()
            .map_init(
                || CorrelationPlan::new(n_frames), // Thread-local FFT plan
                |plan, i| {
                    let series = trajectory.particle_series(i);
                    let (msd, fourth, _) = plan.evaluate(&series, with_fourth, false);
                    (msd, fourth)
                },
            )
            .collect(),
        MomentMethod::Direct => (0..n_particles)
            .into_par_iter()
            .map(|i| {
                let series = direct_series_unchecked(&trajectory.particle_series(i), false);
                (series.msd, with_fourth.then_some(series.fourth_moment))
            })
            .collect(),
    };

    let msd = Array2::from_shape_fn((n_lags, n_particles), |(row, i)| columns[i].0[row + 1]);
    let fourth_moment = with_fourth.then(|| {
        Array2::from_shape_fn((n_lags, n_particles), |(row, i)| {
            columns[i].1.as_ref().map_or(0.0, |fourth| fourth[row + 1])
        })
    });

    log::debug!("Gathered moments into [{}, {}] arrays", n_lags, n_particles);
    Ok(ParticleMoments {
        msd,
        fourth_moment,
        method,
        timestep: config.timestep,
    })
}

/// Particle-averaged moments of a trajectory.
pub fn compute_ensemble_moments(
    trajectory: &Trajectory,
    config: &TransportConfig,
) -> Result<EnsembleMoments> {
    Ok(compute_particle_moments(trajectory, config)?.ensemble())
}
