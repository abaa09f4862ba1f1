//! Direct summation of displacement moments.
//!
//! Reference kernel: every start frame is visited for every lag, O(N²) per
//! particle. Positions must be unwrapped; no periodic wrapping is applied.

use rayon::prelude::*;
use rtk_core::error::{KernelError, Result};
use rtk_core::trajectory::Trajectory;
use rtk_core::util::{ensure_finite, norm_squared, sub};

use crate::moments::{DisplacementMoments, MomentSeries};

pub(crate) fn validate_series(series: &[[f64; 3]]) -> Result<()> {
    if series.len() < 2 {
        return Err(KernelError::invalid(format!(
            "Position series needs at least 2 frames, got {}",
            series.len()
        )));
    }
    ensure_finite(series, "Position series")
}

fn validate_lag(n_frames: usize, lag: usize) -> Result<()> {
    if lag == 0 || lag >= n_frames {
        return Err(KernelError::invalid(format!(
            "Lag {} out of range [1, {}]",
            lag,
            n_frames.saturating_sub(1)
        )));
    }
    Ok(())
}

/// Moments at one lag; the caller has validated `1 <= lag < series.len()`.
#[inline]
pub(crate) fn moments_unchecked(series: &[[f64; 3]], lag: usize) -> DisplacementMoments {
    let starts = series.len() - lag;
    let mut sum2 = 0.0;
    let mut sum4 = 0.0;
    for t in 0..starts {
        let d2 = norm_squared(&sub(&series[t + lag], &series[t]));
        sum2 += d2;
        sum4 += d2 * d2;
    }
    let count = starts as f64;
    DisplacementMoments {
        msd: sum2 / count,
        fourth_moment: sum4 / count,
    }
}

/// MSD and fourth moment of one particle at one lag.
///
/// # Arguments
/// * `series` - Unwrapped positions of one particle, one entry per frame
/// * `lag` - Frame offset, `1 <= lag <= series.len() - 1`
pub fn compute_moments(series: &[[f64; 3]], lag: usize) -> Result<DisplacementMoments> {
    validate_series(series)?;
    validate_lag(series.len(), lag)?;
    Ok(moments_unchecked(series, lag))
}

/// Moments of one particle for every lag, by direct summation.
pub fn direct_moment_series(series: &[[f64; 3]]) -> Result<MomentSeries> {
    validate_series(series)?;
    Ok(direct_series_unchecked(series, true))
}

pub(crate) fn direct_series_unchecked(series: &[[f64; 3]], with_axial: bool) -> MomentSeries {
    let n = series.len();
    let mut msd = vec![0.0; n];
    let mut fourth_moment = vec![0.0; n];

    for lag in 1..n {
        let m = moments_unchecked(series, lag);
        msd[lag] = m.msd;
        fourth_moment[lag] = m.fourth_moment;
    }
    let axial_fourth_moment = with_axial.then(|| {
        std::iter::once(0.0)
            .chain((1..n).map(|lag| axial_at_lag(series, lag)))
            .collect()
    });

    MomentSeries {
        msd,
        fourth_moment,
        axial_fourth_moment,
    }
}

pub(crate) fn axial_at_lag(series: &[[f64; 3]], lag: usize) -> f64 {
    let starts = series.len() - lag;
    let sum: f64 = (0..starts)
        .map(|t| {
            let d = sub(&series[t + lag], &series[t]);
            d[0].powi(4) + d[1].powi(4) + d[2].powi(4)
        })
        .sum();
    sum / starts as f64
}

/// Moments of every particle of `trajectory` at a single lag, in parallel
/// over particles.
pub fn moments_at_lag(trajectory: &Trajectory, lag: usize) -> Result<Vec<DisplacementMoments>> {
    validate_lag(trajectory.n_frames(), lag)?;
    Ok((0..trajectory.n_particles())
        .into_par_iter()
        .map(|i| moments_unchecked(&trajectory.particle_series(i), lag))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stationary_particle() {
        let series = vec![[1.5, -2.0, 3.25]; 12];
        let result = direct_moment_series(&series).unwrap();
        assert!(result.msd.iter().all(|&v| v == 0.0));
        assert!(result.fourth_moment.iter().all(|&v| v == 0.0));
        assert!(result.ngp().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_constant_velocity() {
        let v = [0.5, -1.0, 2.0];
        let speed_sq = 0.25 + 1.0 + 4.0;
        let series: Vec<[f64; 3]> = (0..20)
            .map(|t| {
                let t = t as f64;
                [v[0] * t, v[1] * t, v[2] * t]
            })
            .collect();
        for lag in 1..20 {
            let m = compute_moments(&series, lag).unwrap();
            let expected = speed_sq * (lag * lag) as f64;
            assert_relative_eq!(m.msd, expected, max_relative = 1e-12);
            assert_relative_eq!(m.fourth_moment, expected * expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_hand_computed_lag() {
        let series = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 2.0, 0.0]];
        let m = compute_moments(&series, 1).unwrap();
        // Steps of length 1 and 2
        assert_relative_eq!(m.msd, 2.5);
        assert_relative_eq!(m.fourth_moment, 8.5);
        let m = compute_moments(&series, 2).unwrap();
        assert_relative_eq!(m.msd, 5.0);
        assert_relative_eq!(m.fourth_moment, 25.0);

        let series = direct_moment_series(&series).unwrap();
        let axial = series.axial_fourth_moment.unwrap();
        assert_relative_eq!(axial[1], 8.5);
        assert_relative_eq!(axial[2], 17.0);
    }

    #[test]
    fn test_lag_validation() {
        let series = [[0.0; 3], [1.0; 3], [2.0; 3]];
        assert!(compute_moments(&series, 0).is_err());
        assert!(compute_moments(&series, 3).is_err());
        assert!(compute_moments(&series[..1], 1).is_err());
        assert!(compute_moments(&[[f64::NAN, 0.0, 0.0], [0.0; 3]], 1).is_err());
    }

    #[test]
    fn test_moments_at_lag_per_particle() {
        let frames = vec![
            vec![[0.0, 0.0, 0.0], [5.0, 5.0, 5.0]],
            vec![[1.0, 0.0, 0.0], [5.0, 5.0, 5.0]],
            vec![[2.0, 0.0, 0.0], [5.0, 5.0, 5.0]],
        ];
        let traj = Trajectory::from_frames(&frames).unwrap();
        let moments = moments_at_lag(&traj, 2).unwrap();
        assert_eq!(moments.len(), 2);
        assert_relative_eq!(moments[0].msd, 4.0);
        assert_eq!(moments[1].msd, 0.0);
        assert!(moments_at_lag(&traj, 3).is_err());
    }
}
