//! Einstein relation: `MSD(t) ≈ 6·D·t` in the diffusive regime.

use rtk_core::error::{KernelError, Result};

use crate::config::DiffusionFit;
use crate::ensemble::EnsembleMoments;

/// Denominators below this are treated as a degenerate fit.
const DIVISION_GUARD: f64 = 1e-30;

/// Self-diffusion coefficient from the ensemble MSD.
///
/// Fits `MSD = 6·D·t + offset` by least squares over the lags selected by
/// `fit`, and returns `max(D, 0)`.
pub fn einstein_diffusion(moments: &EnsembleMoments, fit: &DiffusionFit) -> Result<f64> {
    fit.validate()?;
    let n = moments.len();
    let fit_start = (fit.start_fraction * n as f64).floor() as usize;
    let fit_end = ((fit.end_fraction * n as f64).ceil() as usize).min(n);
    if fit_end < fit_start + 2 {
        return Err(KernelError::invalid(format!(
            "Fit window [{}, {}) of {} lags holds fewer than 2 points",
            fit_start, fit_end, n
        )));
    }

    let time_vals = &moments.time[fit_start..fit_end];
    let msd_vals = &moments.msd[fit_start..fit_end];

    // Linear regression: MSD = 6D*t + offset
    let n_pts = msd_vals.len() as f64;
    let t_mean: f64 = time_vals.iter().sum::<f64>() / n_pts;
    let m_mean: f64 = msd_vals.iter().sum::<f64>() / n_pts;
    let mut num = 0.0;
    let mut den = 0.0;
    for (t, m) in time_vals.iter().zip(msd_vals) {
        let dt = t - t_mean;
        num += dt * (m - m_mean);
        den += dt * dt;
    }
    let slope = if den > DIVISION_GUARD { num / den } else { 0.0 };

    log::debug!(
        "Einstein fit over lags {}..{}: slope {}",
        fit_start + 1,
        fit_end,
        slope
    );
    Ok((slope / 6.0).max(0.0))
}
