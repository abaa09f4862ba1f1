//! FFT evaluation of displacement moments for all lags at once.
//!
//! Every lagged sum `Σ_t f[t + m]·g[t]` is read off the inverse transform of
//! `F·conj(G)` with both signals zero padded to `2N`, which removes the
//! circular wraparound. The moments then follow from expanding `|Δr|²` and
//! `|Δr|⁴` into products of single-time quantities:
//!
//! - `MSD(m) = S1[s](m) - 2·Σ_a acf(x_a)(m)` with `s = |r|²`
//! - `<|Δr|⁴>(m) = S1[s²](m) + 2·acf(s)(m) + 4·Σ_ab acf(x_a x_b)(m)
//!   - 4·Σ_a (xcorr(s x_a, x_a) + xcorr(x_a, s x_a))(m)`
//!
//! where `S1[f](m) = mean_t (f[t + m] + f[t])` is evaluated by a running sum.
//! Linear combinations are formed in the frequency domain so each moment
//! needs a single inverse transform.
//!
//! The expansion subtracts products of size `|r|⁴` to produce `|Δr|⁴`, so
//! its rounding error grows with how far the particle strays from its mean
//! position. Positions are centred per axis first, and any lag whose
//! rounding bound exceeds `REFINE_TOLERANCE` of its value is recomputed by
//! direct summation. Short lags of drifting or very long trajectories are
//! the usual candidates.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use rtk_core::error::{KernelError, Result};

use crate::direct::{axial_at_lag, moments_unchecked, validate_series};
use crate::moments::MomentSeries;

/// Relative precision every FFT lag must reach before it is accepted.
const REFINE_TOLERANCE: f64 = 1e-10;

/// Multiplier on the normwise FFT rounding estimate.
const ROUNDING_SAFETY: f64 = 16.0;

/// Forward and inverse FFT plans for one series length, with scratch space.
///
/// Planning dominates for short series, so parallel workers keep one plan
/// each and reuse it across particles.
pub struct CorrelationPlan {
    len: usize,
    padded: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl CorrelationPlan {
    /// Plan correlations of series with `len` samples.
    pub fn new(len: usize) -> Self {
        let padded = 2 * len.max(1);
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(padded);
        let inverse = planner.plan_fft_inverse(padded);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            len,
            padded,
            forward,
            inverse,
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// Series length this plan was built for.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn spectrum<I>(&mut self, signal: I) -> Vec<Complex<f64>>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut buffer = vec![Complex::new(0.0, 0.0); self.padded];
        for (slot, value) in buffer.iter_mut().zip(signal) {
            slot.re = value;
        }
        self.forward.process_with_scratch(&mut buffer, &mut self.scratch);
        buffer
    }

    /// Inverse transform of a correlation spectrum, normalised by the number
    /// of contributing starts `N - m`.
    fn lagged_means(&mut self, mut spectrum: Vec<Complex<f64>>) -> Vec<f64> {
        self.inverse.process_with_scratch(&mut spectrum, &mut self.scratch);
        let scale = self.padded as f64;
        (0..self.len)
            .map(|m| spectrum[m].re / scale / (self.len - m) as f64)
            .collect()
    }

    fn check_len(&self, n: usize) -> Result<()> {
        if n != self.len {
            return Err(KernelError::invalid(format!(
                "Correlation plan is for {} samples, got {}",
                self.len, n
            )));
        }
        Ok(())
    }

    /// `acf(f)(m) = Σ_t f[t + m]·f[t] / (N - m)`.
    pub fn autocorrelation(&mut self, signal: &[f64]) -> Result<Vec<f64>> {
        self.check_len(signal.len())?;
        let spectrum: Vec<Complex<f64>> = self
            .spectrum(signal.iter().copied())
            .into_iter()
            .map(|z| Complex::new(z.norm_sqr(), 0.0))
            .collect();
        Ok(self.lagged_means(spectrum))
    }

    /// `xcorr(f, g)(m) = Σ_t f[t + m]·g[t] / (N - m)`.
    pub fn cross_correlation(&mut self, f: &[f64], g: &[f64]) -> Result<Vec<f64>> {
        self.check_len(f.len())?;
        self.check_len(g.len())?;
        let f_hat = self.spectrum(f.iter().copied());
        let g_hat = self.spectrum(g.iter().copied());
        let product = f_hat
            .iter()
            .zip(&g_hat)
            .map(|(a, b)| a * b.conj())
            .collect();
        Ok(self.lagged_means(product))
    }

    /// All-lag moments of one particle.
    pub fn moment_series(&mut self, series: &[[f64; 3]]) -> Result<MomentSeries> {
        self.check_len(series.len())?;
        validate_series(series)?;
        let (msd, fourth, axial) = self.evaluate(series, true, true);
        Ok(MomentSeries {
            msd,
            fourth_moment: fourth.unwrap_or_default(),
            axial_fourth_moment: axial,
        })
    }

    /// Moments for a series of `self.len` validated samples.
    pub(crate) fn evaluate(
        &mut self,
        series: &[[f64; 3]],
        with_fourth: bool,
        with_axial: bool,
    ) -> (Vec<f64>, Option<Vec<f64>>, Option<Vec<f64>>) {
        let n = self.len;
        let spectrum_len = self.padded;

        let x = centred_axes(series);
        let s: Vec<f64> = (0..n)
            .map(|t| x[0][t] * x[0][t] + x[1][t] * x[1][t] + x[2][t] * x[2][t])
            .collect();

        let x_hat: [Vec<Complex<f64>>; 3] = [
            self.spectrum(x[0].iter().copied()),
            self.spectrum(x[1].iter().copied()),
            self.spectrum(x[2].iter().copied()),
        ];

        let mut cross = zeros(spectrum_len);
        for xa in &x_hat {
            accumulate_power(&mut cross, xa, 1.0);
        }
        let s2 = self.lagged_means(cross);
        let s1 = running_pair_means(&s);
        let mut msd = clamp_moments(s1.iter().zip(&s2).map(|(a, b)| a - 2.0 * b));

        let mut fourth = with_fourth.then(|| {
            let mut spec = zeros(spectrum_len);
            let s_hat = self.spectrum(s.iter().copied());
            accumulate_power(&mut spec, &s_hat, 2.0);
            for a in 0..3 {
                for b in a..3 {
                    let weight = if a == b { 4.0 } else { 8.0 };
                    let p_hat = self.spectrum((0..n).map(|t| x[a][t] * x[b][t]));
                    accumulate_power(&mut spec, &p_hat, weight);
                }
                let y_hat = self.spectrum((0..n).map(|t| s[t] * x[a][t]));
                accumulate_symmetric(&mut spec, &y_hat, &x_hat[a], -4.0);
            }
            let lagged = self.lagged_means(spec);
            let d4: Vec<f64> = s.iter().map(|v| v * v).collect();
            let s1_4 = running_pair_means(&d4);
            clamp_moments(s1_4.iter().zip(&lagged).map(|(a, b)| a + b))
        });

        let mut axial = with_axial.then(|| {
            let mut spec = zeros(spectrum_len);
            for a in 0..3 {
                let sq_hat = self.spectrum(x[a].iter().map(|v| v * v));
                accumulate_power(&mut spec, &sq_hat, 6.0);
                let cube_hat = self.spectrum(x[a].iter().map(|v| v * v * v));
                accumulate_symmetric(&mut spec, &cube_hat, &x_hat[a], -4.0);
            }
            let lagged = self.lagged_means(spec);
            let d4: Vec<f64> = (0..n)
                .map(|t| x[0][t].powi(4) + x[1][t].powi(4) + x[2][t].powi(4))
                .collect();
            let s1_4 = running_pair_means(&d4);
            clamp_moments(s1_4.iter().zip(&lagged).map(|(a, b)| a + b))
        });

        // Absolute rounding error of every lagged mean is bounded by
        // eps·log2(P)·||f||·||g|| / (N - m). The quadratic terms are bounded
        // by Σs and the quartic ones by sqrt(Σs³·Σs).
        let error_factor = ROUNDING_SAFETY * f64::EPSILON * (spectrum_len as f64).log2();
        let sum_s: f64 = s.iter().sum();
        let bound2 = error_factor * sum_s;
        let bound4 = error_factor * (s.iter().map(|v| v * v * v).sum::<f64>() * sum_s).sqrt();
        let mut refined = 0usize;
        for lag in 1..n {
            let starts = n - lag;
            let imprecise_msd = exceeds_tolerance(msd[lag], bound2, starts);
            let imprecise_fourth = fourth
                .as_ref()
                .is_some_and(|f| exceeds_tolerance(f[lag], bound4, starts));
            if imprecise_msd || imprecise_fourth {
                let exact = moments_unchecked(series, lag);
                msd[lag] = exact.msd;
                if let Some(f) = fourth.as_mut() {
                    f[lag] = exact.fourth_moment;
                }
                refined += 1;
            }
            if let Some(ax) = axial.as_mut() {
                if exceeds_tolerance(ax[lag], bound4, starts) {
                    ax[lag] = axial_at_lag(series, lag);
                }
            }
        }
        log::trace!("Refined {} of {} lags by direct summation", refined, n - 1);

        (msd, fourth, axial)
    }
}

/// Positions relative to the per-axis mean, measured from the first frame
/// so a resting particle is exactly zero.
fn centred_axes(series: &[[f64; 3]]) -> [Vec<f64>; 3] {
    let origin = series[0];
    std::array::from_fn(|a| {
        let offsets: Vec<f64> = series.iter().map(|p| p[a] - origin[a]).collect();
        let mean = offsets.iter().sum::<f64>() / offsets.len() as f64;
        offsets.into_iter().map(|v| v - mean).collect()
    })
}

/// Whether a value whose rounding error is at most `bound / starts` misses
/// `REFINE_TOLERANCE` relative precision.
#[inline]
fn exceeds_tolerance(value: f64, bound: f64, starts: usize) -> bool {
    bound / starts as f64 > REFINE_TOLERANCE * value
}

fn zeros(len: usize) -> Vec<Complex<f64>> {
    vec![Complex::new(0.0, 0.0); len]
}

/// `spec += weight·|z|²`, the spectrum of `weight·acf`.
#[inline]
fn accumulate_power(spec: &mut [Complex<f64>], z: &[Complex<f64>], weight: f64) {
    for (acc, v) in spec.iter_mut().zip(z) {
        acc.re += weight * v.norm_sqr();
    }
}

/// `spec += weight·(F·conj(G) + G·conj(F))`, the spectrum of
/// `weight·(xcorr(f, g) + xcorr(g, f))`.
#[inline]
fn accumulate_symmetric(spec: &mut [Complex<f64>], f: &[Complex<f64>], g: &[Complex<f64>], weight: f64) {
    for ((acc, a), b) in spec.iter_mut().zip(f).zip(g) {
        acc.re += 2.0 * weight * (a.re * b.re + a.im * b.im);
    }
}

/// `S1[f](m) = mean_t (f[t + m] + f[t])` for every lag, via the running sum
/// `Q ← Q - f[m - 1] - f[N - m]` starting from `Q = 2·Σf`.
fn running_pair_means(f: &[f64]) -> Vec<f64> {
    let n = f.len();
    let mut q = 2.0 * f.iter().sum::<f64>();
    let mut out = Vec::with_capacity(n);
    for m in 0..n {
        if m > 0 {
            q -= f[m - 1] + f[n - m];
        }
        out.push(q / (n - m) as f64);
    }
    out
}

/// Zero the lag-0 entry and clamp round-off below zero.
fn clamp_moments<I>(values: I) -> Vec<f64>
where
    I: Iterator<Item = f64>,
{
    values
        .enumerate()
        .map(|(lag, v)| if lag == 0 { 0.0 } else { v.max(0.0) })
        .collect()
}

/// MSD and fourth moment of one particle for every lag in O(N log N).
///
/// # Arguments
/// * `series` - Unwrapped positions of one particle, one entry per frame
///
/// # Returns
/// Series indexed by lag `0..series.len()`, with lag 0 equal to 0. Every
/// lag matches direct summation to about 1e-10 relative; lags the
/// correlation cannot resolve that well are summed directly.
pub fn compute_moments_fft(series: &[[f64; 3]]) -> Result<MomentSeries> {
    validate_series(series)?;
    CorrelationPlan::new(series.len()).moment_series(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::direct_moment_series;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_walk(n: usize, seed: u64) -> Vec<[f64; 3]> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pos = [3.0, -7.0, 12.0];
        (0..n)
            .map(|_| {
                for c in pos.iter_mut() {
                    *c += rng.gen_range(-0.5..0.5);
                }
                pos
            })
            .collect()
    }

    fn direct_lagged(f: &[f64], g: &[f64], m: usize) -> f64 {
        let n = f.len();
        (0..n - m).map(|t| f[t + m] * g[t]).sum::<f64>() / (n - m) as f64
    }

    #[test]
    fn test_autocorrelation_matches_sum() {
        let signal = [1.0, -2.0, 0.5, 3.0, 4.0, -1.5, 0.25];
        let mut plan = CorrelationPlan::new(signal.len());
        let acf = plan.autocorrelation(&signal).unwrap();
        for m in 0..signal.len() {
            assert_relative_eq!(acf[m], direct_lagged(&signal, &signal, m), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cross_correlation_is_ordered() {
        let f = [0.0, 1.0, 2.0, 3.0, 4.0];
        let g = [1.0, 0.0, -1.0, 0.5, 2.0];
        let mut plan = CorrelationPlan::new(f.len());
        let fg = plan.cross_correlation(&f, &g).unwrap();
        let gf = plan.cross_correlation(&g, &f).unwrap();
        for m in 0..f.len() {
            assert_relative_eq!(fg[m], direct_lagged(&f, &g, m), epsilon = 1e-12);
            assert_relative_eq!(gf[m], direct_lagged(&g, &f, m), epsilon = 1e-12);
        }
        assert!(plan.autocorrelation(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_fft_matches_direct() {
        for (n, seed) in [(2, 1), (3, 2), (17, 3), (128, 4), (301, 5)] {
            let series = random_walk(n, seed);
            let direct = direct_moment_series(&series).unwrap();
            let fft = compute_moments_fft(&series).unwrap();
            assert_eq!(fft.len(), n);

            let direct_axial = direct.axial_fourth_moment.as_ref().unwrap();
            let fft_axial = fft.axial_fourth_moment.as_ref().unwrap();
            for lag in 1..n {
                assert_relative_eq!(fft.msd[lag], direct.msd[lag], max_relative = 1e-9, epsilon = 1e-12);
                assert_relative_eq!(
                    fft.fourth_moment[lag],
                    direct.fourth_moment[lag],
                    max_relative = 1e-9,
                    epsilon = 1e-12
                );
                assert_relative_eq!(fft_axial[lag], direct_axial[lag], max_relative = 1e-9, epsilon = 1e-12);
            }
        }
    }

    fn drifting_walk(n: usize, seed: u64, drift: f64) -> Vec<[f64; 3]> {
        random_walk(n, seed)
            .into_iter()
            .enumerate()
            .map(|(t, p)| {
                let shift = drift * t as f64;
                [p[0] + shift, p[1] - shift, p[2] + 0.5 * shift]
            })
            .collect()
    }

    fn assert_series_close(fft: &MomentSeries, direct: &MomentSeries, tol: f64) {
        let fft_axial = fft.axial_fourth_moment.as_ref().unwrap();
        let direct_axial = direct.axial_fourth_moment.as_ref().unwrap();
        for lag in 1..fft.len() {
            assert_relative_eq!(fft.msd[lag], direct.msd[lag], max_relative = tol);
            assert_relative_eq!(fft.fourth_moment[lag], direct.fourth_moment[lag], max_relative = tol);
            assert_relative_eq!(fft_axial[lag], direct_axial[lag], max_relative = tol);
        }
    }

    #[test]
    fn test_long_walk_matches_direct() {
        let n = 8000;
        let series = random_walk(n, 21);
        let fft = compute_moments_fft(&series).unwrap();
        let lags = (1..64).chain((64..n).step_by(97)).chain(n - 3..n);
        for lag in lags {
            let exact = crate::direct::compute_moments(&series, lag).unwrap();
            assert_relative_eq!(fft.msd[lag], exact.msd, max_relative = 1e-9);
            assert_relative_eq!(fft.fourth_moment[lag], exact.fourth_moment, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_drifting_walk_matches_direct() {
        for (drift, seed) in [(0.05, 30), (1.0, 31)] {
            let series = drifting_walk(2000, seed, drift);
            let direct = direct_moment_series(&series).unwrap();
            let fft = compute_moments_fft(&series).unwrap();
            assert_series_close(&fft, &direct, 1e-9);
        }
    }

    #[test]
    fn test_far_from_origin_matches_direct() {
        let series: Vec<[f64; 3]> = random_walk(500, 32)
            .into_iter()
            .map(|p| [p[0] + 1e4, p[1] - 2e4, p[2] + 5e3])
            .collect();
        let direct = direct_moment_series(&series).unwrap();
        let fft = compute_moments_fft(&series).unwrap();
        assert_series_close(&fft, &direct, 1e-9);
    }

    #[test]
    fn test_stationary_particle_is_exactly_zero() {
        let series = vec![[4.25, -1.0, 9.5]; 33];
        let result = compute_moments_fft(&series).unwrap();
        assert!(result.msd.iter().all(|&v| v == 0.0));
        assert!(result.fourth_moment.iter().all(|&v| v == 0.0));
        assert!(result.ngp().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_constant_velocity() {
        let v = [0.3, 0.4, -1.2];
        let speed_sq = v.iter().map(|c| c * c).sum::<f64>();
        let series: Vec<[f64; 3]> = (0..20)
            .map(|t| {
                let t = t as f64;
                [1.0 + v[0] * t, 2.0 + v[1] * t, 3.0 + v[2] * t]
            })
            .collect();
        let result = compute_moments_fft(&series).unwrap();
        assert_eq!(result.msd[0], 0.0);
        for lag in 1..20 {
            let expected = speed_sq * (lag * lag) as f64;
            assert_relative_eq!(result.msd[lag], expected, max_relative = 1e-9);
            assert_relative_eq!(result.fourth_moment[lag], expected * expected, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_ngp_starts_at_zero() {
        let series = random_walk(64, 8);
        let result = compute_moments_fft(&series).unwrap();
        let ngp = result.ngp();
        assert_eq!(ngp[0], 0.0);
        assert!(ngp.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_plan_reuse() {
        let a = random_walk(40, 10);
        let b = random_walk(40, 11);
        let mut plan = CorrelationPlan::new(40);
        let first = plan.moment_series(&a).unwrap();
        let _ = plan.moment_series(&b).unwrap();
        let again = plan.moment_series(&a).unwrap();
        assert_eq!(first, again);
        assert!(plan.moment_series(&a[..39]).is_err());
    }

    #[test]
    fn test_rejects_short_series() {
        assert!(compute_moments_fft(&[[0.0; 3]]).is_err());
        assert!(compute_moments_fft(&[]).is_err());
    }
}
