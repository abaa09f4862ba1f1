//! Displacement moment records shared by the direct and FFT kernels.

/// Mean squared and mean quartic displacement of one particle at one lag.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplacementMoments {
    /// `mean_t |r(t + lag) - r(t)|²`
    pub msd: f64,
    /// `mean_t |r(t + lag) - r(t)|⁴`
    pub fourth_moment: f64,
}

impl DisplacementMoments {
    /// Non-Gaussian parameter for this lag.
    pub fn ngp(&self) -> f64 {
        non_gaussian_parameter(self.msd, self.fourth_moment)
    }
}

/// Moments of one particle for every lag `0..n_frames`.
///
/// Entry 0 is the zero lag and is exactly 0 for both moments.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentSeries {
    pub msd: Vec<f64>,
    pub fourth_moment: Vec<f64>,
    /// `mean_t Σ_axis (Δx_axis)⁴`, when computed.
    pub axial_fourth_moment: Option<Vec<f64>>,
}

impl MomentSeries {
    /// Number of lags, including lag 0.
    pub fn len(&self) -> usize {
        self.msd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msd.is_empty()
    }

    /// Moments at a single lag.
    pub fn at(&self, lag: usize) -> DisplacementMoments {
        DisplacementMoments {
            msd: self.msd[lag],
            fourth_moment: self.fourth_moment[lag],
        }
    }

    /// Non-Gaussian parameter for every lag; 0 at lag 0.
    pub fn ngp(&self) -> Vec<f64> {
        ngp_series(&self.msd, &self.fourth_moment)
    }
}

/// `α₂ = (3/5)·<Δr⁴>/<Δr²>² - 1`, defined as 0 when the msd vanishes.
#[inline]
pub fn non_gaussian_parameter(msd: f64, fourth_moment: f64) -> f64 {
    if msd == 0.0 {
        0.0
    } else {
        0.6 * fourth_moment / (msd * msd) - 1.0
    }
}

/// Elementwise NGP of a lag-indexed series whose entry 0 is the zero lag.
pub fn ngp_series(msd: &[f64], fourth_moment: &[f64]) -> Vec<f64> {
    msd.iter()
        .zip(fourth_moment)
        .enumerate()
        .map(|(lag, (&m2, &m4))| {
            if lag == 0 {
                0.0
            } else {
                non_gaussian_parameter(m2, m4)
            }
        })
        .collect()
}
