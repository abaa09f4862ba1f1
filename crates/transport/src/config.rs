//! Parameters for the moment kernels and the diffusion fit.

use rtk_core::error::{KernelError, Result};

/// How per-particle moment series are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MomentMethod {
    /// O(N²) double loop.
    Direct,
    /// O(N log N) correlation by FFT.
    Fft,
    /// FFT once the trajectory reaches `fft_threshold` frames, direct below.
    /// Both agree to about 1e-10 relative, so only the cost differs.
    #[default]
    Auto,
}

/// Configuration of the per-particle moment calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Kernel selection. Default: Auto.
    pub method: MomentMethod,
    /// Frame count at which Auto switches to the FFT kernel. Default: 64.
    pub fft_threshold: usize,
    /// Largest lag kept in the output. Default: None (all lags).
    pub max_lag: Option<usize>,
    /// Whether to compute the fourth moment. Default: true.
    pub compute_fourth_moment: bool,
    /// Time between frames, used for the time axis. Default: 1.0.
    pub timestep: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            method: MomentMethod::Auto,
            fft_threshold: 64,
            max_lag: None,
            compute_fourth_moment: true,
            timestep: 1.0,
        }
    }
}

impl TransportConfig {
    /// Kernel to use for a trajectory of `n_frames` frames.
    pub fn resolve_method(&self, n_frames: usize) -> MomentMethod {
        match self.method {
            MomentMethod::Auto if n_frames >= self.fft_threshold => MomentMethod::Fft,
            MomentMethod::Auto => MomentMethod::Direct,
            other => other,
        }
    }

    /// Number of lags reported for a trajectory of `n_frames` frames.
    pub fn lag_count(&self, n_frames: usize) -> Result<usize> {
        let available = n_frames.saturating_sub(1);
        match self.max_lag {
            None => Ok(available),
            Some(0) => Err(KernelError::invalid("max_lag must be at least 1")),
            Some(max_lag) => Ok(max_lag.min(available)),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(KernelError::invalid(format!(
                "Timestep must be positive and finite, got {}",
                self.timestep
            )));
        }
        if self.max_lag == Some(0) {
            return Err(KernelError::invalid("max_lag must be at least 1"));
        }
        Ok(())
    }
}

/// Window of lags used for the Einstein fit, as fractions of the longest
/// reported lag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionFit {
    /// Start of the fit window. Default: 0.1 (skip the ballistic regime).
    pub start_fraction: f64,
    /// End of the fit window. Default: 0.5 (skip poorly averaged long lags).
    pub end_fraction: f64,
}

impl Default for DiffusionFit {
    fn default() -> Self {
        Self {
            start_fraction: 0.1,
            end_fraction: 0.5,
        }
    }
}

impl DiffusionFit {
    pub(crate) fn validate(&self) -> Result<()> {
        let ok = self.start_fraction.is_finite()
            && self.end_fraction.is_finite()
            && (0.0..1.0).contains(&self.start_fraction)
            && self.end_fraction > self.start_fraction
            && self.end_fraction <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(KernelError::invalid(format!(
                "Fit window must satisfy 0 <= start < end <= 1, got [{}, {}]",
                self.start_fraction, self.end_fraction
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_policy() {
        let config = TransportConfig::default();
        assert_eq!(config.resolve_method(10), MomentMethod::Direct);
        assert_eq!(config.resolve_method(64), MomentMethod::Fft);

        let forced = TransportConfig {
            method: MomentMethod::Direct,
            ..Default::default()
        };
        assert_eq!(forced.resolve_method(10_000), MomentMethod::Direct);
    }

    #[test]
    fn test_lag_count() {
        let mut config = TransportConfig::default();
        assert_eq!(config.lag_count(10).unwrap(), 9);
        config.max_lag = Some(4);
        assert_eq!(config.lag_count(10).unwrap(), 4);
        config.max_lag = Some(40);
        assert_eq!(config.lag_count(10).unwrap(), 9);
        config.max_lag = Some(0);
        assert!(config.lag_count(10).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(TransportConfig::default().validate().is_ok());
        let bad = TransportConfig {
            timestep: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        assert!(DiffusionFit::default().validate().is_ok());
        let inverted = DiffusionFit {
            start_fraction: 0.6,
            end_fraction: 0.2,
        };
        assert!(inverted.validate().is_err());
    }
}
