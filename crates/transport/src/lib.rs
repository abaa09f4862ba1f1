//! Time-lagged displacement statistics.
//!
//! Mean squared displacement, fourth moment and the non-Gaussian parameter
//! of unwrapped particle trajectories, by direct summation or by FFT
//! correlation, plus ensemble averaging and the Einstein diffusion fit.

pub mod config;
pub mod diffusion;
pub mod direct;
pub mod ensemble;
pub mod fft;
pub mod moments;

pub use config::{DiffusionFit, MomentMethod, TransportConfig};
pub use diffusion::einstein_diffusion;
pub use direct::{compute_moments, direct_moment_series, moments_at_lag};
pub use ensemble::{compute_ensemble_moments, compute_particle_moments, EnsembleMoments, ParticleMoments};
pub use fft::{compute_moments_fft, CorrelationPlan};
pub use moments::{DisplacementMoments, MomentSeries};
pub use rtk_core::error::{KernelError, Result};
