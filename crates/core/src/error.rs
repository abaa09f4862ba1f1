//! Error types shared by the kernel crates.

use thiserror::Error;

/// Errors raised at the boundary of the analysis kernels.
///
/// Every variant is detected before any computation starts; kernels never
/// return partial results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Caller-supplied data or parameters violate a precondition.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cell-list sizing produced cells narrower than the cutoff, so the
    /// 3x3x3 scan could miss neighbors.
    #[error("Cell width {cell_width} along axis {axis} is below the cutoff {cutoff}")]
    CellTooSmall {
        axis: usize,
        cell_width: f64,
        cutoff: f64,
    },

    /// The box matrix has no inverse.
    #[error("Box matrix is singular")]
    SingularBox,
}

impl KernelError {
    /// Creates an invalid-input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        KernelError::InvalidInput(message.into())
    }
}

/// Result alias used throughout the kernels.
pub type Result<T> = std::result::Result<T, KernelError>;
