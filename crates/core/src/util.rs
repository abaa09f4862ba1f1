//! Small vector helpers shared across modules.

use crate::error::{KernelError, Result};

/// Compute squared distance between two 3D points.
#[inline(always)]
pub fn distance_squared(p1: &[f64; 3], p2: &[f64; 3]) -> f64 {
    let dx = p1[0] - p2[0];
    let dy = p1[1] - p2[1];
    let dz = p1[2] - p2[2];
    dx * dx + dy * dy + dz * dz
}

/// Squared norm of a displacement vector.
#[inline(always)]
pub fn norm_squared(d: &[f64; 3]) -> f64 {
    d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
}

/// Component-wise `a - b`.
#[inline(always)]
pub fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Component-wise `a + b`.
#[inline(always)]
pub fn add(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Reject positions containing NaN or infinities.
pub fn ensure_finite(positions: &[[f64; 3]], what: &str) -> Result<()> {
    match positions
        .iter()
        .position(|p| !(p[0].is_finite() && p[1].is_finite() && p[2].is_finite()))
    {
        Some(idx) => Err(KernelError::invalid(format!(
            "{} contains a non-finite coordinate at index {}",
            what, idx
        ))),
        None => Ok(()),
    }
}
