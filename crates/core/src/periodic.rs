//! Periodic simulation boxes and the minimum image convention.
//!
//! A box is stored as a cell matrix whose columns are the box vectors,
//! together with its inverse. Axis-aligned boxes keep a per-axis fast path
//! that applies `d - L * round(d / L)` directly; general triclinic cells wrap
//! in fractional coordinates.

use nalgebra::{Matrix3, Vector3};

use crate::error::{KernelError, Result};

/// Relative slack allowed when comparing a cutoff against the half-width limit,
/// so that `cutoff == L / 2` is accepted for cells whose widths are computed
/// through a cross product.
const CUTOFF_LIMIT_SLACK: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    /// Edge lengths of an axis-aligned box.
    Orthorhombic([f64; 3]),
    Triclinic,
}

/// Periodic domain: cubic, orthorhombic or triclinic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBox {
    shape: Shape,
    /// Columns are the box vectors a, b, c.
    cell: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl PeriodicBox {
    /// Cubic box with edge length `edge`.
    pub fn cubic(edge: f64) -> Result<Self> {
        Self::orthorhombic([edge, edge, edge])
    }

    /// Axis-aligned box with edge lengths `[lx, ly, lz]`.
    pub fn orthorhombic(lengths: [f64; 3]) -> Result<Self> {
        if lengths.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(KernelError::invalid(format!(
                "Box edge lengths must be positive and finite, got {:?}",
                lengths
            )));
        }
        let cell = Matrix3::from_diagonal(&Vector3::from(lengths));
        let inverse = Matrix3::from_diagonal(&Vector3::new(
            1.0 / lengths[0],
            1.0 / lengths[1],
            1.0 / lengths[2],
        ));
        Ok(Self {
            shape: Shape::Orthorhombic(lengths),
            cell,
            inverse,
        })
    }

    /// General cell from its three box vectors, given as rows `[a, b, c]`.
    ///
    /// A purely diagonal matrix is treated as an orthorhombic box.
    pub fn triclinic(vectors: [[f64; 3]; 3]) -> Result<Self> {
        if vectors.iter().flatten().any(|v| !v.is_finite()) {
            return Err(KernelError::invalid("Box matrix contains non-finite entries"));
        }
        let off_diagonal_zero = (0..3)
            .all(|i| (0..3).all(|j| i == j || vectors[i][j] == 0.0));
        if off_diagonal_zero {
            return Self::orthorhombic([vectors[0][0], vectors[1][1], vectors[2][2]]);
        }

        let cell = Matrix3::from_columns(&[
            Vector3::from(vectors[0]),
            Vector3::from(vectors[1]),
            Vector3::from(vectors[2]),
        ]);
        let det = cell.determinant();
        if !(det > 0.0) {
            return Err(KernelError::invalid(format!(
                "Box matrix must have positive volume, determinant is {}",
                det
            )));
        }
        let inverse = cell.try_inverse().ok_or(KernelError::SingularBox)?;
        Ok(Self {
            shape: Shape::Triclinic,
            cell,
            inverse,
        })
    }

    /// Whether the box is axis-aligned.
    pub fn is_orthorhombic(&self) -> bool {
        matches!(self.shape, Shape::Orthorhombic(_))
    }

    /// Box vectors as rows `[a, b, c]`.
    pub fn vectors(&self) -> [[f64; 3]; 3] {
        let mut rows = [[0.0; 3]; 3];
        for (k, row) in rows.iter_mut().enumerate() {
            let col = self.cell.column(k);
            *row = [col[0], col[1], col[2]];
        }
        rows
    }

    /// Cell volume.
    pub fn volume(&self) -> f64 {
        match self.shape {
            Shape::Orthorhombic(l) => l[0] * l[1] * l[2],
            Shape::Triclinic => self.cell.determinant(),
        }
    }

    /// Distance between opposite faces for each of the three box vectors.
    pub fn perpendicular_widths(&self) -> [f64; 3] {
        match self.shape {
            Shape::Orthorhombic(l) => l,
            Shape::Triclinic => {
                let a = self.cell.column(0).into_owned();
                let b = self.cell.column(1).into_owned();
                let c = self.cell.column(2).into_owned();
                let volume = self.volume();
                [
                    volume / b.cross(&c).norm(),
                    volume / c.cross(&a).norm(),
                    volume / a.cross(&b).norm(),
                ]
            }
        }
    }

    /// Largest cutoff for which the minimum image is guaranteed to be the
    /// shortest image: half the smallest perpendicular width.
    pub fn max_cutoff(&self) -> f64 {
        let w = self.perpendicular_widths();
        0.5 * w[0].min(w[1]).min(w[2])
    }

    /// Check that `cutoff` is positive, finite and within [`Self::max_cutoff`].
    pub fn validate_cutoff(&self, cutoff: f64) -> Result<()> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(KernelError::invalid(format!(
                "Cutoff must be positive and finite, got {}",
                cutoff
            )));
        }
        let limit = self.max_cutoff();
        if cutoff > limit * (1.0 + CUTOFF_LIMIT_SLACK) {
            return Err(KernelError::invalid(format!(
                "Cutoff {} exceeds half the smallest box width ({}); minimum image is not valid",
                cutoff, limit
            )));
        }
        Ok(())
    }

    /// Cartesian to fractional coordinates.
    #[inline]
    pub fn to_fractional(&self, p: &[f64; 3]) -> [f64; 3] {
        match self.shape {
            Shape::Orthorhombic(l) => [p[0] / l[0], p[1] / l[1], p[2] / l[2]],
            Shape::Triclinic => {
                let s = self.inverse * Vector3::from(*p);
                [s[0], s[1], s[2]]
            }
        }
    }

    /// Fractional to Cartesian coordinates.
    #[inline]
    pub fn to_cartesian(&self, s: &[f64; 3]) -> [f64; 3] {
        match self.shape {
            Shape::Orthorhombic(l) => [s[0] * l[0], s[1] * l[1], s[2] * l[2]],
            Shape::Triclinic => {
                let r = self.cell * Vector3::from(*s);
                [r[0], r[1], r[2]]
            }
        }
    }

    /// Cartesian translation for an integer image shift along the box vectors.
    #[inline]
    pub fn image_shift(&self, shift: [i32; 3]) -> [f64; 3] {
        self.to_cartesian(&[f64::from(shift[0]), f64::from(shift[1]), f64::from(shift[2])])
    }

    /// Minimum-image displacement `a - b`.
    #[inline]
    pub fn minimum_image(&self, a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
        let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
        match self.shape {
            Shape::Orthorhombic(l) => [
                d[0] - l[0] * (d[0] / l[0]).round(),
                d[1] - l[1] * (d[1] / l[1]).round(),
                d[2] - l[2] * (d[2] / l[2]).round(),
            ],
            Shape::Triclinic => {
                let s = self.inverse * Vector3::from(d);
                let wrapped = Vector3::new(s[0] - s[0].round(), s[1] - s[1].round(), s[2] - s[2].round());
                let r = self.cell * wrapped;
                [r[0], r[1], r[2]]
            }
        }
    }

    /// Squared minimum-image distance.
    #[inline]
    pub fn distance_squared(&self, a: &[f64; 3], b: &[f64; 3]) -> f64 {
        let d = self.minimum_image(a, b);
        d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
    }

    /// Minimum-image distance.
    #[inline]
    pub fn distance(&self, a: &[f64; 3], b: &[f64; 3]) -> f64 {
        self.distance_squared(a, b).sqrt()
    }

    /// Fractional coordinates of `p` folded into `[0, 1)`.
    #[inline]
    pub fn wrapped_fractional(&self, p: &[f64; 3]) -> [f64; 3] {
        let s = self.to_fractional(p);
        [fold_unit(s[0]), fold_unit(s[1]), fold_unit(s[2])]
    }

    /// Wrap a position into the primary cell.
    #[inline]
    pub fn wrap_position(&self, p: &[f64; 3]) -> [f64; 3] {
        self.to_cartesian(&self.wrapped_fractional(p))
    }
}

/// Fold a fractional coordinate into `[0, 1)`.
#[inline(always)]
fn fold_unit(s: f64) -> f64 {
    let wrapped = s - s.floor();
    // Rounding can land exactly on 1.0 for tiny negative inputs
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}
