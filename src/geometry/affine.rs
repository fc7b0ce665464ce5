//! Affine transforms between pixel and geographic coordinates.
//!
//! A transform maps pixel `(col, row)` to geographic `(x, y)`:
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! North-up rasters have `b = d = 0` and a negative `e`.

use std::ops::Mul;

/// Six-parameter affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    #[must_use]
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Pure translation to `(x, y)`
    #[must_use]
    pub fn translation(x: f64, y: f64) -> Self {
        Self::new(1.0, 0.0, x, 0.0, 1.0, y)
    }

    /// Pure scaling by `(sx, sy)`
    #[must_use]
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    /// Map a pixel coordinate to a geographic coordinate
    #[inline]
    #[must_use]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Inverse transform (geographic to pixel), or `None` if degenerate
    #[must_use]
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let idet = 1.0 / det;
        let ra = self.e * idet;
        let rb = -self.b * idet;
        let rd = -self.d * idet;
        let re = self.a * idet;
        Some(Affine::new(
            ra,
            rb,
            -self.c * ra - self.f * rb,
            rd,
            re,
            -self.c * rd - self.f * re,
        ))
    }

    /// Pixel size along each axis, always positive
    #[must_use]
    pub fn resolution(&self) -> (f64, f64) {
        if self.is_rectilinear() {
            return (self.a.abs(), self.e.abs());
        }
        (
            (self.a * self.a + self.d * self.d).sqrt(),
            (self.b * self.b + self.e * self.e).sqrt(),
        )
    }

    /// True if the transform has no rotation or shear
    #[must_use]
    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }
}

/// `lhs * rhs` applies `rhs` first, then `lhs`.
impl Mul for Affine {
    type Output = Affine;

    fn mul(self, rhs: Affine) -> Affine {
        Affine::new(
            self.a * rhs.a + self.b * rhs.d,
            self.a * rhs.b + self.b * rhs.e,
            self.a * rhs.c + self.b * rhs.f + self.c,
            self.d * rhs.a + self.e * rhs.d,
            self.d * rhs.b + self.e * rhs.e,
            self.d * rhs.c + self.e * rhs.f + self.f,
        )
    }
}

impl std::fmt::Display for Affine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "|{:.6}, {:.6}, {:.6}|\n|{:.6}, {:.6}, {:.6}|",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn north_up() -> Affine {
        Affine::translation(-114.0, 46.0) * Affine::scale(0.2, -0.2)
    }

    #[test]
    fn test_translate_then_scale() {
        let t = north_up();
        assert_eq!(t, Affine::new(0.2, 0.0, -114.0, 0.0, -0.2, 46.0));

        let (x, y) = t.apply(10.0, 10.0);
        assert!((x - (-112.0)).abs() < EPS);
        assert!((y - 44.0).abs() < EPS);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = north_up();
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(3.0, 7.0);
        let (col, row) = inv.apply(x, y);
        assert!((col - 3.0).abs() < 1e-9);
        assert!((row - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_of_rotated() {
        let t = Affine::new(0.5, 0.1, 100.0, 0.2, -0.5, 50.0);
        let inv = t.inverse().unwrap();
        let ident = t * inv;
        assert!((ident.a - 1.0).abs() < EPS);
        assert!(ident.b.abs() < EPS);
        assert!(ident.c.abs() < 1e-9);
        assert!(ident.d.abs() < EPS);
        assert!((ident.e - 1.0).abs() < EPS);
        assert!(ident.f.abs() < 1e-9);
    }

    #[test]
    fn test_singular_has_no_inverse() {
        assert!(Affine::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_resolution() {
        let t = north_up();
        assert_eq!(t.resolution(), (0.2, 0.2));
        assert!(t.is_rectilinear());

        let rotated = Affine::new(3.0, 4.0, 0.0, 4.0, -3.0, 0.0);
        assert!(!rotated.is_rectilinear());
        assert_eq!(rotated.resolution(), (5.0, 5.0));
    }
}
