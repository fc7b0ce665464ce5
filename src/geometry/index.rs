//! Geographic coordinate to pixel index mapping.
//!
//! Block windows are mapped into each source independently, so a corner that
//! falls a hair off an integer pixel boundary (e.g. `2.9999999999999996`
//! instead of `3.0`) must not flip to a different index from one block to the
//! next. The inverted coordinate is therefore rounded to a fixed number of
//! decimal places before the final rounding policy turns it into an index.

use crate::casting::f64_to_isize;
use crate::error::{MergeError, MergeResult};

use super::Affine;

/// Policy for turning a fractional pixel coordinate into an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rounding {
    /// Round down (the pixel containing the coordinate)
    Floor,
    /// Round up
    Ceil,
    /// Round to the nearest integer, halves away from zero
    #[default]
    Nearest,
}

impl Rounding {
    #[inline]
    #[must_use]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Rounding::Floor => value.floor(),
            Rounding::Ceil => value.ceil(),
            Rounding::Nearest => value.round(),
        }
    }
}

/// Integer pixel position; may be negative or beyond the raster extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelIndex {
    pub col: isize,
    pub row: isize,
}

/// Round `value` to `precision` decimal places.
#[inline]
#[must_use]
pub fn round_to_precision(value: f64, precision: u32) -> f64 {
    let Ok(exp) = i32::try_from(precision) else {
        return value;
    };
    let scale = 10f64.powi(exp);
    let scaled = value * scale;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / scale
}

/// Map a geographic coordinate to the pixel index under `transform`.
///
/// # Errors
/// Returns [`MergeError::InvalidInput`] if the transform cannot be inverted
/// or the coordinate maps outside the representable index range.
pub fn pixel_index(
    x: f64,
    y: f64,
    transform: &Affine,
    rounding: Rounding,
    precision: u32,
) -> MergeResult<PixelIndex> {
    let inverse = transform
        .inverse()
        .ok_or_else(|| MergeError::invalid(format!("Transform is not invertible: {transform:?}")))?;

    let (col, row) = inverse.apply(x, y);
    let col = rounding.apply(round_to_precision(col, precision));
    let row = rounding.apply(round_to_precision(row, precision));

    match (f64_to_isize(col), f64_to_isize(row)) {
        (Some(col), Some(row)) => Ok(PixelIndex { col, row }),
        _ => Err(MergeError::invalid(format!(
            "Coordinate ({x}, {y}) does not map to a pixel index"
        ))),
    }
}
