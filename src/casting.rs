//! Checked numeric conversions between pixel-space and geographic values.
//!
//! # Design Decisions
//!
//! ## Raster Dimensions (`usize` ↔ `f64`)
//! `usize` to `f64` conversions are allowed without checks: `f64` represents
//! every integer up to 2^53 exactly and no raster dimension comes close.
//!
//! ## Pixel Indices (`f64` → `isize`)
//! Pixel indices computed from geographic coordinates may be negative (a
//! source window starting left of or above the source) and may be NaN or
//! infinite when the transform is degenerate, so they are checked.
//!
//! ## TIFF Dimensions (`usize` ↔ `u32`)
//! The TIFF codec works in `u32`; a raster wider than `u32::MAX` cannot be
//! encoded, so these conversions return an error.

use std::convert::TryFrom;

/// Convert a `usize` to `u32`, failing on 64-bit overflow.
///
/// # Errors
/// Returns an error string if the value exceeds `u32::MAX`.
#[inline]
pub fn usize_to_u32(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("Value {value} exceeds u32 maximum"))
}

/// Convert an integral `f64` to `isize`, returning `None` for NaN, infinity
/// or values outside the `isize` range.
///
/// The value is truncated toward zero; callers round first.
#[inline]
#[must_use]
pub fn f64_to_isize(value: f64) -> Option<isize> {
    if !value.is_finite() {
        return None;
    }
    // Allow casts: range checked against the isize limits just below
    #[allow(clippy::cast_precision_loss)]
    let (min, max) = (isize::MIN as f64, isize::MAX as f64);
    if value < min || value >= max {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let index = value as isize;
    Some(index)
}

/// Convert a non-negative integral `f64` to a size, returning `None` for
/// NaN, infinity or negative values.
#[inline]
#[must_use]
pub fn f64_to_size(value: f64) -> Option<usize> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let max = usize::MAX as f64;
    if value >= max {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let size = value as usize;
    Some(size)
}

/// Convert a signed offset to unsigned, returning `None` if negative.
#[inline]
#[must_use]
pub fn isize_to_usize(value: isize) -> Option<usize> {
    usize::try_from(value).ok()
}

/// Convert a size to a signed offset, saturating at `isize::MAX`.
#[inline]
#[must_use]
pub fn usize_to_isize(value: usize) -> isize {
    isize::try_from(value).unwrap_or(isize::MAX)
}
