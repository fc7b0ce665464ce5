//! Output geometry planning.
//!
//! Works out where the merged raster sits and how big it is: the bounding box
//! (explicit or the union of all inputs), the pixel size, the north-up
//! transform and the pixel dimensions. Dimensions are rounded up so the
//! output always covers the requested bounds; the east and south edges are
//! then pushed outward to the pixel grid.

use tracing::debug;

use crate::casting::f64_to_size;
use crate::error::{MergeError, MergeResult};
use crate::geometry::{Affine, BoundingBox};
use crate::raster::{RasterSource, RGBA_BAND_COUNT};

/// Requested output pixel size
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Same size along both axes
    Uniform(f64),
    /// Separate `x` and `y` sizes
    PerAxis { x: f64, y: f64 },
}

impl Resolution {
    /// Interpret a list of one or two values, as given on the command line.
    ///
    /// # Errors
    /// Returns [`MergeError::InvalidInput`] for an empty list or more than
    /// two values.
    pub fn from_values(values: &[f64]) -> MergeResult<Self> {
        match *values {
            [r] => Ok(Resolution::Uniform(r)),
            [x, y] => Ok(Resolution::PerAxis { x, y }),
            _ => Err(MergeError::invalid(format!(
                "Resolution takes one or two values, got {}",
                values.len()
            ))),
        }
    }

    /// `(x_res, y_res)`
    #[must_use]
    pub fn xy(&self) -> (f64, f64) {
        match *self {
            Resolution::Uniform(r) => (r, r),
            Resolution::PerAxis { x, y } => (x, y),
        }
    }
}

/// Geometry of the merged raster
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPlan {
    /// Pixel to geographic transform (north-up)
    pub transform: Affine,
    pub width: usize,
    pub height: usize,
    /// Bounds after snapping the east and south edges to the pixel grid
    pub bounds: BoundingBox,
    /// `(x_res, y_res)`
    pub resolution: (f64, f64),
}

/// Compute the output geometry for merging `sources`.
///
/// Every source must be a 4-band RGBA raster; this is checked whether or not
/// `bounds` is given.
///
/// # Errors
/// Returns [`MergeError::InvalidInput`] if there are no sources, any source
/// does not have exactly four bands, the resolution is not positive, or the
/// output would be empty.
pub fn plan_output<S: RasterSource>(
    sources: &[S],
    bounds: Option<BoundingBox>,
    resolution: Option<Resolution>,
) -> MergeResult<OutputPlan> {
    let Some(first) = sources.first() else {
        return Err(MergeError::invalid("No input rasters given"));
    };

    if sources.iter().any(|src| src.band_count() != RGBA_BAND_COUNT) {
        return Err(MergeError::invalid("Inputs must be 4-band RGBA rasters"));
    }

    let bounds = match bounds {
        Some(b) => b,
        None => sources
            .iter()
            .skip(1)
            .fold(first.bounds(), |acc, src| acc.union(&src.bounds())),
    };
    debug!(?bounds, "Output bounds");

    let (x_res, y_res) = resolution.map_or_else(|| first.resolution(), |r| r.xy());
    if !(x_res.is_finite() && y_res.is_finite() && x_res > 0.0 && y_res > 0.0) {
        return Err(MergeError::invalid(format!(
            "Resolution must be positive, got ({x_res}, {y_res})"
        )));
    }

    let transform = Affine::translation(bounds.west, bounds.north) * Affine::scale(x_res, -y_res);
    debug!(%transform, "Output transform");

    // Round up so the raster covers the bounds completely
    let width = f64_to_size((bounds.width() / x_res).ceil()).unwrap_or(0);
    let height = f64_to_size((bounds.height() / y_res).ceil()).unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MergeError::invalid(format!(
            "Output bounds {bounds:?} produce an empty raster at resolution ({x_res}, {y_res})"
        )));
    }

    #[allow(clippy::cast_precision_loss)]
    let (east, south) = transform.apply(width as f64, height as f64);
    let bounds = BoundingBox::new(bounds.west, south, east, bounds.north);
    debug!(width, height, adjusted = ?bounds, "Output size");

    Ok(OutputPlan {
        transform,
        width,
        height,
        bounds,
        resolution: (x_res, y_res),
    })
}
