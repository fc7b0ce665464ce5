//! Input rasters backed by files.
//!
//! # Example
//!
//! ```rust,no_run
//! use merge_rgba::source::GeoTiffSource;
//! use merge_rgba::RasterSource;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = GeoTiffSource::open("tile.tif")?.with_cache_capacity(16 * 1024 * 1024);
//!     println!("{}x{} with {} bands", source.width(), source.height(), source.band_count());
//!     Ok(())
//! }
//! ```

pub mod geotiff;

pub use geotiff::GeoTiffSource;

use std::path::Path;

use crate::error::MergeResult;

/// Open every path in order as a [`GeoTiffSource`].
///
/// # Errors
/// Returns the first error from [`GeoTiffSource::open`].
pub fn open_all<P: AsRef<Path>>(paths: &[P]) -> MergeResult<Vec<GeoTiffSource>> {
    paths.iter().map(|path| GeoTiffSource::open(path)).collect()
}
