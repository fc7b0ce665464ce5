//! Block compositing: first valid source wins.
//!
//! For one destination window the compositor walks the sources in caller
//! order, reads the matching source window and fills every pixel whose alpha
//! is still zero. Once every pixel of the window has a non-zero alpha the
//! remaining sources are skipped.

use tracing::trace;

use crate::error::MergeResult;
use crate::geometry::{pixel_index, Rounding, Window};
use crate::raster::{BlockBuffer, OutputProfile, RasterSource};

/// Counters gathered while compositing, reported by the merge summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositeStats {
    /// Blocks composited
    pub blocks: usize,
    /// Source windows read
    pub reads: usize,
    /// Blocks that were filled before the last source was consulted
    pub early_exits: usize,
}

/// Composites destination blocks from a stack of sources.
#[derive(Debug)]
pub struct BlockCompositor<'a> {
    profile: &'a OutputProfile,
    precision: u32,
    stats: CompositeStats,
}

impl<'a> BlockCompositor<'a> {
    /// `precision` is the number of decimals kept when mapping window
    /// corners to source pixels.
    #[must_use]
    pub fn new(profile: &'a OutputProfile, precision: u32) -> Self {
        Self {
            profile,
            precision,
            stats: CompositeStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> CompositeStats {
        self.stats
    }

    /// Build the `(band_count, rows, cols)` buffer for `window` of the output.
    ///
    /// # Errors
    /// Returns an error if a window corner cannot be mapped into a source or
    /// a source read fails.
    pub fn composite<S: RasterSource>(&mut self, window: &Window, sources: &mut [S]) -> MergeResult<BlockBuffer> {
        let (rows, cols) = (window.height(), window.width());
        let bounds = self.profile.window_bounds(window);
        let mut block = BlockBuffer::zeroed(self.profile.band_count, rows, cols);
        let target = window.pixel_count();
        self.stats.blocks += 1;

        for (i, src) in sources.iter_mut().enumerate() {
            let transform = src.transform();
            let start = pixel_index(bounds.west, bounds.north, &transform, Rounding::Nearest, self.precision)?;
            let stop = pixel_index(bounds.east, bounds.south, &transform, Rounding::Nearest, self.precision)?;
            let src_window = Window::from_corners(start, stop);

            let data = src.read_window(&src_window, rows, cols)?;
            self.stats.reads += 1;
            block.fill_empty_from(&data)?;

            let valid = block.valid_pixel_count();
            trace!(%window, source = i, %src_window, valid, "Composited source");

            if valid == target {
                if i + 1 < sources.len() {
                    self.stats.early_exits += 1;
                }
                break;
            }
        }
        Ok(block)
    }
}
