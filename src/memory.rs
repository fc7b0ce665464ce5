//! In-memory rasters.
//!
//! [`MemoryRaster`] is a [`RasterSource`] over pixels already held in memory
//! and [`MemorySink`] is a [`BlockSink`] that assembles the merged output into
//! a [`MemoryRaster`] using a fixed block shape, which makes the block order
//! reproducible regardless of any file driver.

use crate::error::{MergeError, MergeResult};
use crate::geometry::{block_windows, Affine, Window};
use crate::merge::BlockSink;
use crate::raster::{BlockBuffer, NearestSampler, OutputProfile, RasterSource, SampleType};

/// Raster held entirely in memory, band-major.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    transform: Affine,
    sample_type: SampleType,
    crs: Option<i32>,
    pixels: BlockBuffer,
    reads: usize,
}

impl MemoryRaster {
    /// Create an all-zero raster
    #[must_use]
    pub fn new(bands: usize, height: usize, width: usize, transform: Affine) -> Self {
        Self {
            transform,
            sample_type: SampleType::U8,
            crs: None,
            pixels: BlockBuffer::zeroed(bands, height, width),
            reads: 0,
        }
    }

    /// Wrap an existing band-major buffer
    #[must_use]
    pub fn from_buffer(pixels: BlockBuffer, transform: Affine) -> Self {
        Self {
            transform,
            sample_type: SampleType::U8,
            crs: None,
            pixels,
            reads: 0,
        }
    }

    #[must_use]
    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    #[must_use]
    pub fn with_crs(mut self, epsg: i32) -> Self {
        self.crs = Some(epsg);
        self
    }

    /// Fill `band` over rows `rows` and columns `cols` with `value`
    pub fn fill(&mut self, band: usize, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>, value: f32) {
        for row in rows {
            for col in cols.clone() {
                self.pixels.set(band, row, col, value);
            }
        }
    }

    /// Sample at `(band, row, col)`
    #[must_use]
    pub fn get(&self, band: usize, row: usize, col: usize) -> f32 {
        self.pixels.get(band, row, col)
    }

    /// One band, row-major
    #[must_use]
    pub fn band(&self, band: usize) -> &[f32] {
        self.pixels.band(band)
    }

    /// Number of `read_window` calls served so far
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads
    }

    #[must_use]
    pub fn pixels(&self) -> &BlockBuffer {
        &self.pixels
    }
}

impl RasterSource for MemoryRaster {
    fn width(&self) -> usize {
        self.pixels.cols()
    }

    fn height(&self) -> usize {
        self.pixels.rows()
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn band_count(&self) -> usize {
        self.pixels.bands()
    }

    fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    fn crs(&self) -> Option<i32> {
        self.crs
    }

    fn read_window(&mut self, window: &Window, rows: usize, cols: usize) -> MergeResult<BlockBuffer> {
        self.reads += 1;
        let bands = self.pixels.bands();
        let mut out = BlockBuffer::zeroed(bands, rows, cols);
        let sampler = NearestSampler::new(window, rows, cols, self.height(), self.width());

        for (r, src_row) in sampler.rows.iter().enumerate() {
            let Some(src_row) = *src_row else { continue };
            for (c, src_col) in sampler.cols.iter().enumerate() {
                let Some(src_col) = *src_col else { continue };
                for band in 0..bands {
                    out.set(band, r, c, self.pixels.get(band, src_row, src_col));
                }
            }
        }
        Ok(out)
    }
}

/// Destination assembled in memory with a pinned block shape.
#[derive(Debug)]
pub struct MemorySink {
    profile: OutputProfile,
    block_shape: (usize, usize),
    raster: MemoryRaster,
    written: Vec<Window>,
}

impl MemorySink {
    /// Create a sink for `profile`, tiled in blocks of `(rows, cols)`
    #[must_use]
    pub fn new(profile: &OutputProfile, block_shape: (usize, usize)) -> Self {
        let mut raster = MemoryRaster::new(profile.band_count, profile.height, profile.width, profile.transform)
            .with_sample_type(profile.sample_type);
        raster.crs = profile.crs;
        Self {
            profile: profile.clone(),
            block_shape,
            raster,
            written: Vec::new(),
        }
    }

    /// Windows written so far, in write order
    #[must_use]
    pub fn written(&self) -> &[Window] {
        &self.written
    }

    /// The assembled output raster
    #[must_use]
    pub fn into_raster(self) -> MemoryRaster {
        self.raster
    }
}

impl BlockSink for MemorySink {
    fn profile(&self) -> &OutputProfile {
        &self.profile
    }

    fn block_windows(&self) -> Vec<Window> {
        block_windows(self.profile.height, self.profile.width, self.block_shape.0, self.block_shape.1)
    }

    fn write_blocks<I>(&mut self, blocks: I) -> MergeResult<()>
    where
        I: IntoIterator<Item = MergeResult<(Window, BlockBuffer)>>,
    {
        for block in blocks {
            let (window, buffer) = block?;
            let expected = (self.profile.band_count, window.height(), window.width());
            if buffer.shape() != expected {
                return Err(MergeError::invalid(format!(
                    "Block {window} has shape {:?}, expected {expected:?}",
                    buffer.shape()
                )));
            }
            let (Ok(row0), Ok(col0)) = (usize::try_from(window.row_start), usize::try_from(window.col_start)) else {
                return Err(MergeError::invalid(format!("Block {window} lies outside the output")));
            };
            if row0 + window.height() > self.profile.height || col0 + window.width() > self.profile.width {
                return Err(MergeError::invalid(format!("Block {window} lies outside the output")));
            }

            for band in 0..buffer.bands() {
                for row in 0..buffer.rows() {
                    for col in 0..buffer.cols() {
                        self.raster.pixels.set(band, row0 + row, col0 + col, buffer.get(band, row, col));
                    }
                }
            }
            self.written.push(window);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> Affine {
        Affine::translation(-114.0, 46.0) * Affine::scale(0.2, -0.2)
    }

    #[test]
    fn test_metadata() {
        let raster = MemoryRaster::new(4, 10, 8, transform()).with_crs(4326);
        assert_eq!(raster.width(), 8);
        assert_eq!(raster.height(), 10);
        assert_eq!(raster.band_count(), 4);
        assert_eq!(raster.crs(), Some(4326));
        assert_eq!(raster.sample_type(), SampleType::U8);
        assert_eq!(raster.resolution(), (0.2, 0.2));

        let b = raster.bounds();
        assert!((b.west - (-114.0)).abs() < 1e-12);
        assert!((b.east - (-112.4)).abs() < 1e-12);
        assert!((b.south - 44.0).abs() < 1e-12);
        assert!((b.north - 46.0).abs() < 1e-12);
    }

    #[test]
    fn test_boundless_read_pads_with_zero() {
        let mut raster = MemoryRaster::new(4, 4, 4, transform());
        raster.fill(0, 0..4, 0..4, 9.0);
        raster.fill(3, 0..4, 0..4, 255.0);

        let block = raster.read_window(&Window::new((-1, 3), (2, 6)), 4, 4).unwrap();
        assert_eq!(block.shape(), (4, 4, 4));
        // Row -1 and columns 4..6 are outside
        assert_eq!(block.get(0, 0, 0), 0.0);
        assert_eq!(block.get(0, 1, 0), 9.0);
        assert_eq!(block.get(0, 1, 1), 9.0);
        assert_eq!(block.get(0, 1, 2), 0.0);
        assert_eq!(block.valid_pixel_count(), 3 * 2);
        assert_eq!(raster.reads(), 1);
    }

    #[test]
    fn test_sink_assembles_blocks() {
        let profile = OutputProfile {
            transform: transform(),
            width: 5,
            height: 3,
            band_count: 4,
            sample_type: SampleType::U8,
            nodata: 0.0,
            crs: None,
        };
        let mut sink = MemorySink::new(&profile, (2, 2));
        let windows = sink.block_windows();
        assert_eq!(windows.len(), 2 * 3);

        let blocks = windows.iter().map(|w| {
            let mut buffer = BlockBuffer::zeroed(4, w.height(), w.width());
            buffer.band_mut(0).fill(1.0);
            Ok((*w, buffer))
        });
        sink.write_blocks(blocks).unwrap();
        assert_eq!(sink.written(), windows.as_slice());

        let raster = sink.into_raster();
        assert!(raster.band(0).iter().all(|&v| v == 1.0));
        assert!(raster.band(3).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sink_rejects_misshapen_block() {
        let profile = OutputProfile {
            transform: transform(),
            width: 4,
            height: 4,
            band_count: 4,
            sample_type: SampleType::U8,
            nodata: 0.0,
            crs: None,
        };
        let mut sink = MemorySink::new(&profile, (4, 4));
        let window = Window::new((0, 4), (0, 4));
        let result = sink.write_blocks([Ok((window, BlockBuffer::zeroed(4, 2, 2)))]);
        assert!(result.is_err());
    }
}
