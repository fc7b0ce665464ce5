//! Raster abstraction shared by sources, sinks and the compositor.
//!
//! The merge core only sees rasters through [`RasterSource`] (inputs) and
//! [`crate::merge::BlockSink`] (the destination). Pixel blocks travel as
//! [`BlockBuffer`]s: band-major `f32` buffers, which hold every `u8` and
//! `u16` sample exactly.

use crate::casting::isize_to_usize;
use crate::error::{MergeError, MergeResult};
use crate::geometry::{Affine, BoundingBox, Window};

/// Number of bands every input must have (red, green, blue, alpha)
pub const RGBA_BAND_COUNT: usize = 4;

/// Zero-based index of the alpha band, the sole validity signal
pub const ALPHA_BAND: usize = 3;

/// Nodata value of the output; a zero alpha marks an empty pixel
pub const OUTPUT_NODATA: f64 = 0.0;

/// Storage type of raster samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    U16,
}

impl SampleType {
    /// Bits per sample
    #[must_use]
    pub fn bits(self) -> u16 {
        match self {
            SampleType::U8 => 8,
            SampleType::U16 => 16,
        }
    }

    /// Bytes per sample
    #[must_use]
    pub fn bytes(self) -> usize {
        usize::from(self.bits() / 8)
    }

    /// Map TIFF BitsPerSample / SampleFormat to a supported sample type.
    ///
    /// `sample_format` 1 is unsigned integer (the TIFF default).
    #[must_use]
    pub fn from_tiff(bits: u16, sample_format: u16) -> Option<Self> {
        match (bits, sample_format) {
            (8, 1) => Some(SampleType::U8),
            (16, 1) => Some(SampleType::U16),
            _ => None,
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleType::U8 => write!(f, "uint8"),
            SampleType::U16 => write!(f, "uint16"),
        }
    }
}

/// Band-major `(bands, rows, cols)` pixel buffer for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockBuffer {
    bands: usize,
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl BlockBuffer {
    /// Buffer filled with the nodata value (0)
    #[must_use]
    pub fn zeroed(bands: usize, rows: usize, cols: usize) -> Self {
        Self {
            bands,
            rows,
            cols,
            data: vec![0.0; bands * rows * cols],
        }
    }

    /// Wrap band-major samples.
    ///
    /// # Errors
    /// Returns [`MergeError::InvalidInput`] if `data` does not hold exactly
    /// `bands * rows * cols` samples.
    pub fn from_vec(bands: usize, rows: usize, cols: usize, data: Vec<f32>) -> MergeResult<Self> {
        if data.len() != bands * rows * cols {
            return Err(MergeError::invalid(format!(
                "Buffer of {} samples does not match shape ({bands}, {rows}, {cols})",
                data.len()
            )));
        }
        Ok(Self { bands, rows, cols, data })
    }

    #[must_use]
    pub fn bands(&self) -> usize {
        self.bands
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(bands, rows, cols)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.bands, self.rows, self.cols)
    }

    /// Pixels per band
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Samples of one band, row-major
    #[must_use]
    pub fn band(&self, band: usize) -> &[f32] {
        let n = self.pixel_count();
        &self.data[band * n..(band + 1) * n]
    }

    pub fn band_mut(&mut self, band: usize) -> &mut [f32] {
        let n = self.pixel_count();
        &mut self.data[band * n..(band + 1) * n]
    }

    #[inline]
    #[must_use]
    pub fn get(&self, band: usize, row: usize, col: usize) -> f32 {
        self.data[(band * self.rows + row) * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, band: usize, row: usize, col: usize, value: f32) {
        self.data[(band * self.rows + row) * self.cols + col] = value;
    }

    /// Number of pixels whose alpha is non-zero
    #[must_use]
    pub fn valid_pixel_count(&self) -> usize {
        self.band(ALPHA_BAND).iter().filter(|&&a| a != 0.0).count()
    }

    /// True once every pixel has a non-zero alpha
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.valid_pixel_count() == self.pixel_count()
    }

    /// Copy every band of `other` into the pixels of `self` whose alpha is
    /// still zero; pixels already holding data are left untouched.
    ///
    /// Returns the number of pixels copied.
    ///
    /// # Errors
    /// Returns [`MergeError::InvalidInput`] if the shapes differ.
    pub fn fill_empty_from(&mut self, other: &BlockBuffer) -> MergeResult<usize> {
        if self.shape() != other.shape() {
            return Err(MergeError::invalid(format!(
                "Block shape {:?} does not match {:?}",
                other.shape(),
                self.shape()
            )));
        }
        let n = self.pixel_count();
        let empty: Vec<usize> = (0..n)
            .filter(|&i| self.data[ALPHA_BAND * n + i] == 0.0)
            .collect();

        for band in 0..self.bands {
            let offset = band * n;
            for &i in &empty {
                self.data[offset + i] = other.data[offset + i];
            }
        }
        Ok(empty.len())
    }

    /// Samples in pixel-interleaved order (`RGBARGBA...`), row-major
    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        let n = self.pixel_count();
        (0..n).flat_map(move |i| (0..self.bands).map(move |b| self.data[b * n + i]))
    }
}

/// An opened input raster.
///
/// Implementations own whatever handle they read from; the merge borrows
/// them mutably for its duration and only ever reads.
pub trait RasterSource {
    /// Raster width in pixels
    fn width(&self) -> usize;

    /// Raster height in pixels
    fn height(&self) -> usize;

    /// Pixel to geographic transform
    fn transform(&self) -> Affine;

    /// Number of bands
    fn band_count(&self) -> usize;

    /// Storage type of the samples
    fn sample_type(&self) -> SampleType;

    /// Declared nodata value, if any. Merging ignores it in favour of alpha.
    fn nodata(&self) -> Option<f64> {
        None
    }

    /// EPSG code of the coordinate reference system, if known
    fn crs(&self) -> Option<i32> {
        None
    }

    /// Geographic extent
    fn bounds(&self) -> BoundingBox {
        #[allow(clippy::cast_precision_loss)]
        let far = (self.width() as f64, self.height() as f64);
        let t = self.transform();
        BoundingBox::from_corners(t.apply(0.0, 0.0), t.apply(far.0, far.1))
    }

    /// Pixel size `(x_res, y_res)`, both positive
    fn resolution(&self) -> (f64, f64) {
        self.transform().resolution()
    }

    /// Boundless read of `window` into a `(band_count, rows, cols)` buffer.
    ///
    /// Pixels outside the raster read as zero. When the window and output
    /// shapes differ the window is resampled with nearest neighbour.
    ///
    /// # Errors
    /// Returns [`MergeError`] if the underlying data cannot be read.
    fn read_window(&mut self, window: &Window, rows: usize, cols: usize) -> MergeResult<BlockBuffer>;
}

/// Metadata of the destination raster, fixed for the whole merge.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputProfile {
    pub transform: Affine,
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub sample_type: SampleType,
    /// Always [`OUTPUT_NODATA`]
    pub nodata: f64,
    /// EPSG code used to label the output
    pub crs: Option<i32>,
}

impl OutputProfile {
    /// Geographic bounds of a destination window
    #[must_use]
    pub fn window_bounds(&self, window: &Window) -> BoundingBox {
        window.bounds(&self.transform)
    }
}

/// Nearest-neighbour lookup table from output rows/cols of a boundless read
/// to source rows/cols (`None` outside the source).
#[derive(Debug, Clone)]
pub(crate) struct NearestSampler {
    pub rows: Vec<Option<usize>>,
    pub cols: Vec<Option<usize>>,
}

impl NearestSampler {
    pub fn new(window: &Window, out_rows: usize, out_cols: usize, src_height: usize, src_width: usize) -> Self {
        Self {
            rows: Self::axis(window.row_start, window.height(), out_rows, src_height),
            cols: Self::axis(window.col_start, window.width(), out_cols, src_width),
        }
    }

    /// Output index `i` samples the window pixel whose centre is nearest to
    /// the centre of `i`: `start + floor((i + 0.5) * span / out)`.
    fn axis(start: isize, span: usize, out: usize, limit: usize) -> Vec<Option<usize>> {
        if span == 0 {
            return vec![None; out];
        }
        (0..out)
            .map(|i| {
                let offset = ((2 * i + 1) * span) / (2 * out);
                let src = start.checked_add(isize::try_from(offset).ok()?)?;
                isize_to_usize(src).filter(|&s| s < limit)
            })
            .collect()
    }

    /// True if no output pixel falls inside the source
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Option::is_none) || self.cols.iter().all(Option::is_none)
    }
}
