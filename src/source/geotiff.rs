//! GeoTIFF input rasters.
//!
//! Supports strip and tile organised files with chunky (pixel interleaved)
//! layout and unsigned 8 or 16 bit samples. Chunks are decoded on demand and
//! kept in a per-source [`ChunkCache`] in their stored sample type. Each read
//! evicts the chunks above it, so a top-to-bottom merge only keeps the chunk
//! rows it is currently working through.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::{debug, trace};

use crate::error::{MergeError, MergeResult};
use crate::geometry::projection::{epsg_from_geokeys, pixel_is_point};
use crate::geometry::{Affine, Window};
use crate::raster::{BlockBuffer, NearestSampler, RasterSource, SampleType};
use crate::tile_cache::{ChunkCache, ChunkData, DEFAULT_CACHE_CAPACITY_BYTES};

const PLANAR_CONFIG_SEPARATE: u16 = 2;
const SAMPLE_FORMAT_UINT: u16 = 1;

/// Georeferencing and layout read from the first image directory
#[derive(Debug, Clone, PartialEq)]
struct GeoTiffMetadata {
    width: usize,
    height: usize,
    bands: usize,
    sample_type: SampleType,
    transform: Affine,
    crs: Option<i32>,
    nodata: Option<f64>,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
}

/// A GeoTIFF opened for windowed reads.
pub struct GeoTiffSource {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    meta: GeoTiffMetadata,
    cache: ChunkCache,
}

impl GeoTiffSource {
    /// Open `path` and read its metadata.
    ///
    /// # Errors
    /// Returns [`MergeError::Io`] or [`MergeError::Tiff`] if the file cannot
    /// be read, and [`MergeError::InvalidInput`] if it has no georeferencing,
    /// stores bands in separate planes, or uses a sample type other than
    /// unsigned 8 or 16 bit integers.
    pub fn open(path: impl AsRef<Path>) -> MergeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?;
        let meta = read_metadata(&mut decoder, &path)?;

        debug!(
            path = %path.display(),
            width = meta.width,
            height = meta.height,
            bands = meta.bands,
            sample_type = %meta.sample_type,
            crs = ?meta.crs,
            chunk = ?(meta.chunk_width, meta.chunk_height),
            "Opened GeoTIFF"
        );

        Ok(Self {
            path,
            decoder,
            meta,
            cache: ChunkCache::new(DEFAULT_CACHE_CAPACITY_BYTES),
        })
    }

    /// Replace the chunk cache with one holding at most `bytes`
    #[must_use]
    pub fn with_cache_capacity(mut self, bytes: usize) -> Self {
        self.cache = ChunkCache::new(bytes);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// Decoded samples of chunk `index`, pixel interleaved, and the width of
    /// its rows in pixels.
    fn chunk(&mut self, index: u32) -> MergeResult<(Arc<ChunkData>, usize)> {
        let (data_width, data_height) = self.decoder.chunk_data_dimensions(index);
        let stride = usize::try_from(data_width).unwrap_or(0);

        if let Some(data) = self.cache.get(index) {
            return Ok((data, stride));
        }

        let samples = match self.decoder.read_chunk(index)? {
            DecodingResult::U8(v) => ChunkData::U8(v),
            DecodingResult::U16(v) => ChunkData::U16(v),
            _ => {
                return Err(MergeError::invalid(format!(
                    "{}: unexpected sample type in chunk {index}",
                    self.path.display()
                )))
            }
        };

        let rows = usize::try_from(data_height).unwrap_or(0);
        if samples.len() < stride * rows * self.meta.bands {
            return Err(MergeError::Tiff(format!(
                "{}: chunk {index} holds {} samples, expected {}",
                self.path.display(),
                samples.len(),
                stride * rows * self.meta.bands
            )));
        }
        trace!(index, bytes = samples.size_bytes(), "Decoded chunk");

        let data = Arc::new(samples);
        self.cache.insert(index, Arc::clone(&data));
        Ok((data, stride))
    }
}

impl std::fmt::Debug for GeoTiffSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffSource")
            .field("path", &self.path)
            .field("meta", &self.meta)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl RasterSource for GeoTiffSource {
    fn width(&self) -> usize {
        self.meta.width
    }

    fn height(&self) -> usize {
        self.meta.height
    }

    fn transform(&self) -> Affine {
        self.meta.transform
    }

    fn band_count(&self) -> usize {
        self.meta.bands
    }

    fn sample_type(&self) -> SampleType {
        self.meta.sample_type
    }

    fn nodata(&self) -> Option<f64> {
        self.meta.nodata
    }

    fn crs(&self) -> Option<i32> {
        self.meta.crs
    }

    fn read_window(&mut self, window: &Window, rows: usize, cols: usize) -> MergeResult<BlockBuffer> {
        let bands = self.meta.bands;
        let mut out = BlockBuffer::zeroed(bands, rows, cols);
        let sampler = NearestSampler::new(window, rows, cols, self.meta.height, self.meta.width);
        if sampler.is_empty() {
            return Ok(out);
        }

        let (chunk_w, chunk_h) = (self.meta.chunk_width, self.meta.chunk_height);
        if let Some(first_row) = sampler.rows.iter().flatten().min() {
            let first_chunk = (first_row / chunk_h) * self.meta.chunks_across;
            let evicted = self.cache.evict_before(u32::try_from(first_chunk).unwrap_or(u32::MAX));
            if evicted > 0 {
                trace!(evicted, first_chunk, "Evicted chunks above window");
            }
        }
        let mut current: Option<(u32, Arc<ChunkData>, usize)> = None;

        for (r, src_row) in sampler.rows.iter().enumerate() {
            let Some(src_row) = *src_row else { continue };
            for (c, src_col) in sampler.cols.iter().enumerate() {
                let Some(src_col) = *src_col else { continue };

                let index = (src_row / chunk_h) * self.meta.chunks_across + src_col / chunk_w;
                let index = u32::try_from(index)
                    .map_err(|_| MergeError::invalid(format!("Chunk index {index} out of range")))?;
                let (data, stride) = match &current {
                    Some((cached, data, stride)) if *cached == index => (Arc::clone(data), *stride),
                    _ => {
                        let (data, stride) = self.chunk(index)?;
                        current = Some((index, Arc::clone(&data), stride));
                        (data, stride)
                    }
                };

                let offset = ((src_row % chunk_h) * stride + src_col % chunk_w) * bands;
                for band in 0..bands {
                    out.set(band, r, c, data.sample(offset + band).unwrap_or(0.0));
                }
            }
        }
        Ok(out)
    }
}

fn read_metadata(decoder: &mut Decoder<BufReader<File>>, path: &Path) -> MergeResult<GeoTiffMetadata> {
    let (width, height) = decoder.dimensions()?;
    let bands = decoder.find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?.unwrap_or(1);
    let bits = decoder
        .find_tag_unsigned_vec::<u16>(Tag::BitsPerSample)?
        .and_then(|v| v.first().copied())
        .unwrap_or(1);
    let format = decoder
        .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)?
        .and_then(|v| v.first().copied())
        .unwrap_or(SAMPLE_FORMAT_UINT);

    let Some(sample_type) = SampleType::from_tiff(bits, format) else {
        return Err(MergeError::invalid(format!(
            "{}: unsupported sample type ({bits} bits, format {format})",
            path.display()
        )));
    };

    if decoder.find_tag_unsigned::<u16>(Tag::PlanarConfiguration)? == Some(PLANAR_CONFIG_SEPARATE) && bands > 1 {
        return Err(MergeError::invalid(format!(
            "{}: band-separate planar configuration is not supported",
            path.display()
        )));
    }

    let mut transform = read_transform(decoder)?
        .ok_or_else(|| MergeError::invalid(format!("{}: no georeferencing found", path.display())))?;

    let geokeys = decoder.find_tag_unsigned_vec::<u16>(Tag::GeoKeyDirectoryTag)?.unwrap_or_default();
    let crs = epsg_from_geokeys(&geokeys);
    // Tiepoints of a PixelIsPoint raster name the centre of the pixel
    if pixel_is_point(&geokeys) {
        transform = transform * Affine::translation(-0.5, -0.5);
    }

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => value.into_string()?.trim_matches(char::from(0)).trim().parse().ok(),
        None => None,
    };

    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let to_size = |v: u32| usize::try_from(v).unwrap_or(usize::MAX);

    Ok(GeoTiffMetadata {
        width: to_size(width),
        height: to_size(height),
        bands: usize::from(bands),
        sample_type,
        transform,
        crs,
        nodata,
        chunk_width: to_size(chunk_width.max(1)),
        chunk_height: to_size(chunk_height.max(1)),
        chunks_across: to_size(width.div_ceil(chunk_width.max(1))),
    })
}

/// Pixel to model transform from ModelTransformation, or from ModelPixelScale
/// and ModelTiepoint.
fn read_transform(decoder: &mut Decoder<BufReader<File>>) -> MergeResult<Option<Affine>> {
    if let Some(value) = decoder.find_tag(Tag::ModelTransformationTag)? {
        let m = value.into_f64_vec()?;
        if m.len() >= 8 {
            return Ok(Some(Affine::new(m[0], m[1], m[3], m[4], m[5], m[7])));
        }
    }

    let scale = match decoder.find_tag(Tag::ModelPixelScaleTag)? {
        Some(value) => value.into_f64_vec()?,
        None => return Ok(None),
    };
    let tiepoint = match decoder.find_tag(Tag::ModelTiepointTag)? {
        Some(value) => value.into_f64_vec()?,
        None => return Ok(None),
    };
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Ok(None);
    }

    // Tiepoint (i, j, k, x, y, z) ties raster pixel (i, j) to model (x, y)
    let (sx, sy) = (scale[0], scale[1]);
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    Ok(Some(Affine::new(sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy)))
}
