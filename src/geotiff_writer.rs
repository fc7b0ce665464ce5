//! Strip-based GeoTIFF writer for merged rasters.
//!
//! [`GeoTiffBlockWriter`] is a [`BlockSink`]: its natural tiling is full-width
//! strips, which are encoded and written to disk as they arrive, so the
//! merged raster is never held in memory at once. The file carries the
//! GeoTIFF georeferencing tags, the CRS GeoKeys and a `GDAL_NODATA` of 0.
//!
//! # Example
//!
//! ```rust,no_run
//! use merge_rgba::geotiff_writer::{CreationOptions, GeoTiffCompression};
//! use merge_rgba::{merge_to_geotiff, source, MergeOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut sources = source::open_all(&["b.tif", "a.tif"])?;
//!     let creation = CreationOptions::default().with_compression(GeoTiffCompression::Deflate);
//!     merge_to_geotiff(&mut sources, "merged.tif", &MergeOptions::default(), &creation)?;
//!     Ok(())
//! }
//! ```

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tiff::encoder::colortype::{ColorType, RGBA16, RGBA8};
use tiff::encoder::{Compression, DeflateLevel, DirectoryEncoder, TiffEncoder, TiffKind, TiffValue};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::casting::usize_to_u32;
use crate::error::{MergeError, MergeResult};
use crate::geometry::projection::{build_geokey_directory, get_proj_string};
use crate::geometry::{block_windows, Window};
use crate::merge::BlockSink;
use crate::raster::{BlockBuffer, OutputProfile, SampleType};

/// ExtraSamples value for an unassociated alpha channel
const EXTRA_SAMPLE_UNASSOCIATED_ALPHA: u16 = 2;

/// Target size of an uncompressed strip when no block size is requested
const DEFAULT_STRIP_BYTES: usize = 8192;

/// Compression method for GeoTIFF output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeoTiffCompression {
    /// No compression - fastest but largest files
    #[default]
    None,
    /// LZW compression - good balance of speed and size
    Lzw,
    /// Deflate (zlib) compression - better compression, slower
    Deflate,
}

impl GeoTiffCompression {
    fn to_tiff(self) -> Compression {
        match self {
            GeoTiffCompression::None => Compression::Uncompressed,
            GeoTiffCompression::Lzw => Compression::Lzw,
            GeoTiffCompression::Deflate => Compression::Deflate(DeflateLevel::Balanced),
        }
    }
}

impl std::str::FromStr for GeoTiffCompression {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(GeoTiffCompression::None),
            "LZW" => Ok(GeoTiffCompression::Lzw),
            "DEFLATE" => Ok(GeoTiffCompression::Deflate),
            other => Err(MergeError::invalid(format!("Unsupported COMPRESS value: {other}"))),
        }
    }
}

/// Driver creation options, given as `NAME=VALUE` pairs on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationOptions {
    pub compression: GeoTiffCompression,
    /// Rows per strip; sized for roughly 8 KiB strips when `None`
    pub block_rows: Option<usize>,
}

impl CreationOptions {
    #[must_use]
    pub fn with_compression(mut self, compression: GeoTiffCompression) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_block_rows(mut self, rows: usize) -> Self {
        self.block_rows = Some(rows);
        self
    }

    /// Build options from `(name, value)` pairs. Names are case-insensitive.
    ///
    /// Recognised: `COMPRESS` (`NONE`, `LZW`, `DEFLATE`), `BLOCKYSIZE` and
    /// `TILED`. Tiled output is not supported; `TILED=YES` and unknown names
    /// are logged and ignored.
    ///
    /// # Errors
    /// Returns [`MergeError::InvalidInput`] for an unsupported compression
    /// or a block size that is not a positive integer.
    pub fn from_pairs<I, K, V>(pairs: I) -> MergeResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (name, value) in pairs {
            let (name, value) = (name.as_ref(), value.as_ref());
            match name.to_ascii_uppercase().as_str() {
                "COMPRESS" => options.compression = value.parse()?,
                "BLOCKYSIZE" => {
                    let rows = value
                        .parse::<usize>()
                        .ok()
                        .filter(|&r| r > 0)
                        .ok_or_else(|| MergeError::invalid(format!("Invalid BLOCKYSIZE: {value}")))?;
                    options.block_rows = Some(rows);
                }
                "TILED" => {
                    if value.eq_ignore_ascii_case("YES") || value.eq_ignore_ascii_case("TRUE") {
                        warn!("Tiled output is not supported, writing strips");
                    }
                }
                _ => warn!(option = name, value, "Ignoring unknown creation option"),
            }
        }
        Ok(options)
    }

    /// Parse `NAME=VALUE` strings.
    ///
    /// # Errors
    /// Returns [`MergeError::InvalidInput`] for an item without `=` and
    /// anything [`CreationOptions::from_pairs`] rejects.
    pub fn parse<S: AsRef<str>>(items: &[S]) -> MergeResult<Self> {
        let pairs = items
            .iter()
            .map(|item| {
                item.as_ref()
                    .split_once('=')
                    .ok_or_else(|| MergeError::invalid(format!("Creation option must be NAME=VALUE: {}", item.as_ref())))
            })
            .collect::<MergeResult<Vec<_>>>()?;
        Self::from_pairs(pairs)
    }
}

/// Rows per strip giving strips of about [`DEFAULT_STRIP_BYTES`]
fn default_strip_rows(profile: &OutputProfile) -> usize {
    let row_bytes = profile.width * profile.band_count * profile.sample_type.bytes();
    (DEFAULT_STRIP_BYTES / row_bytes.max(1)).max(1)
}

/// GeoTIFF destination written strip by strip.
///
/// The file is created by [`GeoTiffBlockWriter::create`] and completed by
/// [`BlockSink::write_blocks`]; dropping the writer closes it on every path.
pub struct GeoTiffBlockWriter {
    path: PathBuf,
    profile: OutputProfile,
    strip_rows: usize,
    encoder: Option<TiffEncoder<BufWriter<File>>>,
}

impl GeoTiffBlockWriter {
    /// Create (or truncate) `path` for a raster described by `profile`.
    ///
    /// # Errors
    /// Returns [`MergeError::InvalidInput`] for a profile that is not 4-band
    /// or is too large for TIFF, and an I/O error if the file cannot be
    /// created.
    pub fn create(path: impl AsRef<Path>, profile: &OutputProfile, creation: &CreationOptions) -> MergeResult<Self> {
        let path = path.as_ref().to_path_buf();
        if profile.band_count != 4 {
            return Err(MergeError::invalid(format!(
                "GeoTIFF output needs 4 bands, got {}",
                profile.band_count
            )));
        }
        if profile.width == 0 || profile.height == 0 {
            return Err(MergeError::invalid("Raster has zero dimensions"));
        }
        usize_to_u32(profile.width).map_err(MergeError::InvalidInput)?;
        usize_to_u32(profile.height).map_err(MergeError::InvalidInput)?;

        let strip_rows = creation
            .block_rows
            .unwrap_or_else(|| default_strip_rows(profile))
            .min(profile.height);

        let file = File::create(&path)?;
        let encoder = TiffEncoder::new(BufWriter::new(file))?.with_compression(creation.compression.to_tiff());
        debug!(
            path = %path.display(),
            strip_rows,
            compression = ?creation.compression,
            "Created GeoTIFF"
        );

        Ok(Self {
            path,
            profile: profile.clone(),
            strip_rows,
            encoder: Some(encoder),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows in each strip
    #[must_use]
    pub fn strip_rows(&self) -> usize {
        self.strip_rows
    }
}

impl std::fmt::Debug for GeoTiffBlockWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffBlockWriter")
            .field("path", &self.path)
            .field("profile", &self.profile)
            .field("strip_rows", &self.strip_rows)
            .finish_non_exhaustive()
    }
}

impl BlockSink for GeoTiffBlockWriter {
    fn profile(&self) -> &OutputProfile {
        &self.profile
    }

    fn block_windows(&self) -> Vec<Window> {
        block_windows(self.profile.height, self.profile.width, self.strip_rows, self.profile.width)
    }

    fn write_blocks<I>(&mut self, blocks: I) -> MergeResult<()>
    where
        I: IntoIterator<Item = MergeResult<(Window, BlockBuffer)>>,
    {
        let Some(mut encoder) = self.encoder.take() else {
            return Err(std::io::Error::other(format!("{} has already been written", self.path.display())).into());
        };
        let expected = self.block_windows();

        match self.profile.sample_type {
            SampleType::U8 => write_image::<RGBA8, _, _>(
                &mut encoder,
                &self.profile,
                self.strip_rows,
                &expected,
                blocks,
                to_u8,
            )?,
            SampleType::U16 => write_image::<RGBA16, _, _>(
                &mut encoder,
                &self.profile,
                self.strip_rows,
                &expected,
                blocks,
                to_u16,
            )?,
        }
        debug!(path = %self.path.display(), strips = expected.len(), "Finished GeoTIFF");
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(value: f32) -> u8 {
    value as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u16(value: f32) -> u16 {
    value as u16
}

fn write_image<C, W, I>(
    encoder: &mut TiffEncoder<W>,
    profile: &OutputProfile,
    strip_rows: usize,
    expected: &[Window],
    blocks: I,
    convert: fn(f32) -> C::Inner,
) -> MergeResult<()>
where
    C: ColorType,
    W: Write + Seek,
    I: IntoIterator<Item = MergeResult<(Window, BlockBuffer)>>,
    [C::Inner]: TiffValue,
{
    let width = usize_to_u32(profile.width).map_err(MergeError::InvalidInput)?;
    let height = usize_to_u32(profile.height).map_err(MergeError::InvalidInput)?;

    let mut image = encoder.new_image::<C>(width, height)?;
    image.rows_per_strip(usize_to_u32(strip_rows).map_err(MergeError::InvalidInput)?)?;
    image
        .encoder()
        .write_tag(Tag::ExtraSamples, EXTRA_SAMPLE_UNASSOCIATED_ALPHA)?;
    write_geotiff_tags(image.encoder(), profile)?;

    let mut written = 0;
    let mut strip = Vec::new();
    for block in blocks {
        let (window, buffer) = block?;
        if expected.get(written) != Some(&window) {
            return Err(std::io::Error::other(format!("Block {window} written out of strip order")).into());
        }
        if buffer.shape() != (profile.band_count, window.height(), window.width()) {
            return Err(MergeError::invalid(format!(
                "Block {window} has shape {:?}",
                buffer.shape()
            )));
        }

        strip.clear();
        strip.extend(buffer.interleaved().map(convert));
        image.write_strip(&strip)?;
        written += 1;
    }

    if written != expected.len() {
        return Err(std::io::Error::other(format!(
            "Only {written} of {} strips were written",
            expected.len()
        ))
        .into());
    }
    image.finish()?;
    Ok(())
}

/// Write georeferencing, CRS keys and the nodata value
fn write_geotiff_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<W, K>,
    profile: &OutputProfile,
) -> MergeResult<()> {
    let t = &profile.transform;

    if t.is_rectilinear() {
        // ModelPixelScale: [ScaleX, ScaleY, ScaleZ]
        let pixel_scale = [t.a, -t.e, 0.0];
        dir.write_tag(Tag::ModelPixelScaleTag, pixel_scale.as_slice())?;

        // ModelTiepoint: [I, J, K, X, Y, Z], pixel (0, 0) to the origin
        let tiepoint = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
        dir.write_tag(Tag::ModelTiepointTag, tiepoint.as_slice())?;
    } else {
        let matrix = [
            t.a, t.b, 0.0, t.c, //
            t.d, t.e, 0.0, t.f, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::ModelTransformationTag, matrix.as_slice())?;
    }

    let geokeys = build_geokey_directory(profile.crs);
    dir.write_tag(Tag::GeoKeyDirectoryTag, geokeys.as_slice())?;

    // PROJ string as GeoAsciiParams when the EPSG code is known
    if let Some(proj_string) = profile.crs.and_then(get_proj_string) {
        let ascii_params = format!("{proj_string}|");
        dir.write_tag(Tag::GeoAsciiParamsTag, ascii_params.as_str())?;
    }

    let nodata = profile.nodata.to_string();
    dir.write_tag(Tag::GdalNodata, nodata.as_str())?;
    Ok(())
}
