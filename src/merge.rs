//! Merge orchestration.
//!
//! [`merge`] plans the output, opens the destination through a caller
//! supplied function, and streams composited blocks into it one window at a
//! time:
//!
//! ```text
//! plan_output ──► OutputProfile ──► open_sink ──► BlockSink
//!                                                   │ block_windows()
//!                                                   ▼
//!                     BlockCompositor::composite (per window, lazily)
//!                                                   │
//!                                                   ▼
//!                                          BlockSink::write_blocks
//! ```
//!
//! Nothing is created until the inputs have been validated, so a bad input
//! never leaves a partial destination behind.

use std::path::Path;

use tracing::{debug, info};

use crate::composite::BlockCompositor;
use crate::error::MergeResult;
use crate::geometry::{Affine, BoundingBox, Window};
use crate::geotiff_writer::{CreationOptions, GeoTiffBlockWriter};
use crate::plan::{plan_output, Resolution};
use crate::raster::{BlockBuffer, OutputProfile, RasterSource, OUTPUT_NODATA};

/// Decimal places kept when mapping coordinates to pixels
pub const DEFAULT_PRECISION: u32 = 7;

/// An opened destination raster that accepts composited blocks.
pub trait BlockSink {
    /// Metadata the sink was opened with
    fn profile(&self) -> &OutputProfile;

    /// The sink's natural tiling, row-major. Together the windows cover the
    /// output exactly once.
    fn block_windows(&self) -> Vec<Window>;

    /// Write blocks in the order produced by [`BlockSink::block_windows`].
    ///
    /// `blocks` is consumed lazily so only one block is alive at a time. The
    /// first error, from the iterator or the sink, aborts the write.
    ///
    /// # Errors
    /// Returns the first error yielded by `blocks` or raised while writing.
    fn write_blocks<I>(&mut self, blocks: I) -> MergeResult<()>
    where
        I: IntoIterator<Item = MergeResult<(Window, BlockBuffer)>>;
}

/// Options controlling the output geometry
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    /// Output extent; the union of the inputs when `None`
    pub bounds: Option<BoundingBox>,
    /// Output pixel size; the first input's when `None`
    pub resolution: Option<Resolution>,
    /// Decimal places used when mapping window corners to source pixels
    pub precision: u32,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            bounds: None,
            resolution: None,
            precision: DEFAULT_PRECISION,
        }
    }
}

impl MergeOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: BoundingBox) -> Self {
        self.bounds = Some(bounds);
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }
}

/// Merge `sources` into the sink returned by `open_sink`.
///
/// Each output pixel takes every band from the first source, in slice
/// order, whose alpha is non-zero at that location. Pixels no source covers
/// stay zero.
///
/// Returns the output transform.
///
/// # Errors
/// Returns [`crate::MergeError::InvalidInput`] for an empty or non-RGBA
/// input list or invalid options (before `open_sink` is called), and any
/// error raised while opening the sink, reading sources or writing blocks.
pub fn merge<S, D, F>(sources: &mut [S], open_sink: F, options: &MergeOptions) -> MergeResult<Affine>
where
    S: RasterSource,
    D: BlockSink,
    F: FnOnce(&OutputProfile) -> MergeResult<D>,
{
    let plan = plan_output(sources, options.bounds, options.resolution)?;
    // Non-empty once planned
    let first = &sources[0];
    let profile = OutputProfile {
        transform: plan.transform,
        width: plan.width,
        height: plan.height,
        band_count: first.band_count(),
        sample_type: first.sample_type(),
        nodata: OUTPUT_NODATA,
        crs: first.crs(),
    };
    debug!(?profile, "Output profile");

    let mut sink = open_sink(&profile)?;
    let windows = sink.block_windows();
    debug!(blocks = windows.len(), "Writing blocks");

    let mut compositor = BlockCompositor::new(&profile, options.precision);
    let blocks = windows
        .iter()
        .map(|window| compositor.composite(window, sources).map(|block| (*window, block)));
    sink.write_blocks(blocks)?;

    let stats = compositor.stats();
    info!(
        sources = sources.len(),
        width = profile.width,
        height = profile.height,
        blocks = stats.blocks,
        reads = stats.reads,
        early_exits = stats.early_exits,
        "Merge complete"
    );
    Ok(profile.transform)
}

/// Merge `sources` into a new GeoTIFF at `path`.
///
/// # Errors
/// See [`merge`] and [`GeoTiffBlockWriter::create`].
pub fn merge_to_geotiff<S: RasterSource>(
    sources: &mut [S],
    path: impl AsRef<Path>,
    options: &MergeOptions,
    creation: &CreationOptions,
) -> MergeResult<Affine> {
    let path = path.as_ref();
    merge(
        sources,
        |profile| GeoTiffBlockWriter::create(path, profile, creation),
        options,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{MemoryRaster, MemorySink};
    use crate::raster::{SampleType, ALPHA_BAND};
    use crate::source::GeoTiffSource;

    fn grid() -> Affine {
        Affine::translation(-114.0, 46.0) * Affine::scale(0.2, -0.2)
    }

    /// 10x10 source with `colour` and an opaque alpha over the given square
    fn square(rows: std::ops::Range<usize>, cols: std::ops::Range<usize>, colour: f32) -> MemoryRaster {
        let mut raster = MemoryRaster::new(4, 10, 10, grid()).with_crs(4326);
        for band in 0..3 {
            raster.fill(band, rows.clone(), cols.clone(), colour);
        }
        raster.fill(ALPHA_BAND, rows, cols, 255.0);
        raster
    }

    fn source_a() -> MemoryRaster {
        square(4..8, 4..8, 254.0)
    }

    fn source_b() -> MemoryRaster {
        square(0..6, 0..6, 255.0)
    }

    fn merge_in_memory(sources: &mut [MemoryRaster], options: &MergeOptions, block: (usize, usize)) -> MemoryRaster {
        let mut assembled = None;
        let slot = &mut assembled;
        let transform = merge(sources, move |profile| Ok(Collect::new(profile, block, slot)), options).unwrap();
        let raster = assembled.unwrap();
        assert_eq!(raster.transform(), transform);
        raster
    }

    /// Hands the assembled raster back to the test once all blocks are in
    struct Collect<'a> {
        profile: OutputProfile,
        sink: Option<MemorySink>,
        out: &'a mut Option<MemoryRaster>,
    }

    impl<'a> Collect<'a> {
        fn new(profile: &OutputProfile, block: (usize, usize), out: &'a mut Option<MemoryRaster>) -> Self {
            Self {
                profile: profile.clone(),
                sink: Some(MemorySink::new(profile, block)),
                out,
            }
        }
    }

    impl BlockSink for Collect<'_> {
        fn profile(&self) -> &OutputProfile {
            &self.profile
        }

        fn block_windows(&self) -> Vec<Window> {
            self.sink.as_ref().map(BlockSink::block_windows).unwrap_or_default()
        }

        fn write_blocks<I>(&mut self, blocks: I) -> MergeResult<()>
        where
            I: IntoIterator<Item = MergeResult<(Window, BlockBuffer)>>,
        {
            if let Some(mut sink) = self.sink.take() {
                sink.write_blocks(blocks)?;
                *self.out = Some(sink.into_raster());
            }
            Ok(())
        }
    }

    fn band_rows(raster: &MemoryRaster, band: usize) -> Vec<Vec<u8>> {
        let width = raster.width();
        raster
            .band(band)
            .chunks(width)
            .map(|row| row.iter().map(|&v| v as u8).collect())
            .collect()
    }

    #[test]
    fn test_earlier_source_wins_overlap() {
        let mut sources = vec![source_b(), source_a()];
        let out = merge_in_memory(&mut sources, &MergeOptions::default(), (3, 4));

        assert_eq!((out.width(), out.height()), (10, 10));
        for row in 0..10 {
            for col in 0..10 {
                let in_b = row < 6 && col < 6;
                let in_a = (4..8).contains(&row) && (4..8).contains(&col);
                let expected = if in_b {
                    255.0
                } else if in_a {
                    254.0
                } else {
                    0.0
                };
                assert_eq!(out.get(0, row, col), expected, "band 1 at ({row}, {col})");
                let alpha = if in_a || in_b { 255.0 } else { 0.0 };
                assert_eq!(out.get(ALPHA_BAND, row, col), alpha, "alpha at ({row}, {col})");
            }
        }
    }

    #[test]
    fn test_order_decides_overlap() {
        let mut sources = vec![source_a(), source_b()];
        let out = merge_in_memory(&mut sources, &MergeOptions::default(), (10, 10));
        assert_eq!(out.get(0, 4, 4), 254.0);
        assert_eq!(out.get(0, 5, 5), 254.0);
        assert_eq!(out.get(0, 0, 0), 255.0);
        assert_eq!(out.get(0, 3, 5), 255.0);
    }

    #[test]
    fn test_explicit_bounds_crop() {
        let mut sources = vec![source_a(), source_b()];
        let options = MergeOptions::new().with_bounds(BoundingBox::new(-113.4, 44.8, -112.8, 45.4));
        let out = merge_in_memory(&mut sources, &options, (2, 2));

        assert_eq!(
            band_rows(&out, 0),
            vec![
                vec![255, 255, 255, 0],
                vec![255, 254, 254, 254],
                vec![255, 254, 254, 254],
                vec![0, 254, 254, 254],
            ]
        );
    }

    /// 7x7 opaque source at `origin` whose band 0 holds `id` and band 1 the
    /// source pixel number `row * 7 + col`
    fn labelled(origin: (f64, f64), id: f32) -> MemoryRaster {
        let n = 7 * 7;
        let mut data = vec![id; n];
        #[allow(clippy::cast_precision_loss)]
        let numbers = (0..n).map(|i| i as f32);
        data.extend(numbers);
        data.extend(std::iter::repeat(0.0).take(n));
        data.extend(std::iter::repeat(255.0).take(n));
        let pixels = BlockBuffer::from_vec(4, 7, 7, data).unwrap();
        MemoryRaster::from_buffer(pixels, Affine::translation(origin.0, origin.1) * Affine::scale(0.2, -0.2))
    }

    #[test]
    fn test_touching_extents_take_pixels_from_their_source() {
        // B starts where A ends in x and two rows further south
        let mut sources = vec![labelled((-114.0, 46.0), 1.0), labelled((-112.6, 45.6), 2.0)];
        let out = merge_in_memory(&mut sources, &MergeOptions::default(), (3, 15));

        // The union's width divides to 14.00000000000006 and rounds up
        assert_eq!((out.width(), out.height()), (15, 9));
        for row in 0..9 {
            for col in 0..15 {
                let expected = if row < 7 && col < 7 {
                    Some((1.0, row * 7 + col))
                } else if (2..9).contains(&row) && (7..14).contains(&col) {
                    Some((2.0, (row - 2) * 7 + (col - 7)))
                } else {
                    None
                };
                let got = (out.get(0, row, col), out.get(1, row, col), out.get(ALPHA_BAND, row, col));
                #[allow(clippy::cast_precision_loss)]
                let want = match expected {
                    Some((id, pixel)) => (id, pixel as f32, 255.0),
                    None => (0.0, 0.0, 0.0),
                };
                assert_eq!(got, want, "pixel ({row}, {col})");
            }
        }
    }

    #[test]
    fn test_transparent_pixels_keep_source_colour() {
        let mut hidden = MemoryRaster::new(4, 10, 10, grid());
        hidden.fill(0, 0..10, 0..10, 7.0);
        let mut sources = vec![source_a(), hidden];
        let out = merge_in_memory(&mut sources, &MergeOptions::default(), (5, 5));

        assert_eq!(out.get(0, 5, 5), 254.0);
        assert_eq!(out.get(0, 0, 0), 7.0);
        assert_eq!(out.get(ALPHA_BAND, 0, 0), 0.0);
    }

    #[test]
    fn test_coarser_resolution_samples_nearest() {
        let mut sources = vec![source_a(), source_b()];
        let options = MergeOptions::new().with_resolution(Resolution::Uniform(0.4));
        let out = merge_in_memory(&mut sources, &options, (5, 5));

        assert_eq!(
            band_rows(&out, 0),
            vec![
                vec![255, 255, 255, 0, 0],
                vec![255, 255, 255, 0, 0],
                vec![255, 255, 254, 254, 0],
                vec![0, 0, 254, 254, 0],
                vec![0, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn test_opaque_first_source_skips_the_rest() {
        let mut opaque = MemoryRaster::new(4, 10, 10, grid());
        for band in 0..3 {
            opaque.fill(band, 0..10, 0..10, 1.0);
        }
        opaque.fill(ALPHA_BAND, 0..10, 0..10, 255.0);

        let mut sources = vec![opaque, source_b()];
        let out = merge_in_memory(&mut sources, &MergeOptions::default(), (4, 4));

        assert!(out.band(0).iter().all(|&v| v == 1.0));
        assert_eq!(sources[0].reads(), 9);
        assert_eq!(sources[1].reads(), 0);
    }

    #[test]
    fn test_single_source_round_trip() {
        let mut src = MemoryRaster::new(4, 7, 9, grid()).with_crs(4326);
        for (band, value) in [(0, 10.0), (1, 20.0), (2, 30.0), (3, 255.0)] {
            src.fill(band, 1..5, 2..9, value);
        }
        let expected = src.pixels().clone();

        let mut sources = vec![src];
        let out = merge_in_memory(&mut sources, &MergeOptions::default(), (2, 4));
        assert_eq!(out.pixels(), &expected);
        assert_eq!(out.crs(), Some(4326));
    }

    #[test]
    fn test_three_band_input_never_opens_sink() {
        let mut sources = vec![source_a(), MemoryRaster::new(3, 10, 10, grid())];
        let mut opened = false;
        let err = merge(
            &mut sources,
            |profile| {
                opened = true;
                Ok(MemorySink::new(profile, (4, 4)))
            },
            &MergeOptions::default(),
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.to_string(), "Inputs must be 4-band RGBA rasters");
        assert!(!opened);
    }

    #[test]
    fn test_profile_follows_first_source() {
        let first = source_a().with_sample_type(SampleType::U16);
        let mut sources = vec![first, source_b()];
        let mut seen = None;
        merge(
            &mut sources,
            |profile| {
                seen = Some(profile.clone());
                Ok(MemorySink::new(profile, (10, 10)))
            },
            &MergeOptions::default(),
        )
        .unwrap();

        let profile = seen.unwrap();
        assert_eq!(profile.sample_type, SampleType::U16);
        assert_eq!(profile.band_count, 4);
        assert_eq!(profile.nodata, 0.0);
        assert_eq!(profile.crs, Some(4326));
    }

    #[test]
    fn test_geotiff_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.tif");
        let b_path = dir.path().join("b.tif");
        let merged = dir.path().join("merged.tif");
        let creation = CreationOptions::default();

        // Writing a single source is an identity merge
        merge_to_geotiff(&mut [source_a()], &a_path, &MergeOptions::default(), &creation).unwrap();
        merge_to_geotiff(&mut [source_b()], &b_path, &MergeOptions::default(), &creation).unwrap();

        let mut sources = vec![GeoTiffSource::open(&a_path).unwrap(), GeoTiffSource::open(&b_path).unwrap()];
        assert_eq!(sources[0].crs(), Some(4326));

        let transform = merge_to_geotiff(&mut sources, &merged, &MergeOptions::default(), &creation).unwrap();
        assert_eq!(transform, grid());

        let mut out = GeoTiffSource::open(&merged).unwrap();
        assert_eq!((out.width(), out.height(), out.band_count()), (10, 10, 4));
        assert_eq!(out.nodata(), Some(0.0));
        assert_eq!(out.crs(), Some(4326));

        let data = out.read_window(&Window::new((0, 10), (0, 10)), 10, 10).unwrap();
        assert_eq!(data.get(0, 0, 0), 255.0);
        assert_eq!(data.get(0, 4, 4), 254.0);
        assert_eq!(data.get(0, 7, 7), 254.0);
        assert_eq!(data.get(0, 0, 7), 0.0);
        assert_eq!(data.get(ALPHA_BAND, 5, 0), 255.0);
        assert_eq!(data.get(ALPHA_BAND, 9, 9), 0.0);
    }

    #[test]
    fn test_geotiff_sources_keep_only_current_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = CreationOptions::default().with_block_rows(4);
        let paths: Vec<_> = (0..3)
            .map(|i| {
                // Each source covers a different column band so every strip reads all three
                let mut raster = MemoryRaster::new(4, 64, 64, grid());
                raster.fill(0, 0..64, i * 16..(i + 1) * 16, 9.0);
                raster.fill(ALPHA_BAND, 0..64, i * 16..(i + 1) * 16, 255.0);
                let path = dir.path().join(format!("in{i}.tif"));
                merge_to_geotiff(&mut [raster], &path, &MergeOptions::default(), &inputs).unwrap();
                path
            })
            .collect();

        let mut sources = crate::source::open_all(&paths).unwrap();
        let merged = dir.path().join("merged.tif");
        let output = CreationOptions::default().with_block_rows(8);
        merge_to_geotiff(&mut sources, &merged, &MergeOptions::default(), &output).unwrap();

        let strip_bytes = 4 * 64 * 4;
        for source in &sources {
            // The last 8-row strip spans two 4-row input strips
            assert_eq!(source.cache().len(), 2);
            assert_eq!(source.cache().size_bytes(), 2 * strip_bytes);
            assert_eq!(source.cache().hit_stats().1, 16);
        }

        let mut out = GeoTiffSource::open(&merged).unwrap();
        let data = out.read_window(&Window::new((0, 64), (0, 64)), 64, 64).unwrap();
        assert_eq!(data.get(0, 63, 40), 9.0);
        assert_eq!(data.get(ALPHA_BAND, 63, 50), 0.0);
    }

    #[test]
    fn test_failed_validation_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("merged.tif");
        let mut sources = vec![MemoryRaster::new(3, 10, 10, grid())];

        let err = merge_to_geotiff(&mut sources, &merged, &MergeOptions::default(), &CreationOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!merged.exists());
    }

    #[test]
    fn test_options_builder() {
        let options = MergeOptions::new()
            .with_precision(3)
            .with_resolution(Resolution::PerAxis { x: 0.5, y: 0.25 });
        assert_eq!(options.precision, 3);
        assert_eq!(options.bounds, None);
        assert_eq!(MergeOptions::default().precision, DEFAULT_PRECISION);
    }
}
