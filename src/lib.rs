#![doc = include_str!("../README.md")]
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geometry`]: Affine transforms, bounding boxes, pixel windows and the coordinate mapper
//! - [`raster`]: The [`RasterSource`] trait and the [`BlockBuffer`] pixel container
//! - [`plan`]: Output geometry planning via [`plan_output`]
//! - [`composite`]: First-valid-source-wins block compositing
//! - [`merge`]: The [`merge`](merge::merge) orchestrator and the [`BlockSink`] trait
//! - [`source`]: GeoTIFF inputs
//! - [`geotiff_writer`]: Strip-based GeoTIFF output
//! - [`memory`]: In-memory rasters and sinks
//! - [`tile_cache`]: Per-source LRU cache for decoded chunks

// ============================================================================
// Public modules
// ============================================================================

pub mod casting;
pub mod composite;
pub mod error;
pub mod geometry;
pub mod geotiff_writer;
pub mod memory;
pub mod merge;
pub mod plan;
pub mod raster;
pub mod source;
pub mod tile_cache;

// ============================================================================
// Merging
// ============================================================================
// Primary API: merge_to_geotiff(&mut sources, path, &MergeOptions::default(), &creation)

pub use merge::{
    merge,
    merge_to_geotiff,
    BlockSink,
    MergeOptions,
    DEFAULT_PRECISION,
};

pub use plan::{
    plan_output,
    OutputPlan,
    Resolution,
};

pub use composite::{
    BlockCompositor,
    CompositeStats,
};

// ============================================================================
// Errors
// ============================================================================

pub use error::{
    ErrorKind,
    MergeError,
    MergeResult,
};

// ============================================================================
// Geometry
// ============================================================================

pub use geometry::{
    Affine,
    BoundingBox,
    PixelIndex,
    Rounding,
    Window,
    pixel_index,
};
pub use geometry::projection::{
    get_proj_string,
    is_geographic_crs,
};

// ============================================================================
// Raster Abstraction
// ============================================================================

pub use raster::{
    BlockBuffer,
    OutputProfile,
    RasterSource,
    SampleType,
};

pub use memory::{
    MemoryRaster,
    MemorySink,
};

// ============================================================================
// GeoTIFF I/O
// ============================================================================

pub use source::GeoTiffSource;

pub use geotiff_writer::{
    CreationOptions,
    GeoTiffBlockWriter,
    GeoTiffCompression,
};

// ============================================================================
// Caching
// ============================================================================

pub use tile_cache::{ChunkCache, ChunkData};
