//! Geometry primitives: bounding boxes, affine transforms, pixel windows and
//! the coordinate-to-pixel mapping used to align sources with output blocks.

pub mod affine;
pub mod index;
pub mod projection;
pub mod window;

pub use affine::Affine;
pub use index::{pixel_index, round_to_precision, PixelIndex, Rounding};
pub use window::{block_windows, Window};

/// Bounding box in a coordinate reference system
///
/// Edges are named the way raster bounds are usually quoted on the command
/// line: `(west, south, east, north)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self { west, south, east, north }
    }

    /// Smallest box containing both `self` and `other`
    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }

    /// Build a box from two arbitrary corners, ordering the edges
    #[must_use]
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            west: a.0.min(b.0),
            south: a.1.min(b.1),
            east: a.0.max(b.0),
            north: a.1.max(b.1),
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.north - self.south
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(b: [f64; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }
}
