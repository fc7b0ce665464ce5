//! Rectangular pixel windows and block tiling.

use crate::casting::{isize_to_usize, usize_to_isize};

use super::{Affine, BoundingBox, PixelIndex};

/// Half-open pixel ranges `[row_start, row_stop) x [col_start, col_stop)`.
///
/// Windows in source-local space may start at negative indices or extend
/// past the raster; reads treat the uncovered part as empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub row_start: isize,
    pub row_stop: isize,
    pub col_start: isize,
    pub col_stop: isize,
}

impl Window {
    #[must_use]
    pub fn new(rows: (isize, isize), cols: (isize, isize)) -> Self {
        Self {
            row_start: rows.0,
            row_stop: rows.1,
            col_start: cols.0,
            col_stop: cols.1,
        }
    }

    /// Window spanning from the `start` pixel up to (excluding) `stop`
    #[must_use]
    pub fn from_corners(start: PixelIndex, stop: PixelIndex) -> Self {
        Self::new((start.row, stop.row), (start.col, stop.col))
    }

    /// Number of rows; zero for an inverted window
    #[must_use]
    pub fn height(&self) -> usize {
        isize_to_usize(self.row_stop - self.row_start).unwrap_or(0)
    }

    /// Number of columns; zero for an inverted window
    #[must_use]
    pub fn width(&self) -> usize {
        isize_to_usize(self.col_stop - self.col_start).unwrap_or(0)
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.height() * self.width()
    }

    /// Geographic bounds of this window under `transform`
    #[must_use]
    pub fn bounds(&self, transform: &Affine) -> BoundingBox {
        #[allow(clippy::cast_precision_loss)]
        let top_left = transform.apply(self.col_start as f64, self.row_start as f64);
        #[allow(clippy::cast_precision_loss)]
        let bottom_right = transform.apply(self.col_stop as f64, self.row_stop as f64);
        BoundingBox::from_corners(top_left, bottom_right)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(({}, {}), ({}, {}))",
            self.row_start, self.row_stop, self.col_start, self.col_stop
        )
    }
}

/// Row-major tiling of a `height x width` raster into blocks of
/// `block_rows x block_cols`; edge blocks are clipped to the raster.
///
/// Zero block dimensions are treated as 1.
#[must_use]
pub fn block_windows(height: usize, width: usize, block_rows: usize, block_cols: usize) -> Vec<Window> {
    let block_rows = block_rows.max(1);
    let block_cols = block_cols.max(1);

    let mut windows = Vec::with_capacity(height.div_ceil(block_rows) * width.div_ceil(block_cols));
    for row in (0..height).step_by(block_rows) {
        let row_stop = (row + block_rows).min(height);
        for col in (0..width).step_by(block_cols) {
            let col_stop = (col + block_cols).min(width);
            windows.push(Window::new(
                (usize_to_isize(row), usize_to_isize(row_stop)),
                (usize_to_isize(col), usize_to_isize(col_stop)),
            ));
        }
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        let w = Window::new((3, 7), (-2, 4));
        assert_eq!(w.height(), 4);
        assert_eq!(w.width(), 6);
        assert_eq!(w.pixel_count(), 24);

        let inverted = Window::new((5, 2), (0, 4));
        assert_eq!(inverted.height(), 0);
        assert_eq!(inverted.pixel_count(), 0);
    }

    #[test]
    fn test_bounds() {
        let t = Affine::translation(-113.4, 45.4) * Affine::scale(0.2, -0.2);
        let b = Window::new((0, 4), (0, 4)).bounds(&t);
        assert!((b.west - (-113.4)).abs() < 1e-12);
        assert!((b.north - 45.4).abs() < 1e-12);
        assert!((b.east - (-112.6)).abs() < 1e-12);
        assert!((b.south - 44.6).abs() < 1e-12);
    }

    #[test]
    fn test_block_windows_cover_raster_once() {
        let windows = block_windows(10, 7, 4, 3);
        assert_eq!(windows.len(), 3 * 3);
        assert_eq!(windows[0], Window::new((0, 4), (0, 3)));
        assert_eq!(windows[2], Window::new((0, 4), (6, 7)));
        assert_eq!(windows[8], Window::new((8, 10), (6, 7)));

        let total: usize = windows.iter().map(Window::pixel_count).sum();
        assert_eq!(total, 70);
    }

    #[test]
    fn test_strip_windows() {
        let windows = block_windows(5, 5, 2, 5);
        assert_eq!(
            windows,
            vec![
                Window::new((0, 2), (0, 5)),
                Window::new((2, 4), (0, 5)),
                Window::new((4, 5), (0, 5)),
            ]
        );
    }

    #[test]
    fn test_empty_raster_has_no_blocks() {
        assert!(block_windows(0, 10, 4, 4).is_empty());
    }
}
