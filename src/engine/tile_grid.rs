// -----------------------------------------------------------------------------
// Tile grid (worker partition)
// -----------------------------------------------------------------------------

use super::geom::{ceil_div, ceil_sqrt, pad_and_clamp_rect};
use super::{FrameDimensions, TileBounds};

pub const DEFAULT_OVERLAP_RATIO: f64 = 0.4;

/// Overlapping rectangular tiles, one per worker, laid out on a
/// `cols x rows` grid in row-major worker order.
#[derive(Clone, Debug, PartialEq)]
pub struct TileGrid {
    pub cols: usize,
    pub rows: usize,
    pub tiles: Vec<TileBounds>,
}

impl TileGrid {
    /// Partition a `dims` canvas among `workers` workers.
    ///
    /// Base tiles are `ceil(W/cols) x ceil(H/rows)`; each is grown by
    /// `overlap_ratio` of its base size on every side and clipped to the
    /// canvas. When the last row is only partly filled, its last tile is
    /// stretched to the right edge so the union still covers the canvas.
    pub fn partition(workers: usize, dims: FrameDimensions, overlap_ratio: f64) -> Self {
        if workers == 0 {
            return Self { cols: 0, rows: 0, tiles: Vec::new() };
        }

        let cols = ceil_sqrt(workers);
        let rows = ceil_div(workers, cols);
        let (w, h) = (dims.width, dims.height);

        if w == 0 || h == 0 {
            return Self { cols, rows, tiles: vec![TileBounds::empty(); workers] };
        }

        let slice_w = ceil_div(w, cols).max(1);
        let slice_h = ceil_div(h, rows).max(1);
        let ratio = if overlap_ratio.is_finite() { overlap_ratio.max(0.0) } else { 0.0 };
        let pad_x = (slice_w as f64 * ratio) as usize;
        let pad_y = (slice_h as f64 * ratio) as usize;

        let last_row = rows - 1;
        let last_row_len = workers - last_row * cols;

        let tiles = (0..workers)
            .map(|i| {
                let col = i % cols;
                let row = i / cols;

                let x0 = col * slice_w;
                let y0 = row * slice_h;
                let mut x1 = (x0 + slice_w).min(w);
                let y1 = (y0 + slice_h).min(h);
                if row == last_row && col + 1 == last_row_len && last_row_len < cols {
                    x1 = w;
                }

                pad_and_clamp_rect(TileBounds { x0, x1, y0, y1 }, pad_x, pad_y, w, h)
            })
            .collect();

        Self { cols, rows, tiles }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    #[inline]
    pub fn bounds(&self, worker: usize) -> Option<TileBounds> {
        self.tiles.get(worker).copied()
    }

    /// Workers whose tile contains `(x, y)`.
    pub fn owners_of(&self, x: usize, y: usize) -> Vec<usize> {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.contains(x, y))
            .map(|(i, _)| i)
            .collect()
    }

    /// True when every cell of `dims` lies in at least one tile.
    pub fn covers(&self, dims: FrameDimensions) -> bool {
        (0..dims.height).all(|y| (0..dims.width).all(|x| self.tiles.iter().any(|t| t.contains(x, y))))
    }
}
