use serde::{Deserialize, Serialize};

/// Dimensions used when allocating the canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: usize,
    pub height: usize,
}

impl FrameDimensions {
    #[inline]
    pub fn area(&self) -> usize {
        self.width.saturating_mul(self.height)
    }
}

/// 8-bit RGB triplet.
pub type Rgb = [u8; 3];

/// A cell address in pixel space: (x, y).
pub type Cell = (usize, usize);

/// Half-open rectangle `[x0, x1) x [y0, y1)` in pixel space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileBounds {
    pub x0: usize,
    pub x1: usize,
    pub y0: usize,
    pub y1: usize,
}

impl TileBounds {
    #[inline]
    pub fn empty() -> Self {
        Self { x0: 0, x1: 0, y0: 0, y1: 0 }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    #[inline]
    pub fn origin(&self) -> Cell {
        (self.x0, self.y0)
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    /// Overlap of two rectangles; empty when they are disjoint.
    pub fn intersect(&self, other: &TileBounds) -> TileBounds {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x1 <= x0 || y1 <= y0 {
            return TileBounds::empty();
        }
        TileBounds { x0, x1, y0, y1 }
    }
}
