// -----------------------------------------------------------------------------
// Shared canvas: RGB grid + monotonic version counter
// -----------------------------------------------------------------------------
//! The canvas is read by every worker and written only by the aggregator.
//!
//! Pixels sit behind a single `RwLock`, so a cell is never observed half
//! written and a batch of writes lands under one write guard. The version
//! counter is a separate atomic so workers can tag proposals without
//! touching the pixel lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::geom::clip_span;
use super::{CanvasError, Cell, FrameDimensions, Rgb, TileBounds};

/// Owned copy of a clipped sub-rectangle of the canvas.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CanvasView {
    /// Canvas coordinates of the top-left cell actually copied.
    pub origin: Cell,
    pub width: usize,
    pub height: usize,
    /// Row-major, `width * height` entries.
    pub pixels: Vec<Rgb>,
}

impl CanvasView {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Pixel at view-local coordinates.
    #[inline]
    pub fn get(&self, dx: usize, dy: usize) -> Option<Rgb> {
        if dx >= self.width || dy >= self.height {
            return None;
        }
        self.pixels.get(dy * self.width + dx).copied()
    }

    /// Pixel at canvas coordinates, if the view covers it.
    pub fn get_abs(&self, x: usize, y: usize) -> Option<Rgb> {
        let dx = x.checked_sub(self.origin.0)?;
        let dy = y.checked_sub(self.origin.1)?;
        self.get(dx, dy)
    }

    /// The rectangle this view covers, in canvas coordinates.
    pub fn bounds(&self) -> TileBounds {
        TileBounds {
            x0: self.origin.0,
            x1: self.origin.0 + self.width,
            y0: self.origin.1,
            y1: self.origin.1 + self.height,
        }
    }
}

pub struct Canvas {
    dims: FrameDimensions,
    pixels: RwLock<Vec<Rgb>>,
    age: AtomicU64,
}

impl Canvas {
    /// Allocate a black canvas. Dimensions are fixed for the canvas lifetime.
    pub fn new(dims: FrameDimensions) -> Self {
        Self {
            dims,
            pixels: RwLock::new(vec![[0, 0, 0]; dims.area()]),
            age: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn dimensions(&self) -> FrameDimensions {
        self.dims
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.dims.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.dims.height
    }

    #[inline]
    pub fn full_bounds(&self) -> TileBounds {
        TileBounds { x0: 0, x1: self.dims.width, y0: 0, y1: self.dims.height }
    }

    /// Copy the `w x h` rectangle at `(x0, y0)`, clipped to the canvas.
    ///
    /// Parts of the request outside the canvas are dropped, so a request
    /// entirely off-canvas returns an empty view.
    pub fn read(&self, x0: i64, y0: i64, w: usize, h: usize) -> CanvasView {
        let (cx0, cx1) = clip_span(x0, x0.saturating_add(saturating_i64(w)), self.dims.width);
        let (cy0, cy1) = clip_span(y0, y0.saturating_add(saturating_i64(h)), self.dims.height);
        let (vw, vh) = (cx1 - cx0, cy1 - cy0);
        if vw == 0 || vh == 0 {
            return CanvasView { origin: (cx0, cy0), ..Default::default() };
        }

        let mut out = Vec::with_capacity(vw * vh);
        {
            let px = self.pixels.read();
            for y in cy0..cy1 {
                let row = y * self.dims.width;
                out.extend_from_slice(&px[row + cx0..row + cx1]);
            }
        }
        CanvasView { origin: (cx0, cy0), width: vw, height: vh, pixels: out }
    }

    /// Copy the cells covered by `bounds`.
    #[inline]
    pub fn read_bounds(&self, bounds: &TileBounds) -> CanvasView {
        self.read(saturating_i64(bounds.x0), saturating_i64(bounds.y0), bounds.width(), bounds.height())
    }

    /// Square field of view of `radius` cells around `(x, y)`, clipped.
    pub fn read_around(&self, x: usize, y: usize, radius: usize) -> CanvasView {
        let fov = TileBounds {
            x0: x.saturating_sub(radius),
            x1: x.saturating_add(radius).saturating_add(1),
            y0: y.saturating_sub(radius),
            y1: y.saturating_add(radius).saturating_add(1),
        };
        self.read_bounds(&fov)
    }

    /// Single cell, `None` outside the canvas.
    pub fn get(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.dims.width || y >= self.dims.height {
            return None;
        }
        Some(self.pixels.read()[y * self.dims.width + x])
    }

    #[inline]
    fn check_bounds(&self, x: usize, y: usize) -> Result<usize, CanvasError> {
        if !self.full_bounds().contains(x, y) {
            return Err(CanvasError::OutOfBounds {
                x,
                y,
                width: self.dims.width,
                height: self.dims.height,
            });
        }
        Ok(y * self.dims.width + x)
    }

    /// Set one cell. Out-of-range coordinates are an error, never clamped.
    pub fn write(&self, x: usize, y: usize, color: Rgb) -> Result<(), CanvasError> {
        let i = self.check_bounds(x, y)?;
        self.pixels.write()[i] = color;
        Ok(())
    }

    /// Apply many writes under one guard.
    ///
    /// In-range writes are applied even when some entries are out of range;
    /// the out-of-range entries are returned as errors in input order.
    pub fn write_many(&self, writes: &[(Cell, Rgb)]) -> Vec<CanvasError> {
        let mut rejected = Vec::new();
        let mut px = self.pixels.write();
        for &((x, y), color) in writes {
            match self.check_bounds(x, y) {
                Ok(i) => px[i] = color,
                Err(e) => rejected.push(e),
            }
        }
        rejected
    }

    #[inline]
    pub fn age(&self) -> u64 {
        self.age.load(Ordering::Acquire)
    }

    /// Advance the version counter by one and return the new value.
    pub(crate) fn increment_age(&self) -> u64 {
        self.age.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Row-major RGB bytes of the whole canvas.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let px = self.pixels.read();
        let mut bytes = Vec::with_capacity(px.len() * 3);
        for p in px.iter() {
            bytes.extend_from_slice(p);
        }
        bytes
    }

    /// Write the canvas as a PNG.
    ///
    /// The pixels are copied out first, so encoding never holds the lock.
    pub fn export(&self, path: &Path) -> Result<(), CanvasError> {
        if self.dims.area() == 0 {
            return Err(CanvasError::EmptyCanvas);
        }
        let bytes = self.to_rgb_bytes();
        image::save_buffer_with_format(
            path,
            &bytes,
            self.dims.width as u32,
            self.dims.height as u32,
            image::ColorType::Rgb8,
            image::ImageFormat::Png,
        )?;
        Ok(())
    }

    /// Export into `dir` as `frame_{age}.png`, creating `dir` if needed.
    pub fn export_frame(&self, dir: &Path, age: u64, digits: usize) -> Result<PathBuf, CanvasError> {
        std::fs::create_dir_all(dir)
            .map_err(|source| CanvasError::Io { path: dir.to_path_buf(), source })?;
        let path = frame_path(dir, age, digits);
        self.export(&path)?;
        Ok(path)
    }
}

#[inline]
fn saturating_i64(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// `dir/frame_0007.png` for `age = 7, digits = 4`.
pub fn frame_path(dir: &Path, age: u64, digits: usize) -> PathBuf {
    dir.join(format!("frame_{:0width$}.png", age, width = digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(w: usize, h: usize) -> Canvas {
        Canvas::new(FrameDimensions { width: w, height: h })
    }

    #[test]
    fn test_write_then_read_cell() {
        let c = canvas(4, 4);
        c.write(1, 2, [10, 20, 30]).unwrap();
        assert_eq!(c.get(1, 2), Some([10, 20, 30]));
        let view = c.read(0, 0, 4, 4);
        assert_eq!(view.get(1, 2), Some([10, 20, 30]));
        assert_eq!(view.get_abs(1, 2), Some([10, 20, 30]));
    }

    #[test]
    fn test_write_out_of_bounds_is_rejected() {
        let c = canvas(4, 3);
        let err = c.write(4, 0, [1, 1, 1]).unwrap_err();
        assert!(matches!(err, CanvasError::OutOfBounds { x: 4, y: 0, width: 4, height: 3 }));
        assert!(c.write(0, 3, [1, 1, 1]).is_err());
        // nothing was clamped onto the edge
        assert_eq!(c.get(3, 0), Some([0, 0, 0]));
        assert_eq!(c.get(0, 2), Some([0, 0, 0]));
    }

    #[test]
    fn test_read_clips_at_border() {
        let c = canvas(5, 5);
        let view = c.read(3, 3, 4, 4);
        assert_eq!((view.width, view.height), (2, 2));
        assert_eq!(view.origin, (3, 3));
        assert_eq!(view.pixels.len(), 4);

        let view = c.read(-2, -1, 4, 3);
        assert_eq!((view.width, view.height), (2, 2));
        assert_eq!(view.origin, (0, 0));
    }

    #[test]
    fn test_read_fully_outside_is_empty() {
        let c = canvas(5, 5);
        assert!(c.read(10, 10, 3, 3).is_empty());
        assert!(c.read(-10, 0, 3, 3).is_empty());
        assert!(c.read(0, 0, 0, 3).is_empty());
    }

    #[test]
    fn test_read_around_clips_fov() {
        let c = canvas(10, 10);
        let fov = c.read_around(0, 0, 3);
        assert_eq!((fov.width, fov.height), (4, 4));
        let fov = c.read_around(5, 5, 3);
        assert_eq!((fov.width, fov.height), (7, 7));
        assert_eq!(fov.origin, (2, 2));
    }

    #[test]
    fn test_oversized_read_clips_instead_of_wrapping() {
        let c = canvas(4, 4);
        let view = c.read(0, 0, usize::MAX, 2);
        assert_eq!((view.width, view.height), (4, 2));
        let view = c.read(-3, 1, usize::MAX, usize::MAX);
        assert_eq!((view.width, view.height), (4, 3));
        assert_eq!(view.origin, (0, 1));

        let fov = c.read_around(1, 1, usize::MAX);
        assert_eq!((fov.width, fov.height), (4, 4));
        let fov = c.read_around(usize::MAX, 0, 1);
        assert!(fov.is_empty());
    }

    #[test]
    fn test_concurrent_reads_never_see_a_torn_cell() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;
        use std::thread;

        const BLACK: Rgb = [0, 0, 0];
        const WHITE: Rgb = [255, 255, 255];

        let c = Arc::new(canvas(16, 16));
        let done = Arc::new(AtomicBool::new(false));
        let cells: Vec<Cell> = (0..16).flat_map(|y| (0..16).map(move |x| (x, y))).collect();

        let writer = {
            let c = Arc::clone(&c);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..2_000 {
                    let color = if i % 2 == 0 { WHITE } else { BLACK };
                    let writes: Vec<_> = cells.iter().map(|&cell| (cell, color)).collect();
                    assert!(c.write_many(&writes).is_empty());
                }
                done.store(true, Ordering::Release);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|r| {
                let c = Arc::clone(&c);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let mut reads = 0usize;
                    while !done.load(Ordering::Acquire) || reads == 0 {
                        let view = c.read(r, r, 16, 16);
                        for px in &view.pixels {
                            assert!(*px == BLACK || *px == WHITE, "torn cell {px:?}");
                        }
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
    }

    #[test]
    fn test_write_many_keeps_in_range_writes() {
        let c = canvas(3, 3);
        let rejected = c.write_many(&[((0, 0), [9, 9, 9]), ((7, 7), [1, 1, 1]), ((2, 2), [5, 5, 5])]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(c.get(0, 0), Some([9, 9, 9]));
        assert_eq!(c.get(2, 2), Some([5, 5, 5]));
    }

    #[test]
    fn test_age_increments_by_one() {
        let c = canvas(2, 2);
        assert_eq!(c.age(), 0);
        assert_eq!(c.increment_age(), 1);
        assert_eq!(c.increment_age(), 2);
        assert_eq!(c.age(), 2);
    }

    #[test]
    fn test_frame_path_is_zero_padded() {
        let p = frame_path(Path::new("frames"), 7, 4);
        assert_eq!(p, Path::new("frames").join("frame_0007.png"));
        let p = frame_path(Path::new("frames"), 12345, 4);
        assert_eq!(p, Path::new("frames").join("frame_12345.png"));
    }

    #[test]
    fn test_export_frame_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let c = canvas(3, 2);
        c.write(2, 1, [255, 0, 0]).unwrap();
        let path = c.export_frame(&dir.path().join("frames"), 1, 4).unwrap();
        assert!(path.ends_with("frame_0001.png"));
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [255, 0, 0]);
    }

    #[test]
    fn test_export_empty_canvas_fails() {
        let dir = tempfile::tempdir().unwrap();
        let c = canvas(0, 4);
        assert!(matches!(c.export(&dir.path().join("x.png")), Err(CanvasError::EmptyCanvas)));
    }
}
