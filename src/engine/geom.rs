// src/engine/geom.rs
use super::TileBounds;

#[inline]
pub(crate) fn ceil_div(a: usize, b: usize) -> usize {
    if b == 0 {
        return 0;
    }
    (a + b - 1) / b
}

/// Smallest `c` with `c * c >= n`.
#[inline]
pub(crate) fn ceil_sqrt(n: usize) -> usize {
    let mut c = (n as f64).sqrt() as usize;
    while c * c < n {
        c += 1;
    }
    while c > 0 && (c - 1) * (c - 1) >= n {
        c -= 1;
    }
    c
}

/// Clip a signed span `[lo, hi)` to `[0, limit)`.
#[inline]
pub(crate) fn clip_span(lo: i64, hi: i64, limit: usize) -> (usize, usize) {
    let lo = lo.clamp(0, limit as i64) as usize;
    let hi = hi.clamp(0, limit as i64) as usize;
    (lo, hi.max(lo))
}

/// Grow a rectangle by `pad_x` / `pad_y` on every side, clamped to `w x h`.
#[inline]
pub(crate) fn pad_and_clamp_rect(r: TileBounds, pad_x: usize, pad_y: usize, w: usize, h: usize) -> TileBounds {
    // Left/top after padding (saturate at 0)
    let x0 = r.x0.saturating_sub(pad_x).min(w);
    let y0 = r.y0.saturating_sub(pad_y).min(h);

    // Right/bottom after padding, clamped to image bounds
    let x1 = r.x1.saturating_add(pad_x).min(w);
    let y1 = r.y1.saturating_add(pad_y).min(h);

    if x1 <= x0 || y1 <= y0 {
        return TileBounds::empty();
    }
    TileBounds { x0, x1, y0, y1 }
}
