//! Clipping and alignment of capture rectangles.
//!
//! Requested regions may hang off the surface (the user drags them
//! freely); before averaging, each rectangle is intersected with the
//! surface bounds and its width reduced to the nearest multiple of 4.
//! The alignment is a correctness requirement of the unrolled
//! averaging loop, not a performance nicety.

use crate::types::Rect;

/// Clip `rect` against a `surface_width` x `surface_height` surface
/// and align the resulting width down to a multiple of 4.
///
/// Returns `None` when nothing remains to sample: an empty
/// intersection, or one whose aligned width or height reaches zero.
pub fn clip_and_align(surface_width: u32, surface_height: u32, rect: Rect) -> Option<Rect> {
    let mut x = rect.x;
    let mut y = rect.y;
    let mut width = rect.width;
    let mut height = rect.height;

    // Ignore the part of the region that is left of / above the surface.
    if x < 0 {
        width += x;
        x = 0;
    }
    if y < 0 {
        height += y;
        y = 0;
    }

    let sw = surface_width as i32;
    let sh = surface_height as i32;

    if x + width > sw {
        width -= (x + width) - sw;
    }
    if y + height > sh {
        height -= (y + height) - sh;
    }

    // Align width down to the averaging unroll factor.
    width -= width.rem_euclid(4);

    if width <= 0 || height <= 0 {
        return None;
    }

    Some(Rect::new(x, y, width, height))
}

// ── Tests ────────────────────────────────────────────────────────
