//! Shared types for the capture and device pipeline.
//!
//! These are the internal representations flowing between the grab
//! side (pixels in) and the device side (colors out): colors, capture
//! rectangles, pixel layouts and the per-cycle surface description.

// ── Rgb ──────────────────────────────────────────────────────────

/// A 24-bit RGB triple, 8 bits per channel.
///
/// Produced fresh on every capture cycle; immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// All channels off.
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

// ── Rect ─────────────────────────────────────────────────────────

/// A rectangle in source-surface coordinates.
///
/// Coordinates are signed: an interactively positioned region may
/// hang partially (or entirely) off the surface. Clipping happens in
/// [`crate::grab::geometry::clip_and_align`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge (exclusive).
    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

// ── Region ───────────────────────────────────────────────────────

/// One configured capture region, mapped to one LED.
///
/// Identity is the stable index within the scheduler's region set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Stable index; equals the LED index downstream.
    pub index: usize,
    /// Capture rectangle in surface coordinates.
    pub rect: Rect,
    /// Disabled regions always report black without being sampled.
    pub enabled: bool,
}

impl Region {
    /// Default rectangle for freshly appended regions.
    pub const DEFAULT_RECT: Rect = Rect::new(0, 0, 64, 64);

    pub fn new(index: usize) -> Self {
        Self {
            index,
            rect: Self::DEFAULT_RECT,
            enabled: true,
        }
    }
}

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a raw captured buffer.
///
/// The four 32-bit variants are named by channel order in memory,
/// lowest address first. `Rgb565` is the 16-bit packed layout used by
/// Linux framebuffer consoles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Argb,
    Abgr,
    Rgba,
    Bgra,
    Rgb565,
}

impl PixelFormat {
    /// Bytes consumed by one pixel in this layout.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            _ => 4,
        }
    }
}

// ── ScreenInfo ───────────────────────────────────────────────────

/// Geometry and depth of the source surface, re-queried every capture
/// cycle — the format may change between cycles and must not be
/// cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Reported color depth in bits.
    pub bits_per_pixel: u32,
}

impl ScreenInfo {
    /// Bytes per pixel for the reported depth.
    pub const fn bytes_per_pixel(&self) -> usize {
        ((self.bits_per_pixel + 7) >> 3) as usize
    }

    /// Size in bytes of one full frame at this geometry.
    pub const fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }

    /// Bytes per row of the source surface.
    pub const fn pitch(&self) -> usize {
        self.width as usize * self.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_edges() {
        let r = Rect::new(10, 20, 30, 40);
        assert_eq!(r.right(), 40);
        assert_eq!(r.bottom(), 60);
    }

    #[test]
    fn pixel_format_sizes() {
        assert_eq!(PixelFormat::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Argb.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Bgra.bytes_per_pixel(), 4);
    }

    #[test]
    fn screen_info_sizing() {
        let info = ScreenInfo {
            width: 320,
            height: 240,
            bits_per_pixel: 16,
        };
        assert_eq!(info.bytes_per_pixel(), 2);
        assert_eq!(info.pitch(), 640);
        assert_eq!(info.frame_size(), 320 * 240 * 2);
    }
}
