//! Region-to-color reduction over raw pixel buffers.
//!
//! [`average_region`] sums channel values over every pixel of an
//! aligned rectangle with a hand-unrolled inner loop that decodes
//! four pixels per iteration, then divides by the sample count. The
//! unroll is why [`crate::grab::geometry::clip_and_align`] reduces
//! rectangle widths to a multiple of 4 — an unaligned width would
//! read past the last pixel of a row.

use crate::types::{PixelFormat, Rect, Rgb};

/// Samples decoded per inner-loop iteration.
const UNROLL: usize = 4;

// ── AverageResult ────────────────────────────────────────────────

/// Result of one region reduction.
///
/// `samples == 0` means the rectangle contributed no pixels (fully
/// off-surface regions are expected); the color is black in that
/// case and the caller decides what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AverageResult {
    pub color: Rgb,
    pub samples: usize,
}

// ── RGB565 decode ────────────────────────────────────────────────

#[inline(always)]
fn r565(buf: &[u8], i: usize) -> u64 {
    (buf[i + 1] & 0xF8) as u64
}

#[inline(always)]
fn g565(buf: &[u8], i: usize) -> u64 {
    ((((buf[i + 1] << 3) & 0x38) | ((buf[i] >> 5) & 0x07)) << 2) as u64
}

#[inline(always)]
fn b565(buf: &[u8], i: usize) -> u64 {
    ((buf[i] & 0x1F) << 3) as u64
}

// ── average_region ───────────────────────────────────────────────

/// Reduce `rect` over `buffer` to one averaged color.
///
/// `pitch` is the byte width of one row of the *source surface*, not
/// of the rectangle. `rect` must already be clipped to the surface
/// and width-aligned to 4.
///
/// # Panics
///
/// Panics when the rectangle width is not a multiple of 4 or the
/// rectangle has negative coordinates — both are programmer errors;
/// rectangles must come through `clip_and_align` first.
pub fn average_region(
    buffer: &[u8],
    format: PixelFormat,
    pitch: usize,
    rect: Rect,
) -> AverageResult {
    assert!(
        rect.width % 4 == 0,
        "average rect width must be aligned by 4 pixels"
    );
    assert!(
        rect.x >= 0 && rect.y >= 0,
        "average rect must be clipped to the surface"
    );

    let (x, y) = (rect.x as usize, rect.y as usize);
    let (width, height) = (rect.width.max(0) as usize, rect.height.max(0) as usize);
    let bpp = format.bytes_per_pixel();

    let mut r: u64 = 0;
    let mut g: u64 = 0;
    let mut b: u64 = 0;
    let mut count: usize = 0;

    match format {
        PixelFormat::Rgb565 => {
            for row in 0..height {
                let mut i = pitch * (y + row) + x * bpp;
                let mut col = 0;
                while col < width {
                    b += b565(buffer, i) + b565(buffer, i + 2) + b565(buffer, i + 4) + b565(buffer, i + 6);
                    g += g565(buffer, i) + g565(buffer, i + 2) + g565(buffer, i + 4) + g565(buffer, i + 6);
                    r += r565(buffer, i) + r565(buffer, i + 2) + r565(buffer, i + 4) + r565(buffer, i + 6);
                    count += UNROLL;
                    i += bpp * UNROLL;
                    col += UNROLL;
                }
            }
        }
        _ => {
            // Byte offsets of (r, g, b) within one 4-byte pixel.
            let (ro, go, bo) = match format {
                PixelFormat::Argb => (2, 1, 0),
                PixelFormat::Abgr => (0, 1, 2),
                PixelFormat::Rgba => (3, 2, 1),
                PixelFormat::Bgra => (1, 2, 3),
                PixelFormat::Rgb565 => unreachable!(),
            };
            for row in 0..height {
                let mut i = pitch * (y + row) + x * bpp;
                let mut col = 0;
                while col < width {
                    r += (buffer[i + ro] as u64)
                        + (buffer[i + 4 + ro] as u64)
                        + (buffer[i + 8 + ro] as u64)
                        + (buffer[i + 12 + ro] as u64);
                    g += (buffer[i + go] as u64)
                        + (buffer[i + 4 + go] as u64)
                        + (buffer[i + 8 + go] as u64)
                        + (buffer[i + 12 + go] as u64);
                    b += (buffer[i + bo] as u64)
                        + (buffer[i + 4 + bo] as u64)
                        + (buffer[i + 8 + bo] as u64)
                        + (buffer[i + 12 + bo] as u64);
                    count += UNROLL;
                    i += bpp * UNROLL;
                    col += UNROLL;
                }
            }
        }
    }

    if count == 0 {
        return AverageResult {
            color: Rgb::BLACK,
            samples: 0,
        };
    }

    let mean = |sum: u64| ((sum as f64 / count as f64).round() as u64 & 0xFF) as u8;
    AverageResult {
        color: Rgb::new(mean(r), mean(g), mean(b)),
        samples: count,
    }
}

// ── average_colors ───────────────────────────────────────────────

/// Plain mean over an already-captured color list.
///
/// Used by the scheduler's average-across-all-regions policy.
pub fn average_colors(colors: &[Rgb]) -> Rgb {
    if colors.is_empty() {
        return Rgb::BLACK;
    }
    let mut r: u32 = 0;
    let mut g: u32 = 0;
    let mut b: u32 = 0;
    for c in colors {
        r += c.r as u32;
        g += c.g as u32;
        b += c.b as u32;
    }
    let n = colors.len() as u32;
    Rgb::new((r / n) as u8, (g / n) as u8, (b / n) as u8)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_argb_buffer() {
        let buf = vec![0xFA; 16];
        let res = average_region(&buf, PixelFormat::Argb, 16, Rect::new(0, 0, 4, 1));
        assert_eq!(res.color, Rgb::new(0xFA, 0xFA, 0xFA));
        assert_eq!(res.samples, 4);
    }

    #[test]
    fn uniform_fill_all_32bit_layouts() {
        let buf = vec![0x7C; 64];
        for format in [
            PixelFormat::Argb,
            PixelFormat::Abgr,
            PixelFormat::Rgba,
            PixelFormat::Bgra,
        ] {
            let res = average_region(&buf, format, 32, Rect::new(0, 0, 8, 2));
            assert_eq!(res.color, Rgb::new(0x7C, 0x7C, 0x7C), "{format:?}");
            assert_eq!(res.samples, 16);
        }
    }

    #[test]
    fn rgb565_bit_exact_decode() {
        // 0xFAFA decodes to exactly (248, 92, 208).
        let buf = vec![0xFA; 16];
        let res = average_region(&buf, PixelFormat::Rgb565, 16, Rect::new(0, 0, 8, 1));
        assert_eq!(res.color, Rgb::new(248, 92, 208));
        assert_eq!(res.samples, 8);
    }

    #[test]
    fn zero_height_yields_black_with_zero_samples() {
        let buf = vec![0xFF; 16];
        let res = average_region(&buf, PixelFormat::Argb, 16, Rect::new(0, 0, 4, 0));
        assert_eq!(res.color, Rgb::BLACK);
        assert_eq!(res.samples, 0);
    }

    #[test]
    fn channel_order_distinguishes_layouts() {
        // One BGRA pixel group: B=10, G=20, R=30, A=0xFF repeated.
        let mut buf = Vec::new();
        for _ in 0..4 {
            buf.extend_from_slice(&[10, 20, 30, 0xFF]);
        }
        let res = average_region(&buf, PixelFormat::Argb, 16, Rect::new(0, 0, 4, 1));
        assert_eq!(res.color, Rgb::new(30, 20, 10));

        let res = average_region(&buf, PixelFormat::Abgr, 16, Rect::new(0, 0, 4, 1));
        assert_eq!(res.color, Rgb::new(10, 20, 30));
    }

    #[test]
    fn respects_pitch_and_offset() {
        // 8x2 ARGB surface; right half of row 1 is white, rest black.
        let pitch = 8 * 4;
        let mut buf = vec![0u8; pitch * 2];
        for px in 4..8 {
            let base = pitch + px * 4;
            buf[base..base + 4].copy_from_slice(&[0xFF; 4]);
        }
        let res = average_region(&buf, PixelFormat::Argb, pitch, Rect::new(4, 1, 4, 1));
        assert_eq!(res.color, Rgb::new(0xFF, 0xFF, 0xFF));
        let res = average_region(&buf, PixelFormat::Argb, pitch, Rect::new(0, 0, 4, 1));
        assert_eq!(res.color, Rgb::BLACK);
        assert_eq!(res.samples, 4);
    }

    #[test]
    #[should_panic(expected = "aligned by 4")]
    fn unaligned_width_panics() {
        let buf = vec![0u8; 64];
        average_region(&buf, PixelFormat::Argb, 32, Rect::new(0, 0, 3, 1));
    }

    #[test]
    fn mean_of_color_list() {
        let colors = [Rgb::new(0, 0, 0), Rgb::new(200, 100, 50)];
        assert_eq!(average_colors(&colors), Rgb::new(100, 50, 25));
        assert_eq!(average_colors(&[]), Rgb::BLACK);
    }
}
