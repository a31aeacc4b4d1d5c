//! Pixel painting primitives for the overlay frame.
//!
//! Everything here operates on an `RgbaImage` frame buffer with alpha
//! blending and clamps to the frame bounds, so callers never need to
//! pre-clip rectangles that hang off the screen edge. Text is rendered from
//! the 8x8 bitmap font, scaled by integer factors.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};

use crate::overlay::registry::Rgb;

/// Glyph cell edge in the base bitmap font.
pub const GLYPH_SIZE: u32 = 8;

pub fn rgba(color: Rgb, alpha: u8) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, alpha])
}

/// Source-over blend of `src` onto `dst`.
fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let channel = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([
        channel(dst[0], src[0]),
        channel(dst[1], src[1]),
        channel(dst[2], src[2]),
        out_a,
    ])
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

/// Fill `[x0,x1] x [y0,y1]` (inclusive corners, any order) with `color`,
/// alpha-blended, clipped to the frame.
pub fn fill_rect_alpha(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let min_x = clamp_i32(x0.min(x1), 0, img.width() as i32 - 1);
    let max_x = clamp_i32(x0.max(x1), 0, img.width() as i32 - 1);
    let min_y = clamp_i32(y0.min(y1), 0, img.height() as i32 - 1);
    let max_y = clamp_i32(y0.max(y1), 0, img.height() as i32 - 1);
    // Fully off-frame rectangles clamp to a degenerate edge strip; reject
    // them instead of smearing the border.
    if x0.max(x1) < 0
        || y0.max(y1) < 0
        || x0.min(x1) >= img.width() as i32
        || y0.min(y1) >= img.height() as i32
    {
        return;
    }
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dst = *img.get_pixel(x as u32, y as u32);
            img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
        }
    }
}

/// Stroke the border of a rectangle with the given stroke width, drawing
/// four filled bands just inside the given edges.
pub fn draw_rect_outline(
    img: &mut RgbaImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgba<u8>,
    stroke: u32,
) {
    if right <= left || bottom <= top {
        return;
    }
    let s = stroke.max(1) as i32;
    // Top and bottom bands span the full width; side bands fill between.
    fill_rect_alpha(img, left, top, right - 1, top + s - 1, color);
    fill_rect_alpha(img, left, bottom - s, right - 1, bottom - 1, color);
    fill_rect_alpha(img, left, top + s, left + s - 1, bottom - s - 1, color);
    fill_rect_alpha(img, right - s, top + s, right - 1, bottom - s - 1, color);
}

/// Pixel width of `text` at the given glyph scale.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_SIZE * scale.max(1)
}

/// Pixel height of a single text line at the given glyph scale.
pub fn text_height(scale: u32) -> u32 {
    GLYPH_SIZE * scale.max(1)
}

/// Draw one line of text with its top-left corner at `(x, y)`.
///
/// Characters without a bitmap glyph render as blank cells; the cursor still
/// advances so layout stays stable.
pub fn draw_bitmap_text(
    img: &mut RgbaImage,
    x: i32,
    y: i32,
    text: &str,
    color: Rgba<u8>,
    scale: u32,
) {
    let scale_i = scale.max(1) as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        if let Some(glyph) = BASIC_FONTS.get(ch) {
            for (row_idx, row) in glyph.iter().enumerate() {
                let row_bits = *row;
                for col_idx in 0..GLYPH_SIZE as i32 {
                    if (row_bits >> col_idx) & 1 == 0 {
                        continue;
                    }
                    let px = cursor_x + col_idx * scale_i;
                    let py = y + row_idx as i32 * scale_i;
                    for sy in 0..scale_i {
                        for sx in 0..scale_i {
                            let tx = px + sx;
                            let ty = py + sy;
                            if tx >= 0
                                && ty >= 0
                                && tx < img.width() as i32
                                && ty < img.height() as i32
                            {
                                let dst = *img.get_pixel(tx as u32, ty as u32);
                                img.put_pixel(tx as u32, ty as u32, blend_pixel(dst, color));
                            }
                        }
                    }
                }
            }
        }
        cursor_x += GLYPH_SIZE as i32 * scale_i;
    }
}
