use image::{Rgb, RgbImage};

use crate::font::{self, GLYPH_H};
use crate::{Classification, Detection};

const LINE_THICKNESS: i32 = 2;
const TEXT_SCALE: i32 = 2;
const TEXT_GAP: i32 = 10;

/// Draws a class-colored box and caption for every recognised detection.
/// Unknown classifications are left untouched; boxes are clamped to the frame.
pub fn annotate(frame: &mut RgbImage, items: &[(Detection, Classification)]) {
    for (det, class) in items {
        let (Some(color), Some(text)) = (class.color(), class.display_text()) else {
            continue;
        };
        let Some(b) = det.bbox.clamp_to(frame.width(), frame.height()) else {
            continue;
        };

        draw_rect(frame, b.x1, b.y1, b.x2, b.y2, color);

        let text_y = (b.y1 - TEXT_GAP - GLYPH_H * TEXT_SCALE).max(0);
        font::draw_text(frame, b.x1, text_y, text, TEXT_SCALE, color);
    }
}

fn draw_rect(img: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let mut put = |x: i32, y: i32| {
        if x >= 0 && y >= 0 && x < w && y < h {
            img.put_pixel(x as u32, y as u32, color);
        }
    };

    for t in 0..LINE_THICKNESS {
        for x in left..=right {
            put(x, top + t);
            put(x, bottom - t);
        }
        for y in top..=bottom {
            put(left + t, y);
            put(right - t, y);
        }
    }
}
