// src/render/legend.rs
//! Small text legends printed on the meter faces.

use super::canvas::{Color, DrawCommand};

pub const GLYPH_W: i32 = 5;
pub const GLYPH_H: i32 = 7;
const ADVANCE: i32 = GLYPH_W + 1;

/// 5x7 glyphs, one byte per row, leftmost pixel in the high bit.
fn glyph(ch: char) -> Option<[u8; 7]> {
    Some(match ch {
        'L' => [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0xf8],
        'R' => [0xf0, 0x88, 0x88, 0xf0, 0xa0, 0x90, 0x88],
        'M' => [0x88, 0xd8, 0xa8, 0xa8, 0x88, 0x88, 0x88],
        'V' => [0x88, 0x88, 0x88, 0x88, 0x50, 0x50, 0x20],
        'U' => [0x88, 0x88, 0x88, 0x88, 0x88, 0x88, 0x70],
        _ => return None,
    })
}

pub fn width(text: &str) -> i32 {
    (text.chars().count() as i32 * ADVANCE - 1).max(0)
}

/// One bitmap per known character, top-left at `(x, y)`. Unknown characters
/// leave a gap.
pub fn text(text: &str, x: i32, y: i32, out: &mut Vec<DrawCommand>) {
    for (i, ch) in text.chars().enumerate() {
        if let Some(rows) = glyph(ch) {
            out.push(DrawCommand::Bitmap {
                x: x + i as i32 * ADVANCE,
                y,
                w: GLYPH_W,
                h: GLYPH_H,
                bits: rows.to_vec(),
                color: Color::On,
            });
        }
    }
}
