// src/render/peak.rs
//! Horizontal segmented peak meter.

use super::canvas::{Color, DrawCommand};
use super::{Layout, legend};
use crate::meter::{BarState, MeterState, PEAK_BRACKETS};

const FIRST_SEGMENT_X: i32 = 15;

/// Left edge and width of each segment. Segments below 0 dB are narrow.
fn segments() -> impl Iterator<Item = (i32, i32)> {
    PEAK_BRACKETS.iter().scan(FIRST_SEGMENT_X, |x, &db| {
        let (advance, width) = if db < 0 { (5, 2) } else { (7, 4) };
        let here = *x;
        *x += advance;
        Some((here, width))
    })
}

fn row(bar: &BarState, label: &str, y: i32, h: i32, out: &mut Vec<DrawCommand>) {
    let label_x = (FIRST_SEGMENT_X - legend::width(label)) / 2;
    legend::text(label, label_x, y + (h - legend::GLYPH_H) / 2, out);
    for (i, (x, w)) in segments().enumerate() {
        let i = i as u8;
        // unlit scale mark
        out.push(DrawCommand::FillRect {
            x,
            y: y + h + 1,
            w,
            h: 1,
            color: Color::On,
        });
        if i < bar.level {
            out.push(DrawCommand::FillRect {
                x,
                y,
                w,
                h,
                color: Color::On,
            });
        } else if bar.cap > bar.level && i == bar.cap - 1 {
            out.push(DrawCommand::FillRect {
                x,
                y: y + h / 3,
                w,
                h: h - 2 * (h / 3),
                color: Color::On,
            });
        }
    }
}

fn scaled(v: i32, layout: &Layout) -> i32 {
    v * layout.height / 64
}

/// One row per channel.
pub fn stereo(state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
    let h = scaled(17, layout);
    let mut out = vec![DrawCommand::Clear];
    let rows = [("L", scaled(7, layout)), ("R", scaled(40, layout))];
    for (bar, (label, y)) in state.peak.iter().zip(rows) {
        row(bar, label, y, h, &mut out);
    }
    out
}

/// A single tall row for the averaged channels.
pub fn downmix(state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
    let mut out = vec![DrawCommand::Clear];
    row(&state.peak[0], "M", scaled(20, layout), scaled(36, layout), &mut out);
    out
}
