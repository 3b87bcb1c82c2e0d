// src/ui/widgets/display.rs
//! The emulated display, drawn with braille cells.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph},
};

use crate::render::{Canvas, Framebuffer};

/// Pixels per braille cell.
pub const CELL_WIDTH: i32 = 2;
pub const CELL_HEIGHT: i32 = 4;

/// Dot bit for pixel `(x, y)` inside a cell.
fn dot(x: i32, y: i32) -> u32 {
    match (x, y) {
        (0, 3) => 0x40,
        (1, 3) => 0x80,
        (0, y) => 1 << y,
        (_, y) => 1 << (y + 3),
    }
}

/// One string per row of cells, `U+2800` based.
pub fn braille_rows(fb: &Framebuffer) -> Vec<String> {
    let cols = (fb.width() + CELL_WIDTH - 1) / CELL_WIDTH;
    let rows = (fb.height() + CELL_HEIGHT - 1) / CELL_HEIGHT;
    (0..rows)
        .map(|row| {
            (0..cols)
                .map(|col| {
                    let mut bits = 0;
                    for dy in 0..CELL_HEIGHT {
                        for dx in 0..CELL_WIDTH {
                            if fb.get(col * CELL_WIDTH + dx, row * CELL_HEIGHT + dy) {
                                bits |= dot(dx, dy);
                            }
                        }
                    }
                    char::from_u32(0x2800 + bits).unwrap_or(' ')
                })
                .collect()
        })
        .collect()
}

/// Terminal cells needed to show `fb` inside a border.
pub fn display_size(fb: &Framebuffer) -> (u16, u16) {
    let cols = (fb.width() + CELL_WIDTH - 1) / CELL_WIDTH + 2;
    let rows = (fb.height() + CELL_HEIGHT - 1) / CELL_HEIGHT + 2;
    (cols as u16, rows as u16)
}

pub fn render_display(f: &mut Frame<'_>, area: Rect, fb: &Framebuffer, title: &str) {
    let lines: Vec<Line> = braille_rows(fb).into_iter().map(Line::from).collect();
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    f.render_widget(
        Paragraph::new(lines)
            .style(Style::default().fg(Color::Cyan))
            .block(block),
        area,
    );
}
