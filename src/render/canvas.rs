// src/render/canvas.rs
//! Drawing surface abstraction and an in-memory 1-bit implementation.

use std::sync::{Arc, Mutex, MutexGuard};

/// Monochrome pixel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    On,
    Off,
}

/// One drawing primitive, produced by the render adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCommand {
    Clear,
    FillRect {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        color: Color,
    },
    Line {
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        color: Color,
    },
    Pixel {
        x: i32,
        y: i32,
        color: Color,
    },
    /// Row-major, most significant bit first, `(w + 7) / 8` bytes per row.
    /// Set bits are drawn in `color`, clear bits are left alone.
    Bitmap {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        bits: Vec<u8>,
        color: Color,
    },
}

/// Something pixels can be drawn on. Out-of-range coordinates are clipped.
pub trait Canvas {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn set_pixel(&mut self, x: i32, y: i32, color: Color);

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: Color) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w).min(self.width());
        let y1 = (y + h).min(self.height());
        for py in y0..y1 {
            for px in x0..x1 {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Bresenham line, both end points included.
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.set_pixel(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn draw_bitmap(&mut self, x: i32, y: i32, w: i32, h: i32, bits: &[u8], color: Color) {
        let stride = ((w + 7) / 8) as usize;
        for row in 0..h {
            for col in 0..w {
                let byte = bits
                    .get(row as usize * stride + col as usize / 8)
                    .copied()
                    .unwrap_or(0);
                if byte & (0x80 >> (col % 8)) != 0 {
                    self.set_pixel(x + col, y + row, color);
                }
            }
        }
    }

    fn clear(&mut self) {
        let (w, h) = (self.width(), self.height());
        self.fill_rect(0, 0, w, h, Color::Off);
    }

    fn apply(&mut self, commands: &[DrawCommand]) {
        for cmd in commands {
            draw(self, cmd);
        }
    }
}

fn draw<C: Canvas + ?Sized>(canvas: &mut C, cmd: &DrawCommand) {
    match cmd {
        DrawCommand::Clear => canvas.clear(),
        DrawCommand::FillRect { x, y, w, h, color } => canvas.fill_rect(*x, *y, *w, *h, *color),
        DrawCommand::Line {
            x0,
            y0,
            x1,
            y1,
            color,
        } => canvas.draw_line(*x0, *y0, *x1, *y1, *color),
        DrawCommand::Pixel { x, y, color } => canvas.set_pixel(*x, *y, *color),
        DrawCommand::Bitmap {
            x,
            y,
            w,
            h,
            bits,
            color,
        } => canvas.draw_bitmap(*x, *y, *w, *h, bits, *color),
    }
}

/// A packed 1-bit frame buffer, one bit per pixel, rows padded to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: i32,
    height: i32,
    stride: usize,
    bits: Vec<u8>,
    generation: u64,
}

impl Framebuffer {
    pub fn new(width: u16, height: u16) -> Self {
        let stride = (usize::from(width) + 7) / 8;
        Self {
            width: i32::from(width),
            height: i32::from(height),
            stride,
            bits: vec![0; stride * usize::from(height)],
            generation: 0,
        }
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return false;
        }
        let byte = self.bits[y as usize * self.stride + x as usize / 8];
        byte & (0x80 >> (x % 8)) != 0
    }

    pub fn lit(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Bumped on every `apply`, so viewers can tell a new frame arrived.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Canvas for Framebuffer {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let idx = y as usize * self.stride + x as usize / 8;
        let mask = 0x80 >> (x % 8);
        match color {
            Color::On => self.bits[idx] |= mask,
            Color::Off => self.bits[idx] &= !mask,
        }
    }

    fn clear(&mut self) {
        self.bits.fill(0);
    }

    fn apply(&mut self, commands: &[DrawCommand]) {
        for cmd in commands {
            draw(self, cmd);
        }
        self.generation += 1;
    }
}

/// A framebuffer shared between the polling thread and a viewer.
#[derive(Debug, Clone)]
pub struct SharedCanvas(Arc<Mutex<Framebuffer>>);

impl SharedCanvas {
    pub fn new(width: u16, height: u16) -> Self {
        Self(Arc::new(Mutex::new(Framebuffer::new(width, height))))
    }

    pub fn lock(&self) -> MutexGuard<'_, Framebuffer> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Canvas for SharedCanvas {
    fn width(&self) -> i32 {
        self.lock().width()
    }

    fn height(&self) -> i32 {
        self.lock().height()
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.lock().set_pixel(x, y, color);
    }

    fn apply(&mut self, commands: &[DrawCommand]) {
        self.lock().apply(commands);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_rect_clips_to_bounds() {
        let mut fb = Framebuffer::new(8, 4);
        fb.fill_rect(-2, -2, 4, 4, Color::On);
        assert_eq!(fb.lit(), 4);
        assert!(fb.get(0, 0) && fb.get(1, 1));
        assert!(!fb.get(2, 0));
    }

    #[test]
    fn line_includes_both_ends() {
        let mut fb = Framebuffer::new(16, 16);
        fb.draw_line(1, 1, 10, 4, Color::On);
        assert!(fb.get(1, 1));
        assert!(fb.get(10, 4));
        assert_eq!(fb.lit(), 10);
    }

    #[test]
    fn bitmap_sets_only_marked_bits() {
        let mut fb = Framebuffer::new(16, 2);
        fb.draw_bitmap(0, 0, 9, 2, &[0b1000_0001, 0b1000_0000, 0, 0], Color::On);
        assert!(fb.get(0, 0));
        assert!(fb.get(7, 0));
        assert!(fb.get(8, 0));
        assert_eq!(fb.lit(), 3);
    }

    #[test]
    fn apply_runs_commands_in_order() {
        let mut fb = Framebuffer::new(8, 8);
        fb.apply(&[
            DrawCommand::FillRect {
                x: 0,
                y: 0,
                w: 8,
                h: 8,
                color: Color::On,
            },
            DrawCommand::Pixel {
                x: 3,
                y: 3,
                color: Color::Off,
            },
        ]);
        assert_eq!(fb.lit(), 63);
        assert_eq!(fb.generation(), 1);
        fb.apply(&[DrawCommand::Clear]);
        assert_eq!(fb.lit(), 0);
    }

    #[test]
    fn shared_canvas_draws_into_shared_buffer() {
        let shared = SharedCanvas::new(8, 8);
        let mut writer = shared.clone();
        writer.apply(&[DrawCommand::Line {
            x0: 0,
            y0: 0,
            x1: 7,
            y1: 0,
            color: Color::On,
        }]);
        assert_eq!(shared.lock().lit(), 8);
        assert_eq!(writer.width(), 8);
    }
}
