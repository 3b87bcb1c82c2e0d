// src/render/vu.rs
//! Analogue style VU needles.

use super::canvas::{Color, DrawCommand};
use super::{Layout, legend};
use crate::meter::MeterState;

/// Widest deflection either side of vertical, in degrees.
const MAX_SWEEP: f64 = 60.0;
const DIAL_STEP_DEG: f64 = 10.0;

struct Dial {
    pivot_x: i32,
    pivot_y: i32,
    radius: f64,
    sweep: f64,
}

impl Dial {
    fn new(pivot_x: i32, pivot_y: i32, radius: f64, reach: i32) -> Self {
        // Keep the needle tip within `reach` pixels of the pivot horizontally.
        let sweep = (f64::from(reach - 2) / radius)
            .clamp(0.0, 1.0)
            .asin()
            .to_degrees()
            .min(MAX_SWEEP);
        Self {
            pivot_x,
            pivot_y,
            radius,
            sweep,
        }
    }

    fn point(&self, angle: f64, radius: f64) -> (i32, i32) {
        let a = angle.to_radians();
        (
            (f64::from(self.pivot_x) + a.sin() * radius) as i32,
            (f64::from(self.pivot_y) - a.cos() * radius) as i32,
        )
    }

    fn scale(&self, out: &mut Vec<DrawCommand>) {
        let mut angle = -self.sweep;
        while angle <= self.sweep + f64::EPSILON {
            let (x0, y0) = self.point(angle, self.radius + 1.0);
            let (x1, y1) = self.point(angle, self.radius + 3.0);
            out.push(DrawCommand::Line {
                x0,
                y0,
                x1,
                y1,
                color: Color::On,
            });
            let minor = angle + DIAL_STEP_DEG / 2.0;
            if minor <= self.sweep {
                let (x, y) = self.point(minor, self.radius + 2.0);
                out.push(DrawCommand::Pixel {
                    x,
                    y,
                    color: Color::On,
                });
            }
            angle += DIAL_STEP_DEG;
        }
    }

    /// "VU" printed on the face, under where the needle swings.
    fn legend(&self, layout: &Layout, out: &mut Vec<DrawCommand>) {
        let x = self.pivot_x - legend::width("VU") / 2;
        legend::text("VU", x, layout.height - 20, out);
    }

    /// A thick needle: three lit lines flanked by two dark ones.
    fn needle(&self, angle: Option<f64>, out: &mut Vec<DrawCommand>) {
        let angle = angle.unwrap_or(-self.sweep).clamp(-self.sweep, self.sweep);
        let (x1, y1) = self.point(angle, self.radius);
        for (dx, color) in [
            (-2, Color::Off),
            (-1, Color::On),
            (0, Color::On),
            (1, Color::On),
            (2, Color::Off),
        ] {
            out.push(DrawCommand::Line {
                x0: self.pivot_x + dx,
                y0: self.pivot_y,
                x1,
                y1,
                color,
            });
        }
    }

    fn hub(&self, layout: &Layout, out: &mut Vec<DrawCommand>) {
        out.push(DrawCommand::FillRect {
            x: self.pivot_x - 7,
            y: layout.height - 6,
            w: 15,
            h: 6,
            color: Color::Off,
        });
        out.push(DrawCommand::FillRect {
            x: self.pivot_x - 3,
            y: layout.height - 4,
            w: 7,
            h: 4,
            color: Color::On,
        });
    }
}

/// Two needles, one per channel, pivoting below the bottom edge.
pub fn stereo(state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
    let pivot_y = layout.height + 2;
    let radius = f64::from(pivot_y - 8);
    let quarter = layout.width / 4;
    let dials = [
        Dial::new(quarter, pivot_y, radius, quarter),
        Dial::new(quarter * 3, pivot_y, radius, quarter),
    ];

    let mut out = vec![DrawCommand::Clear];
    for (dial, needle) in dials.iter().zip(&state.needles) {
        dial.scale(&mut out);
        dial.legend(layout, &mut out);
        dial.needle(needle.damped, &mut out);
    }
    for dial in &dials {
        dial.hub(layout, &mut out);
    }
    out
}

/// One centred needle for the averaged channels.
pub fn downmix(state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
    let pivot_y = layout.height + 2;
    let radius = f64::from(pivot_y - 5);
    let dial = Dial::new(layout.width / 2, pivot_y, radius, layout.width / 2);

    let mut out = vec![DrawCommand::Clear];
    dial.scale(&mut out);
    dial.legend(layout, &mut out);
    dial.needle(state.needles[0].damped, &mut out);
    dial.hub(layout, &mut out);
    out
}
