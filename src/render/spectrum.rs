// src/render/spectrum.rs
//! Spectrum bars: vertical (stereo, downmix) and horizontal (tornado, mirror).
//!
//! Bars are drawn incrementally: only the part of a bar that shrank and the
//! cap line that moved are erased, everything else is drawn over. A state
//! that needs clearing starts from a blank display instead.

use super::Layout;
use super::canvas::{Color, DrawCommand};
use crate::meter::{BarState, MeterState};

/// Highest display level a bar can reach.
const TOP_LEVEL: i32 = 31;

/// Where a bar lives and which way it grows.
#[derive(Debug, Clone, Copy)]
enum Track {
    /// Grows upwards from `base`.
    Up { x: i32, w: i32, base: i32 },
    /// Grows sideways from `anchor`; `dir` is +1 for right, -1 for left.
    Sideways { y: i32, h: i32, anchor: i32, dir: i32 },
}

impl Track {
    /// Rectangle covering lengths `from..to` measured from the bar's origin.
    fn span(&self, from: i32, to: i32, color: Color) -> DrawCommand {
        let len = to - from;
        match *self {
            Track::Up { x, w, base } => DrawCommand::FillRect {
                x,
                y: base - to,
                w,
                h: len,
                color,
            },
            Track::Sideways { y, h, anchor, dir } => DrawCommand::FillRect {
                x: if dir > 0 { anchor + from } else { anchor - to },
                y,
                w: len,
                h,
                color,
            },
        }
    }

    /// One pixel thick marker at length `at`.
    fn mark(&self, at: i32, color: Color) -> DrawCommand {
        match *self {
            Track::Up { x, w, base } => DrawCommand::FillRect {
                x,
                y: base - at,
                w,
                h: 1,
                color,
            },
            Track::Sideways { y, h, anchor, dir } => DrawCommand::FillRect {
                x: anchor + dir * at,
                y,
                w: 1,
                h,
                color,
            },
        }
    }

    /// `extent` is the length of a bar at the top level.
    fn draw(&self, bar: &BarState, extent: i32, fresh: bool, out: &mut Vec<DrawCommand>) {
        let len = |level: u8| i32::from(level) * extent / TOP_LEVEL;
        let now = len(bar.level);
        if !fresh {
            let before = len(bar.last_level);
            if before > now {
                out.push(self.span(now, before, Color::Off));
            }
            if bar.last_cap > 0 && bar.last_cap != bar.cap {
                out.push(self.mark(len(bar.last_cap), Color::Off));
            }
        }
        if now > 0 {
            out.push(self.span(0, now, Color::On));
        }
        if bar.cap > 0 {
            out.push(self.mark(len(bar.cap), Color::On));
        }
    }
}

fn start(state: &MeterState) -> Vec<DrawCommand> {
    if state.needs_clear {
        vec![DrawCommand::Clear]
    } else {
        Vec::new()
    }
}

/// Two banks of vertical bars side by side.
pub fn stereo(state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
    let wsa = layout.width - 2;
    let hsa = layout.height - 4;
    let half = (wsa + 2) / 2;
    let mut out = start(state);

    for (ch, bars) in state.bars.iter().enumerate() {
        if bars.is_empty() {
            continue;
        }
        let ofs = 2 + ch as i32 * half;
        let wbin = ((half - 2) / bars.len() as i32).max(2);
        for (i, bar) in bars.iter().enumerate() {
            let track = Track::Up {
                x: ofs + i as i32 * wbin,
                w: wbin - 1,
                base: hsa,
            };
            track.draw(bar, hsa, state.needs_clear, &mut out);
        }
    }
    out
}

/// One bank of wider vertical bars on a baseline.
pub fn downmix(state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
    let wsa = layout.width - 2;
    let hsa = layout.height - 4;
    let bars = &state.bars[0];
    let wbin = f64::from(wsa) / (bars.len() + 1) as f64;
    let ofs = (wbin * 0.75) as i32;
    let mut out = start(state);

    for (i, bar) in bars.iter().enumerate() {
        let track = Track::Up {
            x: ofs + (i as f64 * wbin) as i32,
            w: wbin as i32 - 1,
            base: hsa,
        };
        track.draw(bar, hsa, state.needs_clear, &mut out);
    }

    let width = (wbin * bars.len() as f64) as i32;
    out.push(DrawCommand::FillRect {
        x: ofs - 1,
        y: hsa,
        w: width,
        h: 1,
        color: Color::Off,
    });
    out.push(DrawCommand::FillRect {
        x: ofs - 1,
        y: hsa + 1,
        w: width,
        h: 1,
        color: Color::On,
    });
    out
}

fn sideways(
    state: &MeterState,
    layout: &Layout,
    top: i32,
    anchor_for: impl Fn(usize) -> (i32, i32),
) -> Vec<DrawCommand> {
    let wsa = (layout.width - 6) / 2;
    let hsa = layout.height - 2;
    let mut out = start(state);

    for (ch, bars) in state.bars.iter().enumerate() {
        if bars.is_empty() {
            continue;
        }
        let hbin = f64::from(hsa) / bars.len() as f64;
        let (anchor, dir) = anchor_for(ch);
        for (i, bar) in bars.iter().enumerate() {
            let track = Track::Sideways {
                y: top + (i as f64 * hbin) as i32,
                h: hbin as i32 - 1,
                anchor,
                dir,
            };
            track.draw(bar, wsa, state.needs_clear, &mut out);
        }
    }
    out
}

/// Bars grow outwards from the centre line: left channel to the left.
pub fn tornado(state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
    let wsa = (layout.width - 6) / 2;
    sideways(state, layout, 2, |ch| if ch == 0 { (wsa - 1, -1) } else { (wsa + 1, 1) })
}

/// Bars grow inwards from both edges.
pub fn mirror(state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
    let right = layout.width - 2;
    sideways(state, layout, 1, |ch| if ch == 0 { (2, 1) } else { (right, -1) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::canvas::{Canvas, Framebuffer};

    fn bars(levels: &[u8]) -> Vec<BarState> {
        levels
            .iter()
            .map(|&l| BarState {
                level: l,
                cap: l,
                ..BarState::default()
            })
            .collect()
    }

    fn state(left: &[u8], right: &[u8]) -> MeterState {
        MeterState {
            bars: [bars(left), bars(right)],
            ..MeterState::neutral()
        }
    }

    #[test]
    fn full_bar_reaches_the_top() {
        let mut fb = Framebuffer::new(128, 64);
        let s = state(&[31; 12], &[0; 12]);
        fb.apply(&stereo(&s, &Layout::default()));
        // first bar spans x 2..6, top row at hsa - 60 = 0
        assert!(fb.get(2, 0));
        assert!(fb.get(5, 59));
        assert!(!fb.get(6, 30));
        // right channel empty
        assert!(!fb.get(70, 50));
    }

    #[test]
    fn shrinking_bar_is_erased() {
        let mut fb = Framebuffer::new(128, 64);
        let layout = Layout::default();
        let mut s = state(&[20; 12], &[20; 12]);
        fb.apply(&stereo(&s, &layout));
        assert!(fb.get(3, 30));

        s.needs_clear = false;
        for bar in s.bars.iter_mut().flatten() {
            bar.push(2);
        }
        fb.apply(&stereo(&s, &layout));
        // bar body gone, cap one level lower still shown
        assert!(!fb.get(3, 30));
        assert!(fb.get(3, 60 - 19 * 60 / 31));
        assert!(!fb.get(3, 60 - 20 * 60 / 31));
        assert!(fb.get(3, 57));
    }

    #[test]
    fn tornado_grows_from_centre() {
        let mut fb = Framebuffer::new(128, 64);
        fb.apply(&tornado(&state(&[31; 12], &[31; 12]), &Layout::default()));
        // wsa = 61: left bank ends at 59, right bank starts at 62
        assert!(fb.get(59, 3));
        assert!(fb.get(1, 3));
        assert!(fb.get(62, 3));
        assert!(!fb.get(60, 3));
    }

    #[test]
    fn mirror_grows_from_edges() {
        let mut fb = Framebuffer::new(128, 64);
        fb.apply(&mirror(&state(&[4; 12], &[4; 12]), &Layout::default()));
        assert!(fb.get(2, 2));
        assert!(fb.get(125, 2));
        assert!(!fb.get(64, 2));
    }

    #[test]
    fn downmix_draws_baseline() {
        let mut fb = Framebuffer::new(128, 64);
        let s = MeterState {
            bars: [bars(&[0; 12]), Vec::new()],
            ..MeterState::neutral()
        };
        fb.apply(&downmix(&s, &Layout::default()));
        assert!(fb.get(20, 61));
        assert!(!fb.get(20, 30));
    }
}
