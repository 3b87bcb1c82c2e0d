// src/render/mod.rs
//! Turning meter state into draw commands.
//!
//! Every adapter is a pure function of the meter state and the display
//! layout. The dispatcher picks one per `(mode, downmix)` and hands the
//! commands to a [`Canvas`].

pub mod canvas;
pub mod legend;
pub mod peak;
pub mod spectrum;
pub mod vu;

pub use canvas::{Canvas, Color, DrawCommand, Framebuffer, SharedCanvas};

use crate::meter::{MeterFamily, MeterState};

/// Pixel size of the display area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: i32,
    pub height: i32,
}

impl Layout {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width: i32::from(width),
            height: i32::from(height),
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(128, 64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Adapter {
    StereoVu,
    DownmixVu,
    StereoPeak,
    DownmixPeak,
    StereoSpectrum,
    DownmixSpectrum,
    Tornado,
    Mirror,
}

impl Adapter {
    /// Which part of the meter state this adapter reads.
    pub fn family(self) -> MeterFamily {
        match self {
            Adapter::StereoVu | Adapter::DownmixVu => MeterFamily::Needle,
            Adapter::StereoPeak | Adapter::DownmixPeak => MeterFamily::Segments,
            Adapter::StereoSpectrum
            | Adapter::DownmixSpectrum
            | Adapter::Tornado
            | Adapter::Mirror => MeterFamily::Bars,
        }
    }

    pub fn is_downmix(self) -> bool {
        matches!(
            self,
            Adapter::DownmixVu | Adapter::DownmixPeak | Adapter::DownmixSpectrum
        )
    }

    pub fn render(self, state: &MeterState, layout: &Layout) -> Vec<DrawCommand> {
        match self {
            Adapter::StereoVu => vu::stereo(state, layout),
            Adapter::DownmixVu => vu::downmix(state, layout),
            Adapter::StereoPeak => peak::stereo(state, layout),
            Adapter::DownmixPeak => peak::downmix(state, layout),
            Adapter::StereoSpectrum => spectrum::stereo(state, layout),
            Adapter::DownmixSpectrum => spectrum::downmix(state, layout),
            Adapter::Tornado => spectrum::tornado(state, layout),
            Adapter::Mirror => spectrum::mirror(state, layout),
        }
    }
}

/// The adapter's resting frame: needles down, no bars.
pub fn neutral_frame(adapter: Adapter, layout: &Layout) -> Vec<DrawCommand> {
    adapter.render(&MeterState::neutral(), layout)
}

/// Blank display.
pub fn clear_frame() -> Vec<DrawCommand> {
    vec![DrawCommand::Clear]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Adapter; 8] = [
        Adapter::StereoVu,
        Adapter::DownmixVu,
        Adapter::StereoPeak,
        Adapter::DownmixPeak,
        Adapter::StereoSpectrum,
        Adapter::DownmixSpectrum,
        Adapter::Tornado,
        Adapter::Mirror,
    ];

    #[test]
    fn neutral_frames_start_from_blank() {
        for adapter in ALL {
            let cmds = neutral_frame(adapter, &Layout::default());
            assert_eq!(cmds.first(), Some(&DrawCommand::Clear), "{adapter:?}");
        }
    }

    #[test]
    fn neutral_frames_fit_the_display() {
        let layout = Layout::new(128, 32);
        for adapter in ALL {
            let mut fb = Framebuffer::new(128, 32);
            fb.apply(&neutral_frame(adapter, &layout));
            assert!(fb.lit() < 128 * 32, "{adapter:?}");
        }
    }

    #[test]
    fn families_match_adapters() {
        assert_eq!(Adapter::Tornado.family(), MeterFamily::Bars);
        assert_eq!(Adapter::DownmixPeak.family(), MeterFamily::Segments);
        assert!(Adapter::DownmixVu.is_downmix());
        assert!(!Adapter::Mirror.is_downmix());
    }
}
