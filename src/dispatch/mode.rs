// src/dispatch/mode.rs
//! Visualization modes and the user's mode rotation.

use std::fmt;

use rand::Rng;
use tracing::warn;

use crate::analysis::MeasurementKind;
use crate::error::ConfigError;
use crate::render::Adapter;

/// Most slots a mode list can hold; extra entries are ignored.
pub const MAX_MODE_SLOTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualizationMode {
    Vu,
    Peak,
    Spectrum,
    /// Horizontal bars growing out from the centre line.
    Tornado,
    /// Horizontal bars growing in from both edges.
    Mirror,
    /// Picks one of the others each time the list reaches it.
    Random,
}

/// What `Random` may turn into.
const CONCRETE: [VisualizationMode; 5] = [
    VisualizationMode::Vu,
    VisualizationMode::Spectrum,
    VisualizationMode::Tornado,
    VisualizationMode::Mirror,
    VisualizationMode::Peak,
];

impl VisualizationMode {
    pub fn code(self) -> &'static str {
        match self {
            VisualizationMode::Vu => "VU",
            VisualizationMode::Peak => "PK",
            VisualizationMode::Spectrum => "SA",
            VisualizationMode::Tornado => "ST",
            VisualizationMode::Mirror => "SM",
            VisualizationMode::Random => "RN",
        }
    }

    /// Case-insensitive two letter code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "VU" => Some(VisualizationMode::Vu),
            "PK" => Some(VisualizationMode::Peak),
            "SA" => Some(VisualizationMode::Spectrum),
            "ST" => Some(VisualizationMode::Tornado),
            "SM" => Some(VisualizationMode::Mirror),
            "RN" => Some(VisualizationMode::Random),
            _ => None,
        }
    }

    /// The measurement a tick must produce for this mode to draw.
    pub fn kind(self) -> MeasurementKind {
        match self {
            VisualizationMode::Vu | VisualizationMode::Peak => MeasurementKind::Loudness,
            _ => MeasurementKind::Spectrum,
        }
    }

    /// Tornado and mirror always show both channels.
    pub fn honours_downmix(self) -> bool {
        matches!(
            self,
            VisualizationMode::Vu | VisualizationMode::Peak | VisualizationMode::Spectrum
        )
    }

    /// `None` for `Random`, which has to be resolved first.
    pub fn adapter(self, downmix: bool) -> Option<Adapter> {
        let downmix = downmix && self.honours_downmix();
        Some(match (self, downmix) {
            (VisualizationMode::Vu, false) => Adapter::StereoVu,
            (VisualizationMode::Vu, true) => Adapter::DownmixVu,
            (VisualizationMode::Peak, false) => Adapter::StereoPeak,
            (VisualizationMode::Peak, true) => Adapter::DownmixPeak,
            (VisualizationMode::Spectrum, false) => Adapter::StereoSpectrum,
            (VisualizationMode::Spectrum, true) => Adapter::DownmixSpectrum,
            (VisualizationMode::Tornado, _) => Adapter::Tornado,
            (VisualizationMode::Mirror, _) => Adapter::Mirror,
            (VisualizationMode::Random, _) => return None,
        })
    }

    pub fn resolve<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        match self {
            VisualizationMode::Random => CONCRETE[rng.gen_range(0..CONCRETE.len())],
            mode => mode,
        }
    }
}

impl fmt::Display for VisualizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Ordered rotation of modes. Unknown entries keep their slot but are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeList {
    slots: Vec<Option<VisualizationMode>>,
    cursor: usize,
}

impl ModeList {
    /// Parse a list such as `"VU,SA-ST"`. Fails only when nothing usable is left.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let slots: Vec<_> = list
            .split([',', '-'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(MAX_MODE_SLOTS)
            .map(|code| {
                let mode = VisualizationMode::from_code(code);
                if mode.is_none() {
                    warn!(code, "ignoring unknown visualization mode");
                }
                mode
            })
            .collect();

        if slots.iter().all(Option::is_none) {
            return Err(ConfigError::InvalidModeList(list.to_string()));
        }
        let cursor = slots.iter().position(Option::is_some).unwrap_or(0);
        Ok(Self { slots, cursor })
    }

    pub fn slots(&self) -> &[Option<VisualizationMode>] {
        &self.slots
    }

    /// The slot under the cursor, unresolved.
    pub fn current(&self) -> Option<VisualizationMode> {
        self.slots.get(self.cursor).copied().flatten()
    }

    /// Move to the next usable slot, wrapping, and resolve it.
    pub fn cycle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> VisualizationMode {
        let len = self.slots.len();
        for step in 1..=len {
            let idx = (self.cursor + step) % len;
            if let Some(mode) = self.slots[idx] {
                self.cursor = idx;
                return mode.resolve(rng);
            }
        }
        // parse() guarantees a usable slot
        VisualizationMode::Spectrum
    }

    /// Human readable form for the startup log.
    pub fn describe(&self) -> String {
        self.slots
            .iter()
            .flatten()
            .map(|m| match m {
                VisualizationMode::Random => "Random",
                m => m.code(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Label for the stream format: `N` (no downmix), `D<rate/44.1>` for single
/// byte samples, otherwise `M<sample size>`. The rate is in kHz.
pub fn downmix_label(sample_size: u32, sample_rate_khz: f64) -> String {
    match sample_size {
        0 => "N".to_string(),
        1 => format!("D{:.0}", sample_rate_khz / 44.1),
        size => format!("M{size}"),
    }
}
