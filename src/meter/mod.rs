// src/meter/mod.rs
//! Meter state between measurements and the display.
//!
//! Small displays refresh slowly and raw measurements jump around, so the
//! cache damps needles, holds bar caps and only reports a change when what
//! would be drawn actually differs from the last frame.

use crate::analysis::SpectralMeasurement;

/// Degrees a stereo VU needle may fall per tick.
pub const VU_STEP_STEREO: f64 = 2.0;
/// Degrees the single downmix needle may fall per tick.
pub const VU_STEP_DOWNMIX: f64 = 4.0;
/// Levels a cap falls per tick once the bar below it drops.
pub const CAP_DECAY: u8 = 1;
/// dB thresholds of the peak meter segments, left to right.
pub const PEAK_BRACKETS: [i32; 19] = [
    -36, -30, -20, -17, -13, -10, -8, -7, -6, -5, -4, -3, -2, -1, 0, 2, 3, 5, 8,
];

/// How a mode draws its measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterFamily {
    Needle,
    Segments,
    Bars,
}

/// Stereo needle angle in degrees from vertical.
pub fn stereo_vu_angle(accumulated_power: i64) -> f64 {
    accumulated_power as f64 / 58.0 - 36.0
}

/// Downmix needle angle from both channels' accumulated power.
pub fn downmix_vu_angle(left: i64, right: i64) -> f64 {
    (left + right) as f64 / 2.0 / 58.0 - 48.0
}

/// Peak meter reading in dB.
pub fn peak_db(accumulated_power: i64) -> f64 {
    -48.0 + accumulated_power as f64 / 48.0
}

/// Number of lit peak segments for a reading.
pub fn peak_level(db: f64) -> u8 {
    PEAK_BRACKETS.iter().filter(|&&b| db >= f64::from(b)).count() as u8
}

/// Needles jump up and fall back at most `step` per tick.
pub fn damp(damped: Option<f64>, new: f64, step: f64) -> f64 {
    match damped {
        Some(d) if new < d => (d - step).max(new),
        _ => new,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NeedleState {
    pub last_value: i64,
    /// `None` until the first measurement after a reset.
    pub damped: Option<f64>,
}

/// A bar or segment row with a falling cap above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BarState {
    pub level: u8,
    pub last_level: u8,
    pub cap: u8,
    pub last_cap: u8,
}

impl BarState {
    pub fn push(&mut self, level: u8) {
        self.last_level = self.level;
        self.last_cap = self.cap;
        self.level = level;
        self.cap = if level >= self.cap {
            level
        } else {
            self.cap.saturating_sub(CAP_DECAY)
        };
    }
}

/// Everything a render adapter needs for one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeterState {
    /// Downmix modes use index 0 only.
    pub needles: [NeedleState; 2],
    pub peak: [BarState; 2],
    /// Spectrum bars per channel; downmix modes use index 0 only.
    pub bars: [Vec<BarState>; 2],
    /// The display must be wiped before the next frame.
    pub needs_clear: bool,
}

impl MeterState {
    pub fn neutral() -> Self {
        Self {
            needs_clear: true,
            ..Self::default()
        }
    }

    fn render_key(&self, family: MeterFamily, downmix: bool) -> Vec<i64> {
        let channels = if downmix { 1 } else { 2 };
        let mut key = Vec::new();
        for ch in 0..channels {
            match family {
                MeterFamily::Needle => {
                    let angle = self.needles[ch].damped.unwrap_or(f64::NEG_INFINITY);
                    key.push((angle * 100.0).round() as i64);
                }
                MeterFamily::Segments => {
                    key.push(i64::from(self.peak[ch].level));
                    key.push(i64::from(self.peak[ch].cap));
                }
                MeterFamily::Bars => {
                    key.push(self.bars[ch].len() as i64);
                    for bar in &self.bars[ch] {
                        key.push(i64::from(bar.level));
                        key.push(i64::from(bar.cap));
                    }
                }
            }
        }
        key
    }
}

/// Owns the meter state for the active mode.
#[derive(Debug)]
pub struct MeterCache {
    state: MeterState,
    last_rendered: Option<Vec<i64>>,
}

impl MeterCache {
    pub fn new() -> Self {
        Self {
            state: MeterState::neutral(),
            last_rendered: None,
        }
    }

    pub fn state(&self) -> &MeterState {
        &self.state
    }

    /// Back to rest: needles down, bars and caps empty, display to be cleared.
    pub fn reset(&mut self) {
        self.state = MeterState::neutral();
        self.last_rendered = None;
    }

    /// The adapter has drawn the current state.
    pub fn drawn(&mut self) {
        self.state.needs_clear = false;
    }

    /// Fold a measurement in. Returns false when the frame would look the same
    /// as the last one.
    pub fn update(&mut self, m: &SpectralMeasurement, family: MeterFamily, downmix: bool) -> bool {
        let [left, right] = &m.channels;
        let power = [left.accumulated_power, right.accumulated_power];

        match family {
            MeterFamily::Needle if downmix => {
                let needle = &mut self.state.needles[0];
                needle.last_value = (power[0] + power[1]) / 2;
                needle.damped = Some(damp(
                    needle.damped,
                    downmix_vu_angle(power[0], power[1]),
                    VU_STEP_DOWNMIX,
                ));
            }
            MeterFamily::Needle => {
                for (needle, &p) in self.state.needles.iter_mut().zip(&power) {
                    needle.last_value = p;
                    needle.damped = Some(damp(needle.damped, stereo_vu_angle(p), VU_STEP_STEREO));
                }
            }
            MeterFamily::Segments if downmix => {
                let mean = (power[0] + power[1]) / 2;
                self.state.peak[0].push(peak_level(peak_db(mean)));
            }
            MeterFamily::Segments => {
                for (peak, &p) in self.state.peak.iter_mut().zip(&power) {
                    peak.push(peak_level(peak_db(p)));
                }
            }
            MeterFamily::Bars if downmix => {
                let mixed = downmix_bars(&left.bars, &right.bars);
                push_bars(&mut self.state.bars[0], &mixed);
            }
            MeterFamily::Bars => {
                push_bars(&mut self.state.bars[0], &left.bars);
                push_bars(&mut self.state.bars[1], &right.bars);
            }
        }

        let key = self.state.render_key(family, downmix);
        if !self.state.needs_clear && self.last_rendered.as_ref() == Some(&key) {
            return false;
        }
        self.last_rendered = Some(key);
        true
    }
}

impl Default for MeterCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Average the channels bar by bar; a bar only one channel has is taken as is.
pub fn downmix_bars(left: &[u8], right: &[u8]) -> Vec<u8> {
    (0..left.len().max(right.len()))
        .map(|i| match (left.get(i), right.get(i)) {
            (Some(&l), Some(&r)) => ((u16::from(l) + u16::from(r)) / 2) as u8,
            (Some(&v), None) | (None, Some(&v)) => v,
            (None, None) => 0,
        })
        .collect()
}

fn push_bars(state: &mut Vec<BarState>, levels: &[u8]) {
    if state.len() != levels.len() {
        state.resize(levels.len(), BarState::default());
    }
    for (bar, &level) in state.iter_mut().zip(levels) {
        bar.push(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ChannelMeasurement, MeasurementKind};

    fn channel(power: i64, bars: Vec<u8>) -> ChannelMeasurement {
        ChannelMeasurement {
            accumulated_power: power,
            dbfs: -20.0,
            db: -20.0,
            linear_pct: 50,
            bars,
        }
    }

    fn loudness(left: i64, right: i64) -> SpectralMeasurement {
        SpectralMeasurement {
            kind: MeasurementKind::Loudness,
            sample_rate: 44_100,
            channels: [channel(left, vec![]), channel(right, vec![])],
        }
    }

    fn spectrum(left: Vec<u8>, right: Vec<u8>) -> SpectralMeasurement {
        SpectralMeasurement {
            kind: MeasurementKind::Spectrum,
            sample_rate: 44_100,
            channels: [channel(0, left), channel(0, right)],
        }
    }

    #[test]
    fn damping_jumps_up_and_falls_slowly() {
        assert_eq!(damp(None, -10.0, 2.0), -10.0);
        assert_eq!(damp(Some(-10.0), 5.0, 2.0), 5.0);
        assert_eq!(damp(Some(5.0), -10.0, 2.0), 3.0);
        assert_eq!(damp(Some(-9.0), -10.0, 2.0), -10.0);
    }

    #[test]
    fn angles_and_peak_readings() {
        assert_eq!(stereo_vu_angle(0), -36.0);
        assert_eq!(stereo_vu_angle(58 * 36), 0.0);
        assert_eq!(downmix_vu_angle(58 * 48, 58 * 48), 0.0);
        assert_eq!(peak_db(0), -48.0);
        assert_eq!(peak_level(-48.0), 0);
        assert_eq!(peak_level(-36.0), 1);
        assert_eq!(peak_level(0.0), 15);
        assert_eq!(peak_level(40.0), PEAK_BRACKETS.len() as u8);
    }

    #[test]
    fn constant_signal_redraws_once() {
        let mut cache = MeterCache::new();
        let m = loudness(1_000, 2_000);
        assert!(cache.update(&m, MeterFamily::Needle, false));
        cache.drawn();
        for _ in 0..10 {
            assert!(!cache.update(&m, MeterFamily::Needle, false));
        }
    }

    #[test]
    fn constant_spectrum_redraws_once() {
        let mut cache = MeterCache::new();
        let m = spectrum(vec![3, 9, 0], vec![1, 2, 3]);
        assert!(cache.update(&m, MeterFamily::Bars, false));
        cache.drawn();
        assert!(!cache.update(&m, MeterFamily::Bars, false));
    }

    #[test]
    fn falling_needle_keeps_redrawing_until_settled() {
        let mut cache = MeterCache::new();
        assert!(cache.update(&loudness(58 * 46, 58 * 46), MeterFamily::Needle, false));
        cache.drawn();
        let quiet = loudness(58 * 40, 58 * 40);
        // 10 degrees -> 4 degrees in steps of 2
        for expected in [8.0, 6.0, 4.0] {
            assert!(cache.update(&quiet, MeterFamily::Needle, false));
            assert_eq!(cache.state().needles[0].damped, Some(expected));
        }
        assert!(!cache.update(&quiet, MeterFamily::Needle, false));
    }

    #[test]
    fn downmix_needle_uses_mean_and_bigger_step() {
        let mut cache = MeterCache::new();
        cache.update(&loudness(58 * 60, 58 * 40), MeterFamily::Needle, true);
        assert_eq!(cache.state().needles[0].damped, Some(2.0));
        cache.update(&loudness(0, 0), MeterFamily::Needle, true);
        assert_eq!(cache.state().needles[0].damped, Some(-2.0));
    }

    #[test]
    fn caps_decay_by_one_to_zero() {
        let mut cache = MeterCache::new();
        cache.update(&spectrum(vec![5], vec![0]), MeterFamily::Bars, false);
        let mut caps = Vec::new();
        for _ in 0..7 {
            cache.update(&spectrum(vec![0], vec![0]), MeterFamily::Bars, false);
            let bar = cache.state().bars[0][0];
            assert_eq!(bar.level, 0);
            caps.push(bar.cap);
        }
        assert_eq!(caps, vec![4, 3, 2, 1, 0, 0, 0]);
        let bar = cache.state().bars[0][0];
        assert_eq!(bar.last_cap, 0);
    }

    #[test]
    fn cap_follows_rising_bar_and_remembers_previous() {
        let mut bar = BarState::default();
        bar.push(3);
        bar.push(7);
        assert_eq!(bar.cap, 7);
        assert_eq!(bar.last_cap, 3);
        assert_eq!(bar.last_level, 3);
        bar.push(2);
        assert_eq!(bar.cap, 6);
        assert_eq!(bar.last_cap, 7);
    }

    #[test]
    fn downmix_bars_average_channels() {
        assert_eq!(downmix_bars(&[4, 9, 1], &[2, 0]), vec![3, 4, 1]);
    }

    #[test]
    fn peak_meter_tracks_levels_and_caps() {
        let mut cache = MeterCache::new();
        cache.update(&loudness(48 * 48, 0), MeterFamily::Segments, false);
        assert_eq!(cache.state().peak[0].level, 15);
        assert_eq!(cache.state().peak[1].level, 0);
        cache.update(&loudness(0, 0), MeterFamily::Segments, false);
        assert_eq!(cache.state().peak[0].level, 0);
        assert_eq!(cache.state().peak[0].cap, 14);
    }

    #[test]
    fn reset_returns_to_neutral() {
        let mut cache = MeterCache::new();
        let m = loudness(3_000, 3_000);
        cache.update(&m, MeterFamily::Needle, false);
        cache.drawn();
        cache.reset();
        assert_eq!(cache.state(), &MeterState::neutral());
        assert!(cache.update(&m, MeterFamily::Needle, false));
    }
}
