// src/analysis/config.rs
//! Analyzer geometry and the lookup tables derived from it.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// FFT bins per displayed subband before log remapping.
pub const OVERSAMPLING: usize = 20;
pub const MIN_SUBBANDS: usize = 16;
/// Keeps `sample_window` inside the producer ring.
pub const MAX_SUBBANDS: usize = 128;
pub const MAX_BARS: usize = 32;
pub const MIN_FFT_INPUT_SAMPLES: usize = 128;
/// Frames used for loudness (VU / peak) measurements.
pub const LOUDNESS_WINDOW_FRAMES: usize = 2048;
/// Number of display levels a bar can take (0..POWER_LEVELS).
pub const POWER_LEVELS: usize = 32;
pub const DEFAULT_FLOOR_DB: f64 = -96.0;
pub const DEFAULT_BAR_SCALE_SHIFT: u32 = 6;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
const MAX_BAR_SCALE_SHIFT: u32 = 24;
const PREEMPHASIS_DB_PER_KHZ: f64 = 1.2;

/// What the display asks of the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryRequest {
    /// Pixel width available to each channel's bars.
    pub channel_width: [usize; 2],
    /// Pixel width of one bar including its gap.
    pub bar_size: [usize; 2],
    /// Drop the upper half of the spectrum instead of squeezing it in.
    pub clip_subbands: [bool; 2],
    pub mono: bool,
    /// Noise floor for dBFS readings.
    pub floor_db: f64,
    /// Bar heights are multiplied by `1 << bar_scale_shift` before quantizing.
    pub bar_scale_shift: u32,
}

impl Default for GeometryRequest {
    fn default() -> Self {
        Self {
            channel_width: [64, 64],
            bar_size: [5, 5],
            clip_subbands: [true, true],
            mono: false,
            floor_db: DEFAULT_FLOOR_DB,
            bar_scale_shift: DEFAULT_BAR_SCALE_SHIFT,
        }
    }
}

/// Everything the analyzer precomputes for one geometry.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    request: GeometryRequest,
    num_subbands: usize,
    subbands_in_bar: [usize; 2],
    num_bars: [usize; 2],
    sample_window: usize,
    num_windows: usize,
    window: Vec<f32>,
    decade_idx: Vec<usize>,
    decade_len: Vec<usize>,
    power_map: Vec<i64>,
}

impl AnalyzerConfig {
    pub fn init(request: GeometryRequest) -> Result<Self, ConfigError> {
        let channels = if request.mono { 1 } else { 2 };
        for ch in 0..channels {
            if request.bar_size[ch] == 0 || request.channel_width[ch] < request.bar_size[ch] {
                return Err(ConfigError::InvalidGeometry(format!(
                    "channel {ch}: width {} cannot hold bars of {}",
                    request.channel_width[ch], request.bar_size[ch]
                )));
            }
        }
        if request.bar_scale_shift > MAX_BAR_SCALE_SHIFT {
            return Err(ConfigError::InvalidGeometry(format!(
                "bar scale shift {} exceeds {MAX_BAR_SCALE_SHIFT}",
                request.bar_scale_shift
            )));
        }
        if !request.floor_db.is_finite() || request.floor_db >= 0.0 {
            return Err(ConfigError::InvalidGeometry(format!(
                "noise floor {} dB must be negative",
                request.floor_db
            )));
        }

        let fitting = request.channel_width[0] / request.bar_size[0];
        // Largest power of two that fits, doubled when the top half gets clipped.
        let mut num_subbands = 1usize << fitting.ilog2();
        if request.clip_subbands[0] {
            num_subbands <<= 1;
        }

        let mut num_bars = [num_subbands, 0];
        let mut subbands_in_bar = [1, 1];
        if num_subbands < MIN_SUBBANDS {
            subbands_in_bar[0] = MIN_SUBBANDS / num_subbands;
            num_subbands = MIN_SUBBANDS;
        }
        if request.clip_subbands[0] {
            num_bars[0] = fitting;
        }

        if request.mono {
            num_bars[1] = num_bars[0];
            subbands_in_bar[1] = subbands_in_bar[0];
        } else {
            num_bars[1] = request.channel_width[1] / request.bar_size[1];
            if num_bars[1] > num_subbands {
                num_bars[1] = num_subbands;
            } else if !request.clip_subbands[1] {
                // Largest power-of-two share of the subbands that fits.
                let mut shown = num_subbands;
                while shown > num_bars[1] {
                    shown >>= 1;
                    subbands_in_bar[1] <<= 1;
                }
                num_bars[1] = shown;
            }
        }

        if num_subbands > MAX_SUBBANDS {
            return Err(ConfigError::InvalidGeometry(format!(
                "{num_subbands} subbands exceeds the maximum of {MAX_SUBBANDS}"
            )));
        }
        if let Some(ch) = (0..2).find(|&ch| num_bars[ch] > MAX_BARS) {
            return Err(ConfigError::InvalidGeometry(format!(
                "channel {ch}: {} bars exceeds the maximum of {MAX_BARS}",
                num_bars[ch]
            )));
        }

        let sample_window = num_subbands * 2 * OVERSAMPLING;
        let num_windows = if sample_window < MIN_FFT_INPUT_SAMPLES {
            MIN_FFT_INPUT_SAMPLES / sample_window
        } else {
            1
        };
        let (decade_idx, decade_len) = decade_tables(num_subbands);

        Ok(Self {
            request,
            num_subbands,
            subbands_in_bar,
            num_bars,
            sample_window,
            num_windows,
            window: hamming(sample_window),
            decade_idx,
            decade_len,
            power_map: power_map(),
        })
    }

    pub fn request(&self) -> &GeometryRequest {
        &self.request
    }

    pub fn num_subbands(&self) -> usize {
        self.num_subbands
    }

    pub fn subbands_in_bar(&self) -> [usize; 2] {
        self.subbands_in_bar
    }

    pub fn num_bars(&self) -> [usize; 2] {
        self.num_bars
    }

    pub fn sample_window(&self) -> usize {
        self.sample_window
    }

    pub fn num_windows(&self) -> usize {
        self.num_windows
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn decade_idx(&self) -> &[usize] {
        &self.decade_idx
    }

    pub fn decade_len(&self) -> &[usize] {
        &self.decade_len
    }

    pub fn power_map(&self) -> &[i64] {
        &self.power_map
    }

    pub fn floor_db(&self) -> f64 {
        self.request.floor_db
    }

    pub fn bar_scale_shift(&self) -> u32 {
        self.request.bar_scale_shift
    }

    /// Frames fed to the FFT per tick.
    pub fn fft_frames(&self) -> usize {
        self.sample_window * self.num_windows
    }

    /// Frames a snapshot must hold to serve both measurement kinds.
    pub fn snapshot_frames(&self) -> usize {
        LOUDNESS_WINDOW_FRAMES.max(self.fft_frames())
    }

    /// Highest display level whose threshold `power` reaches.
    pub fn level_for(&self, power: i64) -> u8 {
        (1..self.power_map.len())
            .rev()
            .find(|&i| power >= self.power_map[i])
            .unwrap_or(0) as u8
    }

    /// Per-subband gain rising 1.2 dB per kHz of bandwidth already covered.
    pub fn preemphasis(&self, sample_rate: u32) -> Vec<f64> {
        preemphasis_table(&self.decade_len, sample_rate)
    }
}

pub fn hamming(len: usize) -> Vec<f32> {
    (0..len)
        .map(|w| (0.54 - 0.46 * (TAU * w as f64 / len as f64).cos()) as f32)
        .collect()
}

/// First FFT bin and bin count of each subband.
///
/// Bins are spread so that subband `s` starts near `s^e`, where `e` is chosen
/// to land the last subband on the Nyquist bin.
pub fn decade_tables(num_subbands: usize) -> (Vec<usize>, Vec<usize>) {
    let span = num_subbands * OVERSAMPLING;
    let e = (span as f64).ln() / (num_subbands as f64).ln();

    let mut idx = vec![0; num_subbands];
    let mut len = vec![0; num_subbands];
    idx[0] = 1;
    for s in 0..num_subbands - 1 {
        idx[s + 1] = ((s + 1) as f64).powf(e) as usize + 1;
        len[s] = idx[s + 1] - idx[s];
    }
    let last = num_subbands - 1;
    len[last] = span - idx[last] + 1;
    (idx, len)
}

pub fn preemphasis_table(decade_len: &[usize], sample_rate: u32) -> Vec<f64> {
    let subbands = decade_len.len();
    let span = (subbands * OVERSAMPLING) as f64;
    let khz = (sample_rate / 1000) as f64;

    let mut table = Vec::with_capacity(subbands);
    let mut freq_sum = 0.0;
    let mut scale_db = 0.0;
    for &len in &decade_len[..subbands.saturating_sub(1)] {
        while freq_sum > 1.0 {
            freq_sum -= 1.0;
            scale_db += PREEMPHASIS_DB_PER_KHZ;
        }
        table.push(if scale_db != 0.0 {
            10f64.powf(scale_db / 10.0)
        } else {
            1.0
        });
        freq_sum += khz / (span / len as f64);
    }
    if subbands > 0 {
        table.push(10f64.powf(scale_db / 10.0));
    }
    table
}

/// `floor(2^8.5 * i^2.5)` for each display level.
pub fn power_map() -> Vec<i64> {
    (0..POWER_LEVELS)
        .map(|i| (2f64.powf(8.5) * (i as f64).powf(2.5)).floor() as i64)
        .collect()
}
