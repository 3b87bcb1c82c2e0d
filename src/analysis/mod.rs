// src/analysis/mod.rs
//! Turns raw sample snapshots into loudness and spectrum measurements.

pub mod config;
pub mod fft;
pub mod loudness;

use rustfft::num_complex::Complex;
use tracing::debug;

use crate::error::ConfigError;
use crate::ipc::AudioSnapshot;

pub use config::{AnalyzerConfig, GeometryRequest, LOUDNESS_WINDOW_FRAMES};
use fft::{PackedFft, split_bin};
pub use loudness::Loudness;

/// Which measurement a tick computes. Ticks alternate between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    Loudness,
    Spectrum,
}

impl MeasurementKind {
    pub fn next(self) -> Self {
        match self {
            Self::Loudness => Self::Spectrum,
            Self::Spectrum => Self::Loudness,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMeasurement {
    pub accumulated_power: i64,
    pub dbfs: f64,
    pub db: f64,
    pub linear_pct: u8,
    /// Display level (0..32) per bar; empty for loudness measurements.
    pub bars: Vec<u8>,
}

impl ChannelMeasurement {
    fn from_loudness(l: Loudness) -> Self {
        Self {
            accumulated_power: l.accumulated_power,
            dbfs: l.dbfs,
            db: l.db,
            linear_pct: l.linear_pct,
            bars: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectralMeasurement {
    pub kind: MeasurementKind,
    pub sample_rate: u32,
    pub channels: [ChannelMeasurement; 2],
}

/// Owns the geometry tables and the FFT plan. Lives on the polling thread.
#[derive(Debug)]
pub struct SpectralAnalyzer {
    config: AnalyzerConfig,
    fft: PackedFft,
    preemphasis: Vec<f64>,
    preemphasis_rate: u32,
    input: Vec<Complex<f32>>,
    power: Vec<[f64; 2]>,
}

impl SpectralAnalyzer {
    pub fn init(request: GeometryRequest) -> Result<Self, ConfigError> {
        let config = AnalyzerConfig::init(request)?;
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: AnalyzerConfig) -> Self {
        let rate = config::DEFAULT_SAMPLE_RATE;
        Self {
            fft: PackedFft::new(config.sample_window()),
            preemphasis: config.preemphasis(rate),
            preemphasis_rate: rate,
            input: vec![Complex::new(0.0, 0.0); config.sample_window()],
            power: vec![[0.0; 2]; config.num_subbands()],
            config,
        }
    }

    /// Replace the geometry. The old plan and tables are dropped.
    pub fn reconfigure(&mut self, request: GeometryRequest) -> Result<(), ConfigError> {
        *self = Self::init(request)?;
        Ok(())
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Frames to ask the source for on every tick.
    pub fn snapshot_frames(&self) -> usize {
        self.config.snapshot_frames()
    }

    pub fn analyze(&mut self, snapshot: &AudioSnapshot, kind: MeasurementKind) -> SpectralMeasurement {
        let floor = self.config.floor_db();
        let recent = snapshot.latest(LOUDNESS_WINDOW_FRAMES);
        let mut channels =
            [0, 1].map(|ch| ChannelMeasurement::from_loudness(loudness::measure(recent, ch, floor)));

        if kind == MeasurementKind::Spectrum {
            let [left, right] = self.spectrum(snapshot);
            channels[0].bars = left;
            channels[1].bars = right;
        }

        SpectralMeasurement {
            kind,
            sample_rate: snapshot.sample_rate(),
            channels,
        }
    }

    fn spectrum(&mut self, snapshot: &AudioSnapshot) -> [Vec<u8>; 2] {
        self.ensure_preemphasis(snapshot.sample_rate());

        let n = self.config.sample_window();
        let windows = self.config.num_windows();
        let needed = self.config.fft_frames();
        let samples = snapshot.latest(needed);
        // Short snapshots are padded with leading silence.
        let missing = needed - samples.len() / 2;

        self.power.iter_mut().for_each(|p| *p = [0.0; 2]);

        for w in 0..windows {
            for (i, slot) in self.input.iter_mut().enumerate() {
                let frame = w * n + i;
                let (l, r) = match frame.checked_sub(missing) {
                    Some(f) => (samples[2 * f], samples[2 * f + 1]),
                    None => (0, 0),
                };
                let gain = self.config.window()[i];
                *slot = Complex::new(gain * f32::from(l >> 7), gain * f32::from(r >> 7));
            }
            self.fft.transform(&mut self.input);

            let idx = self.config.decade_idx();
            let len = self.config.decade_len();
            for (s, power) in self.power.iter_mut().enumerate() {
                for x in idx[s]..idx[s] + len[s] {
                    let (left, right) = split_bin(self.input[x], self.input[n - x]);
                    power[0] += f64::from(left.norm_sqr()) / windows as f64;
                    power[1] += f64::from(right.norm_sqr()) / windows as f64;
                }
            }
        }

        for (power, &len) in self.power.iter_mut().zip(self.config.decade_len()) {
            power[0] /= len as f64;
            power[1] /= len as f64;
        }

        [self.bars(0), self.bars(1)]
    }

    /// Group subbands into bars and quantize each bar to a display level.
    fn bars(&self, channel: usize) -> Vec<u8> {
        let per_bar = self.config.subbands_in_bar()[channel] as i64;
        let target = self.config.num_bars()[channel];
        let scale = 1i64 << self.config.bar_scale_shift();

        let mut bars = Vec::with_capacity(target);
        let mut sum = 0i64;
        let mut in_bar = 0;
        for (power, pre) in self.power.iter().zip(&self.preemphasis) {
            let value = ((power[channel] * pre) as i64) >> 16;
            sum += value / per_bar;
            in_bar += 1;
            if in_bar == per_bar {
                bars.push(self.config.level_for(sum.saturating_mul(scale)));
                if bars.len() == target {
                    break;
                }
                in_bar = 0;
                sum = 0;
            }
        }
        bars
    }

    fn ensure_preemphasis(&mut self, sample_rate: u32) {
        if sample_rate == 0 || sample_rate == self.preemphasis_rate {
            return;
        }
        debug!(from = self.preemphasis_rate, to = sample_rate, "rebuilding preemphasis");
        self.preemphasis = self.config.preemphasis(sample_rate);
        self.preemphasis_rate = sample_rate;
    }

    pub fn preemphasis_rate(&self) -> u32 {
        self.preemphasis_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::local::sine_frames;

    fn tone(freq: f32, rate: u32, amplitude: (f32, f32), frames: usize) -> AudioSnapshot {
        let mut samples = Vec::with_capacity(frames * 2);
        sine_frames(&mut samples, frames, freq, rate, amplitude, 0.0);
        AudioSnapshot::new(rate, samples)
    }

    fn analyzer() -> SpectralAnalyzer {
        SpectralAnalyzer::init(GeometryRequest::default()).unwrap()
    }

    #[test]
    fn kinds_alternate() {
        assert_eq!(MeasurementKind::Loudness.next(), MeasurementKind::Spectrum);
        assert_eq!(MeasurementKind::Spectrum.next(), MeasurementKind::Loudness);
    }

    #[test]
    fn silence_reads_floor_and_empty_bars() {
        let mut a = analyzer();
        let snap = AudioSnapshot::new(44_100, vec![0; a.snapshot_frames() * 2]);
        let m = a.analyze(&snap, MeasurementKind::Spectrum);
        for ch in &m.channels {
            assert_eq!(ch.dbfs, -96.0);
            assert_eq!(ch.linear_pct, 0);
            assert_eq!(ch.accumulated_power, 0);
            assert_eq!(ch.bars, vec![0; 12]);
        }
    }

    #[test]
    fn loudness_kind_has_no_bars() {
        let mut a = analyzer();
        let snap = tone(440.0, 44_100, (8_000.0, 8_000.0), 2048);
        let m = a.analyze(&snap, MeasurementKind::Loudness);
        assert!(m.channels.iter().all(|c| c.bars.is_empty()));
        assert!(m.channels[0].accumulated_power > 0);
    }

    #[test]
    fn one_khz_sine_lands_in_its_bucket() {
        let mut a = analyzer();
        let snap = tone(1_000.0, 44_100, (16_384.0, 4_096.0), 2048);
        let m = a.analyze(&snap, MeasurementKind::Spectrum);

        let left = &m.channels[0];
        let right = &m.channels[1];
        assert_eq!(left.bars.len(), 12);

        let loudest = |bars: &[u8]| {
            bars.iter()
                .enumerate()
                .max_by_key(|(_, v)| **v)
                .map(|(i, _)| i)
        };
        assert_eq!(loudest(&left.bars), Some(3));
        assert_eq!(loudest(&right.bars), Some(3));
        assert!(left.bars[3] > right.bars[3]);
        assert!(right.bars[3] > 0);

        // half scale sine: 20·log10(0.5/√2) ≈ -9.03 dBFS
        assert!(left.dbfs > -10.0 && left.dbfs < -8.0, "{}", left.dbfs);
        assert!(right.dbfs < left.dbfs);
    }

    #[test]
    fn preemphasis_follows_sample_rate() {
        let mut a = analyzer();
        assert_eq!(a.preemphasis_rate(), 44_100);
        let snap = tone(1_000.0, 48_000, (8_000.0, 8_000.0), 2048);
        a.analyze(&snap, MeasurementKind::Spectrum);
        assert_eq!(a.preemphasis_rate(), 48_000);
        // loudness ticks leave the table alone
        let snap = tone(1_000.0, 96_000, (8_000.0, 8_000.0), 2048);
        a.analyze(&snap, MeasurementKind::Loudness);
        assert_eq!(a.preemphasis_rate(), 48_000);
    }

    #[test]
    fn short_snapshot_is_padded() {
        let mut a = analyzer();
        let snap = tone(1_000.0, 44_100, (16_384.0, 16_384.0), 100);
        let m = a.analyze(&snap, MeasurementKind::Spectrum);
        assert_eq!(m.channels[0].bars.len(), 12);
    }

    #[test]
    fn reconfigure_changes_bar_count() {
        let mut a = analyzer();
        let req = GeometryRequest {
            channel_width: [192, 192],
            bar_size: [6, 6],
            clip_subbands: [false, false],
            ..GeometryRequest::default()
        };
        a.reconfigure(req).unwrap();
        let snap = AudioSnapshot::new(44_100, vec![0; a.snapshot_frames() * 2]);
        let m = a.analyze(&snap, MeasurementKind::Spectrum);
        assert_eq!(m.channels[0].bars.len(), 32);
    }
}
