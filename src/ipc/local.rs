// src/ipc/local.rs
//! In-process sample ring for `--demo` and tests.
//!
//! Stands in for the producer segment: something pushes interleaved stereo
//! samples into a `HeapRb`, the engine snapshots the newest ones.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ringbuf::{HeapRb, traits::*};
use tracing::{debug, info};

use super::{AudioSnapshot, SampleSource};

/// A shared circular buffer of interleaved `i16` samples.
#[derive(Clone)]
pub struct LocalRing {
    buffer: Arc<Mutex<HeapRb<i16>>>,
    playing: Arc<AtomicBool>,
    sample_rate: u32,
}

impl LocalRing {
    /// Ring holding `frames` stereo frames.
    pub fn new(frames: usize, sample_rate: u32) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(HeapRb::new(frames.max(1) * 2))),
            playing: Arc::new(AtomicBool::new(true)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Append interleaved samples, overwriting the oldest when full.
    pub fn push(&self, samples: &[i16]) {
        if let Ok(mut buf) = self.buffer.lock() {
            for &sample in samples {
                if buf.is_full() {
                    let _ = buf.try_pop();
                }
                let _ = buf.try_push(sample);
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}

impl SampleSource for LocalRing {
    fn snapshot(&mut self, frames: usize) -> Option<AudioSnapshot> {
        if !self.is_playing() {
            return None;
        }
        let buf = self.buffer.lock().ok()?;
        let wanted = frames * 2;
        let available = buf.occupied_len();
        if available < wanted {
            return None;
        }
        // Newest samples only, without consuming them.
        let samples: Vec<i16> = buf.iter().skip(available - wanted).copied().collect();
        Some(AudioSnapshot::new(self.sample_rate, samples))
    }
}

/// Fill `out` with `frames` frames of a stereo sine starting at `phase`.
///
/// Returns the phase to continue from.
pub fn sine_frames(
    out: &mut Vec<i16>,
    frames: usize,
    freq: f32,
    sample_rate: u32,
    amplitude: (f32, f32),
    phase: f32,
) -> f32 {
    let step = TAU * freq / sample_rate as f32;
    let mut phase = phase;
    for _ in 0..frames {
        let s = phase.sin();
        out.push((s * amplitude.0).round() as i16);
        out.push((s * amplitude.1).round() as i16);
        phase = (phase + step) % TAU;
    }
    phase
}

/// Background thread feeding a sine tone into a [`LocalRing`] in real time.
pub struct ToneGenerator {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ToneGenerator {
    const CHUNK: Duration = Duration::from_millis(10);

    /// Start generating `freq` Hz with per-channel peak amplitudes.
    pub fn spawn(ring: LocalRing, freq: f32, amplitude: (f32, f32)) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let frames_per_chunk = (ring.sample_rate() / 100).max(1) as usize;

        let handle = thread::spawn(move || {
            info!(freq, rate = ring.sample_rate(), "demo tone started");
            let mut phase = 0.0;
            let mut chunk = Vec::with_capacity(frames_per_chunk * 2);
            while !stop_flag.load(Ordering::Relaxed) {
                chunk.clear();
                phase = sine_frames(
                    &mut chunk,
                    frames_per_chunk,
                    freq,
                    ring.sample_rate(),
                    amplitude,
                    phase,
                );
                ring.push(&chunk);
                thread::sleep(Self::CHUNK);
            }
            debug!("demo tone stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ToneGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_needs_a_full_window() {
        let mut ring = LocalRing::new(8, 44_100);
        ring.push(&[1, 2, 3, 4]);
        assert!(ring.snapshot(4).is_none());
        let snap = ring.snapshot(2).unwrap();
        assert_eq!(snap.samples(), &[1, 2, 3, 4]);
    }

    #[test]
    fn overwrites_oldest_and_returns_newest() {
        let mut ring = LocalRing::new(2, 48_000);
        ring.push(&[1, 2, 3, 4, 5, 6]);
        let snap = ring.snapshot(2).unwrap();
        assert_eq!(snap.samples(), &[3, 4, 5, 6]);
        assert_eq!(snap.sample_rate(), 48_000);
        assert!(snap.playing());
    }

    #[test]
    fn paused_ring_yields_nothing() {
        let mut ring = LocalRing::new(4, 44_100);
        ring.push(&[0; 8]);
        ring.set_playing(false);
        assert!(ring.snapshot(4).is_none());
        ring.set_playing(true);
        assert!(ring.snapshot(4).is_some());
    }

    #[test]
    fn sine_frames_respects_amplitude_per_channel() {
        let mut out = Vec::new();
        sine_frames(&mut out, 441, 1_000.0, 44_100, (1_000.0, 0.0), 0.0);
        assert_eq!(out.len(), 882);
        let left_peak = out.iter().step_by(2).map(|s| s.abs()).max().unwrap();
        let right_peak = out.iter().skip(1).step_by(2).map(|s| s.abs()).max().unwrap();
        assert!(left_peak >= 990 && left_peak <= 1_000);
        assert_eq!(right_peak, 0);
    }

    #[test]
    fn tone_generator_fills_the_ring() {
        let mut ring = LocalRing::new(1024, 44_100);
        let mut tone = ToneGenerator::spawn(ring.clone(), 440.0, (8_000.0, 8_000.0));
        let mut got = None;
        for _ in 0..100 {
            got = ring.snapshot(256);
            if got.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        tone.stop();
        assert!(got.is_some());
    }
}
