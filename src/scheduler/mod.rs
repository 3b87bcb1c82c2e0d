// src/scheduler/mod.rs
//! The polling thread and the timers that steer it.

pub mod timers;

pub use timers::{Repeat, TimerHandle, TimerId, Timers};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::analysis::MeasurementKind;
use crate::dispatch::{NowPlaying, SharedConfig, TickOutcome, VisualizationDispatcher};
use crate::ipc::SampleSource;
use crate::render::Canvas;

/// Bits per sample in the producer ring.
const RING_SAMPLE_BITS: u32 = 16;

/// Delay before the first zeroing after start.
const FIRST_ZERO_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    /// Mode rotation period; zero keeps the first mode.
    pub cycle_every: Duration,
    /// Activation toggle period; zero keeps the visualization always on.
    pub toggle_every: Duration,
    /// Silence after which meters fall back to rest.
    pub zero_after: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            cycle_every: Duration::from_secs(254),
            toggle_every: Duration::from_secs(120),
            zero_after: Duration::from_secs(5),
        }
    }
}

/// A running visualization: the polling thread plus its timers.
pub struct Engine {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    timers: Timers,
}

impl Engine {
    pub fn spawn<S, C>(
        mut source: S,
        mut dispatcher: VisualizationDispatcher<C>,
        settings: EngineSettings,
    ) -> Result<Self>
    where
        S: SampleSource + Send + 'static,
        C: Canvas + Send + 'static,
    {
        let shared = dispatcher.shared().clone();
        let timers = Timers::new();
        start_mode_timers(&timers, &shared, &settings);

        let zero_pending = Arc::new(AtomicBool::new(false));
        let zero_flag = zero_pending.clone();
        let zero_timer = timers.start(FIRST_ZERO_DELAY, Repeat::Once, move || {
            zero_flag.store(true, Ordering::Release);
        });
        let timer_handle = timers.handle();

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();
        let thread = thread::Builder::new()
            .name("vissy-poll".into())
            .spawn(move || {
                info!(
                    poll_ms = settings.poll_interval.as_millis() as u64,
                    frames = dispatcher.snapshot_frames(),
                    "polling started"
                );
                let mut kind = MeasurementKind::Loudness;
                while !stop.load(Ordering::Acquire) {
                    thread::sleep(settings.poll_interval);

                    if zero_pending.swap(false, Ordering::AcqRel) {
                        dispatcher.zero();
                    }

                    let snapshot = source.snapshot(dispatcher.snapshot_frames());
                    let playing = snapshot.is_some();
                    match &snapshot {
                        Some(snap) => shared.update_now_playing(NowPlaying {
                            playing: true,
                            sample_size: RING_SAMPLE_BITS,
                            sample_rate_khz: f64::from(snap.sample_rate()) / 1000.0,
                        }),
                        None => shared.set_playing(false),
                    }
                    if playing {
                        timer_handle.restart(zero_timer, settings.zero_after);
                    }

                    let outcome = dispatcher.tick(kind, snapshot.as_ref());
                    if outcome == TickOutcome::Rendered {
                        debug!(?kind, "frame drawn");
                    }
                    // only advance on real measurements so neither kind starves
                    if playing {
                        kind = kind.next();
                    }
                }
                source.close();
                info!("polling stopped");
            })
            .context("failed to start polling thread")?;

        Ok(Self {
            shutdown,
            thread: Some(thread),
            timers,
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the timers, then the polling thread. Returns once both are gone.
    pub fn shutdown(&mut self) {
        self.timers.shutdown();
        self.shutdown.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn start_mode_timers(timers: &Timers, shared: &SharedConfig, settings: &EngineSettings) {
    if !settings.cycle_every.is_zero() {
        let shared = shared.clone();
        timers.start(
            settings.cycle_every,
            Repeat::Every(settings.cycle_every),
            move || {
                if shared.is_playing() {
                    shared.cycle();
                }
            },
        );
    }

    if settings.toggle_every.is_zero() {
        shared.activate();
    } else {
        let shared = shared.clone();
        timers.start(
            settings.toggle_every,
            Repeat::Every(settings.toggle_every),
            move || {
                let active = shared.toggle();
                debug!(active, "visualization toggled");
            },
        );
    }
}
