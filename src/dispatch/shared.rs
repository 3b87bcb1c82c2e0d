// src/dispatch/shared.rs
//! Settings shared between the timers, the polling thread and the viewer.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::mode::{ModeList, VisualizationMode, downmix_label};

/// Stream details pushed in by whoever tracks the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NowPlaying {
    pub playing: bool,
    /// Bits per sample (1 for DSD); 0 when unknown.
    pub sample_size: u32,
    pub sample_rate_khz: f64,
}

/// A consistent copy of the settings for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigView {
    pub active: bool,
    pub mode: VisualizationMode,
    pub downmix: bool,
    /// Meters must be reset and the display cleared before drawing.
    pub refresh: bool,
}

#[derive(Debug)]
struct State {
    active: bool,
    current_mode: VisualizationMode,
    downmix: bool,
    mode_list: ModeList,
    refresh_requested: bool,
    playing: bool,
    stream: Option<NowPlaying>,
}

impl State {
    fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;
        if active {
            self.refresh_requested = true;
        }
        debug!(active, "visualization switched");
    }

    fn set_downmix(&mut self, downmix: bool) {
        if self.downmix != downmix {
            self.downmix = downmix;
            self.refresh_requested = true;
            info!(downmix, "downmix changed");
        }
    }
}

/// Cheap to clone; every clone sees the same settings.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<Mutex<State>>,
}

impl SharedConfig {
    pub fn new(mut mode_list: ModeList, downmix: bool, active: bool) -> Self {
        let current_mode = mode_list
            .current()
            .map(|m| m.resolve(&mut rand::thread_rng()))
            .unwrap_or_else(|| mode_list.cycle(&mut rand::thread_rng()));
        Self {
            inner: Arc::new(Mutex::new(State {
                active,
                current_mode,
                downmix,
                mode_list,
                refresh_requested: true,
                playing: false,
                stream: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Settings for this tick. A pending refresh is handed out exactly once.
    pub fn begin_tick(&self) -> ConfigView {
        let mut state = self.lock();
        let view = ConfigView {
            active: state.active,
            mode: state.current_mode,
            downmix: state.downmix,
            refresh: state.refresh_requested,
        };
        state.refresh_requested = false;
        view
    }

    /// Settings without consuming a pending refresh.
    pub fn view(&self) -> ConfigView {
        let state = self.lock();
        ConfigView {
            active: state.active,
            mode: state.current_mode,
            downmix: state.downmix,
            refresh: state.refresh_requested,
        }
    }

    pub fn activate(&self) {
        self.lock().set_active(true);
    }

    pub fn deactivate(&self) {
        self.lock().set_active(false);
    }

    /// Returns the new activation state.
    pub fn toggle(&self) -> bool {
        let mut state = self.lock();
        let active = !state.active;
        state.set_active(active);
        active
    }

    /// Next mode in the rotation. The display is refreshed even when the
    /// rotation lands on the same mode.
    pub fn cycle(&self) -> VisualizationMode {
        let mut state = self.lock();
        let previous = state.current_mode;
        let next = state.mode_list.cycle(&mut rand::thread_rng());
        state.current_mode = next;
        state.refresh_requested = true;
        if next != previous {
            info!(from = %previous, to = %next, "visualization mode changed");
        }
        next
    }

    pub fn set_downmix(&self, downmix: bool) {
        self.lock().set_downmix(downmix);
    }

    /// Returns the new downmix setting.
    pub fn toggle_downmix(&self) -> bool {
        let mut state = self.lock();
        let downmix = !state.downmix;
        state.set_downmix(downmix);
        downmix
    }

    pub fn request_refresh(&self) {
        self.lock().refresh_requested = true;
    }

    pub fn set_playing(&self, playing: bool) {
        self.lock().playing = playing;
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn update_now_playing(&self, now: NowPlaying) {
        let mut state = self.lock();
        state.playing = now.playing;
        state.stream = Some(now);
    }

    /// Stream format label; `N` unless downmixing a known stream.
    pub fn downmix_label(&self) -> String {
        let state = self.lock();
        match state.stream {
            Some(now) if state.downmix => downmix_label(now.sample_size, now.sample_rate_khz),
            _ => downmix_label(0, 0.0),
        }
    }
}
