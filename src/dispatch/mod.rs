// src/dispatch/mod.rs
//! Per-tick pipeline: settings, analysis, meters, drawing.

pub mod mode;
pub mod shared;

pub use mode::{ModeList, VisualizationMode, downmix_label};
pub use shared::{ConfigView, NowPlaying, SharedConfig};

use tracing::{debug, trace};

use crate::analysis::{MeasurementKind, SpectralAnalyzer};
use crate::ipc::AudioSnapshot;
use crate::meter::MeterCache;
use crate::render::{Adapter, Canvas, Layout, clear_frame, neutral_frame};

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Inactive,
    /// No snapshot this tick.
    NotPlaying,
    /// The tick measured something the current mode does not draw.
    KindMismatch,
    /// Drawing would not change the display.
    Unchanged,
    Rendered,
}

/// Owns everything the polling thread touches on a tick.
pub struct VisualizationDispatcher<C: Canvas> {
    shared: SharedConfig,
    analyzer: SpectralAnalyzer,
    cache: MeterCache,
    canvas: C,
    layout: Layout,
    adapter: Option<Adapter>,
}

impl<C: Canvas> VisualizationDispatcher<C> {
    pub fn new(shared: SharedConfig, analyzer: SpectralAnalyzer, canvas: C) -> Self {
        let layout = Layout {
            width: canvas.width(),
            height: canvas.height(),
        };
        Self {
            shared,
            analyzer,
            cache: MeterCache::new(),
            canvas,
            layout,
            adapter: None,
        }
    }

    pub fn shared(&self) -> &SharedConfig {
        &self.shared
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn cache(&self) -> &MeterCache {
        &self.cache
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Frames each snapshot has to carry.
    pub fn snapshot_frames(&self) -> usize {
        self.analyzer.snapshot_frames()
    }

    pub fn tick(&mut self, kind: MeasurementKind, snapshot: Option<&AudioSnapshot>) -> TickOutcome {
        let view = self.shared.begin_tick();
        if !view.active {
            // blank the display once on the way out
            if self.adapter.take().is_some() {
                self.canvas.apply(&clear_frame());
            }
            return TickOutcome::Inactive;
        }
        let Some(adapter) = view.mode.adapter(view.downmix) else {
            return TickOutcome::Inactive;
        };
        if view.refresh || self.adapter != Some(adapter) {
            debug!(?adapter, "meters reset");
            self.cache.reset();
            self.adapter = Some(adapter);
        }

        let Some(snapshot) = snapshot else {
            return TickOutcome::NotPlaying;
        };
        if view.mode.kind() != kind {
            return TickOutcome::KindMismatch;
        }

        let measurement = self.analyzer.analyze(snapshot, kind);
        if !self
            .cache
            .update(&measurement, adapter.family(), adapter.is_downmix())
        {
            trace!("frame unchanged");
            return TickOutcome::Unchanged;
        }
        let commands = adapter.render(self.cache.state(), &self.layout);
        self.canvas.apply(&commands);
        self.cache.drawn();
        TickOutcome::Rendered
    }

    /// Put the meters back to rest and draw the resting frame.
    pub fn zero(&mut self) {
        self.cache.reset();
        let view = self.shared.view();
        let commands = match view.mode.adapter(view.downmix) {
            Some(adapter) if view.active => neutral_frame(adapter, &self.layout),
            _ => clear_frame(),
        };
        self.canvas.apply(&commands);
        debug!("meters zeroed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::GeometryRequest;
    use crate::ipc::local::sine_frames;
    use crate::render::Framebuffer;

    fn dispatcher(list: &str, downmix: bool) -> VisualizationDispatcher<Framebuffer> {
        let shared = SharedConfig::new(ModeList::parse(list).unwrap(), downmix, true);
        let analyzer = SpectralAnalyzer::init(GeometryRequest::default()).unwrap();
        VisualizationDispatcher::new(shared, analyzer, Framebuffer::new(128, 64))
    }

    fn tone(frames: usize) -> AudioSnapshot {
        let mut samples = Vec::new();
        sine_frames(&mut samples, frames, 1_000.0, 44_100, (30_000.0, 20_000.0), 0.0);
        AudioSnapshot::new(44_100, samples)
    }

    #[test]
    fn inactive_does_nothing() {
        let mut d = dispatcher("VU", false);
        d.shared().deactivate();
        let snap = tone(d.snapshot_frames());
        assert_eq!(d.tick(MeasurementKind::Loudness, Some(&snap)), TickOutcome::Inactive);
        assert_eq!(d.canvas().generation(), 0);
    }

    #[test]
    fn deactivating_blanks_the_display_once() {
        let mut d = dispatcher("SA", false);
        let snap = tone(d.snapshot_frames());
        d.tick(MeasurementKind::Spectrum, Some(&snap));
        assert!(d.canvas().lit() > 0);
        d.shared().deactivate();
        d.tick(MeasurementKind::Spectrum, Some(&snap));
        assert_eq!(d.canvas().lit(), 0);
        let generation = d.canvas().generation();
        d.tick(MeasurementKind::Loudness, Some(&snap));
        assert_eq!(d.canvas().generation(), generation);
    }

    #[test]
    fn skips_ticks_of_the_other_kind() {
        let mut d = dispatcher("SA", false);
        let snap = tone(d.snapshot_frames());
        assert_eq!(
            d.tick(MeasurementKind::Loudness, Some(&snap)),
            TickOutcome::KindMismatch
        );
        assert_eq!(d.tick(MeasurementKind::Spectrum, Some(&snap)), TickOutcome::Rendered);
        assert!(d.canvas().lit() > 0);
    }

    #[test]
    fn missing_snapshot_is_not_playing() {
        let mut d = dispatcher("VU", false);
        assert_eq!(d.tick(MeasurementKind::Loudness, None), TickOutcome::NotPlaying);
    }

    #[test]
    fn constant_input_draws_once() {
        let mut d = dispatcher("PK", false);
        let snap = tone(d.snapshot_frames());
        assert_eq!(d.tick(MeasurementKind::Loudness, Some(&snap)), TickOutcome::Rendered);
        for _ in 0..5 {
            assert_eq!(d.tick(MeasurementKind::Loudness, Some(&snap)), TickOutcome::Unchanged);
        }
    }

    #[test]
    fn downmix_toggle_resets_meters() {
        let mut d = dispatcher("PK", false);
        let snap = tone(d.snapshot_frames());
        d.tick(MeasurementKind::Loudness, Some(&snap));
        assert!(d.cache().state().peak[1].level > 0);

        d.shared().toggle_downmix();
        assert_eq!(d.tick(MeasurementKind::Loudness, None), TickOutcome::NotPlaying);
        assert!(d.cache().state().needs_clear);
        assert_eq!(d.cache().state().peak[1].level, 0);

        assert_eq!(d.tick(MeasurementKind::Loudness, Some(&snap)), TickOutcome::Rendered);
        // downmixed meters only use the first row
        assert_eq!(d.cache().state().peak[1].level, 0);
        assert!(d.cache().state().peak[0].level > 0);
    }

    #[test]
    fn mode_change_redraws_from_blank() {
        let mut d = dispatcher("SA,VU", false);
        let snap = tone(d.snapshot_frames());
        d.tick(MeasurementKind::Spectrum, Some(&snap));
        d.shared().cycle();
        assert_eq!(d.tick(MeasurementKind::Loudness, Some(&snap)), TickOutcome::Rendered);
        assert!(!d.cache().state().needs_clear);
    }

    #[test]
    fn zero_draws_resting_frame() {
        let mut d = dispatcher("SA", false);
        let snap = tone(d.snapshot_frames());
        d.tick(MeasurementKind::Spectrum, Some(&snap));
        let busy = d.canvas().lit();
        d.zero();
        assert!(d.canvas().lit() < busy);
        assert_eq!(d.cache().state(), &crate::meter::MeterState::neutral());
    }
}
