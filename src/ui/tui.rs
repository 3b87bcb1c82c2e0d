// src/ui/tui.rs
//! Terminal preview: shows the display buffer live and takes a few keys.

use std::{
    io,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event as CEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
};
use tracing::info;

use crate::dispatch::SharedConfig;
use crate::render::SharedCanvas;
use crate::ui::keybindings::{PreviewAction, key_to_action};
use crate::ui::widgets::{display_size, render_display, render_status};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

pub struct Preview {
    canvas: SharedCanvas,
    shared: SharedConfig,
    title: String,
}

impl Preview {
    pub fn new(canvas: SharedCanvas, shared: SharedConfig, title: impl Into<String>) -> Self {
        Self {
            canvas,
            shared,
            title: title.into(),
        }
    }

    /// Returns true when the preview should close.
    pub fn on_action(&mut self, action: PreviewAction) -> bool {
        match action {
            PreviewAction::CycleMode => {
                let mode = self.shared.cycle();
                info!(%mode, "mode changed from preview");
            }
            PreviewAction::ToggleDownmix => {
                self.shared.toggle_downmix();
            }
            PreviewAction::ToggleActive => {
                self.shared.toggle();
            }
            PreviewAction::Redraw => self.shared.request_refresh(),
            PreviewAction::Quit => return true,
            PreviewAction::None => {}
        }
        false
    }

    pub fn draw(&self, f: &mut Frame<'_>) {
        let fb = self.canvas.lock().clone();
        let (w, h) = display_size(&fb);
        let area = f.area();
        let width = w.min(area.width);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(h), Constraint::Length(1), Constraint::Min(0)])
            .split(area);

        render_display(f, Rect { width, ..rows[0] }, &fb, &self.title);
        render_status(
            f,
            rows[1],
            &self.shared.view(),
            self.shared.is_playing(),
            &self.shared.downmix_label(),
        );
    }
}

/// Runs its closure when dropped, so each terminal setup step is undone on
/// every exit path, in reverse order.
struct Restore<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Restore<F> {
    fn new(undo: F) -> Self {
        Self(Some(undo))
    }
}

impl<F: FnOnce()> Drop for Restore<F> {
    fn drop(&mut self) {
        if let Some(undo) = self.0.take() {
            undo();
        }
    }
}

/// Take over the terminal until the user quits or `keep_running` says stop.
pub fn run(mut preview: Preview, keep_running: impl Fn() -> bool) -> Result<()> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let _raw = Restore::new(|| {
        let _ = disable_raw_mode();
    });
    execute!(io::stdout(), EnterAlternateScreen).context("failed to enter alternate screen")?;
    let _screen = Restore::new(|| {
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    });

    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;
    let result = event_loop(&mut terminal, &mut preview, keep_running);
    terminal.show_cursor()?;
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    preview: &mut Preview,
    keep_running: impl Fn() -> bool,
) -> Result<()> {
    let mut last_frame = Instant::now();
    while keep_running() {
        terminal.draw(|f| preview.draw(f))?;

        let timeout = FRAME_INTERVAL.checked_sub(last_frame.elapsed()).unwrap_or_default();
        if event::poll(timeout)? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && preview.on_action(key_to_action(&key)) {
                    break;
                }
            }
        }

        if last_frame.elapsed() >= FRAME_INTERVAL {
            last_frame = Instant::now();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ModeList;
    use ratatui::backend::TestBackend;

    fn preview() -> Preview {
        let shared = SharedConfig::new(ModeList::parse("VU,SA").unwrap(), false, true);
        Preview::new(SharedCanvas::new(128, 64), shared, "vissy")
    }

    #[test]
    fn actions_drive_shared_config() {
        let mut p = preview();
        assert!(!p.on_action(PreviewAction::CycleMode));
        assert_eq!(p.shared.view().mode.code(), "SA");
        p.on_action(PreviewAction::ToggleDownmix);
        assert!(p.shared.view().downmix);
        p.shared.begin_tick();
        p.on_action(PreviewAction::Redraw);
        assert!(p.shared.view().refresh);
        p.on_action(PreviewAction::ToggleActive);
        assert!(!p.shared.view().active);
        assert!(p.on_action(PreviewAction::Quit));
    }

    #[test]
    fn setup_steps_are_undone_when_a_later_step_fails() {
        use std::cell::RefCell;

        let undone = RefCell::new(Vec::new());
        let setup = || -> Result<()> {
            let _raw = Restore::new(|| undone.borrow_mut().push("raw"));
            let _screen = Restore::new(|| undone.borrow_mut().push("screen"));
            anyhow::bail!("terminal went away")
        };
        assert!(setup().is_err());
        assert_eq!(*undone.borrow(), ["screen", "raw"]);
    }

    #[test]
    fn draws_display_and_status() {
        let p = preview();
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| p.draw(f)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let status: String = (0..80u16)
            .map(|x| buffer[(x, 18)].symbol().to_string())
            .collect();
        assert!(status.starts_with("VU"), "{status}");
    }
}
