// src/ui/widgets/status.rs
//! One-line status under the display.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::dispatch::ConfigView;

pub fn status_line(view: &ConfigView, playing: bool, label: &str) -> Line<'static> {
    let dim = Style::default().fg(Color::DarkGray);
    let bold = Style::default().add_modifier(Modifier::BOLD);
    Line::from(vec![
        Span::styled(view.mode.code().to_string(), bold),
        Span::styled(" │ ", dim),
        Span::raw(if view.downmix {
            format!("downmix {label}")
        } else {
            "stereo".to_string()
        }),
        Span::styled(" │ ", dim),
        Span::raw(if view.active { "on" } else { "off" }),
        Span::styled(" │ ", dim),
        Span::raw(if playing { "playing" } else { "idle" }),
        Span::styled("   m: mode  d: downmix  space: on/off  q: quit", dim),
    ])
}

pub fn render_status(f: &mut Frame<'_>, area: Rect, view: &ConfigView, playing: bool, label: &str) {
    f.render_widget(Paragraph::new(status_line(view, playing, label)), area);
}
