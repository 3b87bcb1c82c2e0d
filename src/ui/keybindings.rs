// src/ui/keybindings.rs
//! Keyboard input handling for the preview.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewAction {
    CycleMode,
    ToggleDownmix,
    ToggleActive,
    Redraw,
    Quit,
    None,
}

/// Convert a key event to a preview action.
pub fn key_to_action(key: &KeyEvent) -> PreviewAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return PreviewAction::Quit;
    }
    match key.code {
        KeyCode::Char('m') | KeyCode::Right => PreviewAction::CycleMode,
        KeyCode::Char('d') => PreviewAction::ToggleDownmix,
        KeyCode::Char(' ') => PreviewAction::ToggleActive,
        KeyCode::Char('r') => PreviewAction::Redraw,
        KeyCode::Char('q') | KeyCode::Esc => PreviewAction::Quit,
        _ => PreviewAction::None,
    }
}
