// src/ui/mod.rs
//! Terminal preview of the display, for running away from the real panel.

pub mod keybindings;
pub mod tui;
pub mod widgets;

pub use tui::{Preview, run};
