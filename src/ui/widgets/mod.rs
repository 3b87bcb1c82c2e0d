// src/ui/widgets/mod.rs
//! Widgets for the terminal preview.

pub mod display;
pub mod status;

pub use display::{braille_rows, display_size, render_display};
pub use status::render_status;
