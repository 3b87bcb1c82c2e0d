// src/lib.rs
//! Vissy - audio visualization for small attached displays.
//!
//! Samples come from a squeezelite shared-memory ring (or a local test tone),
//! are turned into loudness and spectrum measurements, damped into meter
//! state and drawn as VU needles, peak segments or spectrum bars.

pub mod analysis;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ipc;
pub mod meter;
pub mod render;
pub mod scheduler;
pub mod ui;
