// src/error.rs
//! Error types shared across the engine.

use std::io;

use thiserror::Error;

/// Failures talking to the producer's shared-memory segment.
///
/// None of these are fatal: `RingBufferSource` absorbs them and reports
/// "no snapshot" for the tick.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("shared memory segment {0} does not exist")]
    NotFound(String),
    #[error("producer heartbeat is {age}s old")]
    Stale { age: i64 },
    #[error("failed to take producer read lock (errno {0})")]
    LockFailure(i32),
    #[error("failed to map shared memory segment: {0}")]
    Map(#[source] io::Error),
    #[error("shared memory segment has an unexpected layout: {0}")]
    InvalidLayout(String),
}

/// Startup-time configuration failures. These abort before any thread starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid display geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid timer setting: {0}")]
    InvalidTimer(String),
    #[error("no usable visualization mode in list {0:?}")]
    InvalidModeList(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
