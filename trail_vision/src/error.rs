// THEORY:
// The `error` module names every way the tracking engine can refuse work.
// Source-level failures surface once to the caller. Per-frame anomalies are
// logged where they happen and never leave the worker loop, so only the
// variants a caller can act on are returned through `Result`.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackError>;

#[derive(Debug, Error)]
pub enum TrackError {
    /// The video could not be opened. `load` leaves the previous state untouched.
    #[error("cannot open frame source {path}: {reason}")]
    SourceOpen { path: PathBuf, reason: String },

    /// A frame could not be read or the source could not seek.
    #[error("frame source read failed: {0}")]
    SourceRead(String),

    /// A frame with unexpected dimensions reached the pipeline.
    #[error("malformed frame of {width}x{height}")]
    MalformedFrame { width: u32, height: u32 },

    /// A setter or config file carried a value outside its valid domain.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The playback worker has exited and no longer accepts commands.
    #[error("playback worker is no longer running")]
    WorkerStopped,

    #[error("cannot read config file {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl TrackError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        TrackError::InvalidConfiguration(message.into())
    }
}
