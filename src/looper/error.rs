//! Error taxonomy for the loop engine

use thiserror::Error;

/// Errors surfaced by loop engine operations.
///
/// Every variant is recoverable: a failing operation leaves the engine in the
/// state it was in before the call (or `Idle` when a start failed).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoopError {
    #[error("Invalid loop duration {seconds}s (must be > 0 and <= {max}s)")]
    InvalidDuration { seconds: f64, max: f64 },

    #[error("Could not allocate {frames} frames for the loop buffer")]
    AllocationError { frames: usize },

    #[error("Invalid buffer format: {0}")]
    InvalidFormat(String),

    #[error("No loop buffer has been created")]
    NoActiveBuffer,

    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Failed to decode captured audio: {0}")]
    DecodeError(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Engine is busy ({0})")]
    AlreadyActive(String),

    #[error("Nothing to stop: {0} is not active")]
    NotActive(&'static str),

    #[error("Playback output unavailable: {0}")]
    OutputUnavailable(String),

    #[error("Cannot export: no loop buffer exists")]
    EmptyBufferError,

    #[error("Export failed: {0}")]
    ExportFailed(String),
}

impl From<crate::audio::CaptureError> for LoopError {
    fn from(error: crate::audio::CaptureError) -> Self {
        LoopError::CaptureUnavailable(error.to_string())
    }
}

impl From<crate::audio::DecodeError> for LoopError {
    fn from(error: crate::audio::DecodeError) -> Self {
        LoopError::DecodeError(error.to_string())
    }
}

impl From<crate::audio::OutputError> for LoopError {
    fn from(error: crate::audio::OutputError) -> Self {
        LoopError::OutputUnavailable(error.to_string())
    }
}

impl From<hound::Error> for LoopError {
    fn from(error: hound::Error) -> Self {
        LoopError::ExportFailed(error.to_string())
    }
}
