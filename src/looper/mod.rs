//! Looper module - loop buffer, clock, overdub merging and transport
//!
//! This module provides:
//! - The fixed-shape loop buffer
//! - Clock and time sources for position tracking
//! - Splicing of recorded passes into the buffer
//! - Recording session and playback controller
//! - WAV export
//! - The `LoopEngine` facade tying them together

mod buffer;
mod clock;
mod engine;
mod error;
mod export;
mod merge;
mod playback;
mod recording;

pub use buffer::LoopBuffer;
pub use clock::{
    did_wrap, position_at, wrap_position, LoopClock, ManualTimeSource, SystemTimeSource, TimeSource,
};
pub use engine::{EngineEvent, EngineMode, LoopEngine, MergeSummary, SharedLoopState};
pub use error::LoopError;
pub use export::{export_wav, ExportFormat, ExportedAudio};
pub use merge::{splice, MergeOutcome, SegmentMerger};
pub use playback::{
    Observers, PlaybackController, PositionObserver, PositionSource, PositionUpdate, SubscriptionId,
};
pub use recording::{RecordingSegment, RecordingSession, RecordingTick};
