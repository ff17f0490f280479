//! loopdub - loop overdub engine
//!
//! Owns a fixed-duration circular audio buffer, splices live-captured passes
//! into it at arbitrary offsets, and tracks a wall-clock accurate playhead for
//! visualization and scrubbing.

pub mod audio;
pub mod looper;
pub mod settings;

pub use looper::{EngineEvent, EngineMode, LoopBuffer, LoopEngine, LoopError};
pub use settings::EngineSettings;
