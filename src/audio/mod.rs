//! Audio module - collaborators that touch devices and codecs
//!
//! This module provides:
//! - Lock-free ring for captured samples
//! - Microphone and clip capture sources
//! - Decoding of captured audio
//! - Loop playback output

mod buffer;
mod capture;
mod clip;
mod decode;
mod input;
mod output;

pub use buffer::{capture_ring, CaptureConsumer, CaptureProducer};
pub use capture::{encode_wav_f32, CaptureError, CaptureSource, EncodedAudio, WAV_MIME_TYPE};
pub use clip::ClipCapture;
pub use decode::{AudioDecoder, DecodeError, SymphoniaDecoder};
pub use input::{input_devices, MicrophoneCapture};
pub use output::{CpalOutput, LoopOutput, OutputError, SilentOutput};
