//! Loop playback output
//!
//! The output plays an `Arc<LoopBuffer>` snapshot endlessly. A merge that
//! happens later produces a new buffer; the running stream keeps reading the
//! snapshot it was started with until it is restarted.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::looper::LoopBuffer;

/// Errors raised when starting playback output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to get output config: {0}")]
    Config(String),

    #[error("Failed to build output stream: {0}")]
    Build(String),

    #[error("Failed to start output stream: {0}")]
    Play(String),
}

/// Audible side of loop playback
pub trait LoopOutput {
    /// Start playing `buffer` looped, beginning at `from_frame`
    fn start(&mut self, buffer: Arc<LoopBuffer>, from_frame: usize) -> Result<(), OutputError>;

    /// Stop playing; a no-op when already stopped
    fn stop(&mut self);
}

/// Output that produces no sound, for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentOutput;

impl SilentOutput {
    pub fn new() -> Self {
        Self
    }
}

impl LoopOutput for SilentOutput {
    fn start(&mut self, _buffer: Arc<LoopBuffer>, _from_frame: usize) -> Result<(), OutputError> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Output on the default cpal device
pub struct CpalOutput {
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self { stream: None }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopOutput for CpalOutput {
    fn start(&mut self, buffer: Arc<LoopBuffer>, from_frame: usize) -> Result<(), OutputError> {
        self.stop();

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
        let default_config = device
            .default_output_config()
            .map_err(|e| OutputError::Config(e.to_string()))?;

        let mut config: cpal::StreamConfig = default_config.into();
        config.sample_rate = cpal::SampleRate(buffer.sample_rate());
        let device_channels = config.channels as usize;

        let frame_count = buffer.frame_count();
        let loop_channels = buffer.channel_count();
        let mut cursor = if frame_count == 0 { 0 } else { from_frame % frame_count };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(device_channels) {
                        if frame_count == 0 {
                            frame.fill(0.0);
                            continue;
                        }
                        for (ch, out) in frame.iter_mut().enumerate() {
                            let source = buffer.channel_data(ch.min(loop_channels - 1));
                            *out = source[cursor];
                        }
                        cursor = (cursor + 1) % frame_count;
                    }
                },
                |err| log::error!("Audio output error: {}", err),
                None,
            )
            .map_err(|e| OutputError::Build(e.to_string()))?;

        stream.play().map_err(|e| OutputError::Play(e.to_string()))?;
        self.stream = Some(stream);
        log::info!("Output stream started at frame {}", from_frame);
        Ok(())
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Output stream stopped");
        }
    }
}
