//! Loop buffer - the fixed-length multi-channel sample store
//!
//! A `LoopBuffer` never changes shape once created. Recreating the loop or
//! merging a recording produces a whole new buffer which the engine swaps in.

use super::error::LoopError;

/// Fixed-duration, fixed-rate, multi-channel sample store for one loop cycle
#[derive(Debug, Clone, PartialEq)]
pub struct LoopBuffer {
    sample_rate: u32,
    duration: f64,
    frame_count: usize,
    channels: Vec<Vec<f32>>,
}

impl LoopBuffer {
    /// Allocate a silent buffer of `ceil(sample_rate * duration)` frames per channel.
    pub fn create(
        duration: f64,
        sample_rate: u32,
        channel_count: usize,
        max_duration: f64,
    ) -> Result<Self, LoopError> {
        if !duration.is_finite() || duration <= 0.0 || duration > max_duration {
            return Err(LoopError::InvalidDuration {
                seconds: duration,
                max: max_duration,
            });
        }
        if sample_rate == 0 {
            return Err(LoopError::InvalidFormat("sample rate must be positive".into()));
        }
        if channel_count == 0 {
            return Err(LoopError::InvalidFormat("at least one channel is required".into()));
        }

        let frame_count = (sample_rate as f64 * duration).ceil() as usize;
        let mut channels = Vec::with_capacity(channel_count);
        for _ in 0..channel_count {
            channels.push(silent_channel(frame_count)?);
        }

        Ok(Self {
            sample_rate,
            duration,
            frame_count,
            channels,
        })
    }

    /// Assemble a buffer from channels that already have the right length.
    pub(crate) fn from_channels(sample_rate: u32, duration: f64, channels: Vec<Vec<f32>>) -> Self {
        let frame_count = channels.first().map(Vec::len).unwrap_or(0);
        debug_assert!(channels.iter().all(|c| c.len() == frame_count));
        Self {
            sample_rate,
            duration,
            frame_count,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Declared loop duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples of channel `index`. Panics if the channel does not exist.
    pub fn channel_data(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Mutable samples of channel `index`. Panics if the channel does not exist.
    pub fn channel_data_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Convert a position in seconds to the nearest frame index (not clamped).
    pub fn seconds_to_frame(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64).round() as usize
    }

    /// Peak overview per channel, `points` values each (fewer for short buffers).
    pub fn overview(&self, points: usize) -> Vec<Vec<f32>> {
        if points == 0 || self.frame_count == 0 {
            return vec![Vec::new(); self.channels.len()];
        }

        let chunk_size = self.frame_count.div_ceil(points).max(1);
        self.channels
            .iter()
            .map(|channel| {
                channel
                    .chunks(chunk_size)
                    .map(|chunk| chunk.iter().fold(0.0f32, |max, &v| max.max(v.abs())))
                    .collect()
            })
            .collect()
    }
}

fn silent_channel(frame_count: usize) -> Result<Vec<f32>, LoopError> {
    let mut samples = Vec::new();
    samples
        .try_reserve_exact(frame_count)
        .map_err(|_| LoopError::AllocationError { frames: frame_count })?;
    samples.resize(frame_count, 0.0);
    Ok(samples)
}

/// Copy of `source` that is guaranteed to have been reserved up front.
pub(crate) fn copy_channel(source: &[f32]) -> Result<Vec<f32>, LoopError> {
    let mut samples = Vec::new();
    samples
        .try_reserve_exact(source.len())
        .map_err(|_| LoopError::AllocationError { frames: source.len() })?;
    samples.extend_from_slice(source);
    Ok(samples)
}
