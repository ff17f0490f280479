//! Segment merger - splices a captured pass into the loop buffer
//!
//! The merge never touches the input buffer. It builds fresh channel arrays so
//! that anyone still holding the old buffer (a playback stream) keeps reading
//! consistent data until the engine swaps the new one in.

use super::buffer::{copy_channel, LoopBuffer};
use super::error::LoopError;
use crate::audio::{AudioDecoder, EncodedAudio};

/// Result of a successful merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The new buffer, same shape as the input
    pub buffer: LoopBuffer,
    /// First frame of the overwritten span
    pub start_frame: usize,
    /// One past the last frame of the span, after clamping to the buffer end
    pub end_frame: usize,
    /// Frames actually replaced (less than the span when the capture is short)
    pub frames_written: usize,
}

/// Replace `[start, end)` seconds of `buffer` with `capture`, returning a new buffer.
///
/// The end is clamped to the loop duration; nothing is wrapped into the start
/// of the buffer. Frames of the span beyond the captured length keep their
/// original samples. A mono capture is written into every channel.
pub fn splice(
    buffer: &LoopBuffer,
    capture: &[Vec<f32>],
    start: f64,
    end: f64,
) -> Result<MergeOutcome, LoopError> {
    let duration = buffer.duration();
    if !start.is_finite() || start < 0.0 || start >= duration {
        return Err(LoopError::InvalidPosition(format!(
            "merge start {}s outside [0, {})",
            start, duration
        )));
    }
    if end.is_nan() || end <= start {
        return Err(LoopError::InvalidPosition(format!(
            "merge end {}s must be after start {}s",
            end, start
        )));
    }

    let frame_count = buffer.frame_count();
    let start_frame = buffer.seconds_to_frame(start).min(frame_count);
    let end_frame = buffer.seconds_to_frame(end.min(duration)).min(frame_count);
    let span = end_frame.saturating_sub(start_frame);

    let mut channels = Vec::with_capacity(buffer.channel_count());
    let mut frames_written = 0;
    for index in 0..buffer.channel_count() {
        let mut samples = copy_channel(buffer.channel_data(index))?;
        let source = capture.get(index).or_else(|| capture.last());
        if let Some(source) = source {
            let count = span.min(source.len());
            samples[start_frame..start_frame + count].copy_from_slice(&source[..count]);
            frames_written = frames_written.max(count);
        }
        channels.push(samples);
    }

    Ok(MergeOutcome {
        buffer: LoopBuffer::from_channels(buffer.sample_rate(), duration, channels),
        start_frame,
        end_frame,
        frames_written,
    })
}

/// Decodes capture artifacts and splices them into the loop
pub struct SegmentMerger {
    decoder: Box<dyn AudioDecoder>,
}

impl SegmentMerger {
    pub fn new(decoder: Box<dyn AudioDecoder>) -> Self {
        Self { decoder }
    }

    /// Decode `capture` at the buffer's rate and splice it over `[start, end)`.
    pub fn merge(
        &self,
        buffer: Option<&LoopBuffer>,
        capture: EncodedAudio,
        start: f64,
        end: f64,
    ) -> Result<MergeOutcome, LoopError> {
        let buffer = buffer.ok_or(LoopError::NoActiveBuffer)?;
        let decoded = self
            .decoder
            .decode(capture, buffer.sample_rate(), buffer.channel_count())?;

        let outcome = splice(buffer, &decoded, start, end)?;
        log::debug!(
            "Merged {} frames into [{}, {}) of {}",
            outcome.frames_written,
            outcome.start_frame,
            outcome.end_frame,
            buffer.frame_count()
        );
        Ok(outcome)
    }
}
