//! WAV export of the loop buffer

use std::io::Cursor;

use serde::{Deserialize, Serialize};

use super::buffer::LoopBuffer;
use super::error::LoopError;
use crate::audio::WAV_MIME_TYPE;

/// Sample encoding used for exported WAV files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    /// 16-bit signed integer PCM
    #[default]
    Pcm16,
    /// 32-bit IEEE float
    Float32,
}

impl ExportFormat {
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            ExportFormat::Pcm16 => 16,
            ExportFormat::Float32 => 32,
        }
    }
}

/// An exported loop, ready to be written or downloaded
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Encode every channel at the buffer's native rate into a WAV container.
///
/// The output depends only on the buffer contents and the format.
pub fn export_wav(buffer: &LoopBuffer, format: ExportFormat) -> Result<ExportedAudio, LoopError> {
    let channels = u16::try_from(buffer.channel_count())
        .map_err(|_| LoopError::ExportFailed("too many channels for WAV".into()))?;
    let spec = hound::WavSpec {
        channels,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: format.bits_per_sample(),
        sample_format: match format {
            ExportFormat::Pcm16 => hound::SampleFormat::Int,
            ExportFormat::Float32 => hound::SampleFormat::Float,
        },
    };

    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
        for frame in 0..buffer.frame_count() {
            for channel in buffer.channels() {
                let sample = channel[frame];
                match format {
                    ExportFormat::Pcm16 => writer.write_sample(to_i16(sample))?,
                    ExportFormat::Float32 => writer.write_sample(sample)?,
                }
            }
        }
        writer.finalize()?;
    }

    log::info!(
        "Exported {} frames x {} channel(s) at {} Hz ({} bytes)",
        buffer.frame_count(),
        channels,
        buffer.sample_rate(),
        bytes.len()
    );
    Ok(ExportedAudio {
        bytes,
        mime_type: WAV_MIME_TYPE,
    })
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioDecoder, EncodedAudio, SymphoniaDecoder};

    fn tone_buffer() -> LoopBuffer {
        let mut buffer = LoopBuffer::create(4.0, 44100, 2, 60.0).unwrap();
        for ch in 0..2 {
            let freq = if ch == 0 { 440.0 } else { 660.0 };
            for (i, s) in buffer.channel_data_mut(ch).iter_mut().enumerate() {
                let t = i as f32 / 44100.0;
                *s = 0.5 * (2.0 * std::f32::consts::PI * freq * t).sin();
            }
        }
        buffer
    }

    #[test]
    fn test_header_fields() {
        let buffer = tone_buffer();
        let exported = export_wav(&buffer, ExportFormat::Pcm16).unwrap();
        assert_eq!(exported.mime_type, "audio/wav");

        let reader = hound::WavReader::new(Cursor::new(exported.bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration() as usize, buffer.frame_count());
        assert_eq!(reader.len() as usize, buffer.frame_count() * 2);
    }

    #[test]
    fn test_deterministic() {
        let buffer = tone_buffer();
        let a = export_wav(&buffer, ExportFormat::Pcm16).unwrap();
        let b = export_wav(&buffer, ExportFormat::Pcm16).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pcm16_round_trip() {
        let buffer = tone_buffer();
        let exported = export_wav(&buffer, ExportFormat::Pcm16).unwrap();
        let decoded = SymphoniaDecoder::new()
            .decode(EncodedAudio::wav(exported.bytes), 44100, 2)
            .unwrap();

        for ch in 0..2 {
            assert_eq!(decoded[ch].len(), buffer.frame_count());
            let max_err = decoded[ch]
                .iter()
                .zip(buffer.channel_data(ch))
                .fold(0.0f32, |m, (a, b)| m.max((a - b).abs()));
            assert!(max_err < 1e-3, "channel {} error {}", ch, max_err);
        }
    }

    #[test]
    fn test_float32_round_trip_is_exact() {
        let buffer = tone_buffer();
        let exported = export_wav(&buffer, ExportFormat::Float32).unwrap();
        let decoded = SymphoniaDecoder::new()
            .decode(EncodedAudio::wav(exported.bytes), 44100, 2)
            .unwrap();
        assert_eq!(decoded[0], buffer.channel_data(0));
        assert_eq!(decoded[1], buffer.channel_data(1));
    }

    #[test]
    fn test_clipping() {
        assert_eq!(to_i16(2.0), i16::MAX);
        assert_eq!(to_i16(-2.0), -i16::MAX);
        assert_eq!(to_i16(0.0), 0);
    }
}
