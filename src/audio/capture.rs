//! Capture collaborator contract and the encoded capture artifact

use std::io::Cursor;

use thiserror::Error;

/// Errors raised by a capture collaborator
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No input device available")]
    NoDevice,

    #[error("Input device not found: {0}")]
    DeviceNotFound(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Input stream error: {0}")]
    Stream(String),

    #[error("Capture is not running")]
    NotCapturing,

    #[error("Capture source unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode captured audio: {0}")]
    Encode(#[from] hound::Error),
}

/// Opaque encoded audio produced by one capture pass
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EncodedAudio {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn wav(bytes: Vec<u8>) -> Self {
        Self::new(bytes, WAV_MIME_TYPE)
    }

    /// File extension hint derived from the MIME type
    pub fn extension(&self) -> Option<&'static str> {
        let subtype = self.mime_type.split(';').next()?.trim();
        match subtype {
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
            "audio/flac" | "audio/x-flac" => Some("flac"),
            "audio/ogg" => Some("ogg"),
            "audio/mpeg" => Some("mp3"),
            "audio/mp4" | "audio/aac" => Some("m4a"),
            _ => None,
        }
    }
}

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Source of recorded audio for one pass at a time.
///
/// `stop_capture` is a blocking call. An implementation that never returns
/// leaves the engine parked in its merging state; callers that need a bound
/// must impose their own timeout around the collaborator.
pub trait CaptureSource {
    /// Begin a capture pass
    fn start_capture(&mut self) -> Result<(), CaptureError>;

    /// End the current pass and hand over its encoded audio
    fn stop_capture(&mut self) -> Result<EncodedAudio, CaptureError>;
}

/// Encode interleaved f32 samples as a 32-bit float WAV file in memory
pub fn encode_wav_f32(
    interleaved: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
        for &sample in interleaved {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_hint() {
        assert_eq!(EncodedAudio::wav(Vec::new()).extension(), Some("wav"));
        assert_eq!(
            EncodedAudio::new(Vec::new(), "audio/ogg; codecs=opus").extension(),
            Some("ogg")
        );
        assert_eq!(EncodedAudio::new(Vec::new(), "audio/webm").extension(), None);
    }

    #[test]
    fn test_encode_wav_f32_header() {
        let bytes = encode_wav_f32(&[0.0, 0.5, -0.5, 1.0], 22050, 2).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(reader.duration(), 2);
    }
}
