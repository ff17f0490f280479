//! Capture source that replays a pre-encoded clip
//!
//! Used to overdub an existing audio file into the loop instead of the
//! microphone, and to drive the engine without audio hardware.

use std::fs;
use std::path::Path;

use super::capture::{CaptureError, CaptureSource, EncodedAudio};

pub struct ClipCapture {
    clip: EncodedAudio,
    available: bool,
    capturing: bool,
    passes: usize,
}

impl ClipCapture {
    pub fn new(clip: EncodedAudio) -> Self {
        Self {
            clip,
            available: true,
            capturing: false,
            passes: 0,
        }
    }

    /// Load an audio file from disk, using its extension as the format hint
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| CaptureError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some("flac") => "audio/flac",
            Some("ogg") => "audio/ogg",
            Some("mp3") => "audio/mpeg",
            Some("m4a") | Some("aac") => "audio/mp4",
            _ => super::capture::WAV_MIME_TYPE,
        };
        log::info!("Loaded overdub clip {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(EncodedAudio::new(bytes, mime)))
    }

    /// A source whose `start_capture` always fails
    pub fn unavailable() -> Self {
        let mut capture = Self::new(EncodedAudio::wav(Vec::new()));
        capture.available = false;
        capture
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Completed capture passes
    pub fn passes(&self) -> usize {
        self.passes
    }
}

impl CaptureSource for ClipCapture {
    fn start_capture(&mut self) -> Result<(), CaptureError> {
        if !self.available {
            return Err(CaptureError::Unavailable("clip source disabled".into()));
        }
        self.capturing = true;
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<EncodedAudio, CaptureError> {
        if !self.capturing {
            return Err(CaptureError::NotCapturing);
        }
        self.capturing = false;
        self.passes += 1;
        Ok(self.clip.clone())
    }
}
