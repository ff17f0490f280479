//! Microphone capture
//!
//! Opens an input device with cpal and records passes into a lock-free ring.
//! The stream stays open between passes so a new pass can start on the
//! already-open connection; only the capturing flag gates the callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::buffer::{capture_ring, CaptureConsumer};
use super::capture::{encode_wav_f32, CaptureError, CaptureSource, EncodedAudio};

/// Names of the input devices on the default host
pub fn input_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Capture collaborator backed by a cpal input stream
pub struct MicrophoneCapture {
    /// Requested device name, `None` for the host default
    device_name: Option<String>,

    /// Longest pass the ring must hold, in seconds
    max_seconds: f64,

    /// Whether the callback should keep samples
    is_capturing: Arc<AtomicBool>,

    /// The audio input stream
    stream: Option<cpal::Stream>,

    /// Consumer side of the capture ring
    consumer: Option<CaptureConsumer>,

    /// Format of the open stream
    sample_rate: u32,
    channels: u16,

    /// Gain multiplier (shared atomically with audio thread)
    gain_atomic: Arc<AtomicU32>,
}

impl MicrophoneCapture {
    pub fn new(device_name: Option<String>, max_seconds: f64) -> Self {
        Self {
            device_name,
            max_seconds,
            is_capturing: Arc::new(AtomicBool::new(false)),
            stream: None,
            consumer: None,
            sample_rate: 0,
            channels: 0,
            gain_atomic: Arc::new(AtomicU32::new(1.0_f32.to_bits())),
        }
    }

    /// Check if currently capturing
    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::Relaxed)
    }

    /// Set the input gain; takes effect on the next callback
    pub fn set_gain(&self, gain: f32) {
        self.gain_atomic.store(gain.to_bits(), Ordering::Relaxed);
    }

    fn find_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::Stream(e.to_string()))?
                .find(|d| d.name().ok().as_ref() == Some(name))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.clone())),
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
        }
    }

    /// Open the input stream if it is not open yet
    fn open(&mut self) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = self.find_device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using input device: {}", device_name);

        let config = device
            .default_input_config()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        log::info!("Audio config: {:?}", config);

        let channels = config.channels();
        let sample_rate = config.sample_rate().0;
        let capacity = (self.max_seconds * sample_rate as f64).ceil() as usize * channels as usize;
        let (mut producer, consumer) = capture_ring(capacity);

        let is_capturing = Arc::clone(&self.is_capturing);
        let gain_atomic = Arc::clone(&self.gain_atomic);

        let stream_result = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !is_capturing.load(Ordering::Relaxed) {
                        return;
                    }
                    let gain = f32::from_bits(gain_atomic.load(Ordering::Relaxed));
                    if gain == 1.0 {
                        producer.push_slice(data);
                    } else {
                        for &s in data {
                            producer.push(s * gain);
                        }
                    }
                },
                |err| log::error!("Audio input error: {}", err),
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if !is_capturing.load(Ordering::Relaxed) {
                        return;
                    }
                    let gain = f32::from_bits(gain_atomic.load(Ordering::Relaxed));
                    for &s in data {
                        producer.push((s as f32 / 32768.0) * gain);
                    }
                },
                |err| log::error!("Audio input error: {}", err),
                None,
            ),
            format => {
                return Err(CaptureError::UnsupportedFormat(format!("{:?}", format)));
            }
        };

        let stream = stream_result.map_err(|e| CaptureError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        self.stream = Some(stream);
        self.consumer = Some(consumer);
        self.sample_rate = sample_rate;
        self.channels = channels;
        Ok(())
    }
}

impl CaptureSource for MicrophoneCapture {
    fn start_capture(&mut self) -> Result<(), CaptureError> {
        if self.is_capturing() {
            return Ok(());
        }

        self.open()?;

        // discard anything left over from before this pass
        if let Some(consumer) = self.consumer.as_mut() {
            consumer.drain();
        }

        self.is_capturing.store(true, Ordering::Relaxed);
        log::info!("Capture started");
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<EncodedAudio, CaptureError> {
        if !self.is_capturing() {
            return Err(CaptureError::NotCapturing);
        }
        self.is_capturing.store(false, Ordering::Relaxed);

        let consumer = self.consumer.as_mut().ok_or(CaptureError::NotCapturing)?;
        let samples = consumer.drain();
        let dropped = consumer.samples_dropped();
        if dropped > 0 {
            log::warn!("Capture ring overflowed, {} samples dropped so far", dropped);
        }

        let frames = samples.len() / self.channels.max(1) as usize;
        log::info!(
            "Capture stopped: {} frames at {} Hz, {} channel(s)",
            frames,
            self.sample_rate,
            self.channels
        );

        let bytes = encode_wav_f32(&samples, self.sample_rate, self.channels)?;
        Ok(EncodedAudio::wav(bytes))
    }
}
