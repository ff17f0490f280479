//! Decoding of capture artifacts into per-channel PCM using symphonia

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as SymphoniaSampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::capture::EncodedAudio;

/// Errors that can occur while decoding captured audio
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Captured audio is empty")]
    Empty,

    #[error("Failed to probe audio format: {0}")]
    ProbeError(String),

    #[error("No audio tracks found")]
    NoTracks,

    #[error("Decoder error: {0}")]
    DecoderError(String),

    #[error("Decoded audio contains no frames")]
    NoFrames,
}

/// Decoder collaborator: encoded bytes to one sample vector per channel
pub trait AudioDecoder {
    /// Decode `audio`, resampled to `target_sample_rate` and mapped to `channels`.
    ///
    /// The artifact is consumed.
    fn decode(
        &self,
        audio: EncodedAudio,
        target_sample_rate: u32,
        channels: usize,
    ) -> Result<Vec<Vec<f32>>, DecodeError>;
}

/// Decoder for every container/codec symphonia is built with
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(
        &self,
        audio: EncodedAudio,
        target_sample_rate: u32,
        channels: usize,
    ) -> Result<Vec<Vec<f32>>, DecodeError> {
        if audio.bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let (interleaved, source_channels, source_rate) = decode_interleaved(audio)?;
        if interleaved.is_empty() {
            return Err(DecodeError::NoFrames);
        }

        let planar = deinterleave(&interleaved, source_channels);
        let mapped = map_channels(planar, channels);

        if source_rate == target_sample_rate || target_sample_rate == 0 {
            Ok(mapped)
        } else {
            log::debug!("Resampling capture {} Hz -> {} Hz", source_rate, target_sample_rate);
            Ok(mapped
                .iter()
                .map(|channel| resample_linear(channel, source_rate, target_sample_rate))
                .collect())
        }
    }
}

/// Decode the whole stream into interleaved f32, returning (samples, channels, rate)
fn decode_interleaved(audio: EncodedAudio) -> Result<(Vec<f32>, usize, u32), DecodeError> {
    let mut hint = Hint::new();
    if let Some(ext) = audio.extension() {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(audio.bytes)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::ProbeError(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTracks)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::DecoderError(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::DecoderError(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();

                let mut buf = SymphoniaSampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // corrupt packets are skipped, like a player would
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::DecoderError(e.to_string())),
        }
    }

    if channels == 0 {
        return Err(DecodeError::DecoderError("unknown channel layout".into()));
    }
    Ok((samples, channels, sample_rate))
}

fn deinterleave(interleaved: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = interleaved.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    planar
}

/// Mono is copied into every output channel; extra channels are dropped.
fn map_channels(mut planar: Vec<Vec<f32>>, channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 || planar.len() == channels {
        return planar;
    }
    if planar.len() > channels {
        planar.truncate(channels);
        return planar;
    }
    let last = planar.last().cloned().unwrap_or_default();
    while planar.len() < channels {
        planar.push(last.clone());
    }
    planar
}

/// Linear-interpolation resampler
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == 0 {
        return Vec::new();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).round() as usize;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let index = pos.floor() as usize;
            if index >= last {
                return input[last];
            }
            let frac = (pos - index as f64) as f32;
            input[index] + (input[index + 1] - input[index]) * frac
        })
        .collect()
}
