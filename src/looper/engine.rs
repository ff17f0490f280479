//! Loop engine - the single owner of the loop buffer and playhead
//!
//! Recording and playback are never active at the same time. Mode changes go
//! through a compare-and-swap on the shared mode so a transition is decided
//! before any capture or output work begins.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use super::buffer::LoopBuffer;
use super::clock::TimeSource;
use super::error::LoopError;
use super::export::{export_wav, ExportedAudio};
use super::merge::{MergeOutcome, SegmentMerger};
use super::playback::{
    Observers, PlaybackController, PositionObserver, PositionSource, PositionUpdate, SubscriptionId,
};
use super::recording::{RecordingSegment, RecordingSession};
use crate::audio::{AudioDecoder, CaptureSource, LoopOutput, SilentOutput, SymphoniaDecoder};
use crate::settings::EngineSettings;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineMode {
    Idle,
    Recording,
    Merging,
    Playing,
}

impl From<u8> for EngineMode {
    fn from(val: u8) -> Self {
        match val {
            1 => EngineMode::Recording,
            2 => EngineMode::Merging,
            3 => EngineMode::Playing,
            _ => EngineMode::Idle,
        }
    }
}

/// Mode and playhead readable from any thread without touching the engine.
#[derive(Clone, Debug)]
pub struct SharedLoopState {
    mode: Arc<AtomicU8>,
    position: Arc<AtomicU64>,
}

impl SharedLoopState {
    pub fn new() -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(EngineMode::Idle as u8)),
            position: Arc::new(AtomicU64::new(0.0_f64.to_bits())),
        }
    }

    pub fn mode(&self) -> EngineMode {
        self.mode.load(Ordering::Acquire).into()
    }

    pub fn position(&self) -> f64 {
        f64::from_bits(self.position.load(Ordering::Relaxed))
    }

    fn set_position(&self, position: f64) {
        self.position.store(position.to_bits(), Ordering::Relaxed);
    }

    /// Move from `from` to `to`, or report the mode actually found.
    pub fn try_transition(&self, from: EngineMode, to: EngineMode) -> Result<(), EngineMode> {
        self.mode
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(EngineMode::from)
    }

    fn force(&self, mode: EngineMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }
}

impl Default for SharedLoopState {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a merge landed in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub start_frame: usize,
    pub end_frame: usize,
    pub frames_written: usize,
}

impl From<&MergeOutcome> for MergeSummary {
    fn from(outcome: &MergeOutcome) -> Self {
        Self {
            start_frame: outcome.start_frame,
            end_frame: outcome.end_frame,
            frames_written: outcome.frames_written,
        }
    }
}

/// Something `poll` did
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PositionChanged {
        position: f64,
        source: PositionSource,
        wrapped: bool,
    },
    /// A recording reached its requested duration and was stopped and merged
    RecordingFinished(Result<MergeSummary, LoopError>),
}

pub struct LoopEngine {
    settings: EngineSettings,
    time: Arc<dyn TimeSource>,
    capture: Box<dyn CaptureSource>,
    merger: SegmentMerger,
    recording: RecordingSession,
    playback: PlaybackController,
    observers: Observers,
    buffer: Option<Arc<LoopBuffer>>,
    position: f64,
    shared: SharedLoopState,
    last_error: Option<String>,
}

impl LoopEngine {
    pub fn new(
        settings: EngineSettings,
        time: Arc<dyn TimeSource>,
        capture: Box<dyn CaptureSource>,
        decoder: Box<dyn AudioDecoder>,
        output: Box<dyn LoopOutput>,
    ) -> Self {
        let recording = RecordingSession::new(settings.recording_tick());
        let playback = PlaybackController::new(output, settings.playback_tick());
        Self {
            settings,
            time,
            capture,
            merger: SegmentMerger::new(decoder),
            recording,
            playback,
            observers: Observers::new(),
            buffer: None,
            position: 0.0,
            shared: SharedLoopState::new(),
            last_error: None,
        }
    }

    /// Engine with the symphonia decoder and no audible output
    pub fn headless(
        settings: EngineSettings,
        time: Arc<dyn TimeSource>,
        capture: Box<dyn CaptureSource>,
    ) -> Self {
        Self::new(
            settings,
            time,
            capture,
            Box::new(SymphoniaDecoder::new()),
            Box::new(SilentOutput::new()),
        )
    }

    // ---- lifecycle -------------------------------------------------------

    /// Create a new silent loop, discarding the old buffer and segment history.
    pub fn initialize_loop_buffer(&mut self, duration: f64) -> Result<(), LoopError> {
        let result = self.initialize_inner(duration);
        self.record(result)
    }

    fn initialize_inner(&mut self, duration: f64) -> Result<(), LoopError> {
        self.require_idle()?;
        let buffer = LoopBuffer::create(
            duration,
            self.settings.sample_rate,
            self.settings.channels,
            self.settings.max_loop_seconds,
        )?;
        log::info!(
            "Loop created: {:.3}s, {} frames x {} channel(s) at {} Hz",
            duration,
            buffer.frame_count(),
            buffer.channel_count(),
            buffer.sample_rate()
        );

        self.buffer = Some(Arc::new(buffer));
        self.recording.clear();
        self.playback.set_resume_position(0.0);
        self.position = 0.0;
        self.shared.set_position(0.0);
        Ok(())
    }

    /// Stop everything, discard any in-flight recording and drop the buffer.
    pub fn shutdown(&mut self) {
        let now = self.time.now();
        if self.playback.is_playing() {
            let _ = self.playback.stop(now);
        }
        if self.recording.is_recording() {
            self.recording.abort(now, self.capture.as_mut());
        }
        if self.buffer.take().is_some() {
            log::info!("Loop engine shut down");
        }
        self.shared.force(EngineMode::Idle);
    }

    // ---- recording -------------------------------------------------------

    /// Overdub `duration` seconds starting at `start` seconds. Stops playback first.
    pub fn start_recording_at(&mut self, start: f64, duration: f64) -> Result<(), LoopError> {
        let result = self.start_recording_inner(start, duration);
        self.record(result)
    }

    fn start_recording_inner(&mut self, start: f64, duration: f64) -> Result<(), LoopError> {
        let loop_duration = self.loop_duration().ok_or(LoopError::NoActiveBuffer)?;
        check_position(start, loop_duration)?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(LoopError::InvalidPosition(format!(
                "recording duration {}s must be positive",
                duration
            )));
        }

        match self.shared.mode() {
            EngineMode::Playing => {
                log::info!("Stopping playback before recording");
                self.stop_playback_inner()?;
            }
            EngineMode::Recording | EngineMode::Merging => {
                return Err(LoopError::AlreadyActive(format!("{:?}", self.shared.mode())));
            }
            EngineMode::Idle => {}
        }

        self.shared
            .try_transition(EngineMode::Idle, EngineMode::Recording)
            .map_err(|found| LoopError::AlreadyActive(format!("{:?}", found)))?;

        let now = self.time.now();
        if let Err(e) = self
            .recording
            .start(start, duration, loop_duration, now, self.capture.as_mut())
        {
            self.shared.force(EngineMode::Idle);
            return Err(e);
        }

        self.set_position(start, PositionSource::Recording, false);
        Ok(())
    }

    /// Stop the running recording and splice it into the loop.
    ///
    /// On a capture, decode or merge failure the pass is discarded, the buffer
    /// is left unchanged and the engine returns to idle.
    pub fn stop_recording_and_merge(&mut self) -> Result<MergeSummary, LoopError> {
        let result = self.stop_recording_inner();
        self.record(result)
    }

    fn stop_recording_inner(&mut self) -> Result<MergeSummary, LoopError> {
        self.shared
            .try_transition(EngineMode::Recording, EngineMode::Merging)
            .map_err(|_| LoopError::NotActive("recording"))?;

        let now = self.time.now();
        let result = self.recording.stop(
            now,
            self.capture.as_mut(),
            &self.merger,
            self.buffer.as_deref(),
        );

        let position = self.recording.position();
        self.playback.set_resume_position(position);
        self.shared.force(EngineMode::Idle);
        self.set_position(position, PositionSource::Recording, false);

        let outcome = result.map_err(|e| {
            log::warn!("Recording discarded: {}", e);
            e
        })?;
        let summary = MergeSummary::from(&outcome);
        self.buffer = Some(Arc::new(outcome.buffer));
        log::info!(
            "Recording merged: {} frames into [{}, {})",
            summary.frames_written,
            summary.start_frame,
            summary.end_frame
        );
        Ok(summary)
    }

    // ---- playback --------------------------------------------------------

    /// Start looped playback from `from`, or from the last known position.
    pub fn play_with_tracking(&mut self, from: Option<f64>) -> Result<(), LoopError> {
        let result = self.play_inner(from);
        self.record(result)
    }

    fn play_inner(&mut self, from: Option<f64>) -> Result<(), LoopError> {
        let buffer = self.buffer.clone().ok_or(LoopError::NoActiveBuffer)?;
        let from = from.unwrap_or(self.position);
        check_position(from, buffer.duration())?;

        self.shared
            .try_transition(EngineMode::Idle, EngineMode::Playing)
            .map_err(|found| LoopError::AlreadyActive(format!("{:?}", found)))?;

        let now = self.time.now();
        if let Err(e) = self.playback.start(from, buffer, now) {
            self.shared.force(EngineMode::Idle);
            return Err(e);
        }

        self.set_position(from, PositionSource::Playback, false);
        Ok(())
    }

    /// Stop playback; the stop position becomes the next resume point.
    pub fn stop_playback(&mut self) -> Result<(), LoopError> {
        let result = self.stop_playback_inner();
        self.record(result)
    }

    fn stop_playback_inner(&mut self) -> Result<(), LoopError> {
        self.shared
            .try_transition(EngineMode::Playing, EngineMode::Idle)
            .map_err(|_| LoopError::NotActive("playback"))?;
        let position = self.playback.stop(self.time.now())?;
        self.set_position(position, PositionSource::Playback, false);
        Ok(())
    }

    /// Move the playhead. While playing, playback restarts at the new position.
    pub fn seek(&mut self, position: f64) -> Result<(), LoopError> {
        let result = self.seek_inner(position);
        self.record(result)
    }

    fn seek_inner(&mut self, position: f64) -> Result<(), LoopError> {
        let buffer = self.buffer.clone().ok_or(LoopError::NoActiveBuffer)?;
        check_position(position, buffer.duration())?;

        match self.shared.mode() {
            EngineMode::Idle => self.playback.set_resume_position(position),
            EngineMode::Playing => {
                if let Err(e) = self.playback.restart(position, buffer, self.time.now()) {
                    self.shared.force(EngineMode::Idle);
                    return Err(e);
                }
            }
            mode => return Err(LoopError::AlreadyActive(format!("{:?}", mode))),
        }

        self.set_position(position, PositionSource::Seek, false);
        Ok(())
    }

    // ---- scheduling ------------------------------------------------------

    /// Fire due ticks and self-stop an expired recording.
    ///
    /// Call this regularly from the host loop; at most one event is produced
    /// per call.
    pub fn poll(&mut self) -> Option<EngineEvent> {
        let now = self.time.now();
        match self.shared.mode() {
            EngineMode::Recording => {
                if self.recording.deadline().is_some_and(|deadline| now >= deadline) {
                    log::info!("Recording reached its requested duration");
                    return Some(EngineEvent::RecordingFinished(self.stop_recording_and_merge()));
                }
                let tick = self.recording.tick(now)?;
                self.set_position(tick.position, PositionSource::Recording, tick.wrapped);
                Some(EngineEvent::PositionChanged {
                    position: tick.position,
                    source: PositionSource::Recording,
                    wrapped: tick.wrapped,
                })
            }
            EngineMode::Playing => {
                let (position, wrapped) = self.playback.tick(now)?;
                self.set_position(position, PositionSource::Playback, wrapped);
                Some(EngineEvent::PositionChanged {
                    position,
                    source: PositionSource::Playback,
                    wrapped,
                })
            }
            EngineMode::Idle | EngineMode::Merging => None,
        }
    }

    // ---- export ----------------------------------------------------------

    /// Encode the loop as a WAV file in memory.
    pub fn export_to_blob(&mut self) -> Result<ExportedAudio, LoopError> {
        let result = match self.buffer.as_deref() {
            Some(buffer) => export_wav(buffer, self.settings.export_format),
            None => Err(LoopError::EmptyBufferError),
        };
        self.record(result)
    }

    // ---- observers -------------------------------------------------------

    pub fn subscribe(&mut self, observer: Box<dyn PositionObserver>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ---- accessors -------------------------------------------------------

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn mode(&self) -> EngineMode {
        self.shared.mode()
    }

    pub fn segments(&self) -> &[RecordingSegment] {
        self.recording.segments()
    }

    /// Snapshot of the current buffer
    pub fn buffer(&self) -> Option<Arc<LoopBuffer>> {
        self.buffer.clone()
    }

    pub fn loop_duration(&self) -> Option<f64> {
        self.buffer.as_ref().map(|b| b.duration())
    }

    /// Per-channel peak overview using the configured resolution
    pub fn waveform(&self) -> Vec<Vec<f32>> {
        self.buffer
            .as_ref()
            .map(|b| b.overview(self.settings.waveform_points))
            .unwrap_or_default()
    }

    /// Message of the most recent failed operation, cleared on success
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn shared_state(&self) -> SharedLoopState {
        self.shared.clone()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ---- helpers ---------------------------------------------------------

    fn require_idle(&self) -> Result<(), LoopError> {
        match self.shared.mode() {
            EngineMode::Idle => Ok(()),
            mode => Err(LoopError::AlreadyActive(format!("{:?}", mode))),
        }
    }

    fn set_position(&mut self, position: f64, source: PositionSource, wrapped: bool) {
        self.position = position;
        self.shared.set_position(position);
        self.observers.notify(&PositionUpdate {
            position,
            source,
            wrapped,
        });
    }

    fn record<T>(&mut self, result: Result<T, LoopError>) -> Result<T, LoopError> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(e) => {
                log::warn!("{}", e);
                self.last_error = Some(e.to_string());
            }
        }
        result
    }
}

impl Drop for LoopEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_position(position: f64, duration: f64) -> Result<(), LoopError> {
    if position.is_finite() && position >= 0.0 && position < duration {
        Ok(())
    } else {
        Err(LoopError::InvalidPosition(format!(
            "{}s outside [0, {})",
            position, duration
        )))
    }
}
