//! Recording session - start/stop protocol, segment history and wraparound
//!
//! While recording, the session tracks the loop position from a `LoopClock`.
//! Whenever the tracked time passes the loop duration, the open segment is
//! closed at the boundary, a new one opens at zero and the clock is re-based
//! at the crossing instant so its elapsed time stays within one cycle.

use std::time::{Duration, Instant};

use super::buffer::LoopBuffer;
use super::clock::{did_wrap, wrap_position, LoopClock};
use super::error::LoopError;
use super::merge::{MergeOutcome, SegmentMerger};
use crate::audio::CaptureSource;

/// One contiguous stretch of the loop timeline overwritten by a recording pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingSegment {
    pub start: f64,
    /// `None` while the segment is still being recorded
    pub end: Option<f64>,
}

impl RecordingSegment {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Position report from a recording tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingTick {
    pub position: f64,
    pub wrapped: bool,
}

#[derive(Debug)]
struct ActiveRecording {
    start_position: f64,
    planned_end: f64,
    loop_duration: f64,
    deadline: Instant,
    clock: LoopClock,
    last_elapsed: f64,
    next_tick: Instant,
}

pub struct RecordingSession {
    active: Option<ActiveRecording>,
    segments: Vec<RecordingSegment>,
    tick_interval: Duration,
    position: f64,
}

impl RecordingSession {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            active: None,
            segments: Vec::new(),
            tick_interval,
            position: 0.0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Segment history, oldest first
    pub fn segments(&self) -> &[RecordingSegment] {
        &self.segments
    }

    /// Last tracked position in seconds
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Instant at which the running recording stops itself
    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|a| a.deadline)
    }

    /// Forget segment history (a new loop was created)
    pub fn clear(&mut self) {
        self.segments.clear();
        self.position = 0.0;
    }

    /// Start capturing at `at` seconds for `requested` seconds.
    ///
    /// Nothing is changed when validation or the capture start fails.
    pub fn start(
        &mut self,
        at: f64,
        requested: f64,
        loop_duration: f64,
        now: Instant,
        capture: &mut dyn CaptureSource,
    ) -> Result<(), LoopError> {
        if self.active.is_some() {
            return Err(LoopError::AlreadyActive("recording in progress".into()));
        }
        if !at.is_finite() || at < 0.0 || at >= loop_duration {
            return Err(LoopError::InvalidPosition(format!(
                "recording start {}s outside [0, {})",
                at, loop_duration
            )));
        }
        if !requested.is_finite() || requested <= 0.0 {
            return Err(LoopError::InvalidPosition(format!(
                "recording duration {}s must be positive",
                requested
            )));
        }
        let deadline = Duration::try_from_secs_f64(requested)
            .ok()
            .and_then(|span| now.checked_add(span))
            .ok_or_else(|| {
                LoopError::InvalidPosition(format!("recording duration {}s is too long", requested))
            })?;

        capture.start_capture().map_err(|e| {
            log::warn!("Capture failed to start: {}", e);
            LoopError::from(e)
        })?;

        self.segments.push(RecordingSegment { start: at, end: None });
        self.position = at;
        self.active = Some(ActiveRecording {
            start_position: at,
            planned_end: at + requested,
            loop_duration,
            deadline,
            clock: LoopClock::new(now, at),
            last_elapsed: at,
            next_tick: now + self.tick_interval,
        });

        log::info!("Recording started at {:.3}s for {:.3}s", at, requested);
        Ok(())
    }

    /// Fire the position tick if one is due. No tick fires at or past the deadline.
    pub fn tick(&mut self, now: Instant) -> Option<RecordingTick> {
        let active = self.active.as_mut()?;
        if now >= active.deadline || now < active.next_tick {
            return None;
        }

        let wrapped = track(&mut self.segments, active, now, false);
        active.next_tick += self.tick_interval;
        if active.next_tick <= now {
            active.next_tick = now + self.tick_interval;
        }

        self.position = wrap_position(active.last_elapsed, active.loop_duration);
        Some(RecordingTick {
            position: self.position,
            wrapped,
        })
    }

    /// Stop capture, close the open segment and merge the pass into `buffer`.
    pub fn stop(
        &mut self,
        now: Instant,
        capture: &mut dyn CaptureSource,
        merger: &SegmentMerger,
        buffer: Option<&LoopBuffer>,
    ) -> Result<MergeOutcome, LoopError> {
        let mut active = self.active.take().ok_or(LoopError::NotActive("recording"))?;
        let stop_at = now.min(active.deadline);
        let captured = capture.stop_capture();

        self.finish(&mut active, stop_at);

        let audio = captured.map_err(|e| {
            log::warn!("Capture failed to stop cleanly: {}", e);
            LoopError::from(e)
        })?;
        merger.merge(buffer, audio, active.start_position, active.planned_end)
    }

    /// Stop capture and throw the pass away
    pub fn abort(&mut self, now: Instant, capture: &mut dyn CaptureSource) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = capture.stop_capture() {
                log::warn!("Capture failed to stop while aborting: {}", e);
            }
            let stop_at = now.min(active.deadline);
            self.finish(&mut active, stop_at);
            log::info!("Recording aborted, captured audio discarded");
        }
    }

    fn finish(&mut self, active: &mut ActiveRecording, stop_at: Instant) {
        track(&mut self.segments, active, stop_at, true);
        let end = active.clock.elapsed(stop_at).min(active.loop_duration);
        if let Some(segment) = self.segments.last_mut().filter(|s| s.is_open()) {
            segment.end = Some(end.max(segment.start));
        }
        self.position = wrap_position(end, active.loop_duration);
        log::info!("Recording stopped at {:.3}s", end);
    }
}

/// Advance tracking to `at`, splitting segments at every loop boundary crossed.
///
/// A final stop landing exactly on the boundary does not open a new segment.
fn track(
    segments: &mut Vec<RecordingSegment>,
    active: &mut ActiveRecording,
    at: Instant,
    final_stop: bool,
) -> bool {
    let duration = active.loop_duration;
    let mut wrapped = false;

    loop {
        let elapsed = active.clock.elapsed(at);
        let crossed = if final_stop {
            elapsed > duration
        } else {
            did_wrap(active.last_elapsed, elapsed, duration)
        };
        if !crossed {
            active.last_elapsed = elapsed;
            return wrapped;
        }

        if let Some(segment) = segments.last_mut().filter(|s| s.is_open()) {
            segment.end = Some(duration);
        }
        segments.push(RecordingSegment { start: 0.0, end: None });

        let overshoot = (elapsed - duration).max(0.0);
        let reference = Duration::try_from_secs_f64(overshoot)
            .ok()
            .and_then(|back| at.checked_sub(back))
            .unwrap_or(at);
        active.clock = LoopClock::new(reference, 0.0);
        active.last_elapsed = 0.0;
        wrapped = true;
        log::debug!("Recording wrapped at loop boundary ({:.4}s overshoot)", overshoot);
    }
}
