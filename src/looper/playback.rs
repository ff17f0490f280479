//! Playback controller and position observers
//!
//! Playback position is derived from the loop clock, never from the output
//! device, so the playhead reported to observers is the same whether the
//! output is a real stream or silent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::buffer::LoopBuffer;
use super::clock::{did_wrap, LoopClock};
use super::error::LoopError;
use crate::audio::LoopOutput;

/// What produced a position update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    Playback,
    Recording,
    Seek,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    pub position: f64,
    pub source: PositionSource,
    /// The playhead jumped from the loop end back to the start
    pub wrapped: bool,
}

/// Receives streamed position updates
pub trait PositionObserver {
    fn position_changed(&mut self, update: &PositionUpdate);
}

impl<F: FnMut(&PositionUpdate)> PositionObserver for F {
    fn position_changed(&mut self, update: &PositionUpdate) {
        self(update)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber registry
#[derive(Default)]
pub struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Box<dyn PositionObserver>)>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn PositionObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn notify(&mut self, update: &PositionUpdate) {
        for (_, observer) in self.entries.iter_mut() {
            observer.position_changed(update);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Looped playback with periodic position ticks
pub struct PlaybackController {
    output: Box<dyn LoopOutput>,
    clock: Option<LoopClock>,
    loop_duration: f64,
    resume_position: f64,
    /// Unwrapped clock time at the previous tick
    last_elapsed: f64,
    next_tick: Instant,
    tick_interval: Duration,
}

impl PlaybackController {
    pub fn new(output: Box<dyn LoopOutput>, tick_interval: Duration) -> Self {
        Self {
            output,
            clock: None,
            loop_duration: 0.0,
            resume_position: 0.0,
            last_elapsed: 0.0,
            next_tick: Instant::now(),
            tick_interval,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_some()
    }

    /// Where the next `start` resumes when no position is given
    pub fn resume_position(&self) -> f64 {
        self.resume_position
    }

    pub fn set_resume_position(&mut self, position: f64) {
        self.resume_position = position;
    }

    /// Start looped playback of `buffer` from `from` seconds
    pub fn start(&mut self, from: f64, buffer: Arc<LoopBuffer>, now: Instant) -> Result<(), LoopError> {
        if self.is_playing() {
            return Err(LoopError::AlreadyActive("playback in progress".into()));
        }
        let duration = buffer.duration();
        if !from.is_finite() || from < 0.0 || from >= duration {
            return Err(LoopError::InvalidPosition(format!(
                "playback start {}s outside [0, {})",
                from, duration
            )));
        }

        let from_frame = buffer.seconds_to_frame(from) % buffer.frame_count().max(1);
        self.output.start(buffer, from_frame)?;

        self.clock = Some(LoopClock::new(now, from));
        self.loop_duration = duration;
        self.last_elapsed = from;
        self.resume_position = from;
        self.next_tick = now + self.tick_interval;
        log::info!("Playback started at {:.3}s", from);
        Ok(())
    }

    /// Stop playback, keeping the current position as the resume point
    pub fn stop(&mut self, now: Instant) -> Result<f64, LoopError> {
        let clock = self.clock.take().ok_or(LoopError::NotActive("playback"))?;
        self.output.stop();

        let position = clock.position(now, self.loop_duration);
        self.resume_position = position;
        log::info!("Playback stopped at {:.3}s", position);
        Ok(position)
    }

    /// Stop and immediately start again at `position`
    pub fn restart(&mut self, position: f64, buffer: Arc<LoopBuffer>, now: Instant) -> Result<(), LoopError> {
        if self.is_playing() {
            self.stop(now)?;
        }
        self.start(position, buffer, now)
    }

    /// Fire the position tick if one is due, returning (position, wrapped)
    pub fn tick(&mut self, now: Instant) -> Option<(f64, bool)> {
        let clock = self.clock?;
        if now < self.next_tick {
            return None;
        }

        self.next_tick += self.tick_interval;
        if self.next_tick <= now {
            self.next_tick = now + self.tick_interval;
        }

        let elapsed = clock.elapsed(now);
        let wrapped = did_wrap(self.last_elapsed, elapsed, self.loop_duration);
        let position = clock.position(now, self.loop_duration);
        if wrapped {
            log::debug!("Playback wrapped to {:.3}s", position);
        }
        self.last_elapsed = elapsed;
        Some((position, wrapped))
    }

    /// Current position without firing a tick
    pub fn position(&self, now: Instant) -> Option<f64> {
        self.clock.map(|clock| clock.position(now, self.loop_duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SilentOutput;
    use std::cell::RefCell;
    use std::rc::Rc;

    const TICK: Duration = Duration::from_millis(16);

    /// Output that remembers every frame it was started from
    struct FrameLog(Rc<RefCell<Vec<usize>>>);

    impl LoopOutput for FrameLog {
        fn start(&mut self, _buffer: Arc<LoopBuffer>, from_frame: usize) -> Result<(), crate::audio::OutputError> {
            self.0.borrow_mut().push(from_frame);
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn buffer() -> Arc<LoopBuffer> {
        Arc::new(LoopBuffer::create(2.0, 100, 1, 60.0).unwrap())
    }

    #[test]
    fn test_ticks_follow_clock_and_wrap() {
        let mut playback = PlaybackController::new(Box::new(SilentOutput::new()), TICK);
        let t0 = Instant::now();
        playback.start(1.5, buffer(), t0).unwrap();

        assert_eq!(playback.tick(t0 + Duration::from_millis(10)), None);

        let (position, wrapped) = playback.tick(t0 + Duration::from_millis(16)).unwrap();
        assert!((position - 1.516).abs() < 1e-9);
        assert!(!wrapped);

        let (position, wrapped) = playback.tick(t0 + Duration::from_millis(600)).unwrap();
        assert!((position - 0.1).abs() < 1e-9);
        assert!(wrapped);
    }

    #[test]
    fn test_late_tick_past_a_whole_loop_still_wraps() {
        let mut playback = PlaybackController::new(Box::new(SilentOutput::new()), TICK);
        let t0 = Instant::now();
        playback.start(0.5, buffer(), t0).unwrap();

        // 2.2s later the playhead has gone round once and sits past its start
        let (position, wrapped) = playback.tick(t0 + Duration::from_millis(2200)).unwrap();
        assert!((position - 0.7).abs() < 1e-9);
        assert!(wrapped);

        let (_, wrapped) = playback.tick(t0 + Duration::from_millis(2300)).unwrap();
        assert!(!wrapped);
    }

    #[test]
    fn test_no_tick_after_stop() {
        let mut playback = PlaybackController::new(Box::new(SilentOutput::new()), TICK);
        let t0 = Instant::now();
        playback.start(0.0, buffer(), t0).unwrap();
        let position = playback.stop(t0 + Duration::from_millis(500)).unwrap();
        assert!((position - 0.5).abs() < 1e-9);
        assert_eq!(playback.resume_position(), position);
        assert_eq!(playback.tick(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_stop_twice_fails_second_time() {
        let mut playback = PlaybackController::new(Box::new(SilentOutput::new()), TICK);
        let t0 = Instant::now();
        playback.start(0.0, buffer(), t0).unwrap();
        assert!(playback.stop(t0).is_ok());
        assert_eq!(playback.stop(t0).unwrap_err(), LoopError::NotActive("playback"));
    }

    #[test]
    fn test_start_validation() {
        let mut playback = PlaybackController::new(Box::new(SilentOutput::new()), TICK);
        let t0 = Instant::now();
        assert!(matches!(
            playback.start(2.0, buffer(), t0),
            Err(LoopError::InvalidPosition(_))
        ));
        playback.start(0.0, buffer(), t0).unwrap();
        assert!(matches!(
            playback.start(0.0, buffer(), t0),
            Err(LoopError::AlreadyActive(_))
        ));
    }

    #[test]
    fn test_restart_moves_playhead() {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let mut playback = PlaybackController::new(Box::new(FrameLog(Rc::clone(&frames))), TICK);
        let t0 = Instant::now();
        playback.start(0.0, buffer(), t0).unwrap();
        playback.restart(1.25, buffer(), t0 + Duration::from_millis(300)).unwrap();
        let position = playback.position(t0 + Duration::from_millis(400)).unwrap();
        assert!((position - 1.35).abs() < 1e-9);
        // 100 Hz buffer: output restarted at frame 125
        assert_eq!(*frames.borrow(), vec![0, 125]);
    }

    #[test]
    fn test_observers_subscribe_and_unsubscribe() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut observers = Observers::new();

        let sink = Rc::clone(&seen);
        let id = observers.subscribe(Box::new(move |u: &PositionUpdate| sink.borrow_mut().push(u.position)));
        let update = PositionUpdate {
            position: 0.25,
            source: PositionSource::Seek,
            wrapped: false,
        };
        observers.notify(&update);
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.notify(&update);

        assert_eq!(*seen.borrow(), vec![0.25]);
        assert!(observers.is_empty());
    }
}
