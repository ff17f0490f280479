use std::cell::RefCell;
use std::f32::consts::PI;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use loopdub::audio::{encode_wav_f32, ClipCapture, EncodedAudio};
use loopdub::looper::{
    ExportFormat, ManualTimeSource, PositionSource, PositionUpdate, RecordingSegment,
};
use loopdub::{EngineEvent, EngineMode, EngineSettings, LoopEngine, LoopError};

const STEP: Duration = Duration::from_millis(50);

fn settings(sample_rate: u32) -> EngineSettings {
    EngineSettings {
        sample_rate,
        channels: 2,
        ..EngineSettings::default()
    }
}

fn mono_clip(samples: &[f32], sample_rate: u32) -> ClipCapture {
    let bytes = encode_wav_f32(samples, sample_rate, 1).unwrap();
    ClipCapture::new(EncodedAudio::wav(bytes))
}

fn sine(freq: f32, seconds: f64, sample_rate: u32) -> Vec<f32> {
    let frames = (seconds * sample_rate as f64).round() as usize;
    (0..frames)
        .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

fn engine(sample_rate: u32, capture: ClipCapture) -> (LoopEngine, Arc<ManualTimeSource>) {
    let time = Arc::new(ManualTimeSource::new());
    let engine = LoopEngine::headless(settings(sample_rate), time.clone(), Box::new(capture));
    (engine, time)
}

/// Advance in 50ms steps, polling each time, until the recording finishes
fn run_until_finished(engine: &mut LoopEngine, time: &ManualTimeSource) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    for _ in 0..10_000 {
        time.advance(STEP);
        if let Some(event) = engine.poll() {
            let done = matches!(event, EngineEvent::RecordingFinished(_));
            events.push(event);
            if done {
                return events;
            }
        }
    }
    panic!("recording never finished");
}

fn finished_summary(events: &[EngineEvent]) -> loopdub::looper::MergeSummary {
    match events.last() {
        Some(EngineEvent::RecordingFinished(Ok(summary))) => *summary,
        other => panic!("expected a successful merge, got {:?}", other),
    }
}

#[test]
fn new_loop_is_silent_and_sized_by_ceiling() {
    let (mut engine, _) = engine(44100, mono_clip(&[0.0], 44100));
    engine.initialize_loop_buffer(4.0).unwrap();
    let buffer = engine.buffer().unwrap();
    assert_eq!(buffer.frame_count(), 176_400);
    assert_eq!(buffer.channel_count(), 2);
    assert!(buffer.channels().iter().all(|c| c.iter().all(|&s| s == 0.0)));

    engine.initialize_loop_buffer(0.0105).unwrap();
    // 0.0105 * 44100 = 463.05
    assert_eq!(engine.buffer().unwrap().frame_count(), 464);
}

#[test]
fn rejects_out_of_range_durations() {
    let (mut engine, _) = engine(44100, mono_clip(&[0.0], 44100));
    assert!(matches!(
        engine.initialize_loop_buffer(-1.0),
        Err(LoopError::InvalidDuration { .. })
    ));
    assert!(matches!(
        engine.initialize_loop_buffer(61.0),
        Err(LoopError::InvalidDuration { .. })
    ));
    assert!(engine.buffer().is_none());
}

#[test]
fn full_loop_recording_writes_the_tone() {
    let tone = sine(440.0, 4.0, 44100);
    let (mut engine, time) = engine(44100, mono_clip(&tone, 44100));
    engine.initialize_loop_buffer(4.0).unwrap();

    engine.start_recording_at(0.0, 4.0).unwrap();
    assert_eq!(engine.mode(), EngineMode::Recording);

    let events = run_until_finished(&mut engine, &time);
    let summary = finished_summary(&events);
    assert_eq!(summary.start_frame, 0);
    assert_eq!(summary.end_frame, 176_400);
    assert_eq!(summary.frames_written, 176_400);
    assert_eq!(engine.mode(), EngineMode::Idle);
    assert_eq!(
        engine.segments(),
        &[RecordingSegment {
            start: 0.0,
            end: Some(4.0)
        }]
    );

    let buffer = engine.buffer().unwrap();
    for checkpoint in 0..10 {
        let frame = checkpoint * 17_640 + 123;
        for channel in 0..2 {
            let got = buffer.channel_data(channel)[frame];
            assert!(
                (got - tone[frame]).abs() < 1e-6,
                "channel {} frame {}: {} != {}",
                channel,
                frame,
                got,
                tone[frame]
            );
        }
    }
}

#[test]
fn recording_ticks_are_monotonic_until_the_deadline() {
    let (mut engine, time) = engine(1000, mono_clip(&[0.5; 2000], 1000));
    engine.initialize_loop_buffer(4.0).unwrap();
    engine.start_recording_at(1.0, 2.0).unwrap();

    let events = run_until_finished(&mut engine, &time);
    let positions: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::PositionChanged { position, .. } => Some(*position),
            _ => None,
        })
        .collect();

    assert_eq!(positions.len(), 39);
    assert!(positions.windows(2).all(|w| w[1] > w[0]));
    assert!(positions.iter().all(|&p| (1.0..3.0).contains(&p)));
}

#[test]
fn wraparound_splits_segments_and_clamps_the_merge() {
    let (mut engine, time) = engine(1000, mono_clip(&[0.75; 1000], 1000));
    engine.initialize_loop_buffer(4.0).unwrap();
    engine.start_recording_at(3.5, 1.0).unwrap();

    let events = run_until_finished(&mut engine, &time);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::PositionChanged { wrapped: true, .. }
    )));

    let segments = engine.segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].start, 3.5);
    assert_eq!(segments[0].end, Some(4.0));
    assert_eq!(segments[1].start, 0.0);
    assert!((segments[1].end.unwrap() - 0.5).abs() < 1e-6);
    assert!((engine.position() - 0.5).abs() < 1e-6);

    let summary = finished_summary(&events);
    let buffer = engine.buffer().unwrap();
    assert_eq!(summary.start_frame, 3500);
    assert!(summary.end_frame <= buffer.frame_count());
    assert_eq!(summary.frames_written, 500);

    let left = buffer.channel_data(0);
    assert!(left[3500..].iter().all(|&s| s == 0.75));
    // nothing spills into the head of the loop
    assert!(left[..3500].iter().all(|&s| s == 0.0));
}

#[test]
fn merge_leaves_samples_outside_the_span() {
    let ramp: Vec<f32> = (0..4000).map(|i| i as f32 / 4000.0).collect();
    let (mut engine, time) = engine(1000, mono_clip(&ramp, 1000));
    engine.initialize_loop_buffer(4.0).unwrap();
    engine.start_recording_at(0.0, 4.0).unwrap();
    finished_summary(&run_until_finished(&mut engine, &time));
    let first_pass = engine.buffer().unwrap();
    assert_eq!(first_pass.channel_data(0), &ramp[..]);

    engine.start_recording_at(1.0, 1.0).unwrap();
    let summary = finished_summary(&run_until_finished(&mut engine, &time));
    assert_eq!((summary.start_frame, summary.end_frame), (1000, 2000));
    assert_eq!(summary.frames_written, 1000);

    let merged = engine.buffer().unwrap();
    for channel in 0..2 {
        let data = merged.channel_data(channel);
        assert_eq!(&data[..1000], &ramp[..1000]);
        assert_eq!(&data[1000..2000], &ramp[..1000]);
        assert_eq!(&data[2000..], &ramp[2000..]);
    }
    // the earlier snapshot is untouched
    assert_eq!(first_pass.channel_data(1), &ramp[..]);
    assert_eq!(engine.segments().len(), 2);
}

#[test]
fn stopping_twice_is_harmless() {
    let (mut engine, time) = engine(1000, mono_clip(&[0.1; 1000], 1000));
    engine.initialize_loop_buffer(2.0).unwrap();
    engine.start_recording_at(0.0, 1.0).unwrap();
    time.advance_secs(0.5);

    assert!(engine.stop_recording_and_merge().is_ok());
    let snapshot = engine.buffer().unwrap();
    assert_eq!(
        engine.stop_recording_and_merge(),
        Err(LoopError::NotActive("recording"))
    );
    assert!(Arc::ptr_eq(&snapshot, &engine.buffer().unwrap()));
    assert_eq!(engine.segments().len(), 1);

    assert_eq!(engine.stop_playback(), Err(LoopError::NotActive("playback")));
    assert_eq!(engine.mode(), EngineMode::Idle);
}

#[test]
fn export_round_trips_through_pcm16() {
    let tone = sine(220.0, 1.0, 8000);
    let (mut engine, time) = engine(8000, mono_clip(&tone, 8000));
    engine.initialize_loop_buffer(1.0).unwrap();
    engine.start_recording_at(0.0, 1.0).unwrap();
    finished_summary(&run_until_finished(&mut engine, &time));
    assert_eq!(engine.settings().export_format, ExportFormat::Pcm16);

    let exported = engine.export_to_blob().unwrap();
    assert_eq!(exported.mime_type, "audio/wav");
    assert_eq!(engine.export_to_blob().unwrap(), exported);

    let mut reader = hound::WavReader::new(Cursor::new(exported.bytes)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.bits_per_sample, 16);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 8000 * 2);
    for (frame, pair) in samples.chunks_exact(2).enumerate() {
        for &sample in pair {
            let decoded = sample as f32 / i16::MAX as f32;
            assert!((decoded - tone[frame]).abs() < 1e-3);
        }
    }
}

#[test]
fn observers_follow_playback_and_can_leave() {
    let (mut engine, time) = engine(1000, mono_clip(&[0.0], 1000));
    engine.initialize_loop_buffer(1.0).unwrap();

    let seen: Rc<RefCell<Vec<PositionUpdate>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let id = engine.subscribe(Box::new(move |update: &PositionUpdate| {
        sink.borrow_mut().push(*update)
    }));

    engine.play_with_tracking(Some(0.0)).unwrap();
    for _ in 0..90 {
        time.advance(Duration::from_millis(17));
        engine.poll();
    }
    engine.stop_playback().unwrap();

    {
        let seen = seen.borrow();
        assert!(seen.len() > 50);
        assert!(seen.iter().all(|u| u.source == PositionSource::Playback));
        assert!(seen.iter().all(|u| (0.0..1.0).contains(&u.position)));
        // 90 * 17ms = 1.53s crosses the 1s boundary once
        assert_eq!(seen.iter().filter(|u| u.wrapped).count(), 1);
    }

    assert!(engine.unsubscribe(id));
    let count = seen.borrow().len();
    engine.seek(0.5).unwrap();
    assert_eq!(seen.borrow().len(), count);
}
