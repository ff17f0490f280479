//! loopdub - record a pass into a loop, play it back once and export it
//!
//! Usage: `loopdub <loop-seconds> [record-seconds] [out.wav] [overdub.wav]`
//!        `loopdub --list-devices`
//!
//! Without an overdub file the default (or configured) microphone is used.
//! A default settings file is written on first run so it can be edited.

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use loopdub::audio::{
    input_devices, CaptureSource, ClipCapture, CpalOutput, MicrophoneCapture, SymphoniaDecoder,
};
use loopdub::looper::{PositionUpdate, SystemTimeSource};
use loopdub::settings::settings_path;
use loopdub::{EngineEvent, EngineSettings, LoopEngine};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

struct Args {
    loop_seconds: f64,
    record_seconds: Option<f64>,
    out_path: String,
    overdub_path: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let loop_seconds = args
        .next()
        .ok_or("usage: loopdub <loop-seconds> [record-seconds] [out.wav] [overdub.wav]")?
        .parse::<f64>()
        .map_err(|e| format!("invalid loop length: {}", e))?;
    let record_seconds = args
        .next()
        .map(|s| s.parse::<f64>().map_err(|e| format!("invalid record length: {}", e)))
        .transpose()?;
    let out_path = args.next().unwrap_or_else(|| "loop.wav".to_string());
    let overdub_path = args.next();

    Ok(Args {
        loop_seconds,
        record_seconds,
        out_path,
        overdub_path,
    })
}

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Starting loopdub");

    if std::env::args().nth(1).as_deref() == Some("--list-devices") {
        let devices = input_devices();
        if devices.is_empty() {
            println!("No input devices found");
        }
        for name in devices {
            println!("{}", name);
        }
        return ExitCode::SUCCESS;
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = EngineSettings::load();
    if !settings_path().exists() {
        settings.save();
    }

    let capture: Box<dyn CaptureSource> = match &args.overdub_path {
        Some(path) => Box::new(ClipCapture::from_file(path)?),
        None => {
            let microphone = MicrophoneCapture::new(
                settings.input_device.clone(),
                settings.capture_capacity_seconds(),
            );
            microphone.set_gain(settings.input_gain);
            Box::new(microphone)
        }
    };

    let mut engine = LoopEngine::new(
        settings,
        Arc::new(SystemTimeSource),
        capture,
        Box::new(SymphoniaDecoder::new()),
        Box::new(CpalOutput::new()),
    );

    let mut last_whole_second = -1i64;
    engine.subscribe(Box::new(move |update: &PositionUpdate| {
        let whole = update.position.floor() as i64;
        if whole != last_whole_second || update.wrapped {
            last_whole_second = whole;
            log::info!("{:?} at {:.2}s", update.source, update.position);
        }
    }));

    engine.initialize_loop_buffer(args.loop_seconds)?;
    let record_seconds = args.record_seconds.unwrap_or(args.loop_seconds);

    println!("Recording {:.2}s into a {:.2}s loop...", record_seconds, args.loop_seconds);
    engine.start_recording_at(0.0, record_seconds)?;
    loop {
        if let Some(EngineEvent::RecordingFinished(result)) = engine.poll() {
            let summary = result?;
            println!(
                "Merged {} frames ({} segment(s))",
                summary.frames_written,
                engine.segments().len()
            );
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    println!("Playing the loop once around...");
    engine.play_with_tracking(Some(0.0))?;
    let mut remaining = Duration::from_secs_f64(args.loop_seconds);
    while !remaining.is_zero() {
        engine.poll();
        thread::sleep(POLL_INTERVAL);
        remaining = remaining.saturating_sub(POLL_INTERVAL);
    }
    engine.stop_playback()?;

    let exported = engine.export_to_blob()?;
    std::fs::write(&args.out_path, &exported.bytes)?;
    println!("Wrote {} ({} bytes, {})", args.out_path, exported.bytes.len(), exported.mime_type);

    engine.shutdown();
    Ok(())
}
