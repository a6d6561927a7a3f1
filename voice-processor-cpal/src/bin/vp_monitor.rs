//! Live microphone monitor: prints the VU level of every output frame and can
//! write a short audio dump to disk.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;

use voice_processor_core::{ProcessorOptions, VoiceProcessor, VuMeterEngine};
use voice_processor_cpal::CpalMicCapture;

#[derive(Debug, Parser)]
#[command(about = "Voice processor microphone monitor", author, version)]
struct Args {
    /// Input device name (defaults to the system default microphone).
    #[arg(long)]
    device: Option<String>,

    /// List input devices and exit.
    #[arg(long = "list-input-devices", default_value_t = false)]
    list_input_devices: bool,

    /// Seconds to monitor before exiting.
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    #[arg(long = "output-sample-rate", default_value_t = 16_000)]
    output_sample_rate: u32,

    #[arg(long = "frame-length", default_value_t = 512)]
    frame_length: usize,

    /// Record this many milliseconds of output and write it as WAV to `--dump-path`.
    #[arg(long = "dump-ms")]
    dump_ms: Option<u64>,

    #[arg(long = "dump-path", default_value = "voice-dump.wav")]
    dump_path: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_input_devices {
        return match CpalMicCapture::list_devices() {
            Ok(devices) => {
                for device in devices {
                    let marker = if device.is_default { " (default)" } else { "" };
                    println!("{}{}", device.name, marker);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                log::error!("failed to list input devices: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), voice_processor_core::ProcessorError> {
    let options = ProcessorOptions {
        output_sample_rate: args.output_sample_rate,
        frame_length: args.frame_length,
        device_id: args.device.clone(),
        ..Default::default()
    };
    let processor = VoiceProcessor::new(CpalMicCapture::default_device(), options)?;

    let meter = VuMeterEngine::spawn_with_callback(|db| println!("{:>7.1} dB {}", db, bar(db)))?;
    processor.subscribe(meter.engine())?;
    if let Some(context) = processor.audio_context() {
        log::info!(
            "monitoring '{}' at {} Hz -> {} Hz",
            context.source.name,
            context.sample_rate,
            args.output_sample_rate
        );
    }

    if let Some(dump_ms) = args.dump_ms {
        let dump = processor.audio_dump(Duration::from_millis(dump_ms))?.wait()?;
        let written = dump.write_wav(&args.dump_path)?;
        log::info!(
            "dumped {} samples to {} (sha256 {})",
            dump.len(),
            written.path.display(),
            written.checksum
        );
    }

    thread::sleep(Duration::from_secs(args.seconds));
    processor.unsubscribe(meter.engine())?;

    let diagnostics = processor.diagnostics();
    log::info!(
        "frames dispatched: {}, input blocks dropped: {}",
        diagnostics.frames_dispatched,
        diagnostics.input_frames_dropped
    );
    Ok(())
}

fn bar(db: f32) -> String {
    let width = ((db + 60.0).clamp(0.0, 60.0) / 2.0) as usize;
    "#".repeat(width)
}
