//! `ritmo` - drive the ritmo audio engine from the command line.

mod song;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ritmo_core::{Notification, Sample};
use ritmo_engine::{Engine, EngineConfig};
use ritmo_io::StreamConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use song::Song;

#[derive(Parser)]
#[command(name = "ritmo", version, about = "Sequencer-driven audio engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a song offline to a WAV file (faster than real time).
    Bounce {
        /// Song file (TOML); a demo groove is used when omitted.
        #[arg(long)]
        song: Option<PathBuf>,
        /// Directory the output.wav (and temp snippets) are written to.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Engine buffer size in frames.
        #[arg(long, default_value_t = 512)]
        buffer_size: usize,
        /// Engine sample rate in Hz.
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
    },
    /// Play a song through the default (or named) output device.
    Play {
        /// Song file (TOML); a demo groove is used when omitted.
        #[arg(long)]
        song: Option<PathBuf>,
        /// Output device name (see `ritmo devices`).
        #[arg(long)]
        device: Option<String>,
        /// Stop after this many seconds (plays until Ctrl-C when omitted).
        #[arg(long)]
        duration: Option<u64>,
    },
    /// List the available audio devices.
    Devices,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Commands::Bounce {
            song,
            out_dir,
            buffer_size,
            sample_rate,
        } => bounce(song, &out_dir, buffer_size, sample_rate),
        Commands::Play {
            song,
            device,
            duration,
        } => play(song, device, duration),
        Commands::Devices => devices(),
    }
}

fn load_song(path: Option<PathBuf>) -> anyhow::Result<Song> {
    match path {
        Some(path) => Song::load(&path),
        None => {
            info!("no song file given, using the demo groove");
            Ok(Song::demo())
        }
    }
}

fn bounce(
    song: Option<PathBuf>,
    out_dir: &std::path::Path,
    buffer_size: usize,
    sample_rate: u32,
) -> anyhow::Result<()> {
    let song = load_song(song)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let config = EngineConfig {
        sample_rate,
        buffer_size,
        output_channels: 2,
        input_channels: 0,
        channel_caching: false,
    };
    let (mut engine, _controller, notifications) =
        Engine::new(config, song.tempo, song.time_signature[0], song.time_signature[1])?;
    song.build(&mut engine)?;

    // a gentle master limiter keeps summed tracks below the hard clip
    engine
        .master_chain_mut()
        .add(Box::new(ritmo_effects::Limiter::new(10.0, 500.0, sample_rate, 2)));

    let loop_frames = song.loop_frames(sample_rate);
    let max_buffers = loop_frames.div_ceil(buffer_size);
    engine.set_bounce_state(true, max_buffers, out_dir)?;
    engine.set_playing(true);

    let progress = ProgressBar::new(loop_frames as u64).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} frames {msg}")
            .expect("static template"),
    );

    let mut output = vec![0.0 as Sample; buffer_size * 2];
    while engine.render(&mut output) {
        progress.set_position(engine.timeline().buffer_position() as u64);
    }
    progress.finish_with_message("done");

    for notification in notifications.try_iter() {
        if let Notification::BounceComplete { .. } = notification {
            println!("bounced {} frames to {}", loop_frames, out_dir.join("output.wav").display());
        }
    }
    Ok(())
}

fn play(
    song: Option<PathBuf>,
    device: Option<String>,
    duration: Option<u64>,
) -> anyhow::Result<()> {
    let song = load_song(song)?;

    let stream_config = StreamConfig {
        output_device: device,
        ..StreamConfig::default()
    };
    let config = EngineConfig {
        sample_rate: stream_config.sample_rate,
        buffer_size: stream_config.buffer_size,
        output_channels: stream_config.channels,
        input_channels: 0,
        channel_caching: false,
    };
    let (mut engine, _controller, notifications) =
        Engine::new(config, song.tempo, song.time_signature[0], song.time_signature[1])?;
    song.build(&mut engine)?;
    engine
        .master_chain_mut()
        .add(Box::new(ritmo_effects::Limiter::new(
            10.0,
            500.0,
            stream_config.sample_rate,
            stream_config.channels,
        )));
    engine.set_playing(true);

    let notifier = engine.notifier().clone();
    let block_samples = stream_config.buffer_size * stream_config.channels;
    let mut block = vec![0.0 as Sample; block_samples];
    let stream = ritmo_io::run_output(&stream_config, move |data: &mut [f32]| {
        let keep_going = engine.render(&mut block);
        for (out, sample) in data.iter_mut().zip(block.iter()) {
            *out = *sample as f32;
        }
        keep_going
    });

    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            notifier.broadcast(Notification::HardwareUnavailable);
            eprintln!("audio device unavailable: {err}");
            return Err(err.into());
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let ctrlc_flag = Arc::clone(&running);
    ctrlc::set_handler(move || ctrlc_flag.store(false, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    println!("playing at {} BPM, Ctrl-C to stop", song.tempo);
    let started = std::time::Instant::now();
    while running.load(Ordering::SeqCst) && stream.is_running() {
        if let Some(limit) = duration {
            if started.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }
        for notification in notifications.try_iter() {
            if let Notification::SequencerTempoUpdated = notification {
                info!("tempo updated");
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    stream.stop();
    Ok(())
}

fn devices() -> anyhow::Result<()> {
    let devices = ritmo_io::list_devices()?;
    if devices.is_empty() {
        println!("no audio devices found");
        return Ok(());
    }
    for device in devices {
        let direction = match (device.is_input, device.is_output) {
            (true, true) => "in/out",
            (true, false) => "in",
            _ => "out",
        };
        println!(
            "{:40} {:6} {} Hz",
            device.name, direction, device.default_sample_rate
        );
    }
    Ok(())
}
