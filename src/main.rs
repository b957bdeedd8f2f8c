use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use scene_replay::capture::RecordingSession;
use scene_replay::core::{Chirality, HandPose, RecordingStream, Tick, TransformSample, Vec3};
use scene_replay::input::{load_file, read_buffer, write_stream, NamedBuffer};
use scene_replay::playback::{PlaybackEngine, PlaybackEvent};
use scene_replay::settings::PlaybackConfig;
use scene_replay::units::{unit_for, HandUnit, TransformUnit, UnitHandle, UnitRegistry};

#[derive(Parser)]
#[command(name = "scene-replay")]
#[command(about = "Record and replay scene state streams", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode and validate a recording, then print a summary.
    Inspect {
        file: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play recordings headlessly against stand-in units.
    Play {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Index of the stream to play
        #[arg(long)]
        stream: Option<usize>,
        /// Playback rate multiplier
        #[arg(long)]
        rate: Option<f64>,
        /// Stop after this many seconds of wall time
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
        /// Scrub to this tick right after starting
        #[arg(long)]
        scrub: Option<Tick>,
        /// Wrap to the first tick at the end of the stream
        #[arg(long = "loop")]
        looping: bool,
    },

    /// Record a synthetic scene (a moving cube and a tracked hand) to a file.
    Demo {
        out: PathBuf,
        #[arg(long, default_value_t = 60)]
        frame_rate: u32,
        #[arg(long, default_value_t = 3.0)]
        seconds: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect { file, json } => inspect(file, json),
        Command::Play {
            files,
            stream,
            rate,
            seconds,
            scrub,
            looping,
        } => {
            let mut config = PlaybackConfig::load();
            if let Some(rate) = rate {
                config.playback_rate = rate;
            }
            if let Some(stream) = stream {
                config.default_stream = stream;
            }
            config.loop_playback |= looping;
            play(files, config, seconds, scrub).await
        }
        Command::Demo {
            out,
            frame_rate,
            seconds,
        } => demo(out, frame_rate, seconds),
    }
}

fn inspect(file: PathBuf, json: bool) -> Result<()> {
    let stream = load_file(&file).with_context(|| format!("Failed to load {}", file.display()))?;

    if json {
        let entities: Vec<_> = stream
            .entities
            .iter()
            .map(|e| {
                serde_json::json!({
                    "descriptor": e.descriptor,
                    "kind": e.kind,
                    "parts": e.parts.len(),
                    "frames": e.parts.iter().map(|p| p.frames.len()).sum::<usize>(),
                    "status_events": e.status.len(),
                    "max_tick": e.max_tick(),
                })
            })
            .collect();
        let summary = serde_json::json!({
            "frame_rate": stream.frame_rate,
            "frame_count": stream.frame_count,
            "duration_secs": stream.duration_secs(),
            "recorded_at": stream.recorded_at,
            "entities": entities,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", file.display());
    println!(
        "  {} ticks at {} fps ({:.2}s), recorded {}",
        stream.frame_count,
        stream.frame_rate,
        stream.duration_secs(),
        stream.recorded_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for entity in &stream.entities {
        println!(
            "  {:<24} {} parts, {} frames, {} status events, last tick {}",
            entity.key().to_string(),
            entity.parts.len(),
            entity.parts.iter().map(|p| p.frames.len()).sum::<usize>(),
            entity.status.len(),
            entity.max_tick()
        );
    }
    Ok(())
}

async fn play(files: Vec<PathBuf>, config: PlaybackConfig, seconds: f64, scrub: Option<Tick>) -> Result<()> {
    let buffers: Vec<NamedBuffer> = files
        .iter()
        .filter_map(|path| match read_buffer(path) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                None
            }
        })
        .collect();
    if buffers.is_empty() {
        bail!("No readable recording files");
    }

    let looping = config.loop_playback;
    let mut engine = PlaybackEngine::new(UnitRegistry::new(), config);
    engine.load_streams(buffers)?;
    engine.finish_loading().await;
    log_events(engine.update());

    // Stand-in units for every entity any loaded stream mentions
    for stream in engine.streams() {
        for entity in &stream.entities {
            let key = entity.key();
            if engine.registry().find(&key).is_none() {
                engine.registry_mut().register(unit_for(&key));
            }
        }
    }
    let report = engine.rebind()?;
    info!("Bound {} of {} recorded entities", report.attached.len(), report.binders);

    engine.start_playing().context("Unable to start playback")?;
    if let Some(tick) = scrub {
        engine.scrub_to(tick);
    }

    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    let mut interval = tokio::time::interval(Duration::from_millis(16));
    while Instant::now() < deadline {
        interval.tick().await;
        let events = engine.update();
        let finished = !looping && events.iter().any(|e| matches!(e, PlaybackEvent::ReachedEnd { .. }));
        log_events(events);
        if finished {
            break;
        }
    }

    engine.stop();
    log_events(engine.update());
    info!(
        "Stopped at tick {} ({:.2}s)",
        engine.current_tick(),
        engine.current_time()
    );
    Ok(())
}

fn log_events(events: Vec<PlaybackEvent>) {
    for event in events {
        match event {
            PlaybackEvent::PlayMessages { key, messages } => {
                for message in messages {
                    warn!("{}: {}", key, message);
                }
            }
            PlaybackEvent::ActiveStreamChanged {
                index,
                frame_rate,
                frame_count,
            } => info!("Playing stream {} ({} ticks at {} fps)", index, frame_count, frame_rate),
            PlaybackEvent::LoadFinished { loaded, failed } => {
                if failed.is_empty() {
                    info!("Loaded {} streams", loaded);
                } else {
                    warn!("Loaded {} streams, dropped {}", loaded, failed.join(", "));
                }
            }
            PlaybackEvent::ReachedEnd { tick } => info!("End of stream at tick {}", tick),
        }
    }
}

fn demo(out: PathBuf, frame_rate: u32, seconds: f64) -> Result<()> {
    if frame_rate == 0 {
        bail!("Frame rate must be positive");
    }

    let cube = Arc::new(Mutex::new(TransformSample::default()));
    let cube_unit: UnitHandle = Arc::new(TransformUnit::new("Cube", cube.clone()));
    let hand = Arc::new(HandUnit::new("Hand_L"));
    let hand_unit: UnitHandle = hand.clone();

    let mut session = RecordingSession::new(frame_rate, vec![cube_unit, hand_unit]);
    let dt = 1.0 / frame_rate as f64;
    let steps = demo_steps(frame_rate, seconds)?;
    let hand_begins = steps / 6;
    let hand_ends = (u64::from(steps) * 2 / 3) as Tick;

    session.start();
    for step in 0..steps {
        let t = step as f64 * dt;
        *cube.lock() = TransformSample::at(Vec3::new(t.sin() as f32, 0.0, t.cos() as f32));

        if step == hand_begins {
            hand.hand_began();
        }
        if step >= hand_begins && step < hand_ends {
            let mut pose = HandPose::open(Chirality::Left);
            pose.pinch_strength = (t.sin() * 0.5 + 0.5) as f32;
            pose.palm = TransformSample::at(Vec3::new(0.0, 1.0, t as f32));
            hand.hand_updated(pose);
        }
        if step == hand_ends {
            hand.hand_finished();
        }

        session.advance(dt);
    }
    let stream: RecordingStream = session.stop();

    write_stream(&out, &stream).with_context(|| format!("Failed to write {}", out.display()))?;
    info!(
        "Wrote {} ({} ticks, {} frames)",
        out.display(),
        stream.frame_count,
        stream.total_frames()
    );
    Ok(())
}

/// Number of ticks to record for `seconds` at `frame_rate`
fn demo_steps(frame_rate: u32, seconds: f64) -> Result<Tick> {
    let steps = (seconds * frame_rate as f64).round();
    if !steps.is_finite() || steps < 0.0 {
        bail!("Duration must be a non-negative number of seconds, got {}", seconds);
    }
    if steps > Tick::MAX as f64 {
        bail!("{} seconds at {} fps is more ticks than a recording can hold", seconds, frame_rate);
    }
    Ok(steps as Tick)
}
