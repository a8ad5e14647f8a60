// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Vigil - Watchlist Vehicle & Person Detection
//!
//! Runs the detection loop against a camera, stream, video file or image
//! directory, and manages the watchlist from the command line.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vigil::alarm::{audio_output, relay_output};
use vigil::camera::{open_source, FrameSource, SyntheticSource};
use vigil::db::{AlarmStateStore, EventSink, WatchlistStore};
use vigil::vision::{FeatureExtractor, MatchSelector, ObjectDetector, SimilarityScorer};
use vigil::watchlist::{enroll, NewWatchlistEntry};
use vigil::{
    AlarmCoordinator, CameraStateMachine, Config, Database, DiskSnapshotSink, EventBus, Pipeline, PipelineSinks,
    NAME, VERSION,
};

/// Vigil - Watchlist Vehicle & Person Detection
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Live video watchlist matching for vehicles and persons, with alarm sequencing")]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Camera index, stream URL, video file or image directory
    #[arg(short, long, global = true)]
    source: Option<String>,

    /// Detection model weights
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Minimum detection confidence (0-1)
    #[arg(long, global = true)]
    confidence: Option<f64>,

    /// Process every Nth frame
    #[arg(long, global = true)]
    frame_skip: Option<u32>,

    /// Alarm sound (WAV)
    #[arg(long, global = true)]
    sound: Option<PathBuf>,

    /// Demo mode with synthetic frames
    #[arg(long, global = true)]
    demo: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long, global = true)]
    trace: bool,

    /// Stop after reading this many frames
    #[arg(long, global = true)]
    max_frames: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the detection loop (default)
    Run,

    /// Add a watchlist entry from a reference image
    Enroll {
        /// Reference image
        image: PathBuf,

        /// Display label
        #[arg(long)]
        label: String,

        /// Vehicle type, matched as a substring of the detected class
        #[arg(long)]
        vehicle_type: Option<String>,

        /// Color name; detected from the image when omitted
        #[arg(long)]
        color: Option<String>,

        /// Make or model
        #[arg(long)]
        model_name: Option<String>,

        /// The target carries a logo or livery
        #[arg(long)]
        logo: bool,

        /// The target is a person
        #[arg(long)]
        person: bool,
    },

    /// List watchlist entries
    List,

    /// Remove a watchlist entry
    Remove {
        /// Entry id
        id: i64,
    },

    /// Show recent detection events
    Events {
        /// Number of events
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show alarm and database status
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)
        .with_context(|| format!("loading configuration from {:?}", config_path))?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_filter()?
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{} - Watchlist Vehicle & Person Detection", NAME, VERSION);
    info!("Using configuration {:?}", config_path);

    // Override with command line args
    if let Some(source) = &args.source {
        config.camera.source = source.clone();
    }
    if let Some(model) = &args.model {
        config.detector.model_path = Some(model.clone());
    }
    if let Some(confidence) = args.confidence {
        config.camera.min_confidence = confidence;
    }
    if let Some(frame_skip) = args.frame_skip {
        config.camera.frame_skip = frame_skip;
    }
    if let Some(sound) = &args.sound {
        config.alarm.sound_file = Some(sound.clone());
    }
    if args.demo {
        config.demo_mode = true;
    }
    config.validate()?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_pipeline(config, args.max_frames))
        }
        Command::Enroll {
            image,
            label,
            vehicle_type,
            color,
            model_name,
            logo,
            person,
        } => {
            let db = open_database(&config)?;
            let extractor = FeatureExtractor::new(config.detector.bins);
            let draft = NewWatchlistEntry {
                label,
                vehicle_type,
                color_name: color,
                model_name,
                has_logo: logo,
                is_person: person,
                ..Default::default()
            };
            let entry = enroll(&db, &extractor, &config.storage.watchlist_dir, &image, draft)
                .with_context(|| format!("enrolling {:?}", image))?;
            println!(
                "Added #{} {} (color: {}, type: {})",
                entry.id,
                entry.label,
                entry.color_name.as_deref().unwrap_or("-"),
                describe_kind(entry.is_person, entry.vehicle_type.as_deref())
            );
            Ok(())
        }
        Command::List => {
            let db = open_database(&config)?;
            let entries = db.list()?;
            if entries.is_empty() {
                println!("Watchlist is empty");
            }
            for entry in entries {
                println!(
                    "#{:<4} {:<24} {:<10} {:<8} logo:{:<5} descriptor:{:<5} {}",
                    entry.id,
                    entry.label,
                    describe_kind(entry.is_person, entry.vehicle_type.as_deref()),
                    entry.color_name.as_deref().unwrap_or("-"),
                    entry.has_logo,
                    entry.descriptor.is_some(),
                    entry.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Ok(())
        }
        Command::Remove { id } => {
            let db = open_database(&config)?;
            if db.remove(id)? {
                println!("Removed watchlist entry #{}", id);
            } else {
                warn!("No watchlist entry #{}", id);
            }
            Ok(())
        }
        Command::Events { limit } => {
            let db = open_database(&config)?;
            for event in db.recent(limit)? {
                println!(
                    "{} #{:<5} entry:{:<5} {:<12} score:{:.3} {}",
                    event.created_at.format("%Y-%m-%d %H:%M:%S"),
                    event.id,
                    event.watchlist_entry_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
                    event.detected_label,
                    event.match_score,
                    event.snapshot_path.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        Command::Status => {
            let db = open_database(&config)?;
            let alarm = db.load_alarm_state()?;
            let stats = db.get_stats()?;
            let build = vigil::build_info();
            println!("{} v{} ({}/{}) features: {:?}", NAME, build.version, build.os, build.target, build.features);
            println!("Visual alarm active: {}", alarm.visual_active);
            println!(
                "Last alarm: {}",
                alarm
                    .last_alarm_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".into())
            );
            println!(
                "Watchlist entries: {}, detections: {}, database: {} KiB",
                stats.watchlist_count,
                stats.detection_count,
                stats.size_bytes / 1024
            );
            Ok(())
        }
    }
}

fn open_database(config: &Config) -> Result<Database> {
    config.ensure_directories()?;
    Ok(Database::open(&config.storage.database_path)?)
}

fn describe_kind(is_person: bool, vehicle_type: Option<&str>) -> String {
    if is_person {
        "person".to_string()
    } else {
        vehicle_type.unwrap_or("vehicle").to_string()
    }
}

/// Wire the pipeline together and run it until the stream ends or Ctrl+C
async fn run_pipeline(config: Config, max_frames: Option<u64>) -> Result<()> {
    info!("Initializing pipeline...");
    let db = Arc::new(open_database(&config)?);
    let bus = Arc::new(EventBus::new(256));

    let alarm = Arc::new(AlarmCoordinator::start_with_events(
        config.alarm.clone(),
        audio_output(config.alarm.enable_audio),
        relay_output(config.alarm.relay_pin.as_deref()),
        db.clone(),
        Some(bus.clone()),
    )?);

    let camera = Arc::new(CameraStateMachine::from_config(&config.camera));
    let detector = ObjectDetector::load(config.detector.model_path.as_deref(), config.camera.min_confidence);
    let selector = MatchSelector::new(detector, FeatureExtractor::new(config.detector.bins), SimilarityScorer::default())
        .with_parallel_features(config.detector.parallel_features);

    let sinks = PipelineSinks {
        watchlist: db.clone(),
        events: db.clone(),
        snapshots: Arc::new(DiskSnapshotSink::new(&config.storage.detections_dir)),
    };
    let mut pipeline = Pipeline::new(selector, camera.clone(), alarm.clone(), sinks)
        .with_event_bus(bus.clone())
        .with_max_frames(max_frames);

    let mut source: Box<dyn FrameSource> = if config.demo_mode {
        info!("Demo mode: using synthetic frames");
        Box::new(
            SyntheticSource::new(config.camera.width, config.camera.height).with_interval(Duration::from_millis(66)),
        )
    } else {
        match open_source(&config.camera.source, config.camera.width, config.camera.height) {
            Ok(source) => source,
            Err(e) => {
                camera.set_error(Some(&e.to_string()));
                return Err(e).context("opening camera source");
            }
        }
    };

    let mut detections = bus.subscribe_detections();
    let watcher = tokio::spawn(async move {
        while let Ok(notice) = detections.recv().await {
            warn!(
                "🚨 {} detected ({}, score {:.2}, confidence {:.0}%)",
                notice.entry_label,
                notice.class_tag,
                notice.score,
                notice.confidence * 100.0
            );
        }
    });

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received, stopping...");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    info!("🚀 Vigil running - press Ctrl+C to stop");
    let stats = tokio::task::spawn_blocking(move || pipeline.run(source.as_mut(), &shutdown)).await??;

    info!("Waiting for queued alarms to finish...");
    match tokio::task::spawn_blocking(move || alarm.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Alarm shutdown failed: {}", e),
        Err(e) => error!("Alarm shutdown task failed: {}", e),
    }
    watcher.abort();

    info!(
        "Processed {} of {} frames, {} matches, {} alarms in {:.1}s",
        stats.frames_processed,
        stats.frames_read,
        stats.matches,
        stats.alarms_triggered,
        stats.elapsed_secs()
    );
    info!("Vigil shutdown complete");
    Ok(())
}
