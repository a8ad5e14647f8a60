// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Vigil - Watchlist Vehicle & Person Detection
//!
//! Watches a live video stream, detects vehicles and persons, matches
//! each detection against an operator-maintained watchlist and runs an
//! alarm sequence (sound, relay, visual flag) on a match.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Vigil Pipeline                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌──────────┐  ┌───────────┐  ┌─────────────┐   │
//! │  │ Camera  │→ │ Detector │→ │ Features  │→ │   Matcher   │   │
//! │  │ Source  │  │          │  │ & Scoring │  │             │   │
//! │  └─────────┘  └──────────┘  └───────────┘  └─────────────┘   │
//! │       ↓                                           ↓          │
//! │  ┌──────────────┐   ┌───────────────┐   ┌──────────────────┐ │
//! │  │ Camera State │   │   Event Bus   │   │ Alarm Coordinator│ │
//! │  └──────────────┘   └───────────────┘   │  audio → relay → │ │
//! │                                         │  visual flag     │ │
//! │  ┌──────────────────────────────────┐   └──────────────────┘ │
//! │  │ Storage: watchlist, detections,  │                        │
//! │  │ snapshots, alarm state           │                        │
//! │  └──────────────────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod alarm;
pub mod camera;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod vision;
pub mod watchlist;

// Re-exports for convenience
pub use alarm::{AlarmConfig, AlarmCoordinator, AlarmPhase, AlarmState};
pub use camera::{CameraOverrides, CameraState, CameraStateMachine, FrameSource};
pub use config::Config;
pub use crate::core::{EventBus, Pipeline, PipelineSinks, PipelineStats};
pub use db::{Database, DetectionEvent, DiskSnapshotSink, MemoryStore};
pub use error::{Result, VigilError};
pub use vision::{
    BoundingBox, DetectedRegion, FeatureDescriptor, FeatureExtractor, Frame, MatchResult, MatchSelector,
    ObjectDetector, SimilarityScorer,
};
pub use watchlist::{NewWatchlistEntry, WatchlistEntry};

/// Vigil version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Vigil name
pub const NAME: &str = "Vigil";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
    /// Enabled features
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "audio")]
    features.push("audio".to_string());

    #[cfg(feature = "serial")]
    features.push("serial".to_string());

    #[cfg(feature = "hardware")]
    features.push("hardware".to_string());

    features
}
