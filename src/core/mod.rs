// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Core module - frame loop orchestration and event distribution

mod event_bus;
mod pipeline;

pub use event_bus::{DetectionNotice, Event, EventBus, EventPayload, EventType};
pub use pipeline::{snapshot_name, Pipeline, PipelineSinks};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the frame loop stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    EndOfStream,
    ReadError(String),
    Shutdown,
    FrameLimit,
}

/// Counters for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub regions_detected: u64,
    pub matches: u64,
    pub alarms_triggered: u64,
    pub snapshot_failures: u64,
    pub event_failures: u64,
    pub skipped_frames: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            frames_read: 0,
            frames_processed: 0,
            regions_detected: 0,
            matches: 0,
            alarms_triggered: 0,
            snapshot_failures: 0,
            event_failures: 0,
            skipped_frames: 0,
            started_at: Utc::now(),
            finished_at: None,
            stop_reason: None,
        }
    }
}

impl PipelineStats {
    pub fn elapsed_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
