// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Storage collaborators - watchlist, detection events, snapshots, alarm state

mod memory;
mod snapshots;
mod sqlite;

pub use memory::MemoryStore;
pub use snapshots::DiskSnapshotSink;
pub use sqlite::{Database, DatabaseStats};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::alarm::AlarmState;
use crate::error::Result;
use crate::vision::{BoundingBox, Frame, MatchResult};
use crate::watchlist::{NewWatchlistEntry, WatchlistEntry};

/// Read/write access to watchlist entries
pub trait WatchlistStore: Send + Sync {
    fn insert(&self, entry: NewWatchlistEntry) -> Result<WatchlistEntry>;

    /// All entries, newest first
    fn list(&self) -> Result<Vec<WatchlistEntry>>;

    fn get(&self, id: i64) -> Result<Option<WatchlistEntry>>;

    /// Returns false when no entry had that id
    fn remove(&self, id: i64) -> Result<bool>;
}

/// Durable record of matched detections
pub trait EventSink: Send + Sync {
    /// Record a match and return the new event id
    fn record(&self, result: &MatchResult, snapshot: Option<&str>, metadata: Map<String, Value>) -> Result<i64>;

    /// Latest `limit` events, newest first
    fn recent(&self, limit: usize) -> Result<Vec<DetectionEvent>>;
}

/// Persists cropped frame regions as image files
pub trait SnapshotSink: Send + Sync {
    /// Save `bbox` of `frame` as `name`. `None` when the crop is empty.
    fn save(&self, frame: &Frame, bbox: &BoundingBox, name: &str) -> Result<Option<PathBuf>>;
}

/// Singleton alarm state
pub trait AlarmStateStore: Send + Sync {
    /// Current state, created with defaults on first use
    fn load_alarm_state(&self) -> Result<AlarmState>;

    fn save_alarm_state(&self, state: &AlarmState) -> Result<()>;
}

/// A stored detection of a watchlist target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub id: i64,
    pub watchlist_entry_id: Option<i64>,
    pub detected_label: String,
    pub vehicle_type: Option<String>,
    pub color_name: Option<String>,
    pub model_name: Option<String>,
    pub has_logo: bool,
    pub is_person: bool,
    pub match_score: f64,
    /// File name inside the detections directory
    pub snapshot_path: Option<String>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl DetectionEvent {
    /// Flatten a match into an event record. Categorical fields come from
    /// the matched entry, the color falls back to what was observed.
    pub fn from_match(
        id: i64,
        result: &MatchResult,
        snapshot: Option<&str>,
        metadata: Map<String, Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let entry = result.best_entry.as_ref();
        Self {
            id,
            watchlist_entry_id: entry.map(|e| e.id),
            detected_label: result.region.label.clone(),
            vehicle_type: entry.and_then(|e| e.vehicle_type.clone()),
            color_name: entry
                .and_then(|e| e.color_name.clone())
                .or_else(|| Some(result.color_name.clone())),
            model_name: entry.and_then(|e| e.model_name.clone()),
            has_logo: entry.map(|e| e.has_logo).unwrap_or(false),
            is_person: result.region.is_person(),
            match_score: result.score,
            snapshot_path: snapshot.map(str::to_string),
            metadata,
            created_at,
        }
    }
}
