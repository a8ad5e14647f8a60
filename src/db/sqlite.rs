// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! SQLite-backed storage

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{AlarmStateStore, DetectionEvent, EventSink, WatchlistStore};
use crate::alarm::AlarmState;
use crate::error::{Result, VigilError};
use crate::vision::{FeatureDescriptor, MatchResult};
use crate::watchlist::{NewWatchlistEntry, WatchlistEntry};

const ENTRY_COLUMNS: &str = "id, label, vehicle_type, color_name, model_name, has_logo, is_person, \
                             image_path, descriptor, created_at";

const EVENT_COLUMNS: &str = "id, watchlist_entry_id, detected_label, vehicle_type, color_name, model_name, \
                             has_logo, is_person, match_score, snapshot_path, metadata, created_at";

/// Database manager
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);
        conn.execute_batch(
            r#"
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -16000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };
        db.create_tables()?;

        info!("Database opened at {:?}", path);
        Ok(db)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            path: None,
        };
        db.create_tables()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Operator-defined targets
            CREATE TABLE IF NOT EXISTS watchlist (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL,
                vehicle_type TEXT,
                color_name TEXT,
                model_name TEXT,
                has_logo INTEGER NOT NULL DEFAULT 0,
                is_person INTEGER NOT NULL DEFAULT 0,
                image_path TEXT,
                descriptor TEXT,
                created_at TEXT NOT NULL
            );

            -- Matched detections
            CREATE TABLE IF NOT EXISTS detections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                watchlist_entry_id INTEGER REFERENCES watchlist(id) ON DELETE SET NULL,
                detected_label TEXT NOT NULL,
                vehicle_type TEXT,
                color_name TEXT,
                model_name TEXT,
                has_logo INTEGER NOT NULL DEFAULT 0,
                is_person INTEGER NOT NULL DEFAULT 0,
                match_score REAL NOT NULL,
                snapshot_path TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detections_created ON detections(created_at);
            CREATE INDEX IF NOT EXISTS idx_detections_entry ON detections(watchlist_entry_id);

            -- Singleton alarm state
            CREATE TABLE IF NOT EXISTS app_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                visual_active INTEGER NOT NULL DEFAULT 0,
                last_alarm_at TEXT
            );
        "#,
        )?;

        Ok(())
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock();

        let watchlist_count: i64 = conn.query_row("SELECT COUNT(*) FROM watchlist", [], |row| row.get(0))?;
        let detection_count: i64 = conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        let size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size as size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(DatabaseStats {
            watchlist_count: watchlist_count as usize,
            detection_count: detection_count as usize,
            size_bytes: size_bytes as u64,
        })
    }
}

/// Row as stored, before JSON and timestamp decoding
struct EntryRow {
    id: i64,
    label: String,
    vehicle_type: Option<String>,
    color_name: Option<String>,
    model_name: Option<String>,
    has_logo: bool,
    is_person: bool,
    image_path: Option<String>,
    descriptor: Option<String>,
    created_at: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            vehicle_type: row.get(2)?,
            color_name: row.get(3)?,
            model_name: row.get(4)?,
            has_logo: row.get(5)?,
            is_person: row.get(6)?,
            image_path: row.get(7)?,
            descriptor: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> WatchlistEntry {
        let descriptor = self.descriptor.as_deref().and_then(|text| {
            let decoded = serde_json::from_str::<Map<String, Value>>(text)
                .map_err(VigilError::from)
                .and_then(|map| FeatureDescriptor::from_map(&map));
            match decoded {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    // entry stays usable on categorical hints alone
                    warn!(entry_id = self.id, "Ignoring stored descriptor: {}", e);
                    None
                }
            }
        });

        WatchlistEntry {
            id: self.id,
            label: self.label,
            vehicle_type: self.vehicle_type,
            color_name: self.color_name,
            model_name: self.model_name,
            has_logo: self.has_logo,
            is_person: self.is_person,
            image_path: self.image_path,
            descriptor,
            created_at: parse_time(&self.created_at),
        }
    }
}

struct EventRow {
    id: i64,
    watchlist_entry_id: Option<i64>,
    detected_label: String,
    vehicle_type: Option<String>,
    color_name: Option<String>,
    model_name: Option<String>,
    has_logo: bool,
    is_person: bool,
    match_score: f64,
    snapshot_path: Option<String>,
    metadata: String,
    created_at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            watchlist_entry_id: row.get(1)?,
            detected_label: row.get(2)?,
            vehicle_type: row.get(3)?,
            color_name: row.get(4)?,
            model_name: row.get(5)?,
            has_logo: row.get(6)?,
            is_person: row.get(7)?,
            match_score: row.get(8)?,
            snapshot_path: row.get(9)?,
            metadata: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_event(self) -> Result<DetectionEvent> {
        Ok(DetectionEvent {
            id: self.id,
            watchlist_entry_id: self.watchlist_entry_id,
            detected_label: self.detected_label,
            vehicle_type: self.vehicle_type,
            color_name: self.color_name,
            model_name: self.model_name,
            has_logo: self.has_logo,
            is_person: self.is_person,
            match_score: self.match_score,
            snapshot_path: self.snapshot_path,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: parse_time(&self.created_at),
        })
    }
}

fn parse_time(text: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(text) {
        Ok(time) => time.with_timezone(&Utc),
        Err(e) => {
            warn!("Unparseable timestamp '{}' in database: {}", text, e);
            DateTime::<Utc>::default()
        }
    }
}

impl WatchlistStore for Database {
    fn insert(&self, entry: NewWatchlistEntry) -> Result<WatchlistEntry> {
        let created_at = Utc::now();
        let descriptor = entry
            .descriptor
            .as_ref()
            .map(|d| serde_json::to_string(&d.to_map()))
            .transpose()?;

        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO watchlist
               (label, vehicle_type, color_name, model_name, has_logo, is_person, image_path, descriptor, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                entry.label,
                entry.vehicle_type,
                entry.color_name,
                entry.model_name,
                entry.has_logo,
                entry.is_person,
                entry.image_path,
                descriptor,
                created_at.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(WatchlistEntry {
            id,
            label: entry.label,
            vehicle_type: entry.vehicle_type,
            color_name: entry.color_name,
            model_name: entry.model_name,
            has_logo: entry.has_logo,
            is_person: entry.is_person,
            image_path: entry.image_path,
            descriptor: entry.descriptor,
            created_at,
        })
    }

    fn list(&self) -> Result<Vec<WatchlistEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {ENTRY_COLUMNS} FROM watchlist ORDER BY id DESC"))?;
        let rows = stmt.query_map([], EntryRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry());
        }
        Ok(entries)
    }

    fn get(&self, id: i64) -> Result<Option<WatchlistEntry>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM watchlist WHERE id = ?1"),
                params![id],
                EntryRow::from_row,
            )
            .optional()?;
        Ok(row.map(EntryRow::into_entry))
    }

    fn remove(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM watchlist WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl EventSink for Database {
    fn record(&self, result: &MatchResult, snapshot: Option<&str>, metadata: Map<String, Value>) -> Result<i64> {
        let event = DetectionEvent::from_match(0, result, snapshot, metadata, Utc::now());
        let metadata = serde_json::to_string(&event.metadata)?;

        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO detections
               (watchlist_entry_id, detected_label, vehicle_type, color_name, model_name,
                has_logo, is_person, match_score, snapshot_path, metadata, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                event.watchlist_entry_id,
                event.detected_label,
                event.vehicle_type,
                event.color_name,
                event.model_name,
                event.has_logo,
                event.is_person,
                event.match_score,
                event.snapshot_path,
                metadata,
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent(&self, limit: usize) -> Result<Vec<DetectionEvent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM detections ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], EventRow::from_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }
}

impl AlarmStateStore for Database {
    fn load_alarm_state(&self) -> Result<AlarmState> {
        let conn = self.conn.lock();
        conn.execute("INSERT OR IGNORE INTO app_state (id, visual_active) VALUES (1, 0)", [])?;
        let (visual_active, last_alarm_at): (bool, Option<String>) = conn.query_row(
            "SELECT visual_active, last_alarm_at FROM app_state WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(AlarmState {
            visual_active,
            last_alarm_at: last_alarm_at.as_deref().map(parse_time),
        })
    }

    fn save_alarm_state(&self, state: &AlarmState) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT INTO app_state (id, visual_active, last_alarm_at) VALUES (1, ?1, ?2)
               ON CONFLICT(id) DO UPDATE SET visual_active = excluded.visual_active,
                                             last_alarm_at = excluded.last_alarm_at"#,
            params![state.visual_active, state.last_alarm_at.map(|t| t.to_rfc3339())],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub watchlist_count: usize,
    pub detection_count: usize,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{BoundingBox, DetectedRegion, FeatureExtractor, Frame};
    use image::Rgb;
    use serde_json::json;

    fn draft(label: &str) -> NewWatchlistEntry {
        NewWatchlistEntry {
            label: label.into(),
            vehicle_type: Some("car".into()),
            color_name: Some("red".into()),
            ..Default::default()
        }
    }

    fn matched(entry: WatchlistEntry) -> MatchResult {
        let frame = Frame::from_pixel(8, 8, Rgb([220, 20, 60]));
        MatchResult {
            region: DetectedRegion {
                label: "car".into(),
                confidence: 0.8,
                bbox: BoundingBox::new(0, 0, 8, 8),
                class_tag: "car".into(),
            },
            best_entry: Some(entry),
            score: 0.72,
            descriptor: FeatureExtractor::new(4).extract(&frame),
            color_name: "red".into(),
        }
    }

    #[test]
    fn test_watchlist_round_trip_keeps_descriptor() {
        let db = Database::open_in_memory().unwrap();
        let descriptor = FeatureExtractor::new(4).extract(&Frame::from_pixel(6, 6, Rgb([10, 200, 30])));
        let mut new = draft("green car");
        new.descriptor = Some(descriptor.clone());

        let inserted = db.insert(new).unwrap();
        let fetched = db.get(inserted.id).unwrap().unwrap();
        assert_eq!(fetched.label, "green car");
        assert_eq!(fetched.descriptor, Some(descriptor));
        assert_eq!(fetched.created_at.timestamp(), inserted.created_at.timestamp());
    }

    #[test]
    fn test_list_is_newest_first_and_remove() {
        let db = Database::open_in_memory().unwrap();
        let first = db.insert(draft("first")).unwrap();
        let second = db.insert(draft("second")).unwrap();

        let labels: Vec<String> = db.list().unwrap().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["second", "first"]);

        assert!(db.remove(first.id).unwrap());
        assert!(!db.remove(first.id).unwrap());
        assert_eq!(db.list().unwrap().len(), 1);
        assert!(db.get(second.id).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_descriptor_is_ignored() {
        let db = Database::open_in_memory().unwrap();
        let entry = db.insert(draft("corrupt")).unwrap();
        db.conn
            .lock()
            .execute(
                "UPDATE watchlist SET descriptor = ?1 WHERE id = ?2",
                params![r#"{"color_hist": [1.0, 2.0, 3.0]}"#, entry.id],
            )
            .unwrap();
        let fetched = db.get(entry.id).unwrap().unwrap();
        assert!(fetched.descriptor.is_none());
    }

    #[test]
    fn test_overflowing_bin_count_is_ignored_on_list() {
        let db = Database::open_in_memory().unwrap();
        let entry = db.insert(draft("tampered")).unwrap();
        db.conn
            .lock()
            .execute(
                "UPDATE watchlist SET descriptor = ?1 WHERE id = ?2",
                params![
                    r#"{"bins": 4294967296, "color_hist": [], "average_color": [0, 0, 0], "edge_density": 0.0}"#,
                    entry.id
                ],
            )
            .unwrap();
        let entries = db.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].descriptor.is_none());
    }

    #[test]
    fn test_record_and_list_events() {
        let db = Database::open_in_memory().unwrap();
        let entry = db.insert(draft("red car")).unwrap();
        let result = matched(entry.clone());

        let mut metadata = Map::new();
        metadata.insert("confidence".into(), json!(0.8));
        let first = db.record(&result, Some("20260101T000000_1.jpg"), metadata.clone()).unwrap();
        let second = db.record(&result, None, Map::new()).unwrap();
        assert!(second > first);

        let events = db.recent(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, second);
        assert_eq!(events[1].watchlist_entry_id, Some(entry.id));
        assert_eq!(events[1].snapshot_path.as_deref(), Some("20260101T000000_1.jpg"));
        assert_eq!(events[1].metadata, metadata);
        assert_eq!(events[1].color_name.as_deref(), Some("red"));
        assert!(!events[1].is_person);

        assert_eq!(db.recent(1).unwrap().len(), 1);
    }

    #[test]
    fn test_removed_entry_keeps_events() {
        let db = Database::open_in_memory().unwrap();
        let entry = db.insert(draft("gone")).unwrap();
        db.record(&matched(entry.clone()), None, Map::new()).unwrap();
        db.remove(entry.id).unwrap();

        let events = db.recent(5).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].watchlist_entry_id, None);
    }

    #[test]
    fn test_alarm_state_get_or_create() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load_alarm_state().unwrap(), AlarmState::default());

        let state = AlarmState {
            visual_active: true,
            last_alarm_at: Some(Utc::now()),
        };
        db.save_alarm_state(&state).unwrap();
        let loaded = db.load_alarm_state().unwrap();
        assert!(loaded.visual_active);
        assert_eq!(
            loaded.last_alarm_at.map(|t| t.timestamp_micros()),
            state.last_alarm_at.map(|t| t.timestamp_micros())
        );
    }

    #[test]
    fn test_file_database_persists() {
        let dir = std::env::temp_dir().join(format!("vigil-db-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("vigil.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert(draft("persisted")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list().unwrap()[0].label, "persisted");
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.watchlist_count, 1);
        assert_eq!(stats.detection_count, 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
