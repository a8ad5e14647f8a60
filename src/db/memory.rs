// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! In-process store for demo runs and tests

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::{AlarmStateStore, DetectionEvent, EventSink, WatchlistStore};
use crate::alarm::AlarmState;
use crate::error::Result;
use crate::vision::MatchResult;
use crate::watchlist::{NewWatchlistEntry, WatchlistEntry};

#[derive(Default)]
struct Tables {
    watchlist: Vec<WatchlistEntry>,
    events: Vec<DetectionEvent>,
    alarm: Option<AlarmState>,
    next_entry_id: i64,
    next_event_id: i64,
}

/// Volatile implementation of every storage trait
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.tables.read().events.len()
    }
}

impl WatchlistStore for MemoryStore {
    fn insert(&self, entry: NewWatchlistEntry) -> Result<WatchlistEntry> {
        let mut tables = self.tables.write();
        tables.next_entry_id += 1;
        let stored = WatchlistEntry {
            id: tables.next_entry_id,
            label: entry.label,
            vehicle_type: entry.vehicle_type,
            color_name: entry.color_name,
            model_name: entry.model_name,
            has_logo: entry.has_logo,
            is_person: entry.is_person,
            image_path: entry.image_path,
            descriptor: entry.descriptor,
            created_at: Utc::now(),
        };
        tables.watchlist.push(stored.clone());
        Ok(stored)
    }

    fn list(&self) -> Result<Vec<WatchlistEntry>> {
        Ok(self.tables.read().watchlist.iter().rev().cloned().collect())
    }

    fn get(&self, id: i64) -> Result<Option<WatchlistEntry>> {
        Ok(self.tables.read().watchlist.iter().find(|e| e.id == id).cloned())
    }

    fn remove(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write();
        let before = tables.watchlist.len();
        tables.watchlist.retain(|e| e.id != id);
        let removed = tables.watchlist.len() < before;
        if removed {
            for event in tables.events.iter_mut().filter(|ev| ev.watchlist_entry_id == Some(id)) {
                event.watchlist_entry_id = None;
            }
        }
        Ok(removed)
    }
}

impl EventSink for MemoryStore {
    fn record(&self, result: &MatchResult, snapshot: Option<&str>, metadata: Map<String, Value>) -> Result<i64> {
        let mut tables = self.tables.write();
        tables.next_event_id += 1;
        let id = tables.next_event_id;
        tables
            .events
            .push(DetectionEvent::from_match(id, result, snapshot, metadata, Utc::now()));
        Ok(id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<DetectionEvent>> {
        Ok(self.tables.read().events.iter().rev().take(limit).cloned().collect())
    }
}

impl AlarmStateStore for MemoryStore {
    fn load_alarm_state(&self) -> Result<AlarmState> {
        let mut tables = self.tables.write();
        Ok(tables.alarm.get_or_insert_with(AlarmState::default).clone())
    }

    fn save_alarm_state(&self, state: &AlarmState) -> Result<()> {
        self.tables.write().alarm = Some(state.clone());
        Ok(())
    }
}
