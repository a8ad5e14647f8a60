// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Event bus for inter-component communication

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::alarm::AlarmPhase;
use crate::camera::CameraState;
use crate::vision::BoundingBox;

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Detection,
    Alarm,
    Camera,
    Error,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Detection(DetectionNotice),
    Alarm { phase: AlarmPhase, reason: String },
    Camera(CameraState),
    Error { message: String },
}

/// A watchlist match as announced to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionNotice {
    /// Stored event id, if the event sink accepted it
    pub event_id: Option<i64>,
    pub entry_id: i64,
    pub entry_label: String,
    pub class_tag: String,
    pub confidence: f64,
    pub score: f64,
    pub bbox: BoundingBox,
    pub snapshot: Option<String>,
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    detection_tx: broadcast::Sender<DetectionNotice>,
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (detection_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            detection_tx,
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_detection(&self, notice: DetectionNotice) {
        let _ = self.detection_tx.send(notice.clone());
        self.publish_event(EventType::Detection, EventPayload::Detection(notice));
    }

    pub fn publish_alarm(&self, phase: AlarmPhase, reason: &str) {
        self.publish_event(
            EventType::Alarm,
            EventPayload::Alarm {
                phase,
                reason: reason.to_string(),
            },
        );
    }

    pub fn publish_camera(&self, state: CameraState) {
        self.publish_event(EventType::Camera, EventPayload::Camera(state));
    }

    pub fn publish_error(&self, message: &str) {
        self.publish_event(
            EventType::Error,
            EventPayload::Error {
                message: message.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_detections(&self) -> broadcast::Receiver<DetectionNotice> {
        self.detection_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Events published so far
    pub fn published(&self) -> u64 {
        self.event_counter.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> DetectionNotice {
        DetectionNotice {
            event_id: Some(7),
            entry_id: 3,
            entry_label: "red car".into(),
            class_tag: "car".into(),
            confidence: 0.9,
            score: 0.8,
            bbox: BoundingBox::new(1, 2, 3, 4),
            snapshot: None,
        }
    }

    #[test]
    fn test_detection_reaches_both_channels() {
        let bus = EventBus::new(8);
        let mut detections = bus.subscribe_detections();
        let mut events = bus.subscribe_events();

        bus.publish_detection(notice());
        assert_eq!(detections.try_recv().unwrap(), notice());
        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::Detection);
        assert_eq!(event.id, 0);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish_error("camera offline");
        bus.publish_alarm(AlarmPhase::Triggered, "test");
        assert_eq!(bus.published(), 2);
    }
}
