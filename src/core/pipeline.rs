// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! The frame loop: sample, detect, match, record, alarm

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use super::{DetectionNotice, EventBus, PipelineStats, StopReason};
use crate::alarm::AlarmCoordinator;
use crate::camera::{CameraStateMachine, FrameSource};
use crate::db::{EventSink, SnapshotSink, WatchlistStore};
use crate::error::Result;
use crate::vision::{Frame, MatchResult, MatchSelector};

/// File name for a detection snapshot
pub fn snapshot_name(at: DateTime<Utc>, entry_id: i64) -> String {
    format!("{}_{}.jpg", at.format("%Y%m%dT%H%M%S%6f"), entry_id)
}

/// Storage collaborators used by the loop
#[derive(Clone)]
pub struct PipelineSinks {
    pub watchlist: Arc<dyn WatchlistStore>,
    pub events: Arc<dyn EventSink>,
    pub snapshots: Arc<dyn SnapshotSink>,
}

/// Orchestrates one frame source through matching and alarms
pub struct Pipeline {
    selector: MatchSelector,
    camera: Arc<CameraStateMachine>,
    alarm: Arc<AlarmCoordinator>,
    sinks: PipelineSinks,
    bus: Option<Arc<EventBus>>,
    max_frames: Option<u64>,
    frame_counter: u64,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        selector: MatchSelector,
        camera: Arc<CameraStateMachine>,
        alarm: Arc<AlarmCoordinator>,
        sinks: PipelineSinks,
    ) -> Self {
        Self {
            selector,
            camera,
            alarm,
            sinks,
            bus: None,
            max_frames: None,
            frame_counter: 0,
            stats: PipelineStats::default(),
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Stop after reading this many frames
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn selector(&self) -> &MatchSelector {
        &self.selector
    }

    /// Drive the loop until the source ends, fails, hits the frame limit
    /// or `shutdown` is set. A read failure ends the run cleanly.
    pub fn run(&mut self, source: &mut dyn FrameSource, shutdown: &AtomicBool) -> Result<PipelineStats> {
        self.stats = PipelineStats::default();
        self.frame_counter = 0;

        let state = self.camera.connect(None)?;
        self.publish_camera();
        info!(
            "Pipeline started on {} (frame skip {}, min confidence {:.2}, detector {})",
            source.describe(),
            state.frame_skip,
            state.min_confidence,
            if self.selector.detector().is_degraded() { "degraded" } else { "model" }
        );

        let reason = loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested");
                break StopReason::Shutdown;
            }
            if self.max_frames.is_some_and(|max| self.stats.frames_read >= max) {
                info!("Frame limit reached");
                break StopReason::FrameLimit;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("End of stream");
                    break StopReason::EndOfStream;
                }
                Err(e) => {
                    let message = e.to_string();
                    error!("Frame read failed: {}", message);
                    self.camera.set_error(Some(&message));
                    if let Some(bus) = &self.bus {
                        bus.publish_error(&message);
                    }
                    break StopReason::ReadError(message);
                }
            };
            self.stats.frames_read += 1;

            if self.should_process() {
                self.process_frame(&frame);
            } else {
                self.stats.skipped_frames += 1;
            }
        };

        self.camera.disconnect();
        self.publish_camera();

        self.stats.finished_at = Some(Utc::now());
        self.stats.stop_reason = Some(reason);
        info!(
            frames = self.stats.frames_read,
            processed = self.stats.frames_processed,
            matches = self.stats.matches,
            alarms = self.stats.alarms_triggered,
            "Pipeline stopped after {:.1}s",
            self.stats.elapsed_secs()
        );
        Ok(self.stats.clone())
    }

    /// Count the frame and decide whether it is due for processing
    fn should_process(&mut self) -> bool {
        self.frame_counter += 1;
        let frame_skip = self.camera.frame_skip().max(1) as u64;
        self.frame_counter % frame_skip == 0
    }

    /// Match one frame against the current watchlist and act on every hit.
    ///
    /// Returns all results, matched or not. A watchlist read failure skips
    /// the frame.
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<MatchResult> {
        let watchlist = match self.sinks.watchlist.list() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Watchlist unavailable, skipping frame: {}", e);
                self.stats.skipped_frames += 1;
                return Vec::new();
            }
        };

        let min_confidence = self.camera.min_confidence();
        if (self.selector.detector().min_confidence() - min_confidence).abs() > f64::EPSILON {
            debug!("Minimum confidence now {:.2}", min_confidence);
            self.selector.detector_mut().set_min_confidence(min_confidence);
        }

        let results = self.selector.find_matches(frame, &watchlist);
        self.stats.frames_processed += 1;
        self.stats.regions_detected += results.len() as u64;

        for result in results.iter().filter(|r| r.is_match()) {
            self.handle_match(frame, result);
        }
        results
    }

    fn handle_match(&mut self, frame: &Frame, result: &MatchResult) {
        let Some(entry) = result.best_entry.as_ref() else {
            return;
        };
        let region = &result.region;
        self.stats.matches += 1;
        info!(
            entry_id = entry.id,
            score = result.score,
            confidence = region.confidence,
            "Watchlist match: {} as {}",
            entry.label,
            region.class_tag
        );

        let name = snapshot_name(Utc::now(), entry.id);
        let snapshot = match self.sinks.snapshots.save(frame, &region.bbox, &name) {
            Ok(Some(_)) => Some(name),
            Ok(None) => None,
            Err(e) => {
                warn!("Snapshot {} failed: {}", name, e);
                self.stats.snapshot_failures += 1;
                None
            }
        };

        let event_id = match self
            .sinks
            .events
            .record(result, snapshot.as_deref(), self.event_metadata(result))
        {
            Ok(id) => Some(id),
            Err(e) => {
                error!(entry_id = entry.id, "Failed to record detection: {}", e);
                self.stats.event_failures += 1;
                None
            }
        };

        if let Some(bus) = &self.bus {
            bus.publish_detection(DetectionNotice {
                event_id,
                entry_id: entry.id,
                entry_label: entry.label.clone(),
                class_tag: region.class_tag.clone(),
                confidence: region.confidence,
                score: result.score,
                bbox: region.bbox,
                snapshot,
            });
        }

        let reason = format!("{} matched {} (score {:.2})", region.class_tag, entry.label, result.score);
        if self.alarm.trigger(&reason).is_some() {
            self.stats.alarms_triggered += 1;
        }
    }

    fn event_metadata(&self, result: &MatchResult) -> Map<String, Value> {
        let region = &result.region;
        let mut metadata = Map::new();
        metadata.insert("confidence".into(), json!(region.confidence));
        metadata.insert("class_tag".into(), json!(region.class_tag));
        metadata.insert("bbox".into(), json!(region.bbox.as_array()));
        metadata.insert("observed_color".into(), json!(result.color_name));
        metadata.insert("frame".into(), json!(self.frame_counter));
        metadata
    }

    fn publish_camera(&self) {
        if let Some(bus) = &self.bus {
            bus.publish_camera(self.camera.snapshot());
        }
    }
}
