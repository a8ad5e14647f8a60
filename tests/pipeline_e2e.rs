mod common;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use common::synthetic::{scene, scratch_dir, ScriptedModel};
use vigil::alarm::{AlarmConfig, SilentAudio, SimulatedRelay};
use vigil::camera::ImageSequenceSource;
use vigil::core::StopReason;
use vigil::db::{AlarmStateStore, EventSink, WatchlistStore};
use vigil::vision::{BoundingBox, FeatureExtractor, MatchSelector, ObjectDetector, SimilarityScorer};
use vigil::watchlist::{enroll, NewWatchlistEntry};
use vigil::{AlarmCoordinator, CameraStateMachine, Database, DiskSnapshotSink, MemoryStore, Pipeline, PipelineSinks};

fn person_box() -> BoundingBox {
    BoundingBox::new(200, 100, 320, 400)
}

fn quick_alarm() -> AlarmConfig {
    AlarmConfig {
        relay_active_secs: 0.01,
        visual_hold_ms: 5,
        ..Default::default()
    }
}

#[test]
fn person_with_matching_descriptor_scores_at_least_histogram_weight() {
    let frame = scene(640, 480, person_box(), [200, 40, 40]);
    let extractor = FeatureExtractor::default();
    let stored = extractor.extract(&person_box().crop(&frame));

    let store = MemoryStore::new();
    store
        .insert(NewWatchlistEntry {
            label: "decoy car".into(),
            vehicle_type: Some("car".into()),
            descriptor: Some(stored.clone()),
            ..Default::default()
        })
        .unwrap();
    let target = store
        .insert(NewWatchlistEntry {
            label: "suspect".into(),
            is_person: true,
            descriptor: Some(stored),
            ..Default::default()
        })
        .unwrap();

    let selector = MatchSelector::new(
        ObjectDetector::with_model(Box::new(ScriptedModel::single("person", 0.9, person_box())), 0.45),
        extractor,
        SimilarityScorer::default(),
    );
    let results = selector.find_matches(&frame, &store.list().unwrap());

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.region.class_tag, "person");
    assert!((result.region.confidence - 0.9).abs() < 1e-6);
    assert_eq!(result.best_entry.as_ref().map(|e| e.id), Some(target.id));
    assert!(result.score >= 0.6, "score {:.3} below histogram weight", result.score);
}

#[test]
fn degraded_mode_reports_central_window() {
    let frame = scene(640, 480, person_box(), [30, 30, 200]);
    let selector = MatchSelector::new(
        ObjectDetector::load(None, 0.45),
        FeatureExtractor::default(),
        SimilarityScorer::default(),
    );
    assert!(selector.detector().is_degraded());

    let results = selector.find_matches(&frame, &[]);
    assert_eq!(results.len(), 1);
    let region = &results[0].region;
    assert_eq!(region.bbox, BoundingBox::new(160, 120, 480, 360));
    assert_eq!(region.confidence, 0.3);
    assert_eq!(region.label, "unknown");
    assert!(results[0].best_entry.is_none());
}

#[test]
fn enrolled_target_seen_on_camera_is_recorded_and_alarmed() {
    let dir = scratch_dir("e2e");
    let frames_dir = dir.join("frames");
    std::fs::create_dir_all(&frames_dir).unwrap();

    let frame = scene(320, 240, BoundingBox::new(100, 60, 220, 200), [40, 60, 210]);
    let reference = dir.join("reference.png");
    BoundingBox::new(100, 60, 220, 200).crop(&frame).save(&reference).unwrap();
    for i in 0..4 {
        frame.save(frames_dir.join(format!("frame_{i:03}.png"))).unwrap();
    }

    let db = Arc::new(Database::open(&dir.join("vigil.db")).unwrap());
    let extractor = FeatureExtractor::default();
    let entry = enroll(
        db.as_ref(),
        &extractor,
        &dir.join("watchlist"),
        &reference,
        NewWatchlistEntry {
            label: "blue van".into(),
            vehicle_type: Some("truck".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(entry.color_name.as_deref(), Some("blue"));

    let alarm = Arc::new(
        AlarmCoordinator::start(quick_alarm(), Box::new(SilentAudio), Box::new(SimulatedRelay), db.clone()).unwrap(),
    );
    let camera = Arc::new(CameraStateMachine::default());
    let selector = MatchSelector::new(
        ObjectDetector::with_model(
            Box::new(ScriptedModel::single("truck", 0.8, BoundingBox::new(100, 60, 220, 200))),
            0.45,
        ),
        extractor,
        SimilarityScorer::default(),
    );
    let snapshots = dir.join("detections");
    let mut pipeline = Pipeline::new(
        selector,
        camera.clone(),
        alarm.clone(),
        PipelineSinks {
            watchlist: db.clone(),
            events: db.clone(),
            snapshots: Arc::new(DiskSnapshotSink::new(&snapshots)),
        },
    );

    // default frame skip of 2 processes frames 2 and 4
    let mut source = ImageSequenceSource::open(&frames_dir).unwrap();
    let stats = pipeline.run(&mut source, &AtomicBool::new(false)).unwrap();
    assert_eq!(stats.frames_read, 4);
    assert_eq!(stats.frames_processed, 2);
    assert_eq!(stats.matches, 2);
    assert_eq!(stats.stop_reason, Some(StopReason::EndOfStream));
    assert!(!camera.snapshot().connected);

    let events = db.recent(10).unwrap();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event.watchlist_entry_id, Some(entry.id));
        assert!(event.match_score >= 0.6);
        let name = event.snapshot_path.as_deref().unwrap();
        assert!(snapshots.join(name).exists());
        assert_eq!(event.metadata["class_tag"], "truck");
    }

    assert!(alarm.wait_idle(Duration::from_secs(10)));
    let state = db.load_alarm_state().unwrap();
    assert!(!state.visual_active);
    assert!(state.last_alarm_at.is_some());
    alarm.shutdown().unwrap();

    std::fs::remove_dir_all(&dir).ok();
}
