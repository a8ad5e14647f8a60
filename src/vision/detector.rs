// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Object detection with a pluggable model and a deterministic fallback

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{Result, VigilError};
use super::{BoundingBox, DetectedRegion, Frame, UNKNOWN_CLASS};

/// Confidence reported for degraded-mode regions
pub const DEGRADED_CONFIDENCE: f64 = 0.3;

/// One raw box as returned by a detection model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    /// (x1, y1, x2, y2) in frame pixels, unclamped
    pub bbox: [f32; 4],
}

/// A loaded detection model
pub trait DetectionModel: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Run inference over a full frame
    fn infer(&self, frame: &Frame) -> Result<Vec<RawDetection>>;

    /// Map a class index to its label
    fn class_name(&self, class_id: usize) -> String;
}

/// Resolves a model file into a loaded backend
pub type ModelLoader = dyn Fn(&Path) -> Result<Box<dyn DetectionModel>>;

/// Backend chosen once when the detector is built
pub enum DetectorBackend {
    /// Delegates to a real model
    Model(Box<dyn DetectionModel>),
    /// No model available; returns the central window of every frame
    Degraded,
}

impl std::fmt::Debug for DetectorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model(model) => f.debug_tuple("Model").field(&model.name()).finish(),
            Self::Degraded => f.write_str("Degraded"),
        }
    }
}

/// Produces labeled regions for each frame
#[derive(Debug)]
pub struct ObjectDetector {
    backend: DetectorBackend,
    min_confidence: f64,
}

impl ObjectDetector {
    pub fn new(backend: DetectorBackend, min_confidence: f64) -> Self {
        Self {
            backend,
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn with_model(model: Box<dyn DetectionModel>, min_confidence: f64) -> Self {
        Self::new(DetectorBackend::Model(model), min_confidence)
    }

    pub fn degraded(min_confidence: f64) -> Self {
        Self::new(DetectorBackend::Degraded, min_confidence)
    }

    /// Load a model with the built-in loader, falling back to degraded mode
    pub fn load(model_path: Option<&Path>, min_confidence: f64) -> Self {
        Self::load_with(model_path, min_confidence, &unavailable_loader)
    }

    /// Load a model with a caller-supplied loader.
    ///
    /// Load failures are logged and leave the detector permanently in
    /// degraded mode.
    pub fn load_with(model_path: Option<&Path>, min_confidence: f64, loader: &ModelLoader) -> Self {
        let Some(path) = model_path else {
            warn!("No detection model configured; running in degraded mode");
            return Self::degraded(min_confidence);
        };

        match loader(path) {
            Ok(model) => {
                info!("Detection model '{}' loaded from {:?}", model.name(), path);
                Self::with_model(model, min_confidence)
            }
            Err(e) => {
                warn!("Could not load detection model from {:?} ({}); running in degraded mode", path, e);
                Self::degraded(min_confidence)
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.backend, DetectorBackend::Degraded)
    }

    pub fn backend(&self) -> &DetectorBackend {
        &self.backend
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn set_min_confidence(&mut self, min_confidence: f64) {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
    }

    /// Detect regions in a frame.
    ///
    /// Every returned box lies inside the frame and has positive area.
    pub fn detect(&self, frame: &Frame) -> Vec<DetectedRegion> {
        match &self.backend {
            DetectorBackend::Degraded => degraded_region(frame.width(), frame.height())
                .into_iter()
                .collect(),
            DetectorBackend::Model(model) => match model.infer(frame) {
                Ok(raw) => self.filter_raw(model.as_ref(), raw, frame.width(), frame.height()),
                Err(e) => {
                    warn!("Inference failed on '{}': {}", model.name(), e);
                    Vec::new()
                }
            },
        }
    }

    fn filter_raw(
        &self,
        model: &dyn DetectionModel,
        raw: Vec<RawDetection>,
        width: u32,
        height: u32,
    ) -> Vec<DetectedRegion> {
        let total = raw.len();
        let regions: Vec<DetectedRegion> = raw
            .into_iter()
            .filter(|det| (det.confidence as f64) >= self.min_confidence)
            .filter_map(|det| {
                let bbox = BoundingBox::clamped(det.bbox, width, height);
                if bbox.is_empty() {
                    return None;
                }
                let class_name = model.class_name(det.class_id);
                Some(DetectedRegion {
                    label: class_name.clone(),
                    confidence: det.confidence as f64,
                    bbox,
                    class_tag: class_name,
                })
            })
            .collect();
        debug!("Kept {} of {} raw detections", regions.len(), total);
        regions
    }
}

/// The synthetic region used when no model is loaded: the central
/// 50% x 50% window. `None` for frames too small to hold it.
pub fn degraded_region(width: u32, height: u32) -> Option<DetectedRegion> {
    let bbox = BoundingBox::new(width / 4, height / 4, width * 3 / 4, height * 3 / 4);
    if bbox.is_empty() {
        return None;
    }
    Some(DetectedRegion {
        label: UNKNOWN_CLASS.to_string(),
        confidence: DEGRADED_CONFIDENCE,
        bbox,
        class_tag: UNKNOWN_CLASS.to_string(),
    })
}

fn unavailable_loader(path: &Path) -> Result<Box<dyn DetectionModel>> {
    if !path.exists() {
        return Err(VigilError::ModelUnavailable(format!("{:?} does not exist", path)));
    }
    Err(VigilError::ModelUnavailable(
        "no inference backend is compiled into this build".to_string(),
    ))
}
