// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Camera connection state and frame sources

mod source;

pub use source::{open_source, FfmpegSource, FrameSource, ImageSequenceSource, SyntheticSource};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::CameraConfig;
use crate::error::{Result, VigilError};

/// Process-wide camera settings and connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub source: String,
    pub frame_skip: u32,
    pub min_confidence: f64,
    pub connected: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<&CameraConfig> for CameraState {
    fn from(config: &CameraConfig) -> Self {
        Self {
            source: config.source.trim().to_string(),
            frame_skip: config.frame_skip.max(1),
            min_confidence: config.min_confidence.clamp(0.0, 1.0),
            connected: false,
            last_connected_at: None,
            last_error: None,
        }
    }
}

impl Default for CameraState {
    fn default() -> Self {
        Self::from(&CameraConfig::default())
    }
}

/// Optional changes to the camera settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraOverrides {
    pub source: Option<String>,
    pub frame_skip: Option<u32>,
    pub min_confidence: Option<f64>,
}

impl CameraOverrides {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.frame_skip.is_none() && self.min_confidence.is_none()
    }

    /// Check every field; returns the overrides with the source trimmed
    pub fn validated(&self) -> Result<Self> {
        let source = match &self.source {
            Some(source) if source.trim().is_empty() => {
                return Err(VigilError::validation("camera source must not be empty"));
            }
            Some(source) => Some(source.trim().to_string()),
            None => None,
        };
        if let Some(frame_skip) = self.frame_skip {
            if frame_skip < 1 {
                return Err(VigilError::validation("frame skip must be at least 1"));
            }
        }
        if let Some(confidence) = self.min_confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(VigilError::validation(format!(
                    "minimum confidence {confidence} is outside [0, 1]"
                )));
            }
        }
        Ok(Self {
            source,
            frame_skip: self.frame_skip,
            min_confidence: self.min_confidence,
        })
    }

    fn apply(self, state: &mut CameraState) {
        if let Some(source) = self.source {
            state.source = source;
        }
        if let Some(frame_skip) = self.frame_skip {
            state.frame_skip = frame_skip;
        }
        if let Some(confidence) = self.min_confidence {
            state.min_confidence = confidence;
        }
    }
}

/// Guards [`CameraState`]; the lock is never held across blocking work
#[derive(Debug, Default)]
pub struct CameraStateMachine {
    state: Mutex<CameraState>,
}

impl CameraStateMachine {
    pub fn new(initial: CameraState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(CameraState::from(config))
    }

    pub fn snapshot(&self) -> CameraState {
        self.state.lock().clone()
    }

    pub fn frame_skip(&self) -> u32 {
        self.state.lock().frame_skip
    }

    pub fn min_confidence(&self) -> f64 {
        self.state.lock().min_confidence
    }

    /// Apply validated overrides, then mark connected and clear any error
    pub fn connect(&self, overrides: Option<&CameraOverrides>) -> Result<CameraState> {
        let overrides = overrides.map(CameraOverrides::validated).transpose()?;

        let mut state = self.state.lock();
        if let Some(overrides) = overrides {
            overrides.apply(&mut state);
        }
        state.connected = true;
        state.last_error = None;
        state.last_connected_at = Some(Utc::now());
        info!(source = %state.source, "Camera connected");
        Ok(state.clone())
    }

    pub fn disconnect(&self) -> CameraState {
        let mut state = self.state.lock();
        if state.connected {
            info!(source = %state.source, "Camera disconnected");
        }
        state.connected = false;
        state.clone()
    }

    /// Change settings without touching connectivity
    pub fn update(&self, overrides: Option<&CameraOverrides>) -> Result<CameraState> {
        let Some(overrides) = overrides.filter(|o| !o.is_empty()) else {
            return Ok(self.snapshot());
        };
        let overrides = overrides.validated()?;

        let mut state = self.state.lock();
        overrides.apply(&mut state);
        info!(
            source = %state.source,
            frame_skip = state.frame_skip,
            min_confidence = state.min_confidence,
            "Camera settings updated"
        );
        Ok(state.clone())
    }

    /// Record an error. A non-empty message forces the camera offline,
    /// an empty or absent one only clears the error.
    pub fn set_error(&self, message: Option<&str>) -> CameraState {
        let mut state = self.state.lock();
        match message.map(str::trim).filter(|m| !m.is_empty()) {
            Some(message) => {
                warn!(source = %state.source, "Camera error: {}", message);
                state.last_error = Some(message.to_string());
                state.connected = false;
            }
            None => state.last_error = None,
        }
        state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_applies_overrides() {
        let camera = CameraStateMachine::default();
        let state = camera
            .connect(Some(&CameraOverrides {
                source: Some("  rtsp://gate/stream  ".into()),
                frame_skip: Some(5),
                min_confidence: Some(0.6),
            }))
            .unwrap();
        assert!(state.connected);
        assert_eq!(state.source, "rtsp://gate/stream");
        assert_eq!(state.frame_skip, 5);
        assert!(state.last_connected_at.is_some());
        assert_eq!(camera.min_confidence(), 0.6);
    }

    #[test]
    fn test_invalid_overrides_leave_state_unchanged() {
        let camera = CameraStateMachine::default();
        let before = camera.snapshot();

        let bad = [
            CameraOverrides { source: Some("   ".into()), ..Default::default() },
            CameraOverrides { frame_skip: Some(0), ..Default::default() },
            CameraOverrides { min_confidence: Some(1.2), ..Default::default() },
            CameraOverrides {
                source: Some("1".into()),
                frame_skip: Some(3),
                min_confidence: Some(-0.1),
            },
        ];
        for overrides in &bad {
            assert!(camera.connect(Some(overrides)).unwrap_err().is_validation());
            assert!(camera.update(Some(overrides)).unwrap_err().is_validation());
        }
        assert_eq!(camera.snapshot(), before);
    }

    #[test]
    fn test_connect_clears_error() {
        let camera = CameraStateMachine::default();
        camera.set_error(Some("stream lost"));
        let state = camera.connect(None).unwrap();
        assert!(state.connected);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_set_error_semantics() {
        let camera = CameraStateMachine::default();

        camera.connect(None).unwrap();
        let state = camera.set_error(Some(""));
        assert!(state.connected);
        assert!(state.last_error.is_none());

        let state = camera.set_error(Some("boom"));
        assert!(!state.connected);
        assert_eq!(state.last_error.as_deref(), Some("boom"));

        let state = camera.set_error(None);
        assert!(!state.connected);
        assert!(state.last_error.is_none());

        let state = camera.set_error(Some("boom"));
        assert!(!state.connected);
    }

    #[test]
    fn test_update_without_fields_is_noop() {
        let camera = CameraStateMachine::default();
        camera.connect(None).unwrap();
        let before = camera.snapshot();
        assert_eq!(camera.update(None).unwrap(), before);
        assert_eq!(camera.update(Some(&CameraOverrides::default())).unwrap(), before);
    }

    #[test]
    fn test_update_keeps_connectivity() {
        let camera = CameraStateMachine::default();
        let state = camera
            .update(Some(&CameraOverrides { frame_skip: Some(4), ..Default::default() }))
            .unwrap();
        assert!(!state.connected);
        assert_eq!(state.frame_skip, 4);

        camera.connect(None).unwrap();
        assert!(camera.update(Some(&CameraOverrides { min_confidence: Some(0.0), ..Default::default() })).unwrap().connected);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let camera = CameraStateMachine::default();
        camera.connect(None).unwrap();
        let first = camera.disconnect();
        let second = camera.disconnect();
        assert_eq!(first, second);
        assert!(!second.connected);
    }
}
