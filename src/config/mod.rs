// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Configuration module

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use crate::alarm::AlarmConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace); CLI flags take precedence
    pub log_level: String,

    /// Enable demo mode (synthetic frames instead of a camera)
    pub demo_mode: bool,

    /// Frame source configuration
    pub camera: CameraConfig,

    /// Detector and feature configuration
    pub detector: DetectorConfig,

    /// Alarm configuration
    pub alarm: AlarmConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            demo_mode: false,
            camera: CameraConfig::default(),
            detector: DetectorConfig::default(),
            alarm: AlarmConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.camera.source.trim().is_empty() {
            bail!("camera.source must not be empty");
        }
        if self.camera.frame_skip < 1 {
            bail!("camera.frame_skip must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.camera.min_confidence) {
            bail!("camera.min_confidence must be within [0, 1]");
        }
        if self.detector.bins == 0 {
            bail!("detector.bins must be positive");
        }
        self.log_filter()?;
        if self.alarm.relay_active_secs < 0.0 || !self.alarm.relay_active_secs.is_finite() {
            bail!("alarm.relay_active_secs must be a non-negative number");
        }
        Ok(())
    }

    /// Parsed `log_level`
    pub fn log_filter(&self) -> Result<Level> {
        match self.log_level.trim().parse::<Level>() {
            Ok(level) => Ok(level),
            Err(_) => bail!("log_level '{}' is not one of error, warn, info, debug, trace", self.log_level),
        }
    }

    /// Create the directories the pipeline writes into
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.storage.watchlist_dir)?;
        std::fs::create_dir_all(&self.storage.detections_dir)?;
        if let Some(parent) = self.storage.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("vigil"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Frame source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index, stream URL, video file or image directory
    pub source: String,

    /// Process one out of every `frame_skip` frames
    pub frame_skip: u32,

    /// Minimum detection confidence
    pub min_confidence: f64,

    /// Capture width for decoded streams
    pub width: u32,

    /// Capture height for decoded streams
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            frame_skip: 2,
            min_confidence: 0.45,
            width: 640,
            height: 480,
        }
    }
}

/// Detector and feature extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Detection model weights
    pub model_path: Option<PathBuf>,

    /// Histogram bins per axis
    pub bins: usize,

    /// Extract region features in parallel
    pub parallel_features: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: Some(PathBuf::from("yolov8n.pt")),
            bins: 16,
            parallel_features: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub database_path: PathBuf,

    /// Reference images for watchlist entries
    pub watchlist_dir: PathBuf,

    /// Snapshots of matched detections
    pub detections_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/vigil.db"),
            watchlist_dir: PathBuf::from("./watchlist"),
            detections_dir: PathBuf::from("./detections"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.frame_skip, 2);
        assert_eq!(config.detector.bins, 16);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[camera]\nsource = \"rtsp://cam/stream\"\n").unwrap();
        assert_eq!(config.camera.source, "rtsp://cam/stream");
        assert_eq!(config.camera.frame_skip, 2);
        assert!((config.alarm.relay_active_secs - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_bad_camera_values() {
        let mut config = Config::default();
        config.camera.frame_skip = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.source = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_parsing() {
        let config: Config = toml::from_str("log_level = \"DEBUG\"\n").unwrap();
        assert_eq!(config.log_filter().unwrap(), Level::DEBUG);
        assert_eq!(Config::default().log_filter().unwrap(), Level::INFO);

        let config: Config = toml::from_str("log_level = \"loud\"\n").unwrap();
        assert!(config.log_filter().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("vigil-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.camera.source, created.camera.source);
        assert_eq!(loaded.alarm.relay_pin, created.alarm.relay_pin);

        std::fs::remove_dir_all(&dir).ok();
    }
}
