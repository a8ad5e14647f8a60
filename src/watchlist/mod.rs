// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Watchlist entries and enrollment of new targets

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::WatchlistStore;
use crate::error::Result;
use crate::vision::{dominant_color_name, DetectedRegion, FeatureDescriptor, FeatureExtractor};

/// Operator-defined target. Read-only to the matching pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: i64,
    pub label: String,
    pub vehicle_type: Option<String>,
    pub color_name: Option<String>,
    pub model_name: Option<String>,
    pub has_logo: bool,
    pub is_person: bool,
    /// Reference image file name inside the watchlist directory
    pub image_path: Option<String>,
    pub descriptor: Option<FeatureDescriptor>,
    pub created_at: DateTime<Utc>,
}

impl WatchlistEntry {
    /// Bare entry with no categorical hints or stored appearance
    pub fn new(id: i64, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            vehicle_type: None,
            color_name: None,
            model_name: None,
            has_logo: false,
            is_person: false,
            image_path: None,
            descriptor: None,
            created_at: Utc::now(),
        }
    }

    /// Category filter applied before scoring.
    ///
    /// Person entries only match person regions. A declared vehicle type
    /// must be a case-insensitive substring of the region class tag. An
    /// entry with neither matches any recognized vehicle class.
    pub fn is_eligible_for(&self, region: &DetectedRegion) -> bool {
        if self.is_person {
            return region.is_person();
        }
        match self.vehicle_type.as_deref().map(str::trim) {
            Some(vehicle_type) if !vehicle_type.is_empty() => region
                .class_tag
                .to_lowercase()
                .contains(&vehicle_type.to_lowercase()),
            _ => region.is_vehicle(),
        }
    }
}

/// Fields supplied by the operator when adding a target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWatchlistEntry {
    pub label: String,
    pub vehicle_type: Option<String>,
    pub color_name: Option<String>,
    pub model_name: Option<String>,
    pub has_logo: bool,
    pub is_person: bool,
    pub image_path: Option<String>,
    pub descriptor: Option<FeatureDescriptor>,
}

/// Build a watchlist entry from a reference image and persist it.
///
/// The image is copied into `watchlist_dir` unless it already lives
/// there. A missing color is filled in from the image's dominant color.
/// An unreadable image fails this request and nothing is stored.
pub fn enroll(
    store: &dyn WatchlistStore,
    extractor: &FeatureExtractor,
    watchlist_dir: &Path,
    image_path: &Path,
    mut draft: NewWatchlistEntry,
) -> Result<WatchlistEntry> {
    let image = image::open(image_path)?.to_rgb8();

    std::fs::create_dir_all(watchlist_dir)?;
    let file_name = image_path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("{}.jpg", uuid::Uuid::new_v4())));
    let destination = watchlist_dir.join(&file_name);
    if !same_file(image_path, &destination) {
        std::fs::copy(image_path, &destination)?;
    }

    draft.color_name = Some(match draft.color_name.take() {
        Some(color) if !color.trim().is_empty() => color.trim().to_lowercase(),
        _ => dominant_color_name(&image).to_string(),
    });
    draft.descriptor = Some(extractor.extract(&image));
    draft.image_path = Some(file_name.to_string_lossy().into_owned());

    let entry = store.insert(draft)?;
    info!(entry_id = entry.id, color = ?entry.color_name, "Added to watchlist: {}", entry.label);
    Ok(entry)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
