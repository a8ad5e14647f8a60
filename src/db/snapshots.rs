// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Detection snapshots written to disk

use std::path::{Path, PathBuf};

use tracing::debug;

use super::SnapshotSink;
use crate::error::Result;
use crate::vision::{BoundingBox, Frame};

/// Writes cropped regions under a base directory, format chosen by extension
#[derive(Debug, Clone)]
pub struct DiskSnapshotSink {
    base_dir: PathBuf,
}

impl DiskSnapshotSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl SnapshotSink for DiskSnapshotSink {
    fn save(&self, frame: &Frame, bbox: &BoundingBox, name: &str) -> Result<Option<PathBuf>> {
        if bbox.is_empty() || !bbox.fits_within(frame.width(), frame.height()) {
            debug!("Skipping snapshot {} for out-of-frame box {:?}", name, bbox);
            return Ok(None);
        }

        let path = self.base_dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        bbox.crop(frame).save(&path)?;
        debug!("Snapshot written to {:?}", path);
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_saves_crop_and_creates_directories() {
        let dir = std::env::temp_dir().join(format!("vigil-snap-{}", uuid::Uuid::new_v4()));
        let sink = DiskSnapshotSink::new(dir.join("nested"));
        let frame = Frame::from_pixel(40, 30, Rgb([10, 20, 30]));

        let path = sink
            .save(&frame, &BoundingBox::new(5, 5, 25, 15), "snap.png")
            .unwrap()
            .unwrap();
        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (20, 10));
        assert_eq!(saved.get_pixel(0, 0), &Rgb([10, 20, 30]));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_crop_is_skipped() {
        let dir = std::env::temp_dir().join(format!("vigil-snap-{}", uuid::Uuid::new_v4()));
        let sink = DiskSnapshotSink::new(&dir);
        let frame = Frame::new(10, 10);
        assert!(sink.save(&frame, &BoundingBox::new(3, 3, 3, 8), "empty.jpg").unwrap().is_none());
        assert!(!dir.exists());
    }
}
