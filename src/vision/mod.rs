// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/vigil

//! Vision module - detection, appearance features and watchlist matching

mod detector;
mod features;
mod matcher;
mod similarity;

pub use detector::*;
pub use features::*;
pub use matcher::*;
pub use similarity::*;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A decoded 8-bit RGB frame
pub type Frame = RgbImage;

/// Detector classes treated as vehicles
pub const VEHICLE_CLASSES: &[&str] = &["car", "motorcycle", "bus", "truck", "train"];

/// Detector classes treated as persons
pub const PERSON_CLASSES: &[&str] = &["person"];

/// Label and class tag of degraded-mode regions
pub const UNKNOWN_CLASS: &str = "unknown";

/// Returns true if the class tag is a recognized vehicle class
pub fn is_vehicle_class(class_tag: &str) -> bool {
    VEHICLE_CLASSES.contains(&class_tag)
}

/// Returns true if the class tag is a person class
pub fn is_person_class(class_tag: &str) -> bool {
    PERSON_CLASSES.contains(&class_tag)
}

/// Axis-aligned box in pixel coordinates, half-open on the far edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Clamp raw model coordinates to a `width` x `height` frame.
    ///
    /// Coordinates are floored; non-finite values collapse to zero.
    pub fn clamped(raw: [f32; 4], width: u32, height: u32) -> Self {
        let clamp = |v: f32, max: u32| -> u32 {
            if !v.is_finite() || v <= 0.0 {
                0
            } else {
                (v.floor() as u64).min(max as u64) as u32
            }
        };
        Self {
            x1: clamp(raw[0], width),
            y1: clamp(raw[1], height),
            x2: clamp(raw[2], width),
            y2: clamp(raw[3], height),
        }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// True if the box has positive area and lies inside the frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty() && self.x2 <= width && self.y2 <= height
    }

    /// Copy the pixels under this box out of `frame`
    pub fn crop(&self, frame: &Frame) -> Frame {
        let x = self.x1.min(frame.width());
        let y = self.y1.min(frame.height());
        let w = self.width().min(frame.width() - x);
        let h = self.height().min(frame.height() - y);
        image::imageops::crop_imm(frame, x, y, w, h).to_image()
    }

    pub fn as_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// A labeled region produced by the detector for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub class_tag: String,
}

impl DetectedRegion {
    pub fn is_person(&self) -> bool {
        is_person_class(&self.class_tag)
    }

    pub fn is_vehicle(&self) -> bool {
        is_vehicle_class(&self.class_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_frame() {
        let bbox = BoundingBox::clamped([-12.5, 10.7, 700.0, 500.0], 640, 480);
        assert_eq!(bbox, BoundingBox::new(0, 10, 640, 480));
        assert!(bbox.fits_within(640, 480));
    }

    #[test]
    fn test_inverted_box_is_empty() {
        let bbox = BoundingBox::clamped([300.0, 200.0, 100.0, 250.0], 640, 480);
        assert!(bbox.is_empty());
        assert!(!bbox.fits_within(640, 480));
    }

    #[test]
    fn test_crop_dimensions() {
        let frame = Frame::from_pixel(64, 48, image::Rgb([10, 20, 30]));
        let crop = BoundingBox::new(8, 4, 40, 36).crop(&frame);
        assert_eq!(crop.dimensions(), (32, 32));
        assert_eq!(crop.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_class_sets() {
        assert!(is_vehicle_class("truck"));
        assert!(!is_vehicle_class("person"));
        assert!(is_person_class("person"));
        assert!(!is_person_class(UNKNOWN_CLASS));
    }
}
