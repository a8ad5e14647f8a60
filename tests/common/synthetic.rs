use image::Rgb;
use vigil::vision::{BoundingBox, DetectionModel, Frame, RawDetection};
use vigil::Result;

/// Flat background with one striped rectangle.
pub fn scene(width: u32, height: u32, target: BoundingBox, color: [u8; 3]) -> Frame {
    assert!(target.fits_within(width, height), "target must lie inside the frame");

    let mut frame = Frame::from_pixel(width, height, Rgb([90, 110, 90]));
    for y in target.y1..target.y2 {
        for x in target.x1..target.x2 {
            let stripe = ((x - target.x1) / 6) % 2 == 0;
            let pixel = if stripe { color } else { [color[0] / 2, color[1] / 2, color[2] / 2] };
            frame.put_pixel(x, y, Rgb(pixel));
        }
    }
    frame
}

/// Detection model that reports the same boxes for every frame.
pub struct ScriptedModel {
    pub classes: Vec<&'static str>,
    pub detections: Vec<RawDetection>,
}

impl ScriptedModel {
    pub fn single(class: &'static str, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            classes: vec![class],
            detections: vec![RawDetection {
                class_id: 0,
                confidence,
                bbox: [bbox.x1 as f32, bbox.y1 as f32, bbox.x2 as f32, bbox.y2 as f32],
            }],
        }
    }
}

impl DetectionModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn infer(&self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }

    fn class_name(&self, class_id: usize) -> String {
        self.classes.get(class_id).copied().unwrap_or("other").to_string()
    }
}

/// Unique scratch directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("vigil-{tag}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}
