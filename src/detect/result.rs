use serde::{Deserialize, Serialize};

/// One detected object.
///
/// Coordinates are normalized to 0..1 of the frame, `(x, y)` being the
/// top-left corner of the box.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_id: u32,
}

/// Result of running detection on one frame.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    /// Number of detections of `class_id` at or above the confidence floor.
    pub fn count_class(&self, class_id: u32, min_confidence: f32) -> u32 {
        self.detections
            .iter()
            .filter(|d| d.class_id == class_id && d.confidence >= min_confidence)
            .count() as u32
    }
}
