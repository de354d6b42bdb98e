use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;
use crate::PERSON_CLASS_ID;

/// Stub backend for running the pipeline without a model.
///
/// Derives a deterministic pseudo-count (0..=4 person boxes) from a pixel
/// content hash, so identical frames always produce identical detections.
pub struct StubBackend {
    frames_seen: u64,
}

impl StubBackend {
    pub const MAX_SYNTHETIC_DETECTIONS: usize = 4;

    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        self.frames_seen += 1;

        let hash: [u8; 32] = Sha256::digest(frame.pixels()).into();
        let count = (hash[0] as usize) % (Self::MAX_SYNTHETIC_DETECTIONS + 1);

        let mut detections = Vec::with_capacity(count);
        for i in 0..count {
            // Two hash bytes per box position, two more for extent.
            let bx = hash[1 + i * 4] as f32 / 255.0;
            let by = hash[2 + i * 4] as f32 / 255.0;
            let bw = 0.05 + (hash[3 + i * 4] as f32 / 255.0) * 0.2;
            let bh = 0.1 + (hash[4 + i * 4] as f32 / 255.0) * 0.3;

            let w = bw.min(1.0);
            let h = bh.min(1.0);
            detections.push(Detection {
                x: (bx * (1.0 - w)).clamp(0.0, 1.0),
                y: (by * (1.0 - h)).clamp(0.0, 1.0),
                w,
                h,
                confidence: 0.6 + (hash[5 + i * 4] as f32 / 255.0) * 0.39,
                class_id: PERSON_CLASS_ID,
            });
        }

        Ok(DetectionResult { detections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(value: u8) -> Frame {
        Frame::new(vec![value; 8 * 8 * 3], 8, 8, 0).unwrap()
    }

    #[test]
    fn identical_frames_produce_identical_detections() {
        let mut backend = StubBackend::new();
        let a = backend.detect(&gray_frame(42)).unwrap();
        let b = backend.detect(&gray_frame(42)).unwrap();
        assert_eq!(a.detections.len(), b.detections.len());
    }

    #[test]
    fn detections_are_person_boxes_in_bounds() {
        let mut backend = StubBackend::new();
        for value in 0u8..16 {
            let result = backend.detect(&gray_frame(value)).unwrap();
            assert!(result.detections.len() <= StubBackend::MAX_SYNTHETIC_DETECTIONS);
            for det in &result.detections {
                assert_eq!(det.class_id, PERSON_CLASS_ID);
                assert!(det.x >= 0.0 && det.x + det.w <= 1.0 + f32::EPSILON);
                assert!(det.y >= 0.0 && det.y + det.h <= 1.0 + f32::EPSILON);
                assert!((0.0..=1.0).contains(&det.confidence));
            }
        }
    }

    #[test]
    fn varying_content_varies_counts() {
        let mut backend = StubBackend::new();
        let counts: Vec<usize> = (0u8..32)
            .map(|v| backend.detect(&gray_frame(v)).unwrap().detections.len())
            .collect();
        // Hash-derived counts are spread over 0..=4; a constant run over 32
        // distinct frames would mean the derivation is broken.
        assert!(counts.iter().any(|&c| c != counts[0]));
    }
}
