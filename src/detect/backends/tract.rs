#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Tract-based backend for YOLO ONNX inference.
///
/// Loads a local model file and runs object detection on RGB frames. The
/// model input is pinned to `1x3xHxW`; frames must already be captured at
/// that resolution (resizing is the ingest layer's concern). No network I/O,
/// no disk access beyond model loading.
pub struct TractBackend {
    model: TypedSimplePlan<TypedModel>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Override the default NMS IoU threshold.
    pub fn with_iou(mut self, iou: f32) -> Self {
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }

        let pixels = frame.pixels();
        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::ObjectDetection | DetectionCapability::Classification
        )
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("expected a 1x(4+nc)xN output head")?;

        let candidates = decode_predictions(
            view,
            self.width as f32,
            self.height as f32,
            self.confidence_threshold,
        )?;
        let detections = non_max_suppression(candidates, self.iou_threshold);

        Ok(DetectionResult { detections })
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::new(
            vec![0u8; self.width as usize * self.height as usize * 3],
            self.width,
            self.height,
            0,
        )?;
        self.detect(&blank).map(|_| ())
    }
}

/// Decode a YOLO `1 x (4 + nc) x anchors` output head.
///
/// Boxes arrive center-based in model pixel space with per-class scores
/// already in 0..1. Keeps the best class per anchor at or above the
/// confidence threshold, converts to normalized corner boxes.
fn decode_predictions(
    view: tract_ndarray::ArrayView3<f32>,
    input_w: f32,
    input_h: f32,
    confidence_threshold: f32,
) -> Result<Vec<Detection>> {
    let (_, attrs, anchors) = view.dim();
    if attrs < 5 {
        return Err(anyhow!(
            "output head has {} attributes per anchor, expected at least 5",
            attrs
        ));
    }

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for class in 4..attrs {
            let score = view[[0, class, anchor]];
            if score > best_score {
                best_score = score;
                best_class = class - 4;
            }
        }
        if !best_score.is_finite() || best_score < confidence_threshold {
            continue;
        }

        let cx = view[[0, 0, anchor]];
        let cy = view[[0, 1, anchor]];
        let w = view[[0, 2, anchor]];
        let h = view[[0, 3, anchor]];

        let x = ((cx - w / 2.0) / input_w).clamp(0.0, 1.0);
        let y = ((cy - h / 2.0) / input_h).clamp(0.0, 1.0);
        let w = (w / input_w).clamp(0.0, 1.0 - x);
        let h = (h / input_h).clamp(0.0, 1.0 - y);

        detections.push(Detection {
            x,
            y,
            w,
            h,
            confidence: best_score.clamp(0.0, 1.0),
            class_id: best_class as u32,
        });
    }

    Ok(detections)
}

/// Greedy per-class non-maximum suppression.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.w).min(b.x + b.w);
    let y2 = (a.y + a.h).min(b.y + b.h);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.w * a.h + b.w * b.h - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, confidence: f32, class_id: u32) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            confidence,
            class_id,
        }
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = det(0.0, 0.0, 0.2, 0.2, 0.9, 0);
        let b = det(0.5, 0.5, 0.2, 0.2, 0.9, 0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = det(0.1, 0.1, 0.3, 0.3, 0.9, 0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlapping_same_class_boxes() {
        let kept = non_max_suppression(
            vec![
                det(0.10, 0.10, 0.30, 0.30, 0.95, 0),
                det(0.11, 0.11, 0.30, 0.30, 0.80, 0),
                det(0.60, 0.60, 0.20, 0.20, 0.70, 0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.95);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_different_classes() {
        let kept = non_max_suppression(
            vec![
                det(0.10, 0.10, 0.30, 0.30, 0.95, 0),
                det(0.11, 0.11, 0.30, 0.30, 0.80, 2),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn decodes_anchors_above_threshold() {
        // 2 anchors, 4 box attrs + 2 classes, 640x640 model space.
        let mut grid = tract_ndarray::Array3::<f32>::zeros((1, 6, 2));
        // Anchor 0: a confident person at the frame center.
        grid[[0, 0, 0]] = 320.0;
        grid[[0, 1, 0]] = 320.0;
        grid[[0, 2, 0]] = 64.0;
        grid[[0, 3, 0]] = 128.0;
        grid[[0, 4, 0]] = 0.9;
        // Anchor 1: below threshold.
        grid[[0, 4, 1]] = 0.2;

        let decoded = decode_predictions(grid.view(), 640.0, 640.0, 0.5).unwrap();
        assert_eq!(decoded.len(), 1);
        let d = &decoded[0];
        assert_eq!(d.class_id, 0);
        assert!((d.x - (320.0 - 32.0) / 640.0).abs() < 1e-6);
        assert!((d.w - 0.1).abs() < 1e-6);
        assert!((d.h - 0.2).abs() < 1e-6);
        assert_eq!(d.confidence, 0.9);
    }

    #[test]
    fn decode_rejects_headless_output() {
        let grid = tract_ndarray::Array3::<f32>::zeros((1, 4, 8));
        assert!(decode_predictions(grid.view(), 640.0, 640.0, 0.5).is_err());
    }
}
