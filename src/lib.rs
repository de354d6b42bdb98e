//! crowdwatch
//!
//! Samples a bounded window of frames from a camera (or file/stub) source,
//! runs a person detector on each frame, and reports the per-window average
//! crowd level.
//!
//! # Module Structure
//!
//! - `frame`: captured RGB frames (Frame)
//! - `ingest`: frame sources (V4L2 devices, still-image directories, stubs)
//! - `detect`: detector backends (tract ONNX, stub) and the backend registry
//! - `sampler`: the bounded sampling loop producing a CrowdReport
//! - `config`: layered TOML/env configuration
//!
//! Frame ingestion is local-only: no URL schemes besides `stub://` are
//! accepted, and sources never write frames to disk.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod sampler;

pub use detect::{
    BackendRegistry, Detection, DetectionCapability, DetectionResult, DetectorBackend, StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::Frame;
#[cfg(feature = "ingest-image")]
pub use ingest::ImageDirSource;
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Source;
pub use ingest::{open_source, FrameSource, SourceSettings, SourceStats, StubSource};
pub use sampler::{sample_window, SamplerConfig};

/// Class id of the "person" entry in the detector label set.
///
/// COCO-trained YOLO exports put "person" at index 0; the crowd count is the
/// number of detections of this class per frame.
pub const PERSON_CLASS_ID: u32 = 0;

// -------------------- Source Specs --------------------

/// Parsed description of a frame origin.
///
/// Accepted forms:
/// - `stub://<scene>` with `<scene>` in `[a-z0-9_-]{1,64}`
/// - `v4l2:<device>` or a bare `/dev/videoN` path
/// - `file:<path>` naming a directory of still images
///
/// Anything else is rejected. Remote URL schemes in particular are not
/// frame origins; ingestion is local-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Stub { scene: String },
    V4l2 { device: String },
    File { path: String },
}

impl SourceSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(anyhow!("source spec must not be empty"));
        }

        if let Some(scene) = spec.strip_prefix("stub://") {
            validate_stub_scene(scene)?;
            return Ok(SourceSpec::Stub {
                scene: scene.to_string(),
            });
        }

        if let Some(device) = spec.strip_prefix("v4l2:") {
            validate_device_path(device)?;
            return Ok(SourceSpec::V4l2 {
                device: device.to_string(),
            });
        }

        if let Some(path) = spec.strip_prefix("file:") {
            if path.trim().is_empty() {
                return Err(anyhow!("file source spec has an empty path"));
            }
            if path.contains("://") {
                return Err(anyhow!("file sources only accept local paths (no URL schemes)"));
            }
            return Ok(SourceSpec::File {
                path: path.to_string(),
            });
        }

        // Bare device-node shorthand for the common case.
        if spec.starts_with("/dev/") {
            validate_device_path(spec)?;
            return Ok(SourceSpec::V4l2 {
                device: spec.to_string(),
            });
        }

        Err(anyhow!(
            "unrecognized source spec '{}': expected stub://<scene>, v4l2:<device>, or file:<path>",
            spec
        ))
    }

    /// Human-readable origin label for logs and reports.
    pub fn origin(&self) -> String {
        match self {
            SourceSpec::Stub { scene } => format!("stub://{}", scene),
            SourceSpec::V4l2 { device } => device.clone(),
            SourceSpec::File { path } => path.clone(),
        }
    }
}

/// Stub scene names are local identifiers, not paths.
/// Enforced as a positive allowlist to keep specs unambiguous.
fn validate_stub_scene(scene: &str) -> Result<()> {
    // Compile once for hot paths.
    static SCENE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = SCENE_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9_-]{1,64}$").unwrap());

    if !re.is_match(scene) {
        return Err(anyhow!(
            "stub scene must match ^[a-z0-9_-]{{1,64}}$, got '{}'",
            scene
        ));
    }
    Ok(())
}

/// V4L2 capture nodes only; rejects arbitrary device files.
fn validate_device_path(device: &str) -> Result<()> {
    static DEVICE_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = DEVICE_RE.get_or_init(|| regex::Regex::new(r"^/dev/video[0-9]+$").unwrap());

    if !re.is_match(device) {
        return Err(anyhow!(
            "v4l2 device must match ^/dev/video[0-9]+$, got '{}'",
            device
        ));
    }
    Ok(())
}

// -------------------- Window Aggregation --------------------

/// Aggregate statistics over the per-frame counts of one sampling window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub min: u32,
    pub max: u32,
}

impl WindowStats {
    /// Returns `None` for an empty window; the mean of zero frames is
    /// undefined and must not surface as NaN.
    pub fn from_counts(counts: &[u32]) -> Option<Self> {
        let min = *counts.iter().min()?;
        let max = *counts.iter().max()?;
        let sum: u64 = counts.iter().map(|&c| c as u64).sum();
        let mean = sum as f64 / counts.len() as f64;
        Some(Self { mean, min, max })
    }
}

/// Summary of one sampling run.
///
/// `sampled_frames` can fall short of `requested_frames` when the source
/// fails mid-window or the run is interrupted; the partial window is still
/// reported.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrowdReport {
    pub origin: String,
    pub backend: String,
    pub target_class: u32,
    pub requested_frames: u32,
    pub sampled_frames: u32,
    pub counts: Vec<u32>,
    pub stats: WindowStats,
    pub cut_short: bool,
}

// -------------------- Tests --------------------
