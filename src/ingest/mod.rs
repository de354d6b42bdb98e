//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - Still-image directories (feature: ingest-image)
//! - Stub source (always available)
//!
//! Ingestion is local-only. All sources produce `Frame` instances that flow
//! into the sampling loop. The ingestion layer is responsible for:
//! - Capturing frames in-memory at the configured resolution
//! - Normalizing pixel formats to tightly packed RGB8
//! - Tracking capture counts and health
//!
//! The ingestion layer MUST NOT:
//! - Store captured frames to disk
//! - Fetch remote URLs

use anyhow::Result;

#[cfg(feature = "ingest-image")]
pub mod file;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod stub;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

#[cfg(feature = "ingest-image")]
pub use file::ImageDirSource;
pub use stub::{StubConfig, StubSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

use crate::frame::Frame;
use crate::SourceSpec;

/// A source of captured frames.
///
/// `next_frame` blocks until a frame is available and fails when the source
/// is exhausted or unavailable; a failure ends the sampling window.
pub trait FrameSource {
    /// Open the underlying device/path. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub origin: String,
}

/// Capture settings shared by all source kinds.
#[derive(Clone, Debug)]
pub struct SourceSettings {
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate hint (frames per second).
    pub target_fps: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

/// Open the frame source described by `spec`.
///
/// Selecting a source whose backing feature is compiled out is an error
/// naming the feature.
pub fn open_source(spec: &SourceSpec, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    match spec {
        SourceSpec::Stub { scene } => Ok(Box::new(StubSource::new(StubConfig {
            scene: scene.clone(),
            width: settings.width,
            height: settings.height,
            sensor_noise: true,
        }))),
        SourceSpec::V4l2 { device } => {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Box::new(V4l2Source::new(V4l2Config {
                    device: device.clone(),
                    target_fps: settings.target_fps,
                    width: settings.width,
                    height: settings.height,
                })?))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                let _ = device;
                Err(anyhow::anyhow!(
                    "v4l2 ingestion requires the ingest-v4l2 feature"
                ))
            }
        }
        SourceSpec::File { path } => {
            #[cfg(feature = "ingest-image")]
            {
                Ok(Box::new(ImageDirSource::new(path.clone())?))
            }
            #[cfg(not(feature = "ingest-image"))]
            {
                let _ = path;
                Err(anyhow::anyhow!(
                    "file ingestion requires the ingest-image feature"
                ))
            }
        }
    }
}
