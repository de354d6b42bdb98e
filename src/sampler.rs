//! Bounded sampling windows.
//!
//! The sampler drives one window: capture up to a fixed number of frames
//! from a source, run the object detector on each, count detections of the
//! target class, and aggregate the counts into a `CrowdReport`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::{BackendRegistry, DetectionCapability};
use crate::ingest::FrameSource;
use crate::{CrowdReport, WindowStats, PERSON_CLASS_ID};

/// Configuration for one sampling window.
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    /// Number of frames to sample.
    pub frames: u32,
    /// Class id whose detections are counted.
    pub target_class: u32,
    /// Confidence floor for counting a detection.
    pub min_confidence: f32,
    /// Pause between captures.
    pub interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frames: 10,
            target_class: PERSON_CLASS_ID,
            min_confidence: 0.5,
            interval: Duration::from_millis(100),
        }
    }
}

/// Run one sampling window.
///
/// A capture failure ends the window early; the partial window is still
/// reported. Setting `stop` (e.g. from a Ctrl-C handler) ends the window
/// between frames. Zero sampled frames is an error: the mean of an empty
/// window is undefined.
pub fn sample_window(
    source: &mut dyn FrameSource,
    registry: &BackendRegistry,
    cfg: &SamplerConfig,
    stop: &AtomicBool,
) -> Result<CrowdReport> {
    if cfg.frames == 0 {
        return Err(anyhow!("sampling window must request at least one frame"));
    }

    let backend_name = registry
        .default_name()
        .unwrap_or("unregistered")
        .to_string();

    let mut counts: Vec<u32> = Vec::with_capacity(cfg.frames as usize);
    let mut cut_short = false;
    let mut last_digest: Option<[u8; 32]> = None;

    for i in 0..cfg.frames {
        if stop.load(Ordering::SeqCst) {
            log::info!("sampling interrupted after {} frames", counts.len());
            cut_short = true;
            break;
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                // A failed read ends the window; the frames already sampled
                // still count.
                log::warn!("capture failed after {} frames: {}", counts.len(), err);
                cut_short = true;
                break;
            }
        };

        let digest = frame.digest();
        if last_digest == Some(digest) {
            log::warn!(
                "source delivered identical consecutive frames at seq {}; capture may be stalled",
                frame.seq
            );
        }
        last_digest = Some(digest);

        let result = registry.detect_with_capability(DetectionCapability::ObjectDetection, &frame)?;
        let count = result.count_class(cfg.target_class, cfg.min_confidence);
        log::debug!(
            "frame {}/{}: seq={} detections={} counted={}",
            i + 1,
            cfg.frames,
            frame.seq,
            result.detections.len(),
            count
        );
        counts.push(count);

        // No pause after the final capture.
        if i + 1 < cfg.frames && !cfg.interval.is_zero() {
            std::thread::sleep(cfg.interval);
        }
    }

    let stats = WindowStats::from_counts(&counts)
        .ok_or_else(|| anyhow!("no frames sampled from {}", source.stats().origin))?;

    let source_stats = source.stats();
    Ok(CrowdReport {
        origin: source_stats.origin,
        backend: backend_name,
        target_class: cfg.target_class,
        requested_frames: cfg.frames,
        sampled_frames: counts.len() as u32,
        counts,
        stats,
        cut_short,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::frame::Frame;
    use crate::ingest::{SourceStats, StubConfig, StubSource};

    fn test_registry() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        registry
    }

    fn quick_config(frames: u32) -> SamplerConfig {
        SamplerConfig {
            frames,
            interval: Duration::ZERO,
            min_confidence: 0.0,
            ..SamplerConfig::default()
        }
    }

    /// Source that fails after a fixed number of frames.
    struct FlakySource {
        healthy_frames: u64,
        delivered: u64,
    }

    impl FrameSource for FlakySource {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame> {
            if self.delivered >= self.healthy_frames {
                return Err(anyhow!("device went away"));
            }
            self.delivered += 1;
            Frame::new(
                vec![self.delivered as u8; 4 * 4 * 3],
                4,
                4,
                self.delivered,
            )
        }

        fn is_healthy(&self) -> bool {
            self.delivered < self.healthy_frames
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.delivered,
                origin: "flaky".to_string(),
            }
        }
    }

    #[test]
    fn samples_a_full_window() -> Result<()> {
        let mut source = StubSource::new(StubConfig {
            width: 32,
            height: 32,
            ..StubConfig::default()
        });
        source.connect()?;
        let registry = test_registry();
        let stop = AtomicBool::new(false);

        let report = sample_window(&mut source, &registry, &quick_config(5), &stop)?;

        assert_eq!(report.requested_frames, 5);
        assert_eq!(report.sampled_frames, 5);
        assert_eq!(report.counts.len(), 5);
        assert!(!report.cut_short);
        assert_eq!(report.backend, "stub");

        let expected_mean =
            report.counts.iter().map(|&c| c as u64).sum::<u64>() as f64 / 5.0;
        assert_eq!(report.stats.mean, expected_mean);
        assert!(report.stats.mean >= report.stats.min as f64);
        assert!(report.stats.mean <= report.stats.max as f64);

        Ok(())
    }

    #[test]
    fn capture_failure_ends_window_early() -> Result<()> {
        let mut source = FlakySource {
            healthy_frames: 3,
            delivered: 0,
        };
        let registry = test_registry();
        let stop = AtomicBool::new(false);

        let report = sample_window(&mut source, &registry, &quick_config(10), &stop)?;

        assert_eq!(report.requested_frames, 10);
        assert_eq!(report.sampled_frames, 3);
        assert!(report.cut_short);

        Ok(())
    }

    #[test]
    fn immediate_failure_is_an_error() {
        let mut source = FlakySource {
            healthy_frames: 0,
            delivered: 0,
        };
        let registry = test_registry();
        let stop = AtomicBool::new(false);

        assert!(sample_window(&mut source, &registry, &quick_config(10), &stop).is_err());
    }

    #[test]
    fn stop_flag_ends_window_before_first_frame() {
        let mut source = FlakySource {
            healthy_frames: 10,
            delivered: 0,
        };
        let registry = test_registry();
        let stop = AtomicBool::new(true);

        // Interrupted before anything was sampled: empty window, so an error.
        assert!(sample_window(&mut source, &registry, &quick_config(10), &stop).is_err());
    }

    #[test]
    fn zero_frame_window_is_rejected() {
        let mut source = FlakySource {
            healthy_frames: 10,
            delivered: 0,
        };
        let registry = test_registry();
        let stop = AtomicBool::new(false);

        assert!(sample_window(&mut source, &registry, &quick_config(0), &stop).is_err());
    }
}
