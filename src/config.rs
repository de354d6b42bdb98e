use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::SourceSettings;
use crate::{SourceSpec, PERSON_CLASS_ID};

const DEFAULT_SOURCE: &str = "stub://lobby";
const DEFAULT_FPS: u32 = 10;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FRAMES: u32 = 10;
const DEFAULT_INTERVAL_MS: u64 = 100;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_MODEL_INPUT: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    source: Option<SourceFile>,
    detector: Option<DetectorFile>,
    sampling: Option<SamplingFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceFile {
    spec: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorFile {
    backend: Option<String>,
    model: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    min_confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingFile {
    frames: Option<u32>,
    target_class: Option<u32>,
    interval_ms: Option<u64>,
}

/// Which detector backend drives the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Tract,
}

impl BackendKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "stub" => Ok(Self::Stub),
            "tract" => Ok(Self::Tract),
            other => Err(anyhow!(
                "unknown detector backend '{}': expected 'stub' or 'tract'",
                other
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stub => "stub",
            Self::Tract => "tract",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    /// ONNX model path; required by the tract backend.
    pub model: Option<PathBuf>,
    /// Model input resolution; frames are captured at this size for tract.
    pub input_width: u32,
    pub input_height: u32,
    pub min_confidence: f32,
    pub iou: f32,
}

#[derive(Clone, Debug)]
pub struct SamplingSettings {
    pub frames: u32,
    pub target_class: u32,
    pub interval: Duration,
}

/// Layered runtime configuration: TOML file (named by `CROWDWATCH_CONFIG`),
/// then environment overrides, then validation.
#[derive(Clone, Debug)]
pub struct CrowdwatchConfig {
    pub source: SourceSpec,
    pub capture: SourceSettings,
    pub detector: DetectorSettings,
    pub sampling: SamplingSettings,
}

impl CrowdwatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROWDWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        let source_spec = file
            .source
            .as_ref()
            .and_then(|source| source.spec.clone())
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let capture = SourceSettings {
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_HEIGHT),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_FPS),
        };
        let detector = DetectorSettings {
            backend: match file.detector.as_ref().and_then(|d| d.backend.as_deref()) {
                Some(name) => BackendKind::parse(name)?,
                None => BackendKind::Stub,
            },
            model: file.detector.as_ref().and_then(|d| d.model.clone()),
            input_width: file
                .detector
                .as_ref()
                .and_then(|d| d.input_width)
                .unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: file
                .detector
                .as_ref()
                .and_then(|d| d.input_height)
                .unwrap_or(DEFAULT_MODEL_INPUT),
            min_confidence: file
                .detector
                .as_ref()
                .and_then(|d| d.min_confidence)
                .unwrap_or(DEFAULT_MIN_CONFIDENCE),
            iou: file
                .detector
                .as_ref()
                .and_then(|d| d.iou)
                .unwrap_or(DEFAULT_IOU),
        };
        let sampling = SamplingSettings {
            frames: file
                .sampling
                .as_ref()
                .and_then(|s| s.frames)
                .unwrap_or(DEFAULT_FRAMES),
            target_class: file
                .sampling
                .as_ref()
                .and_then(|s| s.target_class)
                .unwrap_or(PERSON_CLASS_ID),
            interval: Duration::from_millis(
                file.sampling
                    .and_then(|s| s.interval_ms)
                    .unwrap_or(DEFAULT_INTERVAL_MS),
            ),
        };
        Ok(Self {
            source: SourceSpec::parse(&source_spec)?,
            capture,
            detector,
            sampling,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(spec) = std::env::var("CROWDWATCH_SOURCE") {
            if !spec.trim().is_empty() {
                self.source = SourceSpec::parse(&spec)?;
            }
        }
        if let Ok(backend) = std::env::var("CROWDWATCH_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = BackendKind::parse(backend.trim())?;
            }
        }
        if let Ok(model) = std::env::var("CROWDWATCH_MODEL") {
            if !model.trim().is_empty() {
                self.detector.model = Some(PathBuf::from(model));
            }
        }
        if let Ok(frames) = std::env::var("CROWDWATCH_FRAMES") {
            self.sampling.frames = frames
                .parse()
                .map_err(|_| anyhow!("CROWDWATCH_FRAMES must be an integer frame count"))?;
        }
        if let Ok(confidence) = std::env::var("CROWDWATCH_MIN_CONFIDENCE") {
            self.detector.min_confidence = confidence
                .parse()
                .map_err(|_| anyhow!("CROWDWATCH_MIN_CONFIDENCE must be a number in 0..=1"))?;
        }
        if let Ok(interval) = std::env::var("CROWDWATCH_INTERVAL_MS") {
            let ms: u64 = interval
                .parse()
                .map_err(|_| anyhow!("CROWDWATCH_INTERVAL_MS must be milliseconds"))?;
            self.sampling.interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.sampling.frames == 0 {
            return Err(anyhow!("sampling.frames must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(anyhow!("detector.min_confidence must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.detector.iou) {
            return Err(anyhow!("detector.iou must be within 0..=1"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("source dimensions must be nonzero"));
        }
        if self.detector.backend == BackendKind::Tract {
            if self.detector.model.is_none() {
                return Err(anyhow!("the tract backend requires detector.model"));
            }
            // The tract backend rejects frames that do not match the model
            // input; capture directly at that resolution.
            self.capture.width = self.detector.input_width;
            self.capture.height = self.detector.input_height;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
