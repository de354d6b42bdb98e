//! crowdwatch - bounded crowd-level sampling
//!
//! One invocation:
//! 1. Opens the configured frame source (V4L2 device, image directory, stub)
//! 2. Samples a fixed window of frames
//! 3. Runs the person detector on each frame and counts the target class
//! 4. Prints the per-window average crowd level
//!
//! Diagnostics go to stderr via `env_logger`; stdout carries only the result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crowdwatch::config::{BackendKind, CrowdwatchConfig};
use crowdwatch::{
    open_source, sample_window, BackendRegistry, SamplerConfig, SourceSpec, StubBackend,
};

#[derive(Parser, Debug)]
#[command(name = "crowdwatch", about = "Sample a camera window and report the average crowd level")]
struct Args {
    /// Frame origin: stub://<scene>, v4l2:<device>, or file:<dir>
    #[arg(long, env = "CROWDWATCH_SOURCE")]
    source: Option<String>,

    /// Number of frames to sample
    #[arg(long)]
    frames: Option<u32>,

    /// Detector backend ("stub" or "tract")
    #[arg(long)]
    backend: Option<String>,

    /// ONNX model path (tract backend)
    #[arg(long)]
    model: Option<std::path::PathBuf>,

    /// Class id to count (0 = person)
    #[arg(long)]
    class: Option<u32>,

    /// Confidence floor for counting a detection
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Pause between captures, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Print the full report as JSON instead of the single-line mean
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = CrowdwatchConfig::load()?;
    apply_args(&mut cfg, &args)?;

    let registry = build_registry(&cfg)?;

    let mut source = open_source(&cfg.source, &cfg.capture)?;
    source.connect().with_context(|| {
        format!("failed to open frame source {}", cfg.source.origin())
    })?;

    // Ctrl-C requests a graceful stop; the partial window is still reported.
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .context("failed to install interrupt handler")?;

    let sampler_cfg = SamplerConfig {
        frames: cfg.sampling.frames,
        target_class: cfg.sampling.target_class,
        min_confidence: cfg.detector.min_confidence,
        interval: cfg.sampling.interval,
    };

    log::info!(
        "sampling {} frames from {} (backend={}, class={})",
        sampler_cfg.frames,
        cfg.source.origin(),
        cfg.detector.backend.name(),
        sampler_cfg.target_class
    );

    let report = sample_window(source.as_mut(), &registry, &sampler_cfg, &stop)?;

    log::info!(
        "sampled {}/{} frames from {} (healthy={})",
        report.sampled_frames,
        report.requested_frames,
        report.origin,
        source.is_healthy()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{:.2}", report.stats.mean);
    }

    Ok(())
}

fn apply_args(cfg: &mut CrowdwatchConfig, args: &Args) -> Result<()> {
    if let Some(spec) = &args.source {
        cfg.source = SourceSpec::parse(spec)?;
    }
    if let Some(frames) = args.frames {
        anyhow::ensure!(frames > 0, "--frames must be at least 1");
        cfg.sampling.frames = frames;
    }
    if let Some(backend) = &args.backend {
        cfg.detector.backend = BackendKind::parse(backend)?;
    }
    if let Some(model) = &args.model {
        cfg.detector.model = Some(model.clone());
    }
    if let Some(class) = args.class {
        cfg.sampling.target_class = class;
    }
    if let Some(confidence) = args.min_confidence {
        anyhow::ensure!(
            (0.0..=1.0).contains(&confidence),
            "--min-confidence must be within 0..=1"
        );
        cfg.detector.min_confidence = confidence;
    }
    if let Some(ms) = args.interval_ms {
        cfg.sampling.interval = Duration::from_millis(ms);
    }
    if cfg.detector.backend == BackendKind::Tract {
        anyhow::ensure!(
            cfg.detector.model.is_some(),
            "the tract backend requires --model"
        );
        cfg.capture.width = cfg.detector.input_width;
        cfg.capture.height = cfg.detector.input_height;
    }
    Ok(())
}

fn build_registry(cfg: &CrowdwatchConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();

    match cfg.detector.backend {
        BackendKind::Stub => {
            registry.register(StubBackend::new());
        }
        BackendKind::Tract => {
            #[cfg(feature = "backend-tract")]
            {
                let model = cfg
                    .detector
                    .model
                    .as_ref()
                    .context("the tract backend requires a model path")?;
                let mut backend = crowdwatch::TractBackend::new(
                    model,
                    cfg.detector.input_width,
                    cfg.detector.input_height,
                )?
                .with_threshold(cfg.detector.min_confidence)
                .with_iou(cfg.detector.iou);
                use crowdwatch::DetectorBackend;
                backend.warm_up().context("model warm-up failed")?;
                registry.register(backend);
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                anyhow::bail!("the tract backend requires the backend-tract feature");
            }
        }
    }

    registry.set_default(cfg.detector.backend.name())?;
    Ok(registry)
}
