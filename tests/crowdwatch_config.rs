use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use crowdwatch::config::{BackendKind, CrowdwatchConfig};
use crowdwatch::SourceSpec;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CROWDWATCH_CONFIG",
        "CROWDWATCH_SOURCE",
        "CROWDWATCH_BACKEND",
        "CROWDWATCH_MODEL",
        "CROWDWATCH_FRAMES",
        "CROWDWATCH_MIN_CONFIDENCE",
        "CROWDWATCH_INTERVAL_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [source]
        spec = "stub://atrium"
        target_fps = 12
        width = 320
        height = 240

        [detector]
        backend = "stub"
        min_confidence = 0.6

        [sampling]
        frames = 25
        target_class = 0
        interval_ms = 50
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("CROWDWATCH_CONFIG", file.path());
    std::env::set_var("CROWDWATCH_FRAMES", "40");
    std::env::set_var("CROWDWATCH_INTERVAL_MS", "10");

    let cfg = CrowdwatchConfig::load().expect("load config");

    assert_eq!(
        cfg.source,
        SourceSpec::Stub {
            scene: "atrium".to_string()
        }
    );
    assert_eq!(cfg.capture.target_fps, 12);
    assert_eq!(cfg.capture.width, 320);
    assert_eq!(cfg.capture.height, 240);
    assert_eq!(cfg.detector.backend, BackendKind::Stub);
    assert_eq!(cfg.detector.min_confidence, 0.6);
    assert_eq!(cfg.sampling.frames, 40);
    assert_eq!(cfg.sampling.target_class, 0);
    assert_eq!(cfg.sampling.interval, Duration::from_millis(10));

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CrowdwatchConfig::load().expect("load defaults");

    assert_eq!(
        cfg.source,
        SourceSpec::Stub {
            scene: "lobby".to_string()
        }
    );
    assert_eq!(cfg.sampling.frames, 10);
    assert_eq!(cfg.detector.backend, BackendKind::Stub);
    assert_eq!(cfg.detector.min_confidence, 0.5);
    assert_eq!(cfg.sampling.interval, Duration::from_millis(100));

    clear_env();
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CROWDWATCH_FRAMES", "0");
    assert!(CrowdwatchConfig::load().is_err());

    std::env::set_var("CROWDWATCH_FRAMES", "5");
    std::env::set_var("CROWDWATCH_SOURCE", "rtsp://camera-1/stream");
    assert!(CrowdwatchConfig::load().is_err());

    std::env::set_var("CROWDWATCH_SOURCE", "stub://lobby");
    std::env::set_var("CROWDWATCH_BACKEND", "tract");
    // tract without a model path must fail validation
    assert!(CrowdwatchConfig::load().is_err());

    clear_env();
}
