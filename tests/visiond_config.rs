use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use scene_vision::config::VisionConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VISION_CONFIG",
        "VISION_DEVICE",
        "VISION_TARGET_FPS",
        "VISION_INTERVAL_SECS",
        "VISION_MIN_CONFIDENCE",
        "VISION_MAX_OBJECTS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": {
            "device": "/dev/video2",
            "width": 1280,
            "height": 720,
            "target_fps": 15
        },
        "sampling": {
            "interval_secs": 0.5,
            "min_confidence": 0.4,
            "max_objects": 8
        },
        "spatial": {
            "proximity_threshold_px": 300.0,
            "alignment_tolerance_px": 40.0
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("VISION_CONFIG", file.path());
    std::env::set_var("VISION_DEVICE", "stub://kitchen");
    std::env::set_var("VISION_MAX_OBJECTS", "5");

    let cfg = VisionConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://kitchen");
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.sampling.interval_secs, 0.5);
    assert_eq!(cfg.sampling.min_confidence, 0.4);
    assert_eq!(cfg.sampling.max_objects, 5);
    assert_eq!(cfg.spatial.proximity_threshold_px, 300.0);
    assert_eq!(cfg.spatial.alignment_tolerance_px, 40.0);

    clear_env();
}

#[test]
fn loads_partial_toml_with_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[camera]
device = "stub://desk"

[sampling]
interval_secs = 0.05
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = VisionConfig::from_path(file.path()).expect("load config");
    assert_eq!(cfg.camera.device, "stub://desk");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.target_fps, 30);
    assert_eq!(cfg.sampling.interval_secs, 0.1);
    assert_eq!(cfg.sampling.min_confidence, 0.5);
    assert_eq!(cfg.sampling.max_objects, 20);
    assert_eq!(cfg.spatial.proximity_threshold_px, 200.0);
    assert_eq!(cfg.spatial.alignment_tolerance_px, 50.0);
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = VisionConfig::load().expect("load config");
    assert_eq!(cfg, VisionConfig::default());
}

#[test]
fn rejects_malformed_env_and_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VISION_TARGET_FPS", "fast");
    let err = VisionConfig::load().unwrap_err();
    assert!(err.to_string().contains("VISION_TARGET_FPS"));
    clear_env();

    std::env::set_var("VISION_MIN_CONFIDENCE", "1.5");
    assert!(VisionConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"camera": {"width": 0}}"#).expect("write config");
    assert!(VisionConfig::from_path(file.path()).is_err());

    assert!(VisionConfig::from_path(std::path::Path::new("/nonexistent/vision.json")).is_err());
}
