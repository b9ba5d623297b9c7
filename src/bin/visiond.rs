//! visiond - scene vision diagnostics daemon
//!
//! Starts the camera and the sampling loop, then logs a one-line scene
//! description for every published snapshot until the run time elapses or
//! Ctrl-C is pressed.

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scene_vision::{
    describe_scene, DetectorBackend, Frame, RawDetection, VisionConfig, VisionController,
};

const POLL: Duration = Duration::from_millis(200);
const STATUS_EVERY: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Scene vision sampling daemon")]
struct Args {
    /// Config file (.toml or .json). Without it, VISION_CONFIG and the
    /// VISION_* env overrides apply.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Capture device id (stub://<name>, /dev/videoN, N, image:<path>).
    /// Overrides the device from any config source.
    #[arg(long)]
    device: Option<String>,

    /// Stop after this many seconds (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    seconds: u64,

    /// Drive the sampler with a jittered demo desk scene instead of a model.
    #[arg(long)]
    synthetic_objects: bool,
}

/// Fixed desk scene with a few pixels of per-call jitter.
struct DemoScene;

impl DemoScene {
    const OBJECTS: [(&'static str, f32, [i32; 4]); 4] = [
        ("laptop", 0.92, [200, 180, 440, 340]),
        ("keyboard", 0.71, [230, 280, 400, 330]),
        ("cup", 0.86, [470, 250, 520, 310]),
        ("book", 0.64, [90, 260, 180, 320]),
    ];
}

impl DetectorBackend for DemoScene {
    fn name(&self) -> &'static str {
        "demo-scene"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        let mut rng = rand::thread_rng();
        Ok(Self::OBJECTS
            .iter()
            .map(|(class, confidence, [x1, y1, x2, y2])| {
                let dx = rng.gen_range(-6i32..=6);
                let dy = rng.gen_range(-6i32..=6);
                let jitter = rng.gen_range(-0.05f32..=0.05);
                RawDetection::new(
                    *class,
                    (confidence + jitter).clamp(0.0, 1.0),
                    [x1 + dx, y1 + dy, x2 + dx, y2 + dy],
                )
            })
            .collect())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match args.config.as_deref() {
        Some(path) => VisionConfig::from_path(path)?,
        None => VisionConfig::load()?,
    };
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    log::info!(
        "visiond {} using {} ({}x{} @ {}fps, sampling every {}s)",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.device,
        cfg.camera.width,
        cfg.camera.height,
        cfg.camera.target_fps,
        cfg.sampling.interval_secs
    );

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .context("error setting Ctrl-C handler")?;

    let controller = VisionController::new(cfg);
    controller.start_camera()?;
    let updates = controller.subscribe();
    if args.synthetic_objects {
        controller.set_detector(DemoScene);
        controller.start_processing()?;
    } else {
        log::warn!("no detector configured; running capture only (try --synthetic-objects)");
    }

    let deadline = (args.seconds > 0).then(|| Instant::now() + Duration::from_secs(args.seconds));
    let mut last_status = Instant::now();
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        match updates.recv_timeout(POLL) {
            Ok(snapshot) => {
                log::info!("tick {}: {}", snapshot.sequence, describe_scene(&snapshot));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if last_status.elapsed() >= STATUS_EVERY {
            last_status = Instant::now();
            let info = controller.camera_info();
            let stats = controller.sampler_stats();
            log::info!(
                "camera healthy={} frames={} read_failures={}; ticks published={} skipped={} failed={}",
                info.healthy,
                info.frames_captured,
                info.read_failures,
                stats.published,
                stats.skipped,
                stats.failed
            );
        }
    }

    log::info!("shutting down");
    controller.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn device_env_does_not_override_config_file() {
        std::env::set_var("VISION_DEVICE", "stub://from-env");
        let args = Args::try_parse_from(["visiond", "--config", "desk.toml"]).unwrap();
        std::env::remove_var("VISION_DEVICE");
        assert_eq!(args.config, Some(PathBuf::from("desk.toml")));
        assert!(args.device.is_none());

        let args = Args::try_parse_from(["visiond", "--device", "stub://cli"]).unwrap();
        assert_eq!(args.device.as_deref(), Some("stub://cli"));
    }
}
