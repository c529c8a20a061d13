//! # Canvas Acceleration Harness
//!
//! Headless driver for the acceleration bridge. Replays recorded pointer
//! traces against the classifier, runs physics layout what-ifs, and soaks
//! the frame loop and watchdog in real time.

mod loopback;

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use accel_core::{
    BridgeConfig, BridgeEvent, ElementId, LayoutEntry, ManualClock, NativeBridge, PhysicsBody,
    PointerEvent, Prediction, Preloaded, StateSnapshot, Weights,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::loopback::LoopbackModule;

/// Frame period used when driving the bridge in real time.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "accel-harness")]
#[command(about = "Headless driver for the canvas acceleration bridge")]
#[command(version)]
struct CliArgs {
    /// Bridge configuration file (JSON). Unset fields keep their defaults.
    #[arg(long, env = "ACCEL_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for persisted classifier weights.
    #[arg(long, env = "ACCEL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: HarnessCommand,
}

#[derive(Debug, Subcommand)]
enum HarnessCommand {
    /// Replay a pointer trace and report predictions and learned weights.
    Replay {
        /// Trace file (JSON).
        trace: PathBuf,
    },
    /// Drop bodies under gravity and report where they settle.
    Simulate {
        /// Body list (JSON array).
        layout: PathBuf,
        /// Simulation steps.
        #[arg(long, default_value_t = 120)]
        iterations: usize,
    },
    /// Drive the frame loop and watchdog against the wall clock.
    Soak {
        /// How long to run.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        /// Attach the built-in loopback module instead of running local-only.
        #[arg(long)]
        loopback_module: bool,
        /// Make the loopback module fail every animation step after this
        /// many frames.
        #[arg(long, requires = "loopback_module")]
        stall_after: Option<u64>,
    },
}

/// A recorded editor session.
#[derive(Debug, Deserialize)]
struct Trace {
    /// Element bounds at the start of the session.
    #[serde(default)]
    elements: Vec<LayoutEntry>,
    /// Pointer events in order.
    events: Vec<TraceStep>,
}

#[derive(Debug, Deserialize)]
struct TraceStep {
    /// Time since the previous step.
    #[serde(default)]
    delay_ms: u64,
    event: PointerEvent,
}

#[derive(Debug, Serialize)]
struct TimedPrediction {
    at_ms: u64,
    #[serde(flatten)]
    prediction: Prediction,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    status: String,
    backend: &'static str,
    events: usize,
    training_passes: usize,
    predictions: Vec<TimedPrediction>,
    weights: Weights,
}

#[derive(Debug, Serialize)]
struct SoakReport {
    status: String,
    frames: u64,
    recoveries: u64,
    restored: u64,
    module_failures: u64,
}

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,accel_core=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,accel_core=debug,accel_harness=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve the bridge configuration from the file and overrides.
async fn load_config(args: &CliArgs) -> anyhow::Result<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => read_json(path).await?,
        None => BridgeConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config = config.with_data_dir(dir);
    }
    Ok(config)
}

/// Replay `trace` on a manual clock, one frame and watchdog poll per step.
async fn replay(config: BridgeConfig, trace: &Trace) -> ReplayReport {
    let clock = ManualClock::default();
    let mut bridge = NativeBridge::builder()
        .config(config)
        .clock(Rc::new(clock.clone()))
        .build();
    bridge.init().await;

    for entry in &trace.elements {
        bridge.sync_element(entry.id.clone(), entry.rect);
    }

    let mut now = 0;
    let mut hovered: Option<(ElementId, u64)> = None;
    let mut last_position: Option<(f32, f32)> = None;
    let mut training_passes = 0;
    let mut predictions = Vec::new();

    for step in &trace.events {
        clock.advance(step.delay_ms);
        now += step.delay_ms;
        bridge.tick();
        bridge.poll_watchdog();

        match &step.event {
            PointerEvent::Hover { element_id } => {
                if hovered.as_ref().map(|(id, _)| id) != Some(element_id) {
                    hovered = Some((element_id.clone(), now));
                }
            }
            PointerEvent::Move { x, y } => {
                let velocity = last_position
                    .map_or(0.0, |(lx, ly)| f64::from(x - lx).hypot(f64::from(y - ly)));
                last_position = Some((*x, *y));
                if let Some((id, since)) = &hovered {
                    #[allow(clippy::cast_precision_loss)]
                    let hover_ms = now.saturating_sub(*since) as f64;
                    if let Some(prediction) = bridge.predict_interaction(id, hover_ms, velocity) {
                        predictions.push(TimedPrediction {
                            at_ms: now,
                            prediction,
                        });
                    }
                }
            }
            PointerEvent::Click => {}
        }

        let buffered = bridge.buffered_samples();
        bridge.log_interaction(&step.event);
        if bridge.buffered_samples() < buffered {
            training_passes += 1;
        }
    }

    if bridge.train_model() {
        training_passes += 1;
    }

    ReplayReport {
        status: bridge.status().to_string(),
        backend: bridge.classifier_backend(),
        events: trace.events.len(),
        training_passes,
        predictions,
        weights: bridge.classifier_weights(),
    }
}

/// Run a drop simulation over `bodies`.
async fn simulate(
    config: BridgeConfig,
    bodies: &[PhysicsBody],
    iterations: usize,
) -> anyhow::Result<Vec<(ElementId, accel_core::BodyTransform)>> {
    let mut bridge = NativeBridge::builder().config(config).build();
    bridge.init().await;
    for body in bodies {
        bridge.add_physics_body(body);
    }
    bridge
        .simulate_layout(iterations)
        .context("Physics world is not available")
}

/// Tick the bridge at frame rate and poll its watchdog until `duration`
/// passes or the process is interrupted.
///
/// Without a module the bridge stays degraded and no frame completes.
async fn soak(
    config: BridgeConfig,
    duration: Duration,
    module: Option<LoopbackModule>,
) -> SoakReport {
    let heartbeat = Duration::from_millis(config.watchdog.heartbeat_interval_ms.max(1));
    let mut builder = NativeBridge::builder().config(config);
    if let Some(module) = module {
        builder = builder.loader(Preloaded::new(module));
    }
    let mut bridge = builder.build();
    bridge.init().await;

    let started = std::time::Instant::now();
    bridge.register_snapshot_provider(move || {
        StateSnapshot::new(serde_json::json!({
            "soak_elapsed_ms": u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }))
    });
    let restored = Rc::new(Cell::new(0));
    let counter = Rc::clone(&restored);
    bridge.subscribe(move |event| {
        if let BridgeEvent::StallRecovered { restored: true } = event {
            counter.set(counter.get() + 1);
        }
    });

    let mut frames = tokio::time::interval(FRAME_INTERVAL);
    let mut watchdog = tokio::time::interval(heartbeat);
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping soak");
                break;
            }
            _ = frames.tick() => {
                bridge.tick();
            }
            _ = watchdog.tick() => {
                if bridge.poll_watchdog() {
                    tracing::warn!("Watchdog recovery during soak");
                }
            }
        }
    }
    bridge.stop_frame_loop();

    SoakReport {
        status: bridge.status().to_string(),
        frames: bridge.frame_count(),
        recoveries: bridge.watchdog().recoveries(),
        restored: restored.get(),
        module_failures: bridge.diagnostics().total_failures(),
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = load_config(&args).await?;
    tracing::debug!(?config, "Bridge configuration resolved");

    match &args.command {
        HarnessCommand::Replay { trace } => {
            let trace: Trace = read_json(trace).await?;
            tracing::info!(events = trace.events.len(), "Replaying trace");
            print_json(&replay(config, &trace).await)
        }
        HarnessCommand::Simulate { layout, iterations } => {
            let bodies: Vec<PhysicsBody> = read_json(layout).await?;
            tracing::info!(bodies = bodies.len(), iterations, "Simulating layout");
            print_json(&simulate(config, &bodies, *iterations).await?)
        }
        HarnessCommand::Soak {
            seconds,
            loopback_module,
            stall_after,
        } => {
            tracing::info!(seconds, loopback_module, ?stall_after, "Soaking frame loop");
            let module = loopback_module.then(|| LoopbackModule::new(*stall_after));
            print_json(&soak(config, Duration::from_secs(*seconds), module).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_json() -> &'static str {
        r#"{
            "elements": [{"id": "buy", "x": 0, "y": 0, "width": 120, "height": 40}],
            "events": [
                {"event": {"type": "hover", "element_id": "buy"}},
                {"delay_ms": 100, "event": {"type": "move", "x": 10, "y": 10}},
                {"delay_ms": 100, "event": {"type": "move", "x": 12, "y": 11}},
                {"delay_ms": 100, "event": {"type": "move", "x": 13, "y": 12}},
                {"delay_ms": 100, "event": {"type": "move", "x": 15, "y": 12}},
                {"delay_ms": 100, "event": {"type": "move", "x": 16, "y": 13}},
                {"delay_ms": 100, "event": {"type": "move", "x": 18, "y": 14}},
                {"delay_ms": 900, "event": {"type": "click"}}
            ]
        }"#
    }

    #[test]
    fn parses_subcommands() {
        let args = CliArgs::try_parse_from([
            "accel-harness",
            "--data-dir",
            "/tmp/weights",
            "simulate",
            "layout.json",
            "--iterations",
            "30",
        ])
        .expect("valid args");
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/weights")));
        assert!(matches!(
            args.command,
            HarnessCommand::Simulate { iterations: 30, .. }
        ));
    }

    #[tokio::test]
    async fn config_file_and_overrides_combine() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{"sync_throttle_ms": 250}"#).expect("write config");

        let args = CliArgs {
            config: Some(path),
            data_dir: Some(dir.path().to_path_buf()),
            command: HarnessCommand::Soak {
                seconds: 0,
                loopback_module: false,
                stall_after: None,
            },
        };
        let config = load_config(&args).await.expect("config loads");
        assert_eq!(config.sync_throttle_ms, 250);
        assert_eq!(config.data_dir.as_deref(), Some(dir.path()));
    }

    #[tokio::test]
    async fn replay_trains_on_clicked_trace() {
        let trace: Trace = serde_json::from_str(trace_json()).expect("valid trace");
        let report = replay(BridgeConfig::default(), &trace).await;

        assert_eq!(report.status, "degraded");
        assert_eq!(report.backend, "local");
        assert_eq!(report.events, 8);
        assert_eq!(report.training_passes, 1);
        assert_ne!(report.weights, Weights::default());
    }

    #[tokio::test]
    async fn simulate_settles_every_body() {
        let bodies: Vec<PhysicsBody> = serde_json::from_str(
            r#"[
                {"id": "floor", "x": 0, "y": 400, "width": 800, "height": 20, "is_static": true},
                {"id": "card", "x": 100, "y": 0, "width": 80, "height": 40}
            ]"#,
        )
        .expect("valid bodies");

        let settled = simulate(BridgeConfig::default(), &bodies, 60)
            .await
            .expect("physics available");
        assert_eq!(settled.len(), 2);
        let card = settled
            .iter()
            .find(|(id, _)| id.as_str() == "card")
            .map(|(_, t)| *t)
            .expect("card settled");
        assert!(card.y > 0.0, "card fell");
    }

    #[test]
    fn stall_after_needs_the_loopback_module() {
        assert!(CliArgs::try_parse_from(["accel-harness", "soak", "--stall-after", "5"]).is_err());

        let args = CliArgs::try_parse_from([
            "accel-harness",
            "soak",
            "--seconds",
            "2",
            "--loopback-module",
            "--stall-after",
            "5",
        ])
        .expect("valid args");
        assert!(matches!(
            args.command,
            HarnessCommand::Soak {
                seconds: 2,
                loopback_module: true,
                stall_after: Some(5),
            }
        ));
    }

    fn fast_watchdog() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.watchdog.heartbeat_interval_ms = 20;
        config.watchdog.stall_timeout_ms = 60;
        config.watchdog.snapshot_interval_ms = 20;
        config
    }

    #[tokio::test]
    async fn short_soak_without_module_reports_degraded_bridge() {
        let report = soak(BridgeConfig::default(), Duration::from_millis(50), None).await;
        assert_eq!(report.status, "degraded");
        assert_eq!(report.frames, 0);
        assert_eq!(report.recoveries, 0);
    }

    #[tokio::test]
    async fn loopback_soak_runs_frames_without_stalling() {
        let report = soak(
            BridgeConfig::default(),
            Duration::from_millis(300),
            Some(LoopbackModule::new(None)),
        )
        .await;
        assert_eq!(report.status, "ready");
        assert!(report.frames > 5, "frames: {}", report.frames);
        assert_eq!(report.recoveries, 0);
        assert_eq!(report.module_failures, 0);
    }

    #[tokio::test]
    async fn loopback_stall_is_detected_and_recovered_once() {
        let report = soak(
            fast_watchdog(),
            Duration::from_millis(400),
            Some(LoopbackModule::new(Some(3))),
        )
        .await;
        assert_eq!(report.status, "ready");
        assert_eq!(report.frames, 3);
        assert_eq!(report.recoveries, 1);
        assert_eq!(report.restored, 1);
        assert!(report.module_failures > 0);
    }
}
