//! Bridge configuration.
//!
//! Every tunable of the bridge lives here with the production default.
//! Configs deserialize with `#[serde(default)]`, so a JSON file only needs
//! the fields it overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Hyper-parameters for the interaction classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Buffered samples that trigger an automatic training pass.
    pub train_threshold: usize,
    /// Fewest samples a training pass will accept.
    pub min_samples: usize,
    /// Move samples labelled by a click.
    pub click_window: usize,
    /// Gradient descent epochs per pass.
    pub epochs: usize,
    /// Gradient descent step size.
    pub learning_rate: f64,
    /// Velocity is divided by this before the sigmoid.
    pub velocity_scale: f64,
    /// Hover duration (ms) is divided by this before the sigmoid.
    pub hover_scale: f64,
    /// Probability a prediction must exceed to be reported.
    pub prediction_threshold: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            train_threshold: 50,
            min_samples: 5,
            click_window: 5,
            epochs: 100,
            learning_rate: 0.01,
            velocity_scale: 1000.0,
            hover_scale: 5000.0,
            prediction_threshold: 0.6,
        }
    }
}

/// Timings for the stall watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// How often the heartbeat is checked.
    pub heartbeat_interval_ms: u64,
    /// Silence longer than this is a stall.
    pub stall_timeout_ms: u64,
    /// How often a document snapshot is captured.
    pub snapshot_interval_ms: u64,
    /// Snapshots retained for recovery.
    pub snapshot_capacity: usize,
    /// How long the fault indicator stays visible after a stall.
    pub fault_indicator_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            stall_timeout_ms: 3000,
            snapshot_interval_ms: 10_000,
            snapshot_capacity: 5,
            fault_indicator_ms: 2500,
        }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Minimum spacing between forwarded state syncs.
    pub sync_throttle_ms: u64,
    /// Upper bound on a single frame's delta time, in seconds.
    pub max_frame_dt: f32,
    /// Pixel distance within which edges snap.
    pub snap_threshold: f32,
    /// Physics gravity in px/s².
    pub gravity: [f32; 2],
    /// Restitution for bodies that do not specify one.
    pub default_restitution: f32,
    /// Conversions a variant must exceed before a blueprint mutation.
    pub mutation_conversion_threshold: u32,
    /// Window for rate-limited failure logging.
    pub diagnostics_window_ms: u64,
    /// Directory for persisted weights; `None` selects the in-memory store.
    pub data_dir: Option<PathBuf>,
    /// Classifier settings.
    pub training: TrainingParams,
    /// Watchdog settings.
    pub watchdog: WatchdogConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sync_throttle_ms: 100,
            max_frame_dt: 0.1,
            snap_threshold: 8.0,
            gravity: [0.0, 981.0],
            default_restitution: 0.1,
            mutation_conversion_threshold: 5,
            diagnostics_window_ms: 5000,
            data_dir: None,
            training: TrainingParams::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a config from JSON, filling unspecified fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or has wrong field types.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set the weights directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }
}
