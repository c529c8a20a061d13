//! # Canvas Acceleration Core
//!
//! Hybrid acceleration bridge for interactive design canvases: real-time
//! geometry queries, physics what-if layouts, interaction prediction and
//! stall recovery, with graceful fallback when the external compute module
//! is absent.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       NativeBridge                        │
//! │  command queue │ sync throttle │ frame loop │ fallbacks   │
//! ├───────────────┬───────────────┬───────────────────────────┤
//! │ SpatialIndex  │ PhysicsSim    │ Telemetry → OnlineLearner │
//! │ (always on)   │ (what-ifs)    │ (local or module backend) │
//! ├───────────────┴───────────────┴───────────────────────────┤
//! │ Watchdog (heartbeat, snapshots) │ ExperimentEngine (A/B)  │
//! ├─────────────────────────────────┴─────────────────────────┤
//! │        ComputeModule contract (optional, versioned)       │
//! └───────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod experiment;
pub mod geometry;
pub mod learner;
pub mod module;
pub mod physics;
pub mod queue;
pub mod spatial;
pub mod status;
pub mod storage;
pub mod telemetry;
pub mod watchdog;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use bridge::{BridgeBuilder, NativeBridge, SyncOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BridgeConfig, TrainingParams, WatchdogConfig};
pub use diagnostics::Diagnostics;
pub use error::{ModuleError, ModuleResult, StorageError, StorageResult};
pub use event::{BridgeEvent, KeyEvent, PointerEvent, SubscriptionId};
pub use experiment::{ExperimentEngine, MutationRecord, MutationStrategy, Variant};
pub use geometry::{ElementId, Orientation, Rect, SnapGuide, SnapResult};
pub use learner::{
    logistic, InteractionModel, LocalModel, ModuleModel, OnlineLearner, Prediction, Weights,
};
pub use module::{
    Capability, ComputeModule, LayoutEntry, ModuleHandle, ModuleLoader, NoModule, ParityReport,
    Preloaded, StateSnapshot, TargetOs, CONTRACT_VERSION,
};
pub use physics::{BodyTransform, PhysicsBody, PhysicsSimulator};
pub use queue::{Command, CommandQueue};
pub use spatial::{SpatialIndex, SpatialItem};
pub use status::BridgeStatus;
#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStore;
pub use storage::{select_store, MemoryStore, WeightStore, WEIGHTS_KEY};
pub use telemetry::{TelemetryCollector, TelemetrySample};
pub use watchdog::{Recovery, SnapshotProvider, Watchdog};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
