//! # Native Bridge
//!
//! Central dispatcher between the editor and the optional compute module.
//!
//! ```text
//!                 ┌──────────────────── NativeBridge ────────────────────┐
//!   commit() ───► │ ready? ── yes ──► module.apply_command               │
//!                 │    └──── no ───► CommandQueue (FIFO, drained on init)│
//!   sync_state ─► │ throttle (100ms, drop) ──► module.sync_state         │
//!   hit_test  ──► │ SpatialIndex ──(miss)──► module.hit_test             │
//!   tick()    ──► │ advance animations, pull transforms, notify, pulse   │
//!   poll_watchdog │ stall? ──► restore newest snapshot, StallRecovered   │
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! No public operation returns an error. Module failures are recorded in
//! [`Diagnostics`] and surface as "no result".

mod frame;
mod ops;

use std::rc::Rc;

use crate::clock::{Clock, SystemClock};
use crate::config::BridgeConfig;
use crate::diagnostics::Diagnostics;
use crate::error::ModuleError;
use crate::event::{BridgeEvent, SubscriptionId};
use crate::learner::{select_model, OnlineLearner};
use crate::module::{Capability, ModuleHandle, ModuleLoader, NoModule, StateSnapshot};
use crate::physics::PhysicsSimulator;
use crate::queue::{Command, CommandQueue};
use crate::spatial::SpatialIndex;
use crate::status::BridgeStatus;
use crate::storage::{select_store, WeightStore};
use crate::telemetry::TelemetryCollector;
use crate::watchdog::Watchdog;

type Subscriber = Box<dyn FnMut(&BridgeEvent)>;

/// Outcome of a [`NativeBridge::sync_state`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Delivered to the module.
    Sent,
    /// Within the throttle window; dropped.
    Throttled,
    /// The module rejected it (logged).
    Failed,
    /// No module to sync with.
    Unavailable,
}

/// Assembles a [`NativeBridge`].
pub struct BridgeBuilder {
    config: BridgeConfig,
    clock: Option<Rc<dyn Clock>>,
    loader: Option<Box<dyn ModuleLoader>>,
    store: Option<Box<dyn WeightStore>>,
}

impl BridgeBuilder {
    /// Use a configuration.
    #[must_use]
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a time source. Defaults to [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a module loader. Defaults to [`NoModule`].
    #[must_use]
    pub fn loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Use a weight store. Defaults to [`select_store`].
    #[must_use]
    pub fn store(mut self, store: impl WeightStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Build an uninitialized bridge.
    #[must_use]
    pub fn build(self) -> NativeBridge {
        let config = self.config;
        let clock = self
            .clock
            .unwrap_or_else(|| Rc::new(SystemClock::new()) as Rc<dyn Clock>);
        let store = self.store.unwrap_or_else(|| select_store(&config));
        let diagnostics = Rc::new(Diagnostics::new(
            Rc::clone(&clock),
            config.diagnostics_window_ms,
        ));
        let now = clock.now_ms();

        NativeBridge {
            loader: self.loader.unwrap_or_else(|| Box::new(NoModule)),
            module: None,
            animations: false,
            status: BridgeStatus::Uninitialized,
            queue: CommandQueue::new(),
            last_sync_ms: None,
            spatial: SpatialIndex::new(),
            physics: PhysicsSimulator::new(config.gravity, config.default_restitution),
            telemetry: TelemetryCollector::new(
                config.training.train_threshold,
                config.training.click_window,
            ),
            learner: OnlineLearner::new(store, config.training),
            watchdog: Watchdog::new(config.watchdog, now),
            frame_running: false,
            last_frame_ms: now,
            frames: 0,
            transforms: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
            diagnostics,
            clock,
            config,
        }
    }
}

/// The acceleration bridge. Single-threaded; construct one per editor.
pub struct NativeBridge {
    config: BridgeConfig,
    clock: Rc<dyn Clock>,
    diagnostics: Rc<Diagnostics>,
    loader: Box<dyn ModuleLoader>,
    module: Option<ModuleHandle>,
    animations: bool,
    status: BridgeStatus,
    queue: CommandQueue,
    last_sync_ms: Option<u64>,
    spatial: SpatialIndex,
    physics: PhysicsSimulator,
    telemetry: TelemetryCollector,
    learner: OnlineLearner,
    watchdog: Watchdog,
    frame_running: bool,
    last_frame_ms: u64,
    frames: u64,
    transforms: Vec<f32>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl std::fmt::Debug for NativeBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBridge")
            .field("status", &self.status)
            .field("queued", &self.queue.len())
            .field("elements", &self.spatial.len())
            .field("bodies", &self.physics.body_count())
            .field("samples", &self.telemetry.len())
            .field("classifier", &self.learner.backend())
            .field("frames", &self.frames)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl NativeBridge {
    /// Start building a bridge.
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder {
            config: BridgeConfig::default(),
            clock: None,
            loader: None,
            store: None,
        }
    }

    /// Bring the bridge up. Idempotent.
    ///
    /// Loads the compute module and the physics world together, then loads
    /// classifier weights, drains queued commands and starts the frame loop.
    /// Without a module the bridge settles in [`BridgeStatus::Degraded`].
    pub async fn init(&mut self) {
        if self.status.is_initialized() {
            return;
        }

        let loader = &self.loader;
        let physics = &mut self.physics;
        let (loaded, physics_ready) =
            futures::join!(loader.load(), async move { physics.init() });

        let attached =
            loaded.and_then(|module| ModuleHandle::attach(module, Rc::clone(&self.diagnostics)));
        self.module = match attached {
            Ok(handle) => Some(handle),
            Err(ModuleError::Unavailable(reason)) => {
                tracing::info!("Compute module unavailable, running local-only: {}", reason);
                None
            }
            Err(e) => {
                tracing::warn!("Compute module rejected, running local-only: {}", e);
                None
            }
        };
        if !physics_ready {
            tracing::warn!("Physics world failed to initialize");
        }

        self.status = if self.module.is_some() {
            BridgeStatus::Ready
        } else {
            BridgeStatus::Degraded
        };
        self.animations = self
            .module
            .as_ref()
            .is_some_and(|m| m.supports(Capability::Animations));

        self.learner.set_model(select_model(self.module.as_ref()));
        self.learner.load_weights().await;

        if self.status.is_ready() {
            let pending = self.queue.drain();
            if !pending.is_empty() {
                tracing::debug!("Replaying {} queued commands", pending.len());
            }
            for command in &pending {
                self.forward_command(command);
            }
        }

        self.start_frame_loop();
        if self.status.is_ready() {
            self.watchdog.arm(self.clock.now_ms());
        }

        tracing::info!(
            status = %self.status,
            classifier = self.learner.backend(),
            "Acceleration bridge initialized"
        );
    }

    /// Lifecycle status.
    #[must_use]
    pub fn status(&self) -> BridgeStatus {
        self.status
    }

    /// Whether calls go to the compute module.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Failure counters for module calls.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The module handle, only while ready.
    fn module(&self) -> Option<&ModuleHandle> {
        if self.status.is_ready() {
            self.module.as_ref()
        } else {
            None
        }
    }

    /// Submit a command. Forwarded now when ready, queued otherwise.
    ///
    /// A module failure is logged and does not affect later commands.
    pub fn commit(&mut self, mut command: Command) {
        if command.timestamp == 0 {
            command.timestamp = self.clock.now_ms();
        }
        if self.is_ready() {
            self.forward_command(&command);
        } else {
            tracing::trace!(kind = %command.kind, "Queueing command until module is ready");
            self.queue.enqueue(command);
        }
    }

    fn forward_command(&self, command: &Command) {
        if let Some(module) = self.module() {
            module.call("apply_command", |m| m.apply_command(command));
        }
    }

    /// Commands waiting for the module.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Refresh the module's copy of the document, at most once per throttle
    /// window. Calls inside the window are dropped.
    pub fn sync_state(&mut self, state: &StateSnapshot) -> SyncOutcome {
        if self.module().is_none() {
            return SyncOutcome::Unavailable;
        }
        let now = self.clock.now_ms();
        if self
            .last_sync_ms
            .is_some_and(|last| now.saturating_sub(last) < self.config.sync_throttle_ms)
        {
            return SyncOutcome::Throttled;
        }
        self.last_sync_ms = Some(now);
        self.push_state(state)
    }

    fn push_state(&self, state: &StateSnapshot) -> SyncOutcome {
        match self.module() {
            Some(module) => match module.call("sync_state", |m| m.sync_state(state)) {
                Some(()) => SyncOutcome::Sent,
                None => SyncOutcome::Failed,
            },
            None => SyncOutcome::Unavailable,
        }
    }

    /// Register a callback for bridge events.
    pub fn subscribe(&mut self, callback: impl FnMut(&BridgeEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    fn publish(&mut self, event: &BridgeEvent) {
        for (_, callback) in &mut self.subscribers {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn degraded() -> NativeBridge {
        let mut bridge = NativeBridge::builder()
            .clock(Rc::new(ManualClock::default()))
            .build();
        futures::executor::block_on(bridge.init());
        bridge
    }

    #[test]
    fn no_module_means_degraded() {
        let bridge = degraded();
        assert_eq!(bridge.status(), BridgeStatus::Degraded);
        assert!(!bridge.is_ready());
    }

    #[test]
    fn init_is_idempotent() {
        let mut bridge = degraded();
        bridge.commit(Command::new("noop", json!({})));
        futures::executor::block_on(bridge.init());
        assert_eq!(bridge.status(), BridgeStatus::Degraded);
        assert_eq!(bridge.pending_commands(), 1);
    }

    #[test]
    fn degraded_bridge_keeps_queuing() {
        let mut bridge = degraded();
        for i in 0..3 {
            bridge.commit(Command::new(format!("op{i}"), json!(i)));
        }
        assert_eq!(bridge.pending_commands(), 3);
        assert_eq!(
            bridge.sync_state(&StateSnapshot::default()),
            SyncOutcome::Unavailable
        );
    }

    #[test]
    fn unsubscribe_removes_callback() {
        let mut bridge = degraded();
        let a = bridge.subscribe(|_| {});
        let b = bridge.subscribe(|_| {});
        assert_ne!(a, b);
        assert!(bridge.unsubscribe(a));
        assert!(!bridge.unsubscribe(a));
        assert!(bridge.unsubscribe(b));
    }
}
