//! # Watchdog
//!
//! Detects when the frame loop stops pulsing and hands back the most recent
//! document snapshot so the bridge can roll the module back to it.
//!
//! ```text
//!   every poll:
//!     snapshot due?   → capture via provider into a ring buffer (cap 5)
//!     heartbeat due?  → silence > stall timeout and not latched?
//!                          → latch, show fault indicator, return Recovery
//!   pulse():          → clear the latch
//! ```
//!
//! The watchdog does not own a timer. Its host calls [`Watchdog::poll`]
//! at least once per heartbeat interval and passes the current time.

use std::collections::VecDeque;

use crate::config::WatchdogConfig;
use crate::module::StateSnapshot;

/// Produces a serialized copy of the live document on demand.
pub type SnapshotProvider = Box<dyn Fn() -> StateSnapshot>;

/// Result of a detected stall.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    /// Newest captured snapshot, if any was taken.
    pub snapshot: Option<StateSnapshot>,
    /// Milliseconds since the last pulse.
    pub silent_for_ms: u64,
}

/// Heartbeat monitor with a rolling snapshot buffer.
pub struct Watchdog {
    config: WatchdogConfig,
    armed: bool,
    stalled: bool,
    last_pulse_ms: u64,
    last_check_ms: u64,
    last_snapshot_ms: u64,
    snapshots: VecDeque<StateSnapshot>,
    provider: Option<SnapshotProvider>,
    fault_until_ms: Option<u64>,
    recoveries: u64,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("armed", &self.armed)
            .field("stalled", &self.stalled)
            .field("last_pulse_ms", &self.last_pulse_ms)
            .field("snapshots", &self.snapshots.len())
            .field("has_provider", &self.provider.is_some())
            .field("recoveries", &self.recoveries)
            .finish_non_exhaustive()
    }
}

impl Watchdog {
    /// Create a disarmed watchdog whose snapshot timer starts at `now_ms`.
    #[must_use]
    pub fn new(config: WatchdogConfig, now_ms: u64) -> Self {
        Self {
            config,
            armed: false,
            stalled: false,
            last_pulse_ms: now_ms,
            last_check_ms: now_ms,
            last_snapshot_ms: now_ms,
            snapshots: VecDeque::with_capacity(config.snapshot_capacity),
            provider: None,
            fault_until_ms: None,
            recoveries: 0,
        }
    }

    /// Start stall detection. The heartbeat counts from `now_ms`.
    pub fn arm(&mut self, now_ms: u64) {
        self.armed = true;
        self.stalled = false;
        self.last_pulse_ms = now_ms;
        self.last_check_ms = now_ms;
    }

    /// Stop stall detection. Snapshots keep being captured.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Whether stall detection is active.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Record a successful frame.
    pub fn pulse(&mut self, now_ms: u64) {
        self.last_pulse_ms = now_ms;
        self.stalled = false;
    }

    /// Register the document snapshot source.
    pub fn set_provider(&mut self, provider: SnapshotProvider) {
        self.provider = Some(provider);
    }

    /// Run due snapshot and heartbeat checks.
    pub fn poll(&mut self, now_ms: u64) -> Option<Recovery> {
        if now_ms.saturating_sub(self.last_snapshot_ms) >= self.config.snapshot_interval_ms {
            self.last_snapshot_ms = now_ms;
            self.capture();
        }

        if !self.armed
            || now_ms.saturating_sub(self.last_check_ms) < self.config.heartbeat_interval_ms
        {
            return None;
        }
        self.last_check_ms = now_ms;

        let silent_for_ms = now_ms.saturating_sub(self.last_pulse_ms);
        if silent_for_ms <= self.config.stall_timeout_ms || self.stalled {
            return None;
        }

        self.stalled = true;
        self.recoveries += 1;
        self.fault_until_ms = Some(now_ms + self.config.fault_indicator_ms);
        tracing::warn!(silent_for_ms, "Frame loop stalled, starting recovery");

        Some(Recovery {
            snapshot: self.snapshots.back().cloned(),
            silent_for_ms,
        })
    }

    fn capture(&mut self) {
        let Some(provider) = &self.provider else {
            return;
        };
        if self.snapshots.len() == self.config.snapshot_capacity {
            self.snapshots.pop_front();
        }
        if self.config.snapshot_capacity > 0 {
            self.snapshots.push_back(provider());
        }
    }

    /// Whether the fault indicator should be shown at `now_ms`.
    #[must_use]
    pub fn fault_visible(&self, now_ms: u64) -> bool {
        self.fault_until_ms.is_some_and(|until| now_ms < until)
    }

    /// Newest captured snapshot.
    #[must_use]
    pub fn latest_snapshot(&self) -> Option<&StateSnapshot> {
        self.snapshots.back()
    }

    /// Number of retained snapshots.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Recoveries triggered so far.
    #[must_use]
    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }
}
