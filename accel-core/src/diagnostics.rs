//! Rate-limited failure diagnostics.
//!
//! Module call failures never reach callers, so this is where they become
//! visible. The first failure of an operation in each window is logged at
//! `warn`; later failures in the same window are only counted and reported
//! as `suppressed` on the next logged failure.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::clock::Clock;

#[derive(Debug, Default, Clone, Copy)]
struct OpStats {
    total: u64,
    window_start: Option<u64>,
    suppressed: u64,
}

/// Per-operation failure counters with windowed logging.
#[derive(Debug)]
pub struct Diagnostics {
    clock: Rc<dyn Clock>,
    window_ms: u64,
    ops: RefCell<HashMap<&'static str, OpStats>>,
}

impl Diagnostics {
    /// Create diagnostics that log at most once per `window_ms` per operation.
    #[must_use]
    pub fn new(clock: Rc<dyn Clock>, window_ms: u64) -> Self {
        Self {
            clock,
            window_ms,
            ops: RefCell::new(HashMap::new()),
        }
    }

    /// Record a failure of `op`.
    pub fn record_failure(&self, op: &'static str, error: &dyn std::fmt::Display) {
        let now = self.clock.now_ms();
        let mut ops = self.ops.borrow_mut();
        let stats = ops.entry(op).or_default();
        stats.total += 1;

        let window_open = stats
            .window_start
            .is_some_and(|start| now.saturating_sub(start) < self.window_ms);
        if window_open {
            stats.suppressed += 1;
            return;
        }

        tracing::warn!(
            op,
            error = %error,
            suppressed = stats.suppressed,
            total = stats.total,
            "Compute module call failed"
        );
        stats.window_start = Some(now);
        stats.suppressed = 0;
    }

    /// Failures recorded for `op`.
    #[must_use]
    pub fn failure_count(&self, op: &str) -> u64 {
        self.ops.borrow().get(op).map_or(0, |s| s.total)
    }

    /// Failures recorded across all operations.
    #[must_use]
    pub fn total_failures(&self) -> u64 {
        self.ops.borrow().values().map(|s| s.total).sum()
    }

    /// Failures of `op` swallowed since its last logged failure.
    #[must_use]
    pub fn suppressed_count(&self, op: &str) -> u64 {
        self.ops.borrow().get(op).map_or(0, |s| s.suppressed)
    }
}
