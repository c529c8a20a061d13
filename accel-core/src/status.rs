//! Bridge lifecycle status.

use serde::{Deserialize, Serialize};

/// Where the bridge is in its lifecycle.
///
/// `Degraded` is a supported steady state: local components keep working
/// and commands keep queuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    /// `init()` has not completed.
    #[default]
    Uninitialized,
    /// Initialized with a compute module.
    Ready,
    /// Initialized without a compute module (local-only).
    Degraded,
}

impl BridgeStatus {
    /// Whether calls may be forwarded to the compute module.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether `init()` has completed, with or without a module.
    #[must_use]
    pub const fn is_initialized(self) -> bool {
        !matches!(self, Self::Uninitialized)
    }
}

impl std::fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
        };
        f.write_str(label)
    }
}
