//! # Command Queue
//!
//! Holds commands submitted while the compute module is not ready.
//!
//! ```text
//! 1. Not ready: commit() appends to the queue (unbounded, FIFO)
//! 2. init() succeeds: the queue is drained once, in submission order
//! 3. Ready: commit() forwards immediately and nothing is queued
//! ```
//!
//! There is no deduplication, cancellation or size limit.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// An opaque operation for the compute module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Operation name, interpreted only by the module.
    #[serde(rename = "type")]
    pub kind: String,
    /// Element the command targets, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Operation arguments.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Submission time (bridge clock, ms). Stamped by the bridge on commit.
    #[serde(default)]
    pub timestamp: u64,
}

impl Command {
    /// Create a command with no target.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            target_id: None,
            payload,
            timestamp: 0,
        }
    }

    /// Set the target element.
    #[must_use]
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }
}

/// FIFO queue of commands awaiting delivery.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
}

impl CommandQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command.
    pub fn enqueue(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    /// Take every pending command in submission order, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.pending).into()
    }

    /// Number of pending commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Peek at pending commands without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.pending.iter()
    }
}
