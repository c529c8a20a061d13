//! # Telemetry Collector
//!
//! Turns raw pointer events into classifier samples.
//!
//! ```text
//!   Move(x, y)   → sample { velocity: distance from last position }
//!   Hover(id)    → restart the hover timer if id changed
//!   Click        → last N samples: clicked = true,
//!                                  hover_duration = now - hover start
//! ```
//!
//! Click attribution is a heuristic window, not a causal measurement.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::event::PointerEvent;
use crate::geometry::ElementId;

/// One labelled training sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    /// Pointer distance since the previous move, in px.
    pub velocity: f64,
    /// Hover time in ms; zero until a click backfills it.
    pub hover_duration: f64,
    /// Whether the sample led to a click.
    pub clicked: bool,
}

impl TelemetrySample {
    /// Create a sample.
    #[must_use]
    pub const fn new(velocity: f64, hover_duration: f64, clicked: bool) -> Self {
        Self {
            velocity,
            hover_duration,
            clicked,
        }
    }
}

/// Bounded buffer of pointer samples.
#[derive(Debug, Clone)]
pub struct TelemetryCollector {
    buffer: VecDeque<TelemetrySample>,
    capacity: usize,
    click_window: usize,
    last_position: Option<(f32, f32)>,
    hovered: Option<ElementId>,
    hover_start_ms: u64,
}

impl TelemetryCollector {
    /// Create a collector holding at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize, click_window: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            click_window,
            last_position: None,
            hovered: None,
            hover_start_ms: 0,
        }
    }

    /// Feed one pointer event observed at `now_ms`.
    pub fn record(&mut self, event: &PointerEvent, now_ms: u64) {
        match event {
            PointerEvent::Move { x, y } => self.record_move(*x, *y),
            PointerEvent::Hover { element_id } => self.record_hover(element_id, now_ms),
            PointerEvent::Click => self.record_click(now_ms),
        }
    }

    fn record_move(&mut self, x: f32, y: f32) {
        if let Some((last_x, last_y)) = self.last_position {
            let distance = f64::from(x - last_x).hypot(f64::from(y - last_y));
            if self.buffer.len() == self.capacity {
                self.buffer.pop_front();
            }
            self.buffer
                .push_back(TelemetrySample::new(distance, 0.0, false));
        }
        self.last_position = Some((x, y));
    }

    fn record_hover(&mut self, element_id: &ElementId, now_ms: u64) {
        if self.hovered.as_ref() != Some(element_id) {
            self.hovered = Some(element_id.clone());
            self.hover_start_ms = now_ms;
        }
    }

    #[allow(clippy::cast_precision_loss)] // hover spans are far below 2^52 ms
    fn record_click(&mut self, now_ms: u64) {
        let hover = now_ms.saturating_sub(self.hover_start_ms) as f64;
        for sample in self.buffer.iter_mut().rev().take(self.click_window) {
            sample.clicked = true;
            sample.hover_duration = hover;
        }
    }

    /// Element currently hovered.
    #[must_use]
    pub fn hovered(&self) -> Option<&ElementId> {
        self.hovered.as_ref()
    }

    /// Buffered sample count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Copy of the buffered samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> Vec<TelemetrySample> {
        self.buffer.iter().copied().collect()
    }

    /// Drop every buffered sample. Pointer and hover tracking are kept.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
