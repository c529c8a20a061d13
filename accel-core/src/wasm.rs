//! WebAssembly bindings for accel-core.
//!
//! Exposes a local-only bridge to the browser editor. The host drives the
//! frame loop from `requestAnimationFrame` and the watchdog from a
//! one-second timer. Structured values cross the boundary as JSON strings.

use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::clock::Clock;
use crate::config::BridgeConfig;
use crate::event::PointerEvent;
use crate::geometry::{ElementId, Rect};
use crate::physics::PhysicsBody;
use crate::queue::Command;
use crate::NativeBridge;

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

/// Milliseconds from `Date.now()`, relative to construction.
#[cfg(target_arch = "wasm32")]
#[derive(Debug)]
struct HostClock {
    origin: f64,
}

#[cfg(target_arch = "wasm32")]
impl HostClock {
    fn new() -> Self {
        Self {
            origin: js_sys::Date::now(),
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl Clock for HostClock {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn now_ms(&self) -> u64 {
        (js_sys::Date::now() - self.origin).max(0.0) as u64
    }
}

#[cfg(target_arch = "wasm32")]
fn host_clock() -> Rc<dyn Clock> {
    Rc::new(HostClock::new())
}

#[cfg(not(target_arch = "wasm32"))]
fn host_clock() -> Rc<dyn Clock> {
    Rc::new(crate::clock::SystemClock::new())
}

/// Bridge instance for the browser.
#[wasm_bindgen]
pub struct WasmBridge {
    bridge: NativeBridge,
}

#[wasm_bindgen]
impl WasmBridge {
    /// Create a bridge with the default configuration.
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a bridge from a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error string if the configuration is invalid.
    #[wasm_bindgen(js_name = fromConfigJson)]
    pub fn from_config_json(json: &str) -> Result<WasmBridge, String> {
        let config = BridgeConfig::from_json(json).map_err(|e| e.to_string())?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: BridgeConfig) -> Self {
        Self {
            bridge: NativeBridge::builder()
                .config(config)
                .clock(host_clock())
                .build(),
        }
    }

    /// Bring the bridge up. Every startup future resolves without waiting
    /// in the browser, so this completes synchronously.
    pub fn init(&mut self) {
        futures::executor::block_on(self.bridge.init());
    }

    /// Lifecycle status: `uninitialized`, `ready` or `degraded`.
    #[must_use]
    pub fn status(&self) -> String {
        self.bridge.status().to_string()
    }

    /// Record an element's bounds.
    #[wasm_bindgen(js_name = syncElement)]
    pub fn sync_element(&mut self, id: &str, x: f32, y: f32, width: f32, height: f32) {
        self.bridge.sync_element(id, Rect::new(x, y, width, height));
    }

    /// Forget an element.
    #[wasm_bindgen(js_name = removeElement)]
    pub fn remove_element(&mut self, id: &str) {
        self.bridge.remove_element(id);
    }

    /// An element under or near a point.
    #[wasm_bindgen(js_name = hitTest)]
    #[must_use]
    pub fn hit_test(&self, x: f32, y: f32) -> Option<String> {
        self.bridge.hit_test(x, y).map(|id| id.to_string())
    }

    /// Ids intersecting an area, as a JSON array.
    #[wasm_bindgen(js_name = queryArea)]
    #[must_use]
    pub fn query_area(&self, x: f32, y: f32, width: f32, height: f32) -> String {
        let ids = self.bridge.query_area(Rect::new(x, y, width, height));
        serde_json::to_string(&ids).unwrap_or_default()
    }

    /// Snap result `{x, y, guides}` as JSON.
    #[wasm_bindgen(js_name = findSnapTargets)]
    #[must_use]
    pub fn find_snap_targets(&self, id: &str, x: f32, y: f32, width: f32, height: f32) -> String {
        let result = self
            .bridge
            .find_snap_targets(id, Rect::new(x, y, width, height));
        serde_json::to_string(&result).unwrap_or_default()
    }

    /// Submit a command given as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error string if the command JSON is malformed.
    pub fn commit(&mut self, json: &str) -> Result<(), String> {
        let command: Command = serde_json::from_str(json).map_err(|e| e.to_string())?;
        self.bridge.commit(command);
        Ok(())
    }

    /// Commands waiting for a compute module.
    #[wasm_bindgen(js_name = pendingCommands)]
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.bridge.pending_commands()
    }

    /// Run one frame.
    pub fn tick(&mut self) -> bool {
        self.bridge.tick()
    }

    /// Run due watchdog checks. Returns whether a recovery ran.
    #[wasm_bindgen(js_name = pollWatchdog)]
    pub fn poll_watchdog(&mut self) -> bool {
        self.bridge.poll_watchdog()
    }

    /// Whether the stall indicator should be shown.
    #[wasm_bindgen(js_name = faultVisible)]
    #[must_use]
    pub fn fault_visible(&self) -> bool {
        self.bridge.fault_visible()
    }

    /// Feed a pointer event given as JSON, e.g. `{"type":"move","x":1,"y":2}`.
    ///
    /// # Errors
    ///
    /// Returns an error string if the event JSON is malformed.
    #[wasm_bindgen(js_name = logInteraction)]
    pub fn log_interaction(&mut self, json: &str) -> Result<(), String> {
        let event: PointerEvent = serde_json::from_str(json).map_err(|e| e.to_string())?;
        self.bridge.log_interaction(&event);
        Ok(())
    }

    /// Train on buffered samples now.
    #[wasm_bindgen(js_name = trainModel)]
    pub fn train_model(&mut self) -> bool {
        self.bridge.train_model()
    }

    /// Prediction as JSON, or `None` below the confidence threshold.
    #[wasm_bindgen(js_name = predictInteraction)]
    #[must_use]
    pub fn predict_interaction(&self, element_id: &str, hover_ms: f64, velocity: f64) -> Option<String> {
        self.bridge
            .predict_interaction(&ElementId::from(element_id), hover_ms, velocity)
            .and_then(|p| serde_json::to_string(&p).ok())
    }

    /// Current classifier weights as JSON.
    #[wasm_bindgen(js_name = classifierWeights)]
    #[must_use]
    pub fn classifier_weights(&self) -> String {
        serde_json::to_string(&self.bridge.classifier_weights()).unwrap_or_default()
    }

    /// Replace the simulated bodies, run a drop simulation and return
    /// `[[id, {x, y, rotation}], ...]` as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error string if the bodies JSON is malformed.
    #[wasm_bindgen(js_name = simulateLayout)]
    pub fn simulate_layout(&mut self, bodies_json: &str, iterations: usize) -> Result<String, String> {
        let bodies: Vec<PhysicsBody> =
            serde_json::from_str(bodies_json).map_err(|e| e.to_string())?;
        self.bridge.reset_physics();
        for body in &bodies {
            self.bridge.add_physics_body(body);
        }
        let settled = self.bridge.simulate_layout(iterations).unwrap_or_default();
        serde_json::to_string(&settled).map_err(|e| e.to_string())
    }
}

impl Default for WasmBridge {
    fn default() -> Self {
        Self::new()
    }
}
