//! Geometry, physics, telemetry and module passthrough operations.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::NativeBridge;
use crate::event::{KeyEvent, PointerEvent};
use crate::experiment::{MutationStrategy, Variant};
use crate::geometry::{ElementId, Rect, SnapResult};
use crate::learner::{Prediction, Weights};
use crate::module::{LayoutEntry, ParityReport, TargetOs};
use crate::physics::{BodyTransform, PhysicsBody};
use crate::spatial::SpatialIndex;

// Geometry. Always answered locally first.
impl NativeBridge {
    /// Record an element's bounds and forward them to the module when ready.
    ///
    /// Bounds with a non-finite edge are dropped without touching the index
    /// or the module.
    pub fn sync_element(&mut self, id: impl Into<ElementId>, rect: Rect) {
        let id = id.into();
        if !rect.is_finite() {
            tracing::debug!("Dropping non-finite bounds for {id}: {rect:?}");
            return;
        }
        self.spatial.update_element(id.clone(), rect);
        if let Some(module) = self.module() {
            module.call("sync_element", |m| m.sync_element(&id, rect));
        }
    }

    /// Forget an element in the spatial index and the physics world.
    pub fn remove_element(&mut self, id: &str) {
        self.spatial.remove_element(id);
        self.physics.remove_body(id);
    }

    /// An element under or near a point, whichever the spatial index yields
    /// first. Not necessarily the topmost one: the 1x1 query also matches
    /// elements whose left or top edge lies up to 1px past the point. The
    /// module is asked only when the index has no match.
    #[must_use]
    pub fn hit_test(&self, x: f32, y: f32) -> Option<ElementId> {
        if let Some(hit) = self
            .spatial
            .query(Rect::new(x, y, 1.0, 1.0))
            .into_iter()
            .next()
        {
            return Some(hit);
        }
        self.module()?.call("hit_test", |m| m.hit_test(x, y))?
    }

    /// Elements intersecting an area.
    #[must_use]
    pub fn query_area(&self, area: Rect) -> Vec<ElementId> {
        self.spatial.query(area)
    }

    /// Snap a dragged element to its neighbours' edges.
    #[must_use]
    pub fn find_snap_targets(&self, id: &str, rect: Rect) -> SnapResult {
        self.spatial
            .find_snap_targets(id, rect, self.config.snap_threshold)
    }

    /// The spatial index.
    #[must_use]
    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Constrained drag position. A malformed module answer falls back to
    /// the requested point; `None` when the module is unavailable or fails.
    #[must_use]
    pub fn constrain_drag(&self, id: &ElementId, x: f32, y: f32) -> Option<(f32, f32)> {
        let result = self
            .module()?
            .call("constrain_drag", |m| m.constrain_drag(id, x, y))?;
        match result.as_slice() {
            [cx, cy] => Some((*cx, *cy)),
            _ => Some((x, y)),
        }
    }

    /// Union bounds of several elements, computed by the module.
    #[must_use]
    pub fn group_bounds(&self, ids: &[ElementId]) -> Option<Rect> {
        self.module()?.call("group_bounds", |m| m.group_bounds(ids))
    }

    /// Module-computed bounds of one element.
    #[must_use]
    pub fn element_bounds(&self, id: &ElementId) -> Option<Rect> {
        let bounds = self
            .module()?
            .call("element_bounds", |m| m.element_bounds(id))?;
        match bounds.as_slice() {
            [x, y, w, h] => Some(Rect::new(*x, *y, *w, *h)),
            _ => None,
        }
    }

    /// Module-computed layout record of one element.
    #[must_use]
    pub fn element_layout(&self, id: &ElementId) -> Option<serde_json::Value> {
        self.module()?
            .call("element_layout", |m| m.element_layout(id))?
    }

    /// Computed layout of every element; empty when unavailable.
    #[must_use]
    pub fn layout_dump(&self) -> Vec<LayoutEntry> {
        self.module()
            .and_then(|module| module.call("layout_dump", |m| m.layout_dump()))
            .unwrap_or_default()
    }

    /// Compare the module's layout against a reference layout.
    #[must_use]
    pub fn check_parity(&self, reference: &[LayoutEntry]) -> Option<ParityReport> {
        self.module()?
            .call("parity_score", |m| m.parity_score(reference))
    }
}

// Physics what-if simulation.
impl NativeBridge {
    /// Add or replace a simulated body.
    pub fn add_physics_body(&mut self, body: &PhysicsBody) {
        self.physics.add_body(body);
    }

    /// Remove a simulated body.
    pub fn remove_physics_body(&mut self, id: &str) -> bool {
        self.physics.remove_body(id)
    }

    /// Drop every simulated body.
    pub fn reset_physics(&mut self) {
        self.physics.reset();
    }

    /// Run `iterations` physics steps and return where every body settled.
    ///
    /// `None` if the physics world never initialized.
    pub fn simulate_layout(&mut self, iterations: usize) -> Option<Vec<(ElementId, BodyTransform)>> {
        if !self.physics.is_initialized() {
            return None;
        }
        self.physics.simulate_drop(iterations);
        Some(self.physics.transforms())
    }

    /// Centre-of-mass transform of a simulated body.
    #[must_use]
    pub fn physics_transform(&self, id: &str) -> Option<BodyTransform> {
        self.physics.transform(id)
    }
}

// Telemetry and interaction prediction.
impl NativeBridge {
    /// Feed a pointer event. Trains automatically once enough samples
    /// are buffered.
    pub fn log_interaction(&mut self, event: &PointerEvent) {
        self.telemetry.record(event, self.clock.now_ms());
        if matches!(event, PointerEvent::Move { .. })
            && self.telemetry.len() >= self.config.training.train_threshold
        {
            self.train_model();
        }
    }

    /// Train on the buffered samples and clear them.
    ///
    /// With fewer than the minimum number of samples nothing happens and the
    /// buffer is kept.
    pub fn train_model(&mut self) -> bool {
        let samples = self.telemetry.samples();
        if !self.learner.train(&samples) {
            return false;
        }
        self.telemetry.clear();
        true
    }

    /// Forecast a click on `element_id`.
    #[must_use]
    pub fn predict_interaction(
        &self,
        element_id: &ElementId,
        hover_ms: f64,
        velocity: f64,
    ) -> Option<Prediction> {
        self.learner.predict(element_id, hover_ms, velocity)
    }

    /// Current classifier weights.
    #[must_use]
    pub fn classifier_weights(&self) -> Weights {
        self.learner.weights()
    }

    /// Which classifier backend is active.
    #[must_use]
    pub fn classifier_backend(&self) -> &'static str {
        self.learner.backend()
    }

    /// Samples waiting for the next training pass.
    #[must_use]
    pub fn buffered_samples(&self) -> usize {
        self.telemetry.len()
    }
}

// Module passthroughs. Each degrades to a neutral answer.
impl NativeBridge {
    /// State changes accumulated in the module since the last call.
    pub fn state_deltas(&mut self) -> Vec<serde_json::Value> {
        self.module()
            .and_then(|module| module.call("state_deltas", |m| m.state_deltas()))
            .unwrap_or_default()
    }

    /// Fire a blueprint trigger. Returns whether the module accepted it.
    pub fn fire_trigger(
        &mut self,
        blueprint_id: &str,
        trigger: &str,
        payload: &serde_json::Value,
    ) -> bool {
        self.module()
            .and_then(|module| {
                module.call("fire_trigger", |m| {
                    m.fire_trigger(blueprint_id, trigger, payload)
                })
            })
            .is_some()
    }

    /// Fire a state-machine event. Returns whether a transition happened.
    pub fn trigger(&mut self, event: &str) -> bool {
        self.module()
            .and_then(|module| module.call("fire_state_trigger", |m| m.fire_state_trigger(event)))
            .unwrap_or(false)
    }

    /// Write a named variable. Returns whether the module accepted it.
    pub fn set_variable(&mut self, name: &str, value: &serde_json::Value) -> bool {
        self.module()
            .and_then(|module| module.call("set_variable", |m| m.set_variable(name, value)))
            .is_some()
    }

    /// Read a named variable.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<serde_json::Value> {
        self.module()?
            .call("get_variable", |m| m.get_variable(name))
    }

    /// Gradient placeholder for a broken image as a `data:` URI; empty
    /// when the module cannot produce one.
    #[must_use]
    pub fn healing_placeholder(
        &self,
        width: u32,
        height: u32,
        color_start: &str,
        color_end: &str,
    ) -> String {
        self.module()
            .and_then(|module| {
                module.call("healing_placeholder", |m| {
                    m.healing_placeholder(width, height, color_start, color_end)
                })
            })
            .map(|svg| format!("data:image/svg+xml;base64,{}", BASE64.encode(svg)))
            .unwrap_or_default()
    }

    /// Optimize an RGBA image buffer.
    pub fn optimize_image(&mut self, data: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
        self.module()?
            .call("optimize_image", |m| m.optimize_image(data, width, height))
    }

    /// Semantic editor action for a key event, if the module maps it.
    pub fn translate_key(&mut self, key: &KeyEvent) -> Option<String> {
        self.module()?
            .call("translate_key", |m| m.translate_key(key))?
            .filter(|action| !action.is_empty())
    }

    /// Build a native deployment bundle.
    pub fn compile_native_bundle(
        &mut self,
        project: &str,
        target: TargetOs,
    ) -> Option<serde_json::Value> {
        self.module()?
            .call("compile_native_bundle", |m| {
                m.compile_native_bundle(project, target)
            })
    }

    /// Register an experiment with the module.
    pub fn create_experiment(
        &mut self,
        experiment_id: &str,
        element_id: &ElementId,
        variants: &[Variant],
    ) -> bool {
        self.module()
            .and_then(|module| {
                module.call("create_experiment", |m| {
                    m.create_experiment(experiment_id, element_id, variants)
                })
            })
            .is_some()
    }

    /// Let the module choose a variant.
    pub fn select_variant(&mut self, experiment_id: &str) -> Option<Variant> {
        self.module()?
            .call("select_variant", |m| m.select_variant(experiment_id))
    }

    /// Record an impression or conversion.
    pub fn record_experiment_outcome(
        &mut self,
        experiment_id: &str,
        variant_id: &str,
        conversion: bool,
    ) -> bool {
        self.module()
            .and_then(|module| {
                module.call("record_outcome", |m| {
                    m.record_outcome(experiment_id, variant_id, conversion)
                })
            })
            .is_some()
    }

    /// Ask the module for a mutated blueprint.
    pub fn mutate_blueprint(
        &mut self,
        snapshot: &str,
        strategy: MutationStrategy,
    ) -> Option<String> {
        self.module()?
            .call("mutate_blueprint", |m| m.mutate_blueprint(snapshot, strategy))
    }
}
