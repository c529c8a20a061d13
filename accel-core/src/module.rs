//! # Compute Module Contract
//!
//! The typed, versioned boundary to the optional external compute module.
//!
//! ```text
//!   ModuleLoader::load()  ──► Box<dyn ComputeModule>
//!                                  │ contract_version() == CONTRACT_VERSION ?
//!                                  ▼
//!                            ModuleHandle::call(op, |m| ...)
//!                                  │  Ok(v)        → Some(v)
//!                                  │  Err(e)       → diagnostics, None
//!                                  │  panic        → diagnostics, None
//! ```
//!
//! Every operation has a default body returning
//! [`ModuleError::Unsupported`], so a module implements only what it
//! accelerates. Callers never see a module error; they see `None`.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TrainingParams;
use crate::diagnostics::Diagnostics;
use crate::error::{ModuleError, ModuleResult};
use crate::event::KeyEvent;
use crate::experiment::{MutationStrategy, Variant};
use crate::geometry::{ElementId, Rect};
use crate::learner::Weights;
use crate::queue::Command;
use crate::telemetry::TelemetrySample;

/// Contract version this bridge speaks.
pub const CONTRACT_VERSION: u32 = 1;

/// Optional capability groups a module may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Animation stepping and transform batches.
    Animations,
    /// Point hit testing.
    HitTest,
    /// The interaction classifier.
    Classifier,
    /// Autonomous experiments.
    Experiments,
}

/// Opaque serialized document state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSnapshot(pub serde_json::Value);

impl StateSnapshot {
    /// Wrap a serialized document.
    #[must_use]
    pub fn new(state: serde_json::Value) -> Self {
        Self(state)
    }
}

/// Computed layout of one element, as reported by a layout dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEntry {
    /// Element id.
    pub id: ElementId,
    /// Computed bounds.
    #[serde(flatten)]
    pub rect: Rect,
}

/// Drift between the module's layout and a reference layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    /// Mean positional drift in pixels.
    pub average_drift: f64,
    /// Elements whose drift exceeded the module's tolerance.
    pub flagged_elements: Vec<ElementId>,
}

/// Target platform for a native bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    Macos,
    /// Linux.
    Linux,
}

fn unsupported<T>(op: &'static str) -> ModuleResult<T> {
    Err(ModuleError::Unsupported(op))
}

/// The external compute module.
///
/// Implementations run on the bridge's single execution context and are
/// never called re-entrantly.
#[allow(unused_variables)]
pub trait ComputeModule {
    /// Contract version the module was built against.
    fn contract_version(&self) -> u32;

    /// Whether the module implements a capability group.
    fn supports(&self, capability: Capability) -> bool {
        false
    }

    /// Push one element's serialized form.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn sync_element(&mut self, id: &ElementId, rect: Rect) -> ModuleResult<()> {
        unsupported("sync_element")
    }

    /// Replace the module's view of the document.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn sync_state(&mut self, state: &StateSnapshot) -> ModuleResult<()> {
        unsupported("sync_state")
    }

    /// Apply a serialized command.
    ///
    /// # Errors
    ///
    /// Any module-side failure, including an unknown command type.
    fn apply_command(&mut self, command: &Command) -> ModuleResult<()> {
        unsupported("apply_command")
    }

    /// Take the state changes accumulated since the last call.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn state_deltas(&mut self) -> ModuleResult<Vec<serde_json::Value>> {
        unsupported("state_deltas")
    }

    /// Topmost element under a point.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn hit_test(&mut self, x: f32, y: f32) -> ModuleResult<Option<ElementId>> {
        unsupported("hit_test")
    }

    /// Advance animation state by `dt` seconds.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn advance_animations(&mut self, dt: f32) -> ModuleResult<()> {
        unsupported("advance_animations")
    }

    /// Flat transform buffer for the current frame.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn batch_transforms(&mut self) -> ModuleResult<Vec<f32>> {
        unsupported("batch_transforms")
    }

    /// Fire a blueprint trigger.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn fire_trigger(
        &mut self,
        blueprint_id: &str,
        trigger: &str,
        payload: &serde_json::Value,
    ) -> ModuleResult<()> {
        unsupported("fire_trigger")
    }

    /// Fire a state-machine event. Returns whether a transition happened.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn fire_state_trigger(&mut self, event: &str) -> ModuleResult<bool> {
        unsupported("fire_state_trigger")
    }

    /// Read a named variable.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn get_variable(&self, name: &str) -> ModuleResult<serde_json::Value> {
        unsupported("get_variable")
    }

    /// Write a named variable.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn set_variable(&mut self, name: &str, value: &serde_json::Value) -> ModuleResult<()> {
        unsupported("set_variable")
    }

    /// Constrain a drag target. A well-formed answer has two values.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn constrain_drag(&mut self, id: &ElementId, x: f32, y: f32) -> ModuleResult<Vec<f32>> {
        unsupported("constrain_drag")
    }

    /// Union bounds of several elements.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn group_bounds(&self, ids: &[ElementId]) -> ModuleResult<Rect> {
        unsupported("group_bounds")
    }

    /// Bounds of one element as `[x, y, width, height]`.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn element_bounds(&self, id: &ElementId) -> ModuleResult<Vec<f32>> {
        unsupported("element_bounds")
    }

    /// Full computed layout record of one element.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn element_layout(&self, id: &ElementId) -> ModuleResult<Option<serde_json::Value>> {
        unsupported("element_layout")
    }

    /// SVG gradient placeholder for an image that failed to load.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn healing_placeholder(
        &self,
        width: u32,
        height: u32,
        color_start: &str,
        color_end: &str,
    ) -> ModuleResult<String> {
        unsupported("healing_placeholder")
    }

    /// Optimize an RGBA image buffer.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn optimize_image(&mut self, data: &[u8], width: u32, height: u32) -> ModuleResult<Vec<u8>> {
        unsupported("optimize_image")
    }

    /// Map a raw key event to a semantic editor action.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn translate_key(&mut self, key: &KeyEvent) -> ModuleResult<Option<String>> {
        unsupported("translate_key")
    }

    /// Computed layout of every element.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn layout_dump(&self) -> ModuleResult<Vec<LayoutEntry>> {
        unsupported("layout_dump")
    }

    /// Compare the module's layout with a reference layout.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn parity_score(&self, reference: &[LayoutEntry]) -> ModuleResult<ParityReport> {
        unsupported("parity_score")
    }

    /// Run one training pass and return the updated weights.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn train_classifier(
        &mut self,
        samples: &[TelemetrySample],
        params: &TrainingParams,
    ) -> ModuleResult<Weights> {
        unsupported("train_classifier")
    }

    /// Current classifier weights.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn classifier_weights(&self) -> ModuleResult<Weights> {
        unsupported("classifier_weights")
    }

    /// Replace the classifier weights.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn load_classifier_weights(&mut self, weights: &Weights) -> ModuleResult<()> {
        unsupported("load_classifier_weights")
    }

    /// Interaction probability for a hover.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn predict_interaction(
        &self,
        hover_ms: f64,
        velocity: f64,
        params: &TrainingParams,
    ) -> ModuleResult<f64> {
        unsupported("predict_interaction")
    }

    /// Build a native deployment bundle.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn compile_native_bundle(
        &mut self,
        project: &str,
        target: TargetOs,
    ) -> ModuleResult<serde_json::Value> {
        unsupported("compile_native_bundle")
    }

    /// Register an experiment and its variants.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn create_experiment(
        &mut self,
        experiment_id: &str,
        element_id: &ElementId,
        variants: &[Variant],
    ) -> ModuleResult<()> {
        unsupported("create_experiment")
    }

    /// Choose a variant for display.
    ///
    /// # Errors
    ///
    /// Any module-side failure, including an unknown experiment.
    fn select_variant(&mut self, experiment_id: &str) -> ModuleResult<Variant> {
        unsupported("select_variant")
    }

    /// Record an impression (`conversion == false`) or a conversion.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn record_outcome(
        &mut self,
        experiment_id: &str,
        variant_id: &str,
        conversion: bool,
    ) -> ModuleResult<()> {
        unsupported("record_outcome")
    }

    /// Produce a mutated blueprint from a serialized snapshot.
    ///
    /// # Errors
    ///
    /// Any module-side failure.
    fn mutate_blueprint(
        &mut self,
        snapshot: &str,
        strategy: MutationStrategy,
    ) -> ModuleResult<String> {
        unsupported("mutate_blueprint")
    }
}

/// Produces the compute module during `init()`.
#[async_trait(?Send)]
pub trait ModuleLoader {
    /// Load and initialize the module.
    ///
    /// # Errors
    ///
    /// [`ModuleError::Unavailable`] when no module exists in this
    /// environment; the bridge then runs local-only.
    async fn load(&self) -> ModuleResult<Box<dyn ComputeModule>>;
}

/// Loader for environments without a compute module.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModule;

#[async_trait(?Send)]
impl ModuleLoader for NoModule {
    async fn load(&self) -> ModuleResult<Box<dyn ComputeModule>> {
        Err(ModuleError::Unavailable(
            "no compute module in this build".to_string(),
        ))
    }
}

/// Loader that hands out a module constructed up front.
///
/// The module is handed out once; later loads report it unavailable.
pub struct Preloaded(RefCell<Option<Box<dyn ComputeModule>>>);

impl Preloaded {
    /// Wrap an already-built module.
    #[must_use]
    pub fn new(module: impl ComputeModule + 'static) -> Self {
        Self(RefCell::new(Some(Box::new(module))))
    }
}

impl std::fmt::Debug for Preloaded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preloaded")
            .field("taken", &self.0.borrow().is_none())
            .finish()
    }
}

#[async_trait(?Send)]
impl ModuleLoader for Preloaded {
    async fn load(&self) -> ModuleResult<Box<dyn ComputeModule>> {
        self.0
            .borrow_mut()
            .take()
            .ok_or_else(|| ModuleError::Unavailable("module already loaded".to_string()))
    }
}

/// Shared, guarded access to a loaded module.
#[derive(Clone)]
pub struct ModuleHandle {
    module: Rc<RefCell<Box<dyn ComputeModule>>>,
    diagnostics: Rc<Diagnostics>,
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl ModuleHandle {
    /// Accept a loaded module after checking its contract version.
    ///
    /// # Errors
    ///
    /// [`ModuleError::VersionMismatch`] if the module speaks another
    /// version, or [`ModuleError::Panicked`] if asking it panics.
    pub fn attach(
        module: Box<dyn ComputeModule>,
        diagnostics: Rc<Diagnostics>,
    ) -> ModuleResult<Self> {
        let found = panic::catch_unwind(AssertUnwindSafe(|| module.contract_version()))
            .map_err(|_| ModuleError::Panicked("contract_version"))?;
        if found != CONTRACT_VERSION {
            return Err(ModuleError::VersionMismatch {
                expected: CONTRACT_VERSION,
                found,
            });
        }
        Ok(Self {
            module: Rc::new(RefCell::new(module)),
            diagnostics,
        })
    }

    /// Run one module operation. Failures and panics are recorded and
    /// become `None`.
    pub fn call<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut dyn ComputeModule) -> ModuleResult<T>,
    ) -> Option<T> {
        let outcome = match self.module.try_borrow_mut() {
            Ok(mut module) => panic::catch_unwind(AssertUnwindSafe(|| f(module.as_mut())))
                .unwrap_or(Err(ModuleError::Panicked(op))),
            Err(_) => Err(ModuleError::Failed(format!("re-entrant call to {op}"))),
        };

        match outcome {
            Ok(value) => Some(value),
            Err(ModuleError::Unsupported(name)) => {
                tracing::trace!(op = name, "Operation not provided by compute module");
                None
            }
            Err(error) => {
                self.diagnostics.record_failure(op, &error);
                None
            }
        }
    }

    /// Whether the module advertises a capability. A panic counts as `false`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.call("supports", |m| Ok(m.supports(capability)))
            .unwrap_or(false)
    }

    /// Failure diagnostics shared with the bridge.
    #[must_use]
    pub fn diagnostics(&self) -> &Rc<Diagnostics> {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    struct Versioned(u32);

    impl ComputeModule for Versioned {
        fn contract_version(&self) -> u32 {
            self.0
        }

        fn hit_test(&mut self, _x: f32, _y: f32) -> ModuleResult<Option<ElementId>> {
            Err(ModuleError::Failed("index corrupt".into()))
        }

        fn fire_state_trigger(&mut self, _event: &str) -> ModuleResult<bool> {
            panic!("state machine exploded")
        }

        fn get_variable(&self, name: &str) -> ModuleResult<serde_json::Value> {
            Ok(serde_json::json!({ "name": name }))
        }
    }

    fn diagnostics() -> Rc<Diagnostics> {
        Rc::new(Diagnostics::new(Rc::new(ManualClock::default()), 5000))
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let err = ModuleHandle::attach(Box::new(Versioned(2)), diagnostics())
            .expect_err("version 2 must be rejected");
        assert!(matches!(
            err,
            ModuleError::VersionMismatch {
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn failures_and_panics_become_none() {
        let diagnostics = diagnostics();
        let handle =
            ModuleHandle::attach(Box::new(Versioned(CONTRACT_VERSION)), Rc::clone(&diagnostics))
                .expect("matching version");

        assert_eq!(handle.call("hit_test", |m| m.hit_test(1.0, 1.0)), None);
        assert_eq!(
            handle.call("fire_state_trigger", |m| m.fire_state_trigger("go")),
            None
        );
        assert_eq!(diagnostics.failure_count("hit_test"), 1);
        assert_eq!(diagnostics.failure_count("fire_state_trigger"), 1);

        // Still usable after a panic.
        let value = handle.call("get_variable", |m| m.get_variable("theme"));
        assert_eq!(value, Some(serde_json::json!({ "name": "theme" })));
    }

    #[test]
    fn unsupported_operations_are_not_failures() {
        let diagnostics = diagnostics();
        let handle =
            ModuleHandle::attach(Box::new(Versioned(CONTRACT_VERSION)), Rc::clone(&diagnostics))
                .expect("matching version");

        assert_eq!(handle.call("layout_dump", |m| m.layout_dump()), None);
        assert!(!handle.supports(Capability::Classifier));
        assert_eq!(diagnostics.total_failures(), 0);
    }

    #[test]
    fn no_module_loader_reports_unavailable() {
        let result = futures::executor::block_on(NoModule.load());
        assert!(matches!(result, Err(ModuleError::Unavailable(_))));
    }

    #[test]
    fn preloaded_hands_out_module_once() {
        let loader = Preloaded::new(Versioned(CONTRACT_VERSION));
        assert!(futures::executor::block_on(loader.load()).is_ok());
        assert!(futures::executor::block_on(loader.load()).is_err());
    }
}
