//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use accel_core::{
    logistic, BridgeConfig, Capability, Command, ComputeModule, ElementId, KeyEvent, ManualClock,
    MemoryStore, ModuleError, ModuleResult, MutationStrategy, NativeBridge, Preloaded, Rect,
    StateSnapshot, TelemetrySample, TrainingParams, Variant, Weights, CONTRACT_VERSION,
};

/// Everything the fake module has been asked to do.
#[derive(Debug, Default)]
pub struct FakeState {
    pub applied: Vec<Command>,
    pub synced_states: Vec<StateSnapshot>,
    pub synced_elements: Vec<(ElementId, Rect)>,
    pub frames_advanced: Vec<f32>,
    pub failing_kinds: HashSet<String>,
    pub stalled: bool,
    pub hit: Option<ElementId>,
    pub variables: HashMap<String, serde_json::Value>,
    pub weights: Weights,
    pub experiments: HashMap<String, Vec<Variant>>,
    pub mutations: Vec<(String, MutationStrategy)>,
}

/// A scriptable compute module. Clones share state.
#[derive(Debug, Clone)]
pub struct FakeModule {
    pub state: Rc<RefCell<FakeState>>,
    pub version: u32,
    pub classifier: bool,
}

impl FakeModule {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(FakeState::default())),
            version: CONTRACT_VERSION,
            classifier: true,
        }
    }

    pub fn without_classifier(mut self) -> Self {
        self.classifier = false;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn applied_kinds(&self) -> Vec<String> {
        self.state
            .borrow()
            .applied
            .iter()
            .map(|c| c.kind.clone())
            .collect()
    }
}

impl ComputeModule for FakeModule {
    fn contract_version(&self) -> u32 {
        self.version
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Classifier => self.classifier,
            Capability::Animations | Capability::HitTest | Capability::Experiments => true,
        }
    }

    fn sync_element(&mut self, id: &ElementId, rect: Rect) -> ModuleResult<()> {
        self.state
            .borrow_mut()
            .synced_elements
            .push((id.clone(), rect));
        Ok(())
    }

    fn sync_state(&mut self, state: &StateSnapshot) -> ModuleResult<()> {
        self.state.borrow_mut().synced_states.push(state.clone());
        Ok(())
    }

    fn apply_command(&mut self, command: &Command) -> ModuleResult<()> {
        if command.kind == "panic" {
            panic!("command handler crashed");
        }
        if self.state.borrow().failing_kinds.contains(&command.kind) {
            return Err(ModuleError::Failed(format!("rejected {}", command.kind)));
        }
        self.state.borrow_mut().applied.push(command.clone());
        Ok(())
    }

    fn state_deltas(&mut self) -> ModuleResult<Vec<serde_json::Value>> {
        let applied = std::mem::take(&mut self.state.borrow_mut().applied);
        Ok(applied
            .into_iter()
            .map(|c| serde_json::json!({ "applied": c.kind }))
            .collect())
    }

    fn hit_test(&mut self, _x: f32, _y: f32) -> ModuleResult<Option<ElementId>> {
        Ok(self.state.borrow().hit.clone())
    }

    fn advance_animations(&mut self, dt: f32) -> ModuleResult<()> {
        let mut state = self.state.borrow_mut();
        if state.stalled {
            return Err(ModuleError::Failed("animation thread stuck".into()));
        }
        state.frames_advanced.push(dt);
        Ok(())
    }

    fn batch_transforms(&mut self) -> ModuleResult<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0, 1.0, 10.0, 20.0])
    }

    fn fire_state_trigger(&mut self, event: &str) -> ModuleResult<bool> {
        Ok(event == "next")
    }

    fn get_variable(&self, name: &str) -> ModuleResult<serde_json::Value> {
        self.state
            .borrow()
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError::Failed(format!("unknown variable {name}")))
    }

    fn set_variable(&mut self, name: &str, value: &serde_json::Value) -> ModuleResult<()> {
        self.state
            .borrow_mut()
            .variables
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn constrain_drag(&mut self, id: &ElementId, x: f32, y: f32) -> ModuleResult<Vec<f32>> {
        if id.as_str() == "free" {
            return Ok(vec![x]);
        }
        Ok(vec![(x / 10.0).round() * 10.0, (y / 10.0).round() * 10.0])
    }

    fn element_bounds(&self, id: &ElementId) -> ModuleResult<Vec<f32>> {
        if id.as_str() == "broken" {
            return Ok(vec![1.0, 2.0]);
        }
        Ok(vec![5.0, 6.0, 70.0, 80.0])
    }

    fn healing_placeholder(
        &self,
        _width: u32,
        _height: u32,
        _color_start: &str,
        _color_end: &str,
    ) -> ModuleResult<String> {
        Ok("<svg/>".to_string())
    }

    fn translate_key(&mut self, key: &KeyEvent) -> ModuleResult<Option<String>> {
        Ok(match (key.key.as_str(), key.ctrl, key.shift) {
            ("z", true, false) => Some("undo".to_string()),
            ("z", true, true) => Some("redo".to_string()),
            ("x", false, false) => Some(String::new()),
            _ => None,
        })
    }

    fn train_classifier(
        &mut self,
        samples: &[TelemetrySample],
        params: &TrainingParams,
    ) -> ModuleResult<Weights> {
        let mut state = self.state.borrow_mut();
        state.weights = logistic::train(state.weights, samples, params);
        Ok(state.weights)
    }

    fn classifier_weights(&self) -> ModuleResult<Weights> {
        Ok(self.state.borrow().weights)
    }

    fn load_classifier_weights(&mut self, weights: &Weights) -> ModuleResult<()> {
        self.state.borrow_mut().weights = *weights;
        Ok(())
    }

    fn predict_interaction(
        &self,
        hover_ms: f64,
        velocity: f64,
        params: &TrainingParams,
    ) -> ModuleResult<f64> {
        Ok(logistic::probability(
            &self.state.borrow().weights,
            hover_ms,
            velocity,
            params,
        ))
    }

    fn create_experiment(
        &mut self,
        experiment_id: &str,
        _element_id: &ElementId,
        variants: &[Variant],
    ) -> ModuleResult<()> {
        self.state
            .borrow_mut()
            .experiments
            .insert(experiment_id.to_string(), variants.to_vec());
        Ok(())
    }

    /// Deterministic: the highest weight wins, the first variant on ties.
    fn select_variant(&mut self, experiment_id: &str) -> ModuleResult<Variant> {
        let state = self.state.borrow();
        let variants = state
            .experiments
            .get(experiment_id)
            .ok_or_else(|| ModuleError::Failed(format!("unknown experiment {experiment_id}")))?;
        variants
            .iter()
            .fold(None::<&Variant>, |best, v| match best {
                Some(b) if b.weight >= v.weight => Some(b),
                _ => Some(v),
            })
            .cloned()
            .ok_or_else(|| ModuleError::Failed("experiment has no variants".into()))
    }

    fn record_outcome(
        &mut self,
        experiment_id: &str,
        variant_id: &str,
        conversion: bool,
    ) -> ModuleResult<()> {
        let mut state = self.state.borrow_mut();
        let variant = state
            .experiments
            .get_mut(experiment_id)
            .and_then(|vs| vs.iter_mut().find(|v| v.id == variant_id))
            .ok_or_else(|| ModuleError::Failed(format!("unknown variant {variant_id}")))?;
        if conversion {
            variant.conversions += 1;
        } else {
            variant.impressions += 1;
        }
        Ok(())
    }

    fn mutate_blueprint(
        &mut self,
        snapshot: &str,
        strategy: MutationStrategy,
    ) -> ModuleResult<String> {
        let mut state = self.state.borrow_mut();
        state.mutations.push((snapshot.to_string(), strategy));
        Ok(format!("blueprint-{}", state.mutations.len()))
    }
}

/// A bridge on a manual clock with an in-memory store, not yet initialized.
pub fn bridge_with(clock: &ManualClock, module: FakeModule) -> NativeBridge {
    bridge_with_config(clock, module, BridgeConfig::default())
}

/// Like [`bridge_with`] with a custom configuration.
pub fn bridge_with_config(
    clock: &ManualClock,
    module: FakeModule,
    config: BridgeConfig,
) -> NativeBridge {
    NativeBridge::builder()
        .config(config)
        .clock(Rc::new(clock.clone()))
        .loader(Preloaded::new(module))
        .store(MemoryStore::new())
        .build()
}

/// An initialized bridge attached to `module`.
pub fn ready_bridge(clock: &ManualClock, module: FakeModule) -> NativeBridge {
    let mut bridge = bridge_with(clock, module);
    futures::executor::block_on(bridge.init());
    assert!(bridge.is_ready(), "fake module should attach");
    bridge
}
