//! Classifier convergence on both backends, and its wiring through the bridge.

mod common;

use std::rc::Rc;

use accel_core::{
    Clock, Diagnostics, ElementId, InteractionModel, LocalModel, ManualClock, MemoryStore,
    ModuleHandle, ModuleModel, OnlineLearner, PointerEvent, TelemetrySample, TrainingParams,
    Weights, WeightStore,
};
use common::{ready_bridge, FakeModule};

/// Slow, long hovers end in clicks; fast flybys do not.
fn separable_samples() -> Vec<TelemetrySample> {
    let clicked = (0..25).map(|i| TelemetrySample::new(50.0 + 6.0 * i as f64, 3000.0 + 80.0 * i as f64, true));
    let ignored = (0..25).map(|i| TelemetrySample::new(1500.0 + 60.0 * i as f64, 50.0 + 8.0 * i as f64, false));
    clicked.chain(ignored).collect()
}

fn module_model(fake: &FakeModule) -> Box<dyn InteractionModel> {
    let clock: Rc<dyn Clock> = Rc::new(ManualClock::default());
    let handle = ModuleHandle::attach(
        Box::new(fake.clone()),
        Rc::new(Diagnostics::new(clock, 5_000)),
    )
    .expect("fake speaks the current contract");
    Box::new(ModuleModel::new(handle))
}

fn converges(model: Box<dyn InteractionModel>, store: MemoryStore) -> Weights {
    let mut learner = OnlineLearner::with_model(model, Box::new(store), TrainingParams::default());
    let target = ElementId::from("buy-button");
    assert!(
        learner.predict(&target, 4_000.0, 100.0).is_none(),
        "warm-start weights stay quiet"
    );

    let samples = separable_samples();
    for _ in 0..20 {
        assert!(learner.train(&samples));
    }

    let prediction = learner
        .predict(&target, 4_000.0, 100.0)
        .expect("slow long hover predicts a click");
    assert_eq!(prediction.target_element_id, target);
    assert_eq!(prediction.predicted_action, "click");
    assert!(prediction.confidence > 0.8, "confidence {}", prediction.confidence);
    assert!(learner.predict(&target, 100.0, 2_500.0).is_none());
    learner.weights()
}

#[test]
fn local_backend_learns_separable_interactions() {
    let weights = converges(Box::new(LocalModel::default()), MemoryStore::new());
    assert!(weights.duration > Weights::default().duration);
    assert!(weights.velocity < 0.0);
}

#[test]
fn module_backend_learns_separable_interactions() {
    let fake = FakeModule::new();
    let weights = converges(module_model(&fake), MemoryStore::new());
    assert_eq!(fake.state.borrow().weights, weights);
}

#[test]
fn both_backends_agree() {
    let local = converges(Box::new(LocalModel::default()), MemoryStore::new());
    let module = converges(module_model(&FakeModule::new()), MemoryStore::new());
    assert!((local.velocity - module.velocity).abs() < 1e-9);
    assert!((local.duration - module.duration).abs() < 1e-9);
    assert!((local.bias - module.bias).abs() < 1e-9);
}

#[test]
fn trained_weights_survive_a_restart() {
    let store = MemoryStore::new();
    let trained = converges(Box::new(LocalModel::default()), store.clone());
    assert!(store.raw().is_some());

    let mut restarted =
        OnlineLearner::new(Box::new(store.clone()), TrainingParams::default());
    futures::executor::block_on(restarted.load_weights());
    assert_eq!(restarted.weights(), trained);

    let persisted = futures::executor::block_on(store.load()).expect("readable record");
    assert_eq!(persisted, Some(trained));
}

#[test]
fn corrupt_record_falls_back_to_defaults() {
    let store = MemoryStore::new();
    store.put_raw("{not json");
    let mut learner = OnlineLearner::new(Box::new(store), TrainingParams::default());
    futures::executor::block_on(learner.load_weights());
    assert_eq!(learner.weights(), Weights::default());
}

#[test]
fn bridge_trains_through_the_module_classifier() {
    let clock = ManualClock::default();
    let fake = FakeModule::new();
    let mut bridge = ready_bridge(&clock, fake.clone());
    assert_eq!(bridge.classifier_backend(), "module");

    bridge.log_interaction(&PointerEvent::Hover {
        element_id: "card".into(),
    });
    for step in 1..=8 {
        clock.advance(100);
        bridge.log_interaction(&PointerEvent::Move {
            x: 4.0 * step as f32,
            y: 3.0 * step as f32,
        });
    }
    clock.advance(600);
    bridge.log_interaction(&PointerEvent::Click);
    assert_eq!(bridge.buffered_samples(), 7, "the first move only sets the origin");

    assert!(bridge.train_model());
    assert_eq!(bridge.buffered_samples(), 0);
    assert_ne!(fake.state.borrow().weights, Weights::default());
    assert_eq!(bridge.classifier_weights(), fake.state.borrow().weights);
}

#[test]
fn module_without_classifier_keeps_local_backend() {
    let clock = ManualClock::default();
    let bridge = ready_bridge(&clock, FakeModule::new().without_classifier());
    assert_eq!(bridge.classifier_backend(), "local");
}
