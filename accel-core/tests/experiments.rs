//! Experiment lifecycle against a module that stores variants.

mod common;

use accel_core::experiment::{HEURISTIC_BORDER_COLOR, HEURISTIC_BOX_SHADOW};
use accel_core::{ElementId, ExperimentEngine, ManualClock, MutationStrategy};
use common::{ready_bridge, FakeModule};
use serde_json::json;

#[test]
fn start_registers_control_and_heuristic_variants() {
    let clock = ManualClock::default();
    let fake = FakeModule::new();
    let mut bridge = ready_bridge(&clock, fake.clone());
    let mut engine = ExperimentEngine::new(5);
    let hero = ElementId::from("hero");

    assert!(engine.start_experiment(&mut bridge, &hero, &json!({ "color": "red" })));
    assert!(engine.is_active(&hero));

    let state = fake.state.borrow();
    let variants = &state.experiments["exp_hero"];
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].id, "exp_hero_base");
    assert_eq!(variants[0].styles_override, json!({ "color": "red" }));
    assert_eq!(variants[1].id, "exp_hero_v1");
    assert_eq!(variants[1].styles_override["color"], "red");
    assert_eq!(variants[1].styles_override["boxShadow"], HEURISTIC_BOX_SHADOW);
    assert_eq!(variants[1].styles_override["borderColor"], HEURISTIC_BORDER_COLOR);
}

#[test]
fn impressions_are_recorded_on_selection() {
    let clock = ManualClock::default();
    let fake = FakeModule::new();
    let mut bridge = ready_bridge(&clock, fake.clone());
    let mut engine = ExperimentEngine::new(5);
    let hero = ElementId::from("hero");
    engine.start_experiment(&mut bridge, &hero, &json!({}));

    for _ in 0..3 {
        let shown = engine
            .variant_for_element(&mut bridge, &hero)
            .expect("variant selected");
        assert_eq!(shown.id, "exp_hero_base");
    }

    let state = fake.state.borrow();
    assert_eq!(state.experiments["exp_hero"][0].impressions, 3);
    assert_eq!(state.experiments["exp_hero"][0].conversions, 0);
}

#[test]
fn sixth_conversion_triggers_a_single_mutation() {
    let clock = ManualClock::default();
    let fake = FakeModule::new();
    let mut bridge = ready_bridge(&clock, fake.clone());
    let mut engine = ExperimentEngine::new(5);
    let hero = ElementId::from("hero");
    engine.start_experiment(&mut bridge, &hero, &json!({}));

    for n in 1..=5 {
        engine.record_conversion(&mut bridge, &hero);
        assert!(engine.mutation_log().is_empty(), "no mutation after {n}");
    }

    let credited = engine
        .record_conversion(&mut bridge, &hero)
        .expect("conversion recorded");
    assert_eq!(credited.id, "exp_hero_base");
    assert_eq!(engine.mutation_log().len(), 1);

    engine.record_conversion(&mut bridge, &hero);
    assert_eq!(engine.mutation_log().len(), 1, "mutates once per experiment");

    let record = &engine.mutation_log()[0];
    assert_eq!(record.experiment_id, "exp_hero");
    assert_eq!(record.element_id, hero);
    assert_eq!(record.variant_id, "exp_hero_base");
    assert_eq!(record.strategy, MutationStrategy::Performance);
    assert_eq!(record.blueprint.as_deref(), Some("blueprint-1"));

    let state = fake.state.borrow();
    assert_eq!(state.experiments["exp_hero"][0].conversions, 7);
    assert_eq!(state.mutations.len(), 1);
    let (snapshot, strategy) = &state.mutations[0];
    assert_eq!(*strategy, MutationStrategy::Performance);
    let snapshot: serde_json::Value = serde_json::from_str(snapshot).expect("snapshot is JSON");
    assert_eq!(snapshot["experimentId"], "exp_hero");
    assert_eq!(snapshot["elementId"], "hero");
    assert_eq!(snapshot["variant"]["id"], "exp_hero_base");
}

#[test]
fn strategy_is_forwarded() {
    let clock = ManualClock::default();
    let fake = FakeModule::new();
    let mut bridge = ready_bridge(&clock, fake.clone());
    let mut engine = ExperimentEngine::new(0).with_strategy(MutationStrategy::Layout);
    let hero = ElementId::from("hero");
    engine.start_experiment(&mut bridge, &hero, &json!({}));

    engine.record_conversion(&mut bridge, &hero);

    assert_eq!(fake.state.borrow().mutations[0].1, MutationStrategy::Layout);
}

#[test]
fn unknown_element_is_ignored() {
    let clock = ManualClock::default();
    let fake = FakeModule::new();
    let mut bridge = ready_bridge(&clock, fake.clone());
    let mut engine = ExperimentEngine::new(5);
    let ghost = ElementId::from("ghost");

    assert!(engine.variant_for_element(&mut bridge, &ghost).is_none());
    assert!(engine.record_conversion(&mut bridge, &ghost).is_none());
    assert!(fake.state.borrow().experiments.is_empty());
}
