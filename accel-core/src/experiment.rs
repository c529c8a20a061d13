//! # Experiment Engine
//!
//! A/B style experiments on single elements. Variant storage and selection
//! live in the compute module; this engine decides what to test, records
//! impressions and conversions, and asks for a blueprint mutation once a
//! variant proves itself.
//!
//! ```text
//!   start_experiment(el)       → exp_<el>_base (control), exp_<el>_v1 (glow)
//!   variant_for_element(el)    → select + record impression
//!   record_conversion(el)      → select + record conversion
//!                                 └─ conversions > threshold → mutate once
//! ```
//!
//! Without a compute module every call is a no-op.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::bridge::NativeBridge;
use crate::geometry::ElementId;

/// Shadow applied by the heuristic variant.
pub const HEURISTIC_BOX_SHADOW: &str = "0 0 20px rgba(0, 255, 213, 0.4)";
/// Border colour applied by the heuristic variant.
pub const HEURISTIC_BORDER_COLOR: &str = "#00ffd5";

/// One style configuration under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant id, unique within the experiment.
    pub id: String,
    /// Selection weight.
    pub weight: f64,
    /// Conversions recorded so far.
    pub conversions: u32,
    /// Impressions recorded so far.
    pub impressions: u32,
    /// Styles applied when this variant is shown.
    pub styles_override: serde_json::Value,
}

impl Variant {
    fn fresh(id: String, styles_override: serde_json::Value) -> Self {
        Self {
            id,
            weight: 0.5,
            conversions: 0,
            impressions: 0,
            styles_override,
        }
    }
}

/// How the module should mutate a winning blueprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStrategy {
    /// Optimize for interaction performance.
    #[default]
    Performance,
    /// Rework the layout.
    Layout,
}

impl MutationStrategy {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Layout => "layout",
        }
    }
}

/// Audit entry for one mutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Experiment that triggered the mutation.
    pub experiment_id: String,
    /// Element under test.
    pub element_id: ElementId,
    /// Winning variant.
    pub variant_id: String,
    /// Strategy requested.
    pub strategy: MutationStrategy,
    /// Blueprint returned by the module, `None` if the call failed.
    pub blueprint: Option<String>,
}

/// Experiment id for an element.
#[must_use]
pub fn experiment_id(element_id: &ElementId) -> String {
    format!("exp_{element_id}")
}

/// Builds the control and heuristic variants for an experiment.
#[must_use]
pub fn initial_variants(experiment_id: &str, base_styles: &serde_json::Value) -> [Variant; 2] {
    let mut glow = match base_styles {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    glow.insert("boxShadow".to_string(), HEURISTIC_BOX_SHADOW.into());
    glow.insert("borderColor".to_string(), HEURISTIC_BORDER_COLOR.into());

    [
        Variant::fresh(format!("{experiment_id}_base"), base_styles.clone()),
        Variant::fresh(format!("{experiment_id}_v1"), glow.into()),
    ]
}

/// Tracks running experiments and the mutation audit trail.
#[derive(Debug, Clone)]
pub struct ExperimentEngine {
    active: HashMap<ElementId, String>,
    mutated: HashSet<String>,
    log: Vec<MutationRecord>,
    conversion_threshold: u32,
    strategy: MutationStrategy,
}

impl ExperimentEngine {
    /// Create an engine that mutates after `conversion_threshold` conversions.
    #[must_use]
    pub fn new(conversion_threshold: u32) -> Self {
        Self {
            active: HashMap::new(),
            mutated: HashSet::new(),
            log: Vec::new(),
            conversion_threshold,
            strategy: MutationStrategy::default(),
        }
    }

    /// Use a different mutation strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: MutationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Start an experiment on `element_id`. Returns whether the module
    /// accepted it.
    pub fn start_experiment(
        &mut self,
        bridge: &mut NativeBridge,
        element_id: &ElementId,
        base_styles: &serde_json::Value,
    ) -> bool {
        let id = experiment_id(element_id);
        let variants = initial_variants(&id, base_styles);
        if !bridge.create_experiment(&id, element_id, &variants) {
            return false;
        }
        tracing::info!(experiment = %id, "Experiment started for {}", element_id);
        self.active.insert(element_id.clone(), id);
        true
    }

    /// Whether `element_id` has a running experiment.
    #[must_use]
    pub fn is_active(&self, element_id: &ElementId) -> bool {
        self.active.contains_key(element_id)
    }

    /// Choose the variant to show and record the impression.
    pub fn variant_for_element(
        &mut self,
        bridge: &mut NativeBridge,
        element_id: &ElementId,
    ) -> Option<Variant> {
        let id = self.active.get(element_id)?;
        let variant = bridge.select_variant(id)?;
        bridge.record_experiment_outcome(id, &variant.id, false);
        Some(variant)
    }

    /// Record a conversion against the variant selected now, which may
    /// differ from the one last shown.
    ///
    /// Returns the variant credited.
    pub fn record_conversion(
        &mut self,
        bridge: &mut NativeBridge,
        element_id: &ElementId,
    ) -> Option<Variant> {
        let id = self.active.get(element_id)?.clone();
        let variant = bridge.select_variant(&id)?;
        bridge.record_experiment_outcome(&id, &variant.id, true);
        tracing::debug!(experiment = %id, variant = %variant.id, "Conversion recorded");

        // `variant` predates the conversion just recorded.
        if variant.conversions + 1 > self.conversion_threshold && !self.mutated.contains(&id) {
            self.mutate(bridge, &id, element_id, &variant);
        }
        Some(variant)
    }

    fn mutate(
        &mut self,
        bridge: &mut NativeBridge,
        experiment_id: &str,
        element_id: &ElementId,
        winner: &Variant,
    ) {
        self.mutated.insert(experiment_id.to_string());
        let snapshot = serde_json::json!({
            "experimentId": experiment_id,
            "elementId": element_id,
            "variant": winner,
        })
        .to_string();

        let blueprint = bridge.mutate_blueprint(&snapshot, self.strategy);
        match &blueprint {
            Some(blueprint) => tracing::info!(
                experiment = experiment_id,
                strategy = self.strategy.as_str(),
                "Blueprint mutation produced: {}",
                blueprint
            ),
            None => tracing::warn!(experiment = experiment_id, "Blueprint mutation failed"),
        }

        self.log.push(MutationRecord {
            experiment_id: experiment_id.to_string(),
            element_id: element_id.clone(),
            variant_id: winner.id.clone(),
            strategy: self.strategy,
            blueprint,
        });
    }

    /// Every mutation requested so far, oldest first.
    #[must_use]
    pub fn mutation_log(&self) -> &[MutationRecord] {
        &self.log
    }
}
