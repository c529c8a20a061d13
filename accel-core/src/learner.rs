//! # Online Learner
//!
//! Logistic regression predicting whether a hover will turn into a click,
//! over two normalized features (pointer velocity and hover duration) and
//! a bias.
//!
//! ```text
//!   z = w_v * (velocity / velocity_scale)
//!     + w_d * (hover_ms / hover_scale)
//!     + bias
//!   p = sigmoid(z)         reported only when p > prediction_threshold
//! ```
//!
//! The algorithm runs either locally ([`LocalModel`]) or inside the compute
//! module ([`ModuleModel`]). Both implement [`InteractionModel`], and the
//! pure functions in [`logistic`] define the computation either side must
//! reproduce.

use serde::{Deserialize, Serialize};

use crate::config::TrainingParams;
use crate::geometry::ElementId;
use crate::module::{Capability, ModuleHandle};
use crate::storage::WeightStore;
use crate::telemetry::TelemetrySample;

/// The complete classifier state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Velocity coefficient.
    pub velocity: f64,
    /// Hover duration coefficient.
    pub duration: f64,
    /// Intercept.
    pub bias: f64,
}

impl Default for Weights {
    /// Warm start: long hovers lean towards a click, the bias keeps
    /// untrained predictions quiet.
    fn default() -> Self {
        Self {
            velocity: 0.5,
            duration: 2.0,
            bias: -3.0,
        }
    }
}

/// A positive interaction forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Element expected to be interacted with.
    pub target_element_id: ElementId,
    /// Probability, above the prediction threshold.
    pub confidence: f64,
    /// Expected interaction; always `"click"` today.
    pub predicted_action: String,
}

/// Reference implementation of the classifier maths.
pub mod logistic {
    use super::Weights;
    use crate::config::TrainingParams;
    use crate::telemetry::TelemetrySample;

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }

    fn activation(weights: &Weights, velocity: f64, duration: f64) -> f64 {
        velocity * weights.velocity + duration * weights.duration + weights.bias
    }

    /// Interaction probability for raw (un-normalized) inputs.
    #[must_use]
    pub fn probability(
        weights: &Weights,
        hover_ms: f64,
        velocity: f64,
        params: &TrainingParams,
    ) -> f64 {
        sigmoid(activation(
            weights,
            velocity / params.velocity_scale,
            hover_ms / params.hover_scale,
        ))
    }

    /// Batch gradient descent over `samples`, starting from `weights`.
    ///
    /// Each epoch averages the gradient over every sample before updating.
    /// An empty batch returns `weights` unchanged.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // batch sizes are tiny
    pub fn train(weights: Weights, samples: &[TelemetrySample], params: &TrainingParams) -> Weights {
        if samples.is_empty() {
            return weights;
        }
        let normalized: Vec<(f64, f64, f64)> = samples
            .iter()
            .map(|s| {
                (
                    s.velocity / params.velocity_scale,
                    s.hover_duration / params.hover_scale,
                    if s.clicked { 1.0 } else { 0.0 },
                )
            })
            .collect();
        let m = normalized.len() as f64;

        let mut w = weights;
        for _ in 0..params.epochs {
            let (mut d_v, mut d_t, mut d_b) = (0.0, 0.0, 0.0);
            for &(v, t, y) in &normalized {
                let error = sigmoid(activation(&w, v, t)) - y;
                d_v += error * v;
                d_t += error * t;
                d_b += error;
            }
            w.velocity -= params.learning_rate * (d_v / m);
            w.duration -= params.learning_rate * (d_t / m);
            w.bias -= params.learning_rate * (d_b / m);
        }
        w
    }
}

/// One execution backend of the classifier.
pub trait InteractionModel: std::fmt::Debug {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Current weights.
    fn weights(&self) -> Weights;

    /// Replace the weights.
    fn load_weights(&mut self, weights: Weights);

    /// Run one training pass. `None` if the backend failed.
    fn train(&mut self, samples: &[TelemetrySample], params: &TrainingParams) -> Option<Weights>;

    /// Interaction probability. `None` if the backend failed.
    fn probability(&self, hover_ms: f64, velocity: f64, params: &TrainingParams) -> Option<f64>;
}

/// Classifier running in-process.
#[derive(Debug, Clone, Default)]
pub struct LocalModel {
    weights: Weights,
}

impl LocalModel {
    /// Create a model with the given weights.
    #[must_use]
    pub const fn new(weights: Weights) -> Self {
        Self { weights }
    }
}

impl InteractionModel for LocalModel {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn weights(&self) -> Weights {
        self.weights
    }

    fn load_weights(&mut self, weights: Weights) {
        self.weights = weights;
    }

    fn train(&mut self, samples: &[TelemetrySample], params: &TrainingParams) -> Option<Weights> {
        self.weights = logistic::train(self.weights, samples, params);
        Some(self.weights)
    }

    fn probability(&self, hover_ms: f64, velocity: f64, params: &TrainingParams) -> Option<f64> {
        Some(logistic::probability(&self.weights, hover_ms, velocity, params))
    }
}

/// Classifier running inside the compute module.
///
/// Keeps the last weights it saw so `weights()` has an answer when the
/// module call fails.
#[derive(Debug, Clone)]
pub struct ModuleModel {
    handle: ModuleHandle,
    last_known: Weights,
}

impl ModuleModel {
    /// Wrap a module handle.
    #[must_use]
    pub fn new(handle: ModuleHandle) -> Self {
        Self {
            handle,
            last_known: Weights::default(),
        }
    }
}

impl InteractionModel for ModuleModel {
    fn backend(&self) -> &'static str {
        "module"
    }

    fn weights(&self) -> Weights {
        self.handle
            .call("classifier_weights", |m| m.classifier_weights())
            .unwrap_or(self.last_known)
    }

    fn load_weights(&mut self, weights: Weights) {
        self.last_known = weights;
        self.handle
            .call("load_classifier_weights", |m| {
                m.load_classifier_weights(&weights)
            });
    }

    fn train(&mut self, samples: &[TelemetrySample], params: &TrainingParams) -> Option<Weights> {
        let weights = self
            .handle
            .call("train_classifier", |m| m.train_classifier(samples, params))?;
        self.last_known = weights;
        Some(weights)
    }

    fn probability(&self, hover_ms: f64, velocity: f64, params: &TrainingParams) -> Option<f64> {
        self.handle.call("predict_interaction", |m| {
            m.predict_interaction(hover_ms, velocity, params)
        })
    }
}

/// Pick the backend by capability: the module's classifier when it has one.
#[must_use]
pub fn select_model(handle: Option<&ModuleHandle>) -> Box<dyn InteractionModel> {
    match handle {
        Some(handle) if handle.supports(Capability::Classifier) => {
            Box::new(ModuleModel::new(handle.clone()))
        }
        _ => Box::new(LocalModel::default()),
    }
}

/// Classifier plus its persistence.
#[derive(Debug)]
pub struct OnlineLearner {
    model: Box<dyn InteractionModel>,
    store: Box<dyn WeightStore>,
    params: TrainingParams,
}

impl OnlineLearner {
    /// Create a learner with the local backend.
    #[must_use]
    pub fn new(store: Box<dyn WeightStore>, params: TrainingParams) -> Self {
        Self::with_model(Box::new(LocalModel::default()), store, params)
    }

    /// Create a learner with a specific backend.
    #[must_use]
    pub fn with_model(
        model: Box<dyn InteractionModel>,
        store: Box<dyn WeightStore>,
        params: TrainingParams,
    ) -> Self {
        Self {
            model,
            store,
            params,
        }
    }

    /// Switch backends. The new backend starts with the current weights.
    pub fn set_model(&mut self, mut model: Box<dyn InteractionModel>) {
        model.load_weights(self.model.weights());
        tracing::debug!(
            from = self.model.backend(),
            to = model.backend(),
            "Switching classifier backend"
        );
        self.model = model;
    }

    /// Name of the active backend.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.model.backend()
    }

    /// Training hyper-parameters.
    #[must_use]
    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    /// Current weights.
    #[must_use]
    pub fn weights(&self) -> Weights {
        self.model.weights()
    }

    /// Load persisted weights, falling back to the warm-start default when
    /// the record is missing or unreadable.
    pub async fn load_weights(&mut self) {
        let weights = match self.store.load().await {
            Ok(Some(weights)) => {
                tracing::info!(?weights, "Loaded classifier weights");
                weights
            }
            Ok(None) => Weights::default(),
            Err(e) => {
                tracing::warn!("Failed to load classifier weights, using defaults: {}", e);
                Weights::default()
            }
        };
        self.model.load_weights(weights);
    }

    /// Run one training pass and persist the result.
    ///
    /// Returns `false` without training when fewer than `min_samples`
    /// samples are given.
    pub fn train(&mut self, samples: &[TelemetrySample]) -> bool {
        if samples.len() < self.params.min_samples {
            return false;
        }
        tracing::debug!(
            samples = samples.len(),
            backend = self.model.backend(),
            "Training interaction classifier"
        );
        if let Some(weights) = self.model.train(samples, &self.params) {
            tracing::debug!(?weights, "Classifier updated");
            if let Err(e) = self.store.save(&weights) {
                tracing::warn!("Failed to persist classifier weights: {}", e);
            }
        }
        true
    }

    /// Forecast a click on `element_id`, if confident enough.
    #[must_use]
    pub fn predict(&self, element_id: &ElementId, hover_ms: f64, velocity: f64) -> Option<Prediction> {
        let probability = self.model.probability(hover_ms, velocity, &self.params)?;
        (probability > self.params.prediction_threshold).then(|| Prediction {
            target_element_id: element_id.clone(),
            confidence: probability,
            predicted_action: "click".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn params() -> TrainingParams {
        TrainingParams::default()
    }

    #[test]
    fn default_weights_are_warm_start() {
        let w = Weights::default();
        assert!((w.velocity - 0.5).abs() < f64::EPSILON);
        assert!((w.duration - 2.0).abs() < f64::EPSILON);
        assert!((w.bias + 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn probability_normalizes_inputs() {
        let w = Weights {
            velocity: 1.0,
            duration: 1.0,
            bias: 0.0,
        };
        // 1000 px and 5000 ms both normalize to 1.0 → z = 2.
        let p = logistic::probability(&w, 5000.0, 1000.0, &params());
        let expected = 1.0 / (1.0 + (-2.0f64).exp());
        assert!((p - expected).abs() < 1e-12);
    }

    #[test]
    fn training_moves_towards_labels() {
        let start = Weights::default();
        let clicked = vec![TelemetrySample::new(100.0, 4000.0, true); 10];
        let trained = logistic::train(start, &clicked, &params());
        assert!(trained.bias > start.bias);
        assert!(trained.duration > start.duration);

        assert_eq!(logistic::train(start, &[], &params()), start);
    }

    #[test]
    fn too_few_samples_is_a_no_op() {
        let mut learner = OnlineLearner::new(Box::new(MemoryStore::new()), params());
        let before = learner.weights();
        assert!(!learner.train(&[TelemetrySample::new(1.0, 1.0, true); 4]));
        assert_eq!(learner.weights(), before);
    }

    #[test]
    fn training_persists_weights() {
        let store = MemoryStore::new();
        let mut learner = OnlineLearner::new(Box::new(store.clone()), params());
        assert!(learner.train(&[TelemetrySample::new(10.0, 3000.0, true); 5]));

        let saved = futures::executor::block_on(store.load())
            .expect("memory store never fails")
            .expect("weights saved");
        assert_eq!(saved, learner.weights());
    }

    #[test]
    fn prediction_requires_threshold() {
        let learner = OnlineLearner::new(Box::new(MemoryStore::new()), params());
        // Default weights: long hover, slow pointer → z = 2*4 - 3 = 5.
        let hit = learner
            .predict(&"cta".into(), 20_000.0, 0.0)
            .expect("confident");
        assert_eq!(hit.target_element_id, "cta");
        assert_eq!(hit.predicted_action, "click");
        assert!(hit.confidence > 0.6);

        // No hover → z = -3.
        assert!(learner.predict(&"cta".into(), 0.0, 0.0).is_none());
    }

    #[test]
    fn missing_record_loads_defaults() {
        let mut learner = OnlineLearner::with_model(
            Box::new(LocalModel::new(Weights {
                velocity: 9.0,
                duration: 9.0,
                bias: 9.0,
            })),
            Box::new(MemoryStore::new()),
            params(),
        );
        futures::executor::block_on(learner.load_weights());
        assert_eq!(learner.weights(), Weights::default());
    }
}
