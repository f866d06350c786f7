//! Aggregation of participant updates into the global model.
//!
//! The engine owns the only live [`GlobalModel`] of a coordinator. Rounds
//! are discrete and sequential; the `&mut self` receiver on the mutating
//! methods is the single-writer discipline. A round either fully succeeds
//! — the global weights are replaced in one move after the complete result
//! has been computed — or fails and leaves the global model bit-for-bit
//! unchanged. Partial aggregation that silently drops a bad update is not
//! possible: it would bias the model without any visible signal.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use silo_core::{
    model::{LayoutError, WeightLayout, WeightSet},
    privacy::{EncryptedUpdate, PrivacyContext, PrivacyError},
};

#[derive(Error, Debug)]
/// Errors related to an aggregation round.
///
/// Any of these aborts the whole round.
pub enum AggregationError {
    #[error("an aggregation round needs at least one update")]
    EmptyRound,

    #[error("update {index} rejected: {source}")]
    LayoutMismatch { index: usize, source: LayoutError },

    #[error("{weights} relative weights were supplied for {updates} updates")]
    WeightCount { updates: usize, weights: usize },

    #[error("update rejected: {0}")]
    Privacy(#[from] PrivacyError),
}

/// Computes the per-coordinate weighted arithmetic mean of the updates.
///
/// Every update must conform to `layout`. With no relative weights each
/// update contributes `1/N`. The result is *not* renormalized: weights
/// summing to `s` scale the result by `s`; callers supplying custom
/// weights (by data volume, quality score, ...) are responsible for
/// normalization.
///
/// This is the single weighted-average implementation behind both the
/// encrypted and the plaintext aggregation paths.
///
/// # Errors
/// Fails if `updates` is empty, a relative-weight count disagrees with the
/// update count, or any update fails layout validation.
pub fn weighted_mean(
    layout: &WeightLayout,
    updates: &[WeightSet],
    relative_weights: Option<&[f64]>,
) -> Result<WeightSet, AggregationError> {
    if updates.is_empty() {
        return Err(AggregationError::EmptyRound);
    }
    if let Some(weights) = relative_weights {
        if weights.len() != updates.len() {
            return Err(AggregationError::WeightCount {
                updates: updates.len(),
                weights: weights.len(),
            });
        }
    }
    for (index, update) in updates.iter().enumerate() {
        layout
            .matches(update)
            .map_err(|source| AggregationError::LayoutMismatch { index, source })?;
    }

    let uniform = 1. / updates.len() as f64;
    let mut combined = WeightSet::zeros(layout);
    for (position, update) in updates.iter().enumerate() {
        let weight = relative_weights.map_or(uniform, |w| w[position]);
        for (acc, tensor) in combined.iter_mut().zip(update.iter()) {
            for (sum, value) in acc.data_mut().iter_mut().zip(tensor.data().iter()) {
                *sum += weight * value;
            }
        }
    }
    Ok(combined)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The current global model of a coordinator.
///
/// Exactly one instance is live per coordinator; it is mutated only by the
/// [`AggregationEngine`] that owns it.
pub struct GlobalModel {
    /// The model name under which releases are registered.
    pub name: String,
    /// The version of the last installed release, if any.
    pub version: Option<String>,
    /// The current global weights.
    pub weights: WeightSet,
    /// Arbitrary additional metadata.
    pub metadata: HashMap<String, String>,
}

impl GlobalModel {
    /// Creates a fresh global model of zeros conforming to the layout.
    pub fn new(name: impl Into<String>, layout: &WeightLayout) -> Self {
        Self {
            name: name.into(),
            version: None,
            weights: WeightSet::zeros(layout),
            metadata: HashMap::new(),
        }
    }
}

/// Scoring of a weight set against labeled evaluation data.
///
/// This is the contract boundary to the external training/evaluation
/// collaborator: the engine hands over the current global weights and gets
/// back a mapping of named numeric metrics (loss, accuracy, AUC, ...). No
/// further semantics are owned here.
pub trait Evaluator {
    fn evaluate(
        &self,
        weights: &WeightSet,
        features: &[Vec<f64>],
        labels: &[f64],
    ) -> HashMap<String, f64>;
}

/// The aggregation engine: the configured layout plus the global model it
/// exclusively owns.
pub struct AggregationEngine {
    layout: WeightLayout,
    global: GlobalModel,
    rounds: u64,
}

impl AggregationEngine {
    /// Creates an engine with a zeroed global model for the given layout.
    pub fn new(model_name: impl Into<String>, layout: WeightLayout) -> Self {
        let global = GlobalModel::new(model_name, &layout);
        Self {
            layout,
            global,
            rounds: 0,
        }
    }

    /// Creates an engine around a previously persisted global model.
    ///
    /// # Errors
    /// Fails if the restored weights do not conform to the layout.
    pub fn with_model(layout: WeightLayout, global: GlobalModel) -> Result<Self, AggregationError> {
        layout
            .matches(&global.weights)
            .map_err(|source| AggregationError::LayoutMismatch { index: 0, source })?;
        Ok(Self {
            layout,
            global,
            rounds: 0,
        })
    }

    /// Gets the layout this engine validates updates against.
    pub fn layout(&self) -> &WeightLayout {
        &self.layout
    }

    /// Gets the current global model.
    pub fn global(&self) -> &GlobalModel {
        &self.global
    }

    /// Gets the number of successfully aggregated rounds.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Combines plaintext updates into new global weights.
    ///
    /// On success the global weights are replaced atomically with the
    /// weighted mean of the updates (see [`weighted_mean`] for the exact
    /// semantics) and a reference to the new weights is returned. On
    /// failure the global model is left unchanged.
    pub fn aggregate(
        &mut self,
        updates: &[WeightSet],
        relative_weights: Option<&[f64]>,
    ) -> Result<&WeightSet, AggregationError> {
        let combined = weighted_mean(&self.layout, updates, relative_weights)?;
        self.install(combined, updates.len());
        Ok(&self.global.weights)
    }

    /// Decrypts a round of encrypted updates and aggregates them.
    ///
    /// The updates have no data dependency on each other, so they are
    /// decrypted in parallel on the rayon pool; the reduction waits for all
    /// of them. A single decrypt failure aborts the whole round before any
    /// mutation of the global model.
    pub fn decrypt_and_aggregate(
        &mut self,
        context: &PrivacyContext,
        updates: &[EncryptedUpdate],
        relative_weights: Option<&[f64]>,
    ) -> Result<&WeightSet, AggregationError> {
        if updates.is_empty() {
            return Err(AggregationError::EmptyRound);
        }
        let decrypted = updates
            .par_iter()
            .map(|update| context.decrypt(&update.payload))
            .collect::<Result<Vec<WeightSet>, PrivacyError>>()?;
        self.aggregate(&decrypted, relative_weights)
    }

    /// Encrypts the current global weights for distribution to participants.
    pub fn encrypted_global(&self, context: &PrivacyContext) -> Result<Vec<u8>, PrivacyError> {
        context.encrypt(&self.global.weights)
    }

    /// Scores the current global model via the evaluation collaborator.
    pub fn evaluate<E: Evaluator>(
        &self,
        evaluator: &E,
        features: &[Vec<f64>],
        labels: &[f64],
    ) -> HashMap<String, f64> {
        evaluator.evaluate(&self.global.weights, features, labels)
    }

    /// Marks the global model as carrying the given released version.
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.global.version = Some(version.into());
    }

    fn install(&mut self, weights: WeightSet, update_count: usize) {
        self.global.weights = weights;
        self.rounds += 1;
        info!(
            "aggregated {} updates into global model {} (round {})",
            update_count, self.global.name, self.rounds
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::{
        ckks::CkksConfig,
        model::WeightTensor,
        privacy::PrivacyContext,
        ParticipantId,
    };

    fn test_layout() -> WeightLayout {
        WeightLayout::new(vec![vec![4, 2], vec![2]])
    }

    fn weights(values: [f64; 10]) -> WeightSet {
        WeightSet::new(vec![
            WeightTensor::new(vec![4, 2], values[..8].to_vec()).unwrap(),
            WeightTensor::new(vec![2], values[8..].to_vec()).unwrap(),
        ])
    }

    fn test_context() -> PrivacyContext {
        let config = CkksConfig {
            poly_modulus_degree: 32,
            coeff_modulus_bits: vec![40, 30],
            scale_bits: 30,
        };
        PrivacyContext::new(config, test_layout()).unwrap()
    }

    fn encrypted(context: &PrivacyContext, id: &str, update: &WeightSet) -> EncryptedUpdate {
        EncryptedUpdate::new(
            ParticipantId::new(id),
            1,
            context.encrypt(update).unwrap(),
        )
    }

    fn assert_close(actual: &WeightSet, expected: &WeightSet, tolerance: f64) {
        for (a, e) in actual.flatten().iter().zip(expected.flatten().iter()) {
            assert!((a - e).abs() <= tolerance, "|{} - {}| > {}", a, e, tolerance);
        }
    }

    #[test]
    fn test_two_participant_scenario() {
        // per position: 0.25 * A + 0.75 * B, verifiable by hand
        let a = weights([0., 1., 2., 3., 4., 5., 6., 7., 8., 9.]);
        let b = weights([8., 8., 8., 8., 8., 8., 8., 8., 8., 8.]);

        let mut engine = AggregationEngine::new("demand", test_layout());
        let combined = engine
            .aggregate(&[a, b], Some(&[0.25, 0.75]))
            .unwrap()
            .clone();
        let expected = weights([6., 6.25, 6.5, 6.75, 7., 7.25, 7.5, 7.75, 8., 8.25]);
        assert_eq!(combined, expected);
        assert_eq!(engine.global().weights, expected);
        assert_eq!(engine.rounds(), 1);
    }

    #[test]
    fn test_uniform_aggregation_identity() {
        let update = weights([1., -2., 3., -4., 5., -6., 7., -8., 9., -10.]);
        let mut engine = AggregationEngine::new("demand", test_layout());
        let combined = engine
            .aggregate(&[update.clone(), update.clone(), update.clone()], None)
            .unwrap();
        assert_close(combined, &update, 1e-12);
    }

    #[test]
    fn test_weighted_mean_scales_with_weight_sum() {
        let update = weights([1., 2., 3., 4., 5., 6., 7., 8., 9., 10.]);
        let layout = test_layout();

        let unit = weighted_mean(&layout, &[update.clone(), update.clone()], Some(&[0.5, 0.5]))
            .unwrap();
        assert_close(&unit, &update, 1e-12);

        // weights summing to 2 scale the result linearly
        let doubled =
            weighted_mean(&layout, &[update.clone(), update.clone()], Some(&[1., 1.])).unwrap();
        let expected = weights([2., 4., 6., 8., 10., 12., 14., 16., 18., 20.]);
        assert_close(&doubled, &expected, 1e-12);
    }

    #[test]
    fn test_empty_round_rejected() {
        let mut engine = AggregationEngine::new("demand", test_layout());
        assert!(matches!(
            engine.aggregate(&[], None).unwrap_err(),
            AggregationError::EmptyRound
        ));
    }

    #[test]
    fn test_weight_count_mismatch_rejected() {
        let update = weights([0.; 10]);
        let mut engine = AggregationEngine::new("demand", test_layout());
        assert!(matches!(
            engine
                .aggregate(&[update.clone(), update], Some(&[1.]))
                .unwrap_err(),
            AggregationError::WeightCount {
                updates: 2,
                weights: 1
            }
        ));
    }

    #[test]
    fn test_misshaped_update_leaves_global_untouched() {
        let good = weights([1.; 10]);
        let misshaped = WeightSet::new(vec![
            WeightTensor::new(vec![2, 4], vec![0.; 8]).unwrap(),
            WeightTensor::new(vec![2], vec![0.; 2]).unwrap(),
        ]);

        let mut engine = AggregationEngine::new("demand", test_layout());
        let before = engine.global().clone();
        let err = engine.aggregate(&[good, misshaped], None).unwrap_err();
        assert!(matches!(
            err,
            AggregationError::LayoutMismatch { index: 1, .. }
        ));
        assert_eq!(engine.global(), &before);
        assert_eq!(engine.rounds(), 0);
    }

    #[test]
    fn test_decrypt_and_aggregate_round_trip() {
        let context = test_context();
        let a = weights([0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]);
        let b = weights([1.0, 0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1]);
        let updates = vec![
            encrypted(&context, "silo-01", &a),
            encrypted(&context, "silo-02", &b),
        ];

        let mut engine = AggregationEngine::new("demand", test_layout());
        let combined = engine
            .decrypt_and_aggregate(&context, &updates, None)
            .unwrap()
            .clone();
        // uniform mean of a and b is 0.55 everywhere, within the scheme tolerance
        let expected = weights([0.55; 10]);
        assert_close(&combined, &expected, context.config().tolerance(2));
    }

    #[test]
    fn test_corrupted_update_fails_round_closed() {
        let context = test_context();
        let good = weights([1.; 10]);
        let mut updates = vec![
            encrypted(&context, "silo-01", &good),
            encrypted(&context, "silo-02", &good),
        ];
        // truncate the second blob
        let half = updates[1].payload.len() / 2;
        updates[1].payload.truncate(half);

        let mut engine = AggregationEngine::new("demand", test_layout());
        let before = engine.global().clone();
        let err = engine
            .decrypt_and_aggregate(&context, &updates, None)
            .unwrap_err();
        assert!(matches!(err, AggregationError::Privacy(_)));
        // the global model is bit-for-bit identical to its pre-call value
        assert_eq!(engine.global(), &before);
        assert_eq!(engine.rounds(), 0);
    }

    #[test]
    fn test_encrypted_global_round_trip() {
        let context = test_context();
        let update = weights([0.5; 10]);
        let mut engine = AggregationEngine::new("demand", test_layout());
        engine.aggregate(&[update.clone()], None).unwrap();

        let blob = engine.encrypted_global(&context).unwrap();
        let distributed = context.decrypt(&blob).unwrap();
        assert_close(&distributed, &update, context.config().tolerance(1));
    }

    #[test]
    fn test_evaluate_delegates() {
        struct CountingEvaluator;
        impl Evaluator for CountingEvaluator {
            fn evaluate(
                &self,
                weights: &WeightSet,
                features: &[Vec<f64>],
                labels: &[f64],
            ) -> HashMap<String, f64> {
                let mut metrics = HashMap::new();
                metrics.insert("examples".into(), features.len() as f64);
                metrics.insert("labels".into(), labels.len() as f64);
                metrics.insert("parameters".into(), weights.flatten().len() as f64);
                metrics
            }
        }

        let engine = AggregationEngine::new("demand", test_layout());
        let metrics = engine.evaluate(&CountingEvaluator, &[vec![1., 2.], vec![3., 4.]], &[0., 1.]);
        assert_eq!(metrics["examples"], 2.);
        assert_eq!(metrics["labels"], 2.);
        assert_eq!(metrics["parameters"], 10.);
    }
}
