//! Versioned, immutable global model releases.
//!
//! Every aggregation result worth keeping is persisted as a release keyed
//! by `(model_name, version)`. Releases are write-once: a duplicate key is
//! a usage error, never an overwrite. The registry works the same whether
//! the aggregation path was encrypted or plaintext, and its own round trip
//! is lossless — independent of the lossy homomorphic path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use silo_core::model::{WeightLayout, WeightSet};

use crate::{
    engine::{weighted_mean, AggregationError},
    storage::{CardHandle, ReleaseHandle, ReleaseStore, StorageError},
};

/// Fixed privacy note embedded in every model card.
const PRIVACY_NOTE: &str = "Trained with federated learning; participant updates are \
     encrypted in transit and only aggregated weights are ever released.";

/// Fixed bias-review reminder embedded in every model card.
const BIAS_NOTE: &str =
    "Evaluate the model for demographic biases before promoting a release.";

#[derive(Debug, Error)]
/// Errors related to the model registry.
pub enum RegistryError {
    #[error("release {name} v{version} already exists")]
    DuplicateVersion { name: String, version: String },

    #[error("no release {name} v{version}")]
    ReleaseNotFound { name: String, version: String },

    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("persistence failure: {0}")]
    Persistence(StorageError),
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        Self::Persistence(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The structured metadata document persisted with every release.
pub struct ReleaseMetadata {
    /// The model name.
    pub name: String,
    /// The release version.
    pub version: String,
    /// When the release was created.
    pub created_at: DateTime<Utc>,
    /// The input feature shape of the model (the leading dimensions of the
    /// first weight tensor).
    pub input_shape: Vec<usize>,
    /// Named numeric performance metrics supplied at save time.
    pub performance_metrics: HashMap<String, f64>,
    /// Free-text release notes.
    pub release_notes: String,
    /// Arbitrary additional metadata.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Identity section of a model card.
pub struct CardModelDetails {
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Architecture section of a model card.
pub struct CardModelParameters {
    pub input_shape: Vec<usize>,
    pub framework: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Fixed ethics section of a model card.
pub struct CardEthics {
    pub privacy: String,
    pub bias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// The documentation artifact generated for one release.
///
/// 1:1 with a release, regenerable at any time, never load-bearing state.
pub struct ModelCard {
    pub model_details: CardModelDetails,
    pub model_parameters: CardModelParameters,
    pub performance_metrics: HashMap<String, f64>,
    pub intended_use: String,
    pub limitations: String,
    pub ethical_considerations: CardEthics,
    pub additional_metadata: HashMap<String, String>,
}

/// The versioned model registry over a release store backend.
pub struct ModelRegistry<S> {
    store: S,
}

impl<S: ReleaseStore> ModelRegistry<S> {
    /// Creates a registry over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persists a new immutable release.
    ///
    /// # Errors
    /// Fails with [`RegistryError::DuplicateVersion`] if a release with the
    /// same `(name, version)` key already exists; the existing release is
    /// left untouched.
    pub async fn save(
        &mut self,
        name: &str,
        version: &str,
        weights: &WeightSet,
        performance_metrics: HashMap<String, f64>,
        release_notes: &str,
        extra: HashMap<String, String>,
    ) -> Result<ReleaseHandle, RegistryError> {
        if self.store.exists(name, version).await? {
            return Err(RegistryError::DuplicateVersion {
                name: name.to_string(),
                version: version.to_string(),
            });
        }

        let metadata = ReleaseMetadata {
            name: name.to_string(),
            version: version.to_string(),
            created_at: Utc::now(),
            input_shape: input_shape_of(weights),
            performance_metrics,
            release_notes: release_notes.to_string(),
            extra,
        };
        let handle = self.store.put_release(&metadata, weights).await?;
        info!("saved model release {} v{}", name, version);
        Ok(handle)
    }

    /// Loads a release by version, or the latest release when `version` is
    /// `None`.
    ///
    /// "Latest" follows the registry's own version tracking, not file
    /// modification times.
    ///
    /// # Errors
    /// Fails with [`RegistryError::ReleaseNotFound`] if no matching release
    /// exists.
    pub async fn load(
        &mut self,
        name: &str,
        version: Option<&str>,
    ) -> Result<(WeightSet, ReleaseMetadata), RegistryError> {
        let version = match version {
            Some(version) => version.to_string(),
            None => self
                .store
                .latest_version(name)
                .await?
                .ok_or_else(|| not_found(name, "latest"))?,
        };

        let weights = self
            .store
            .weights(name, &version)
            .await?
            .ok_or_else(|| not_found(name, &version))?;
        let metadata = self
            .store
            .metadata(name, &version)
            .await?
            .ok_or_else(|| not_found(name, &version))?;
        info!("loaded model release {} v{}", name, version);
        Ok((weights, metadata))
    }

    /// Generates (or regenerates) the model card of a release.
    ///
    /// A pure derivation from the release identity, the supplied metrics
    /// and the fixed ethics boilerplate. Regenerating overwrites the prior
    /// card without affecting the release itself.
    ///
    /// # Errors
    /// Fails with [`RegistryError::ReleaseNotFound`] if the handle does not
    /// refer to a persisted release.
    pub async fn generate_model_card(
        &mut self,
        release: &ReleaseHandle,
        performance_metrics: HashMap<String, f64>,
        intended_use: &str,
        limitations: &str,
    ) -> Result<CardHandle, RegistryError> {
        let metadata = self
            .store
            .metadata(&release.name, &release.version)
            .await?
            .ok_or_else(|| not_found(&release.name, &release.version))?;

        let card = ModelCard {
            model_details: CardModelDetails {
                name: metadata.name,
                version: metadata.version,
                created_at: metadata.created_at,
                kind: "Federated global model".to_string(),
            },
            model_parameters: CardModelParameters {
                input_shape: metadata.input_shape,
                framework: "silo".to_string(),
            },
            performance_metrics,
            intended_use: intended_use.to_string(),
            limitations: limitations.to_string(),
            ethical_considerations: CardEthics {
                privacy: PRIVACY_NOTE.to_string(),
                bias: BIAS_NOTE.to_string(),
            },
            additional_metadata: metadata.extra,
        };

        let handle = self.store.put_card(release, &card).await?;
        info!(
            "generated model card for {} v{}",
            release.name, release.version
        );
        Ok(handle)
    }

    /// Combines plaintext weight sets with the exact same weighted-average
    /// semantics as the aggregation engine.
    ///
    /// The non-encrypted path for deployments whose trust model does not
    /// require per-update encryption (a trusted aggregator, a test
    /// harness). The layout is derived from the first update; all others
    /// must conform to it.
    pub fn aggregate_models(
        &self,
        local_weight_sets: &[WeightSet],
        weights: Option<&[f64]>,
    ) -> Result<WeightSet, AggregationError> {
        let first = local_weight_sets
            .first()
            .ok_or(AggregationError::EmptyRound)?;
        let layout = WeightLayout::of(first);
        weighted_mean(&layout, local_weight_sets, weights)
    }
}

/// Derives the model's input feature shape: the leading dimensions of the
/// first weight tensor.
fn input_shape_of(weights: &WeightSet) -> Vec<usize> {
    weights
        .iter()
        .next()
        .map(|tensor| {
            let shape = tensor.shape();
            shape[..shape.len().saturating_sub(1)].to_vec()
        })
        .unwrap_or_default()
}

fn not_found(name: &str, version: &str) -> RegistryError {
    RegistryError::ReleaseNotFound {
        name: name.to_string(),
        version: version.to_string(),
    }
}
