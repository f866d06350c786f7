//! Persistence seam for the model registry.
//!
//! A release is persisted as three artifacts keyed by `(model_name,
//! version)`: the weight snapshot, the structured metadata document and an
//! optional model card. Releases are write-once; a backend must reject a
//! second write to an existing key instead of overwriting it.

pub mod fs;

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use silo_core::model::WeightSet;

use crate::registry::{ModelCard, ReleaseMetadata};

pub use self::fs::FsStore;

/// The error type for storage operations that are not directly related to
/// the application domain: broken pipe, file not found, out-of-memory, etc.
pub type StorageError = anyhow::Error;

/// The result of a storage operation.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Display, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[display(fmt = "{} v{}", name, version)]
/// A handle to a persisted release, usable for later retrieval.
pub struct ReleaseHandle {
    /// The model name of the release.
    pub name: String,
    /// The version of the release.
    pub version: String,
    /// The backend-specific location of the release artifacts.
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A handle to a generated model card.
pub struct CardHandle {
    /// The backend-specific location of the card document.
    pub location: String,
}

#[async_trait]
/// An abstract release store.
pub trait ReleaseStore
where
    Self: Send + Sync + 'static,
{
    /// Checks whether a release exists for the given key.
    async fn exists(&mut self, name: &str, version: &str) -> StorageResult<bool>;

    /// Persists a new release.
    ///
    /// # Behavior
    ///
    /// - If no release exists for the key, persist the weight snapshot and
    ///   the metadata document, record the version in the store's own
    ///   version tracking and return a [`ReleaseHandle`].
    /// - If a release already exists for the key, fail without touching the
    ///   existing artifacts.
    async fn put_release(
        &mut self,
        metadata: &ReleaseMetadata,
        weights: &WeightSet,
    ) -> StorageResult<ReleaseHandle>;

    /// Returns the weight snapshot of a release.
    ///
    /// # Behavior
    ///
    /// - If the release does not exist, return `Ok(None)`.
    /// - The snapshot round-trips losslessly: the returned weights are
    ///   bit-for-bit the weights that were persisted.
    async fn weights(&mut self, name: &str, version: &str) -> StorageResult<Option<WeightSet>>;

    /// Returns the metadata document of a release.
    ///
    /// # Behavior
    ///
    /// - If the release does not exist, return `Ok(None)`.
    async fn metadata(
        &mut self,
        name: &str,
        version: &str,
    ) -> StorageResult<Option<ReleaseMetadata>>;

    /// Returns the most recently persisted version for a model name, by the
    /// store's own version tracking (not by file modification time).
    ///
    /// # Behavior
    ///
    /// - If no release exists for the model name, return `Ok(None)`.
    async fn latest_version(&mut self, name: &str) -> StorageResult<Option<String>>;

    /// Persists the model card of a release, overwriting a prior card.
    async fn put_card(
        &mut self,
        release: &ReleaseHandle,
        card: &ModelCard,
    ) -> StorageResult<CardHandle>;
}
