//! A filesystem [`ReleaseStore`] backend.
//!
//! Each release lives under `<root>/<name>_v<version>/` with three
//! artifacts: `weights.bin` (bincode), `metadata.yml` and, once generated,
//! `model_card.yml`. The per-model version log `<root>/<name>.releases.yml`
//! is the store's own latest-version tracking; file modification times are
//! never consulted.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use displaydoc::Display;
use thiserror::Error;
use tokio::fs;

use silo_core::model::WeightSet;

use crate::{
    registry::{ModelCard, ReleaseMetadata},
    storage::{CardHandle, ReleaseHandle, ReleaseStore, StorageResult},
};

const WEIGHTS_FILE: &str = "weights.bin";
const METADATA_FILE: &str = "metadata.yml";
const CARD_FILE: &str = "model_card.yml";

#[derive(Debug, Display, Error)]
pub enum FsStoreError {
    /// Failed to access the release store: {0}.
    Io(#[from] std::io::Error),
    /// Failed to serialize a weight snapshot: {0}.
    Encode(bincode::Error),
    /// Failed to deserialize a weight snapshot: {0}.
    Decode(bincode::Error),
    /// Failed to encode a registry document: {0}.
    EncodeDocument(serde_yaml::Error),
    /// Failed to decode a registry document: {0}.
    DecodeDocument(serde_yaml::Error),
    /// Release {0} already exists.
    ReleaseAlreadyExists(String),
}

#[derive(Debug, Clone)]
/// A release store rooted at a registry directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a store rooted at the given registry directory.
    ///
    /// The directory is created lazily on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn release_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(format!("{}_v{}", name, version))
    }

    fn index_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.releases.yml", name))
    }

    async fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FsStoreError::Io(err).into()),
        }
    }

    async fn read_index(&self, name: &str) -> StorageResult<Vec<String>> {
        match Self::read_optional(&self.index_path(name)).await? {
            None => Ok(Vec::new()),
            Some(bytes) => Ok(serde_yaml::from_slice(&bytes)
                .map_err(FsStoreError::DecodeDocument)?),
        }
    }

    async fn append_index(&self, name: &str, version: &str) -> StorageResult<()> {
        let mut versions = self.read_index(name).await?;
        versions.push(version.to_string());
        let document =
            serde_yaml::to_string(&versions).map_err(FsStoreError::EncodeDocument)?;
        fs::write(self.index_path(name), document)
            .await
            .map_err(FsStoreError::Io)?;
        Ok(())
    }
}

#[async_trait]
impl ReleaseStore for FsStore {
    async fn exists(&mut self, name: &str, version: &str) -> StorageResult<bool> {
        let marker = self.release_dir(name, version).join(METADATA_FILE);
        Ok(fs::metadata(marker).await.is_ok())
    }

    async fn put_release(
        &mut self,
        metadata: &ReleaseMetadata,
        weights: &WeightSet,
    ) -> StorageResult<ReleaseHandle> {
        let dir = self.release_dir(&metadata.name, &metadata.version);
        if self.exists(&metadata.name, &metadata.version).await? {
            return Err(FsStoreError::ReleaseAlreadyExists(dir.display().to_string()).into());
        }

        debug!("persisting release to {}", dir.display());
        fs::create_dir_all(&dir).await.map_err(FsStoreError::Io)?;

        let snapshot = bincode::serialize(weights).map_err(FsStoreError::Encode)?;
        fs::write(dir.join(WEIGHTS_FILE), snapshot)
            .await
            .map_err(FsStoreError::Io)?;

        let document = serde_yaml::to_string(metadata).map_err(FsStoreError::EncodeDocument)?;
        fs::write(dir.join(METADATA_FILE), document)
            .await
            .map_err(FsStoreError::Io)?;

        self.append_index(&metadata.name, &metadata.version).await?;

        Ok(ReleaseHandle {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            location: dir.display().to_string(),
        })
    }

    async fn weights(&mut self, name: &str, version: &str) -> StorageResult<Option<WeightSet>> {
        let path = self.release_dir(name, version).join(WEIGHTS_FILE);
        match Self::read_optional(&path).await? {
            None => Ok(None),
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(FsStoreError::Decode)?,
            )),
        }
    }

    async fn metadata(
        &mut self,
        name: &str,
        version: &str,
    ) -> StorageResult<Option<ReleaseMetadata>> {
        let path = self.release_dir(name, version).join(METADATA_FILE);
        match Self::read_optional(&path).await? {
            None => Ok(None),
            Some(bytes) => Ok(Some(
                serde_yaml::from_slice(&bytes).map_err(FsStoreError::DecodeDocument)?,
            )),
        }
    }

    async fn latest_version(&mut self, name: &str) -> StorageResult<Option<String>> {
        Ok(self.read_index(name).await?.last().cloned())
    }

    async fn put_card(
        &mut self,
        release: &ReleaseHandle,
        card: &ModelCard,
    ) -> StorageResult<CardHandle> {
        let path = Path::new(&release.location).join(CARD_FILE);
        debug!("writing model card to {}", path.display());
        let document = serde_yaml::to_string(card).map_err(FsStoreError::EncodeDocument)?;
        fs::write(&path, document).await.map_err(FsStoreError::Io)?;
        Ok(CardHandle {
            location: path.display().to_string(),
        })
    }
}
