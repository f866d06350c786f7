//! The reversible transformation of weight sets into opaque transport blobs.
//!
//! A [`PrivacyContext`] owns the coordinator's symmetric key and the
//! parameters/key of the approximate homomorphic cipher. Encryption is a
//! double wrap: the flattened weight vector is encrypted under the
//! homomorphic scheme (which keeps encrypted-domain aggregation possible),
//! and the serialized ciphertext is then sealed with symmetric
//! authenticated encryption for confidentiality and integrity in transit
//! through the untrusted intermediary store.
//!
//! The homomorphic layer is approximate: a round trip reproduces the
//! weights within [`CkksConfig::tolerance`], not bit-exactly.
//!
//! [`CkksConfig::tolerance`]: crate::ckks::CkksConfig::tolerance

use thiserror::Error;

use crate::{
    ckks::{CkksCipher, CkksConfig, CkksError, CiphertextVec, SecretKey},
    crypto::{ByteObject, SealKey},
    model::{LayoutError, WeightLayout, WeightSet},
    ParticipantId,
};

#[derive(Error, Debug)]
/// Errors related to the encryption and decryption of weight sets.
pub enum PrivacyError {
    /// The blob failed symmetric authentication or carries a malformed
    /// ciphertext.
    #[error("decryption of an update failed")]
    Decryption,

    /// The weights disagree with the configured layout.
    #[error("the update does not conform to the configured layout: {0}")]
    Layout(#[from] LayoutError),

    /// The weights cannot be encoded under the configured scheme.
    #[error("encoding the update failed: {0}")]
    Encoding(CkksError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// An encrypted weight update in transit.
///
/// The participant identity and the round number are carried alongside the
/// ciphertext, never inside it. Immutable once produced.
pub struct EncryptedUpdate {
    /// The participant that produced this update.
    pub participant: ParticipantId,
    /// The aggregation round this update belongs to.
    pub round: u64,
    /// The opaque blob produced by [`PrivacyContext::encrypt`].
    pub payload: Vec<u8>,
}

impl EncryptedUpdate {
    /// Tags an encrypted payload with its participant and round.
    pub fn new(participant: ParticipantId, round: u64, payload: Vec<u8>) -> Self {
        Self {
            participant,
            round,
            payload,
        }
    }
}

/// The coordinator's privacy context.
///
/// Created once per coordinator instance (or rebuilt from persisted key
/// material via [`from_key_material`]) and kept for its lifetime. The
/// secrets are never serialized in plaintext.
///
/// [`from_key_material`]: PrivacyContext::from_key_material
#[derive(Clone)]
pub struct PrivacyContext {
    seal_key: SealKey,
    cipher: CkksCipher,
    layout: WeightLayout,
}

impl PrivacyContext {
    /// Creates a context with freshly generated key material.
    ///
    /// # Errors
    /// Fails if the scheme configuration is invalid.
    pub fn new(config: CkksConfig, layout: WeightLayout) -> Result<Self, CkksError> {
        Ok(Self {
            seal_key: SealKey::generate(),
            cipher: CkksCipher::generate(config)?,
            layout,
        })
    }

    /// Rebuilds a context from persisted key material.
    ///
    /// # Errors
    /// Fails if the symmetric key has the wrong length or the scheme
    /// configuration is invalid.
    pub fn from_key_material(
        config: CkksConfig,
        layout: WeightLayout,
        seal_key: &[u8],
        cipher_seed: [u8; 32],
    ) -> Result<Self, CkksError> {
        let seal_key = SealKey::from_slice(seal_key)
            .ok_or(CkksError::InvalidConfig("bad symmetric key length"))?;
        let secret = SecretKey::from_seed(&config, cipher_seed);
        Ok(Self {
            seal_key,
            cipher: CkksCipher::new(config, secret)?,
            layout,
        })
    }

    /// Gets the layout this context validates updates against.
    pub fn layout(&self) -> &WeightLayout {
        &self.layout
    }

    /// Gets the scheme parameters of the homomorphic layer.
    pub fn config(&self) -> &CkksConfig {
        self.cipher.config()
    }

    /// Encrypts a weight set into an opaque transport blob.
    ///
    /// Flattens the tensors in layout order, encrypts the flat vector under
    /// the homomorphic scheme, serializes the ciphertext and seals it with
    /// the symmetric key.
    ///
    /// # Errors
    /// Fails if the weights do not conform to the configured layout or
    /// cannot be encoded under the configured scheme.
    pub fn encrypt(&self, weights: &WeightSet) -> Result<Vec<u8>, PrivacyError> {
        self.layout.matches(weights)?;
        let ciphertext = self
            .cipher
            .encrypt_slots(&weights.flatten())
            .map_err(PrivacyError::Encoding)?;
        // safe unwrap: ciphertext vectors always serialize
        let serialized = bincode::serialize(&ciphertext).unwrap();
        Ok(self.seal_key.seal(&serialized))
    }

    /// Decrypts an opaque transport blob back into a weight set.
    ///
    /// The inverse of [`encrypt`]: opens the symmetric layer, deserializes
    /// and decrypts the homomorphic ciphertext and unflattens the vector
    /// according to the configured layout.
    ///
    /// # Errors
    /// Fails with [`PrivacyError::Decryption`] if authentication fails or
    /// the ciphertext is malformed, and with [`PrivacyError::Layout`] if
    /// the decoded vector does not fill the layout.
    ///
    /// [`encrypt`]: PrivacyContext::encrypt
    pub fn decrypt(&self, blob: &[u8]) -> Result<WeightSet, PrivacyError> {
        let serialized = self
            .seal_key
            .open(blob)
            .map_err(|_| PrivacyError::Decryption)?;
        let ciphertext: CiphertextVec =
            bincode::deserialize(&serialized).map_err(|_| PrivacyError::Decryption)?;
        let flat = self
            .cipher
            .decrypt_slots(&ciphertext)
            .map_err(|_| PrivacyError::Decryption)?;
        if flat.len() != self.layout.total_len() {
            return Err(PrivacyError::Layout(LayoutError::TotalLength {
                expected: self.layout.total_len(),
                actual: flat.len(),
            }));
        }
        WeightSet::unflatten(&self.layout, &flat).map_err(PrivacyError::Layout)
    }
}
