//! # Silo: a privacy layer for cross-silo federated learning
//!
//! Silo coordinates federated training across independent data holders
//! ("participants") without any participant's raw model update ever being
//! visible in plaintext outside its own premises. Participants train
//! locally, encrypt their weight updates, and push the resulting opaque
//! blobs through an untrusted intermediary store; the coordinator decrypts,
//! aggregates and releases new global models.
//!
//! This crate is the participant-facing half of that pipeline:
//!
//! - [`model`]: the numerical representation of a model — ordered weight
//!   tensors ([`model::WeightSet`]) and the shape descriptor used to
//!   validate and reshape them ([`model::WeightLayout`]).
//! - [`crypto`]: wrappers around the [sodiumoxide] primitives used for the
//!   symmetric authenticated layer, plus PRNG utilities.
//! - [`ckks`]: a leveled approximate homomorphic encryption scheme in the
//!   CKKS style. Encoding is lossy by design; decoding error is bounded by
//!   the scheme parameters.
//! - [`privacy`]: the [`privacy::PrivacyContext`] that combines both
//!   ciphers into the reversible weight-set transformation used on the
//!   wire.
//!
//! The coordinator-side aggregation engine and the versioned model registry
//! live in the `silo-coordinator` crate.
//!
//! [sodiumoxide]: https://docs.rs/sodiumoxide/
#[macro_use]
extern crate serde;

pub mod ckks;
pub mod crypto;
pub mod model;
pub mod privacy;

use derive_more::{AsRef, Display, From, Into};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("initialization failed: insufficient system entropy to generate secrets")]
/// An error related to insufficient system entropy for secrets at program startup.
pub struct InitError;

/// Initializes the underlying crypto library.
///
/// This must be called before any other function of this crate. It is safe
/// to call this multiple times and from different threads.
///
/// # Errors
/// Fails if the initialization of the crypto library fails.
pub fn init_crypto() -> Result<(), InitError> {
    sodiumoxide::init().or(Err(InitError))
}

#[derive(
    AsRef, Display, From, Into, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
/// An identifier for a participating data holder.
///
/// Carried alongside an encrypted update, never inside the ciphertext.
pub struct ParticipantId(String);

impl ParticipantId {
    /// Creates a new participant identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Gets the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
