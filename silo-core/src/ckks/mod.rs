//! A leveled approximate homomorphic encryption scheme in the CKKS style.
//!
//! Weight vectors are encoded as scaled integer coefficients of polynomials
//! in the negacyclic ring `Z_q[X]/(X^N + 1)` and encrypted as RLWE pairs
//! under a ternary secret key. The scheme is approximate by design: the
//! encode/encrypt/decrypt/decode round trip introduces a small numeric
//! error bounded by the scheme parameters (see [`CkksConfig::tolerance`]),
//! so callers must compare decrypted weights within that tolerance rather
//! than bit-exactly.
//!
//! Ciphertexts support addition ([`CiphertextVec::add`]), which makes
//! encrypted-domain aggregation of updates possible without decryption.
//!
//! The scheme parameters (polynomial modulus degree, coefficient-modulus
//! bit chain, scale) are a configuration surface, not constants; see
//! [`CkksConfig`].

mod cipher;
mod config;
mod poly;

use thiserror::Error;

pub use self::{
    cipher::{Ciphertext, CiphertextVec, CkksCipher, SecretKey},
    config::{CkksConfig, ERROR_BOUND},
};

#[derive(Error, Debug, Clone, PartialEq)]
/// Errors related to the approximate homomorphic scheme.
pub enum CkksError {
    #[error("invalid cipher configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("weight {0} is not finite and cannot be encoded")]
    NonFinite(f64),

    #[error("weight magnitude exceeds the configured ciphertext modulus")]
    EncodingOverflow,

    #[error("the ciphertext is incompatible with the cipher configuration")]
    ConfigMismatch,

    #[error("ciphertexts at different levels cannot be combined")]
    LevelMismatch,
}
