//! Wrappers around some of the [sodiumoxide] crypto primitives.
//!
//! The wrappers provide methods defined on structs instead of the
//! sodiumoxide functions. The symmetric authenticated cipher used to
//! protect serialized ciphertexts in transit lives here, as well as the
//! PRNG utilities the homomorphic scheme samples from.
//!
//! # Examples
//! ## Sealing of messages
//! ```
//! # use silo_core::crypto::SealKey;
//! # use silo_core::crypto::ByteObject;
//! let key = SealKey::generate();
//! let message = b"Hello world!".to_vec();
//! let blob = key.seal(&message);
//! assert_eq!(message, key.open(&blob).unwrap());
//! ```
//!
//! [sodiumoxide]: https://docs.rs/sodiumoxide/

pub(crate) mod prng;
pub(crate) mod secret;

use sodiumoxide::randombytes::randombytes;

pub use self::{
    prng::generate_integer,
    secret::{DecryptionError, SealKey},
};

/// An interface for slicing into cryptographic byte objects.
pub trait ByteObject: Sized {
    /// Length in bytes of this object
    const LENGTH: usize;

    /// Creates a new object with all the bytes initialized to `0`.
    fn zeroed() -> Self;

    /// Gets the object byte representation.
    fn as_slice(&self) -> &[u8];

    /// Creates an object from the given buffer.
    ///
    /// # Errors
    /// Returns `None` if the length of the byte-slice isn't equal to the length of the object.
    fn from_slice(bytes: &[u8]) -> Option<Self>;

    /// Creates an object from the given buffer.
    ///
    /// # Panics
    /// Panics if the length of the byte-slice isn't equal to the length of the object.
    fn from_slice_unchecked(bytes: &[u8]) -> Self {
        Self::from_slice(bytes).unwrap()
    }

    /// Generates an object with random bytes
    fn generate() -> Self {
        // safe unwrap: length of slice is guaranteed by constants
        Self::from_slice_unchecked(randombytes(Self::LENGTH).as_slice())
    }
}

/// Generates a fresh 32-byte seed for deterministic key or noise derivation.
pub fn generate_seed() -> [u8; 32] {
    let mut seed = [0_u8; 32];
    seed.copy_from_slice(randombytes(32).as_slice());
    seed
}
