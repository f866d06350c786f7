//! Symmetric authenticated encryption of serialized ciphertexts.
//!
//! See the [crypto module] documentation since this is a private module anyways.
//!
//! [crypto module]: crate::crypto

use derive_more::{AsMut, AsRef, From};
use sodiumoxide::crypto::secretbox;

use super::ByteObject;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("decryption of a message failed")]
/// An error related to the decryption of a message.
pub struct DecryptionError;

#[derive(AsRef, AsMut, From, Clone, Eq, PartialEq, Debug)]
/// An `XSalsa20Poly1305` secret key for symmetric authenticated encryption.
///
/// Owned exclusively by the coordinator process and never serialized in
/// plaintext. When this goes out of scope, its contents will be zeroed out.
pub struct SealKey(secretbox::Key);

impl ByteObject for SealKey {
    const LENGTH: usize = secretbox::KEYBYTES;

    fn zeroed() -> Self {
        Self(secretbox::Key([0_u8; secretbox::KEYBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        secretbox::Key::from_slice(bytes).map(Self)
    }
}

impl SealKey {
    /// Seals a message `m` with this key.
    ///
    /// A random nonce is generated per message and prepended to the
    /// ciphertext, so the resulting blob is self-contained. The blob is
    /// `NONCEBYTES + MACBYTES + m.len()` bytes long.
    pub fn seal(&self, m: &[u8]) -> Vec<u8> {
        let nonce = secretbox::gen_nonce();
        let mut blob = nonce.as_ref().to_vec();
        blob.extend(secretbox::seal(m, &nonce, &self.0));
        blob
    }

    /// Opens a blob produced by [`seal()`] and returns the message.
    ///
    /// # Errors
    /// Returns `Err(DecryptionError)` if the blob is truncated or fails
    /// authentication.
    ///
    /// [`seal()`]: SealKey::seal
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        if blob.len() < secretbox::NONCEBYTES {
            return Err(DecryptionError);
        }
        let (nonce, ciphertext) = blob.split_at(secretbox::NONCEBYTES);
        // safe unwrap: the slice length is guaranteed by the split above
        let nonce = secretbox::Nonce::from_slice(nonce).unwrap();
        secretbox::open(ciphertext, &nonce, &self.0).map_err(|_| DecryptionError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let key = SealKey::generate();
        let message = b"weights on the wire".to_vec();
        let blob = key.seal(&message);
        assert_ne!(&blob[secretbox::NONCEBYTES..], message.as_slice());
        assert_eq!(key.open(&blob).unwrap(), message);
    }

    #[test]
    fn test_open_rejects_tampering() {
        let key = SealKey::generate();
        let mut blob = key.seal(b"payload");
        let last = blob.len() - 1;
        blob[last] ^= 0xff;
        assert_eq!(key.open(&blob), Err(DecryptionError));
    }

    #[test]
    fn test_open_rejects_truncation() {
        let key = SealKey::generate();
        let blob = key.seal(b"payload");
        assert_eq!(key.open(&blob[..10]), Err(DecryptionError));
        assert_eq!(key.open(&[]), Err(DecryptionError));
    }

    #[test]
    fn test_open_rejects_wrong_key() {
        let blob = SealKey::generate().seal(b"payload");
        assert_eq!(SealKey::generate().open(&blob), Err(DecryptionError));
    }
}
