//! Key generation, encryption and decryption of weight vectors.

use num::{
    bigint::{BigInt, BigUint},
    traits::{FromPrimitive, ToPrimitive},
    Zero,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use super::{config::ERROR_BOUND, poly, CkksConfig, CkksError};
use crate::crypto::{generate_integer, generate_seed};

#[derive(Clone, PartialEq, Eq)]
/// A ternary secret key for the approximate scheme.
///
/// Derivable from a 32-byte seed, so a coordinator can persist its key
/// material without ever serializing the key itself.
pub struct SecretKey {
    coeffs: Vec<i8>,
}

impl SecretKey {
    /// Generates a new random secret key for the given configuration.
    pub fn generate(config: &CkksConfig) -> Self {
        Self::from_seed(config, generate_seed())
    }

    /// Deterministically derives a secret key from a seed.
    pub fn from_seed(config: &CkksConfig, seed: [u8; 32]) -> Self {
        let mut prng = ChaCha20Rng::from_seed(seed);
        let coeffs = (0..config.poly_modulus_degree)
            .map(|_| prng.gen_range(-1_i8..=1))
            .collect();
        Self { coeffs }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// An RLWE ciphertext carrying one polynomial's worth of encoded weights.
pub struct Ciphertext {
    c0: Vec<BigUint>,
    c1: Vec<BigUint>,
    level: usize,
}

impl Ciphertext {
    /// Gets the polynomial degree of this ciphertext.
    pub fn degree(&self) -> usize {
        self.c0.len()
    }

    /// Gets the level of this ciphertext in the modulus chain.
    pub fn level(&self) -> usize {
        self.level
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A sequence of ciphertext chunks encrypting one flat weight vector.
///
/// Vectors longer than the polynomial degree are split into degree-sized
/// chunks; the original slot count is carried so decryption can trim the
/// zero padding of the final chunk.
pub struct CiphertextVec {
    len: usize,
    chunks: Vec<Ciphertext>,
}

#[allow(clippy::len_without_is_empty)]
impl CiphertextVec {
    /// Gets the number of weights this ciphertext vector encrypts.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Gets the ciphertext chunks.
    pub fn chunks(&self) -> &[Ciphertext] {
        &self.chunks
    }

    /// Homomorphically adds two ciphertext vectors.
    ///
    /// The decryption of the sum equals the coefficient-wise sum of the
    /// plaintexts, with the noise of both operands accumulated.
    ///
    /// # Errors
    /// Fails if the operands encrypt vectors of different lengths or
    /// degrees ([`CkksError::ConfigMismatch`]) or sit at different levels
    /// of the modulus chain ([`CkksError::LevelMismatch`]).
    pub fn add(&self, other: &Self, config: &CkksConfig) -> Result<Self, CkksError> {
        if self.len != other.len || self.chunks.len() != other.chunks.len() {
            return Err(CkksError::ConfigMismatch);
        }
        let q = config.modulus();
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for (left, right) in self.chunks.iter().zip(other.chunks.iter()) {
            if left.degree() != right.degree() {
                return Err(CkksError::ConfigMismatch);
            }
            if left.level != right.level {
                return Err(CkksError::LevelMismatch);
            }
            chunks.push(Ciphertext {
                c0: poly::add(&left.c0, &right.c0, &q),
                c1: poly::add(&left.c1, &right.c1, &q),
                level: left.level,
            });
        }
        Ok(Self {
            len: self.len,
            chunks,
        })
    }
}

/// The approximate cipher: scheme parameters plus the secret key.
#[derive(Clone)]
pub struct CkksCipher {
    config: CkksConfig,
    secret: SecretKey,
    modulus: BigUint,
}

impl CkksCipher {
    /// Creates a cipher from a validated configuration and a matching key.
    ///
    /// # Errors
    /// Fails if the configuration is invalid or the key was derived for a
    /// different polynomial degree.
    pub fn new(config: CkksConfig, secret: SecretKey) -> Result<Self, CkksError> {
        config.validate()?;
        if secret.coeffs.len() != config.poly_modulus_degree {
            return Err(CkksError::ConfigMismatch);
        }
        let modulus = config.modulus();
        Ok(Self {
            config,
            secret,
            modulus,
        })
    }

    /// Creates a cipher with a freshly generated secret key.
    ///
    /// # Errors
    /// Fails if the configuration is invalid.
    pub fn generate(config: CkksConfig) -> Result<Self, CkksError> {
        let secret = SecretKey::generate(&config);
        Self::new(config, secret)
    }

    /// Gets the scheme parameters of this cipher.
    pub fn config(&self) -> &CkksConfig {
        &self.config
    }

    /// Encrypts a flat weight vector.
    ///
    /// The weights are encoded at the configured scale, split into
    /// degree-sized chunks (the final chunk zero-padded) and encrypted as
    /// fresh RLWE pairs at the top level of the modulus chain.
    ///
    /// # Errors
    /// Fails if a weight is not finite or its scaled magnitude wraps the
    /// ciphertext modulus.
    pub fn encrypt_slots(&self, slots: &[f64]) -> Result<CiphertextVec, CkksError> {
        let n = self.config.poly_modulus_degree;
        let mut chunks = Vec::with_capacity((slots.len() + n - 1) / n);
        for block in slots.chunks(n) {
            let mut m = Vec::with_capacity(n);
            for &x in block {
                m.push(self.encode_weight(x)?);
            }
            m.resize(n, BigUint::zero());
            chunks.push(self.encrypt_poly(m));
        }
        Ok(CiphertextVec {
            len: slots.len(),
            chunks,
        })
    }

    /// Decrypts a ciphertext vector back to its flat weight vector.
    ///
    /// The round trip is approximate: each weight is within
    /// [`CkksConfig::tolerance`] of its encoded value.
    ///
    /// # Errors
    /// Fails if a chunk's degree disagrees with the configuration or the
    /// chunks cannot cover the declared vector length.
    pub fn decrypt_slots(&self, ciphertext: &CiphertextVec) -> Result<Vec<f64>, CkksError> {
        let n = self.config.poly_modulus_degree;
        let scale = self.config.scale();
        let mut slots = Vec::with_capacity(ciphertext.chunks.len() * n);
        for chunk in &ciphertext.chunks {
            if chunk.c0.len() != n || chunk.c1.len() != n {
                return Err(CkksError::ConfigMismatch);
            }
            let c1_s = poly::mul_ternary(&chunk.c1, &self.secret.coeffs, &self.modulus);
            for (c0, c1s) in chunk.c0.iter().zip(c1_s.iter()) {
                let m = poly::reduce(
                    BigInt::from(c0.clone()) + BigInt::from(c1s.clone()),
                    &self.modulus,
                );
                let centered = poly::center(&m, &self.modulus);
                slots.push(centered.to_f64().unwrap_or(f64::INFINITY) / scale);
            }
        }
        if slots.len() < ciphertext.len {
            return Err(CkksError::ConfigMismatch);
        }
        slots.truncate(ciphertext.len);
        Ok(slots)
    }

    /// Encodes one weight as a scaled canonical ring element.
    fn encode_weight(&self, x: f64) -> Result<BigUint, CkksError> {
        if !x.is_finite() {
            return Err(CkksError::NonFinite(x));
        }
        let scaled =
            BigInt::from_f64((x * self.config.scale()).round()).ok_or(CkksError::NonFinite(x))?;
        // a plaintext past half the modulus would wrap and decode as garbage
        if (scaled.magnitude() << 1_usize) >= self.modulus {
            return Err(CkksError::EncodingOverflow);
        }
        Ok(poly::reduce(scaled, &self.modulus))
    }

    /// Encrypts one encoded polynomial as a fresh RLWE pair.
    fn encrypt_poly(&self, m: Vec<BigUint>) -> Ciphertext {
        let n = self.config.poly_modulus_degree;
        let mut prng = ChaCha20Rng::from_seed(generate_seed());
        let a: Vec<BigUint> = (0..n)
            .map(|_| generate_integer(&mut prng, &self.modulus))
            .collect();
        let a_s = poly::mul_ternary(&a, &self.secret.coeffs, &self.modulus);
        let bound = ERROR_BOUND as i64;
        let c0 = m
            .into_iter()
            .zip(a_s.into_iter())
            .map(|(mi, asi)| {
                let noise = BigInt::from(prng.gen_range(-bound..=bound));
                poly::reduce(
                    BigInt::from(mi) + noise - BigInt::from(asi),
                    &self.modulus,
                )
            })
            .collect();
        Ciphertext {
            c0,
            c1: a,
            level: self.config.fresh_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> CkksConfig {
        CkksConfig {
            poly_modulus_degree: 32,
            coeff_modulus_bits: vec![40, 30],
            scale_bits: 30,
        }
    }

    fn assert_close(actual: &[f64], expected: &[f64], tolerance: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!(
                (a - e).abs() <= tolerance,
                "|{} - {}| > {}",
                a,
                e,
                tolerance
            );
        }
    }

    #[test]
    fn test_round_trip_single_chunk() {
        let cipher = CkksCipher::generate(test_config()).unwrap();
        let slots = vec![0.5, -1.25, 0., 3.75, -0.001];
        let ciphertext = cipher.encrypt_slots(&slots).unwrap();
        assert_eq!(ciphertext.len(), 5);
        assert_eq!(ciphertext.chunks().len(), 1);

        let decrypted = cipher.decrypt_slots(&ciphertext).unwrap();
        assert_close(&decrypted, &slots, cipher.config().tolerance(1));
    }

    #[test]
    fn test_round_trip_multiple_chunks() {
        let cipher = CkksCipher::generate(test_config()).unwrap();
        // 70 slots across three chunks of degree 32
        let slots: Vec<f64> = (0..70).map(|i| (i as f64 - 35.) / 7.).collect();
        let ciphertext = cipher.encrypt_slots(&slots).unwrap();
        assert_eq!(ciphertext.chunks().len(), 3);

        let decrypted = cipher.decrypt_slots(&ciphertext).unwrap();
        assert_close(&decrypted, &slots, cipher.config().tolerance(1));
    }

    #[test]
    fn test_key_from_seed_is_deterministic() {
        let config = test_config();
        let seed = [42_u8; 32];
        let encryptor =
            CkksCipher::new(config.clone(), SecretKey::from_seed(&config, seed)).unwrap();
        let decryptor =
            CkksCipher::new(config.clone(), SecretKey::from_seed(&config, seed)).unwrap();

        let slots = vec![1., -2., 3.];
        let ciphertext = encryptor.encrypt_slots(&slots).unwrap();
        let decrypted = decryptor.decrypt_slots(&ciphertext).unwrap();
        assert_close(&decrypted, &slots, config.tolerance(1));
    }

    #[test]
    fn test_homomorphic_addition() {
        let cipher = CkksCipher::generate(test_config()).unwrap();
        let left = vec![0.25, -0.5, 1.5];
        let right = vec![1., 2., -3.];

        let sum = cipher
            .encrypt_slots(&left)
            .unwrap()
            .add(&cipher.encrypt_slots(&right).unwrap(), cipher.config())
            .unwrap();
        let decrypted = cipher.decrypt_slots(&sum).unwrap();
        assert_close(&decrypted, &[1.25, 1.5, -1.5], cipher.config().tolerance(2));
    }

    #[test]
    fn test_add_rejects_length_mismatch() {
        let cipher = CkksCipher::generate(test_config()).unwrap();
        let left = cipher.encrypt_slots(&[1., 2.]).unwrap();
        let right = cipher.encrypt_slots(&[1., 2., 3.]).unwrap();
        assert_eq!(
            left.add(&right, cipher.config()).unwrap_err(),
            CkksError::ConfigMismatch
        );
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let cipher = CkksCipher::generate(test_config()).unwrap();
        assert!(matches!(
            cipher.encrypt_slots(&[f64::NAN]).unwrap_err(),
            CkksError::NonFinite(_)
        ));
        assert!(matches!(
            cipher.encrypt_slots(&[f64::INFINITY]).unwrap_err(),
            CkksError::NonFinite(_)
        ));
    }

    #[test]
    fn test_encode_rejects_overflow() {
        let config = CkksConfig {
            poly_modulus_degree: 16,
            coeff_modulus_bits: vec![20],
            scale_bits: 18,
        };
        let cipher = CkksCipher::generate(config).unwrap();
        assert_eq!(
            cipher.encrypt_slots(&[10.]).unwrap_err(),
            CkksError::EncodingOverflow
        );
    }

    #[test]
    fn test_decrypt_rejects_foreign_degree() {
        let cipher = CkksCipher::generate(test_config()).unwrap();
        let other = CkksCipher::generate(CkksConfig {
            poly_modulus_degree: 16,
            coeff_modulus_bits: vec![40, 30],
            scale_bits: 30,
        })
        .unwrap();
        let ciphertext = other.encrypt_slots(&[1., 2.]).unwrap();
        assert_eq!(
            cipher.decrypt_slots(&ciphertext).unwrap_err(),
            CkksError::ConfigMismatch
        );
    }
}
