//! Scheme parameters for the approximate homomorphic cipher.

use num::bigint::BigUint;

use super::CkksError;

/// Bound on the magnitude of the noise sampled into a fresh ciphertext.
///
/// Decoding a fresh ciphertext is off by at most `ERROR_BOUND` integer
/// steps per coefficient before descaling; each homomorphic addition adds
/// another `ERROR_BOUND` steps in the worst case.
pub const ERROR_BOUND: u64 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// The parameters of the leveled approximate scheme.
///
/// The defaults are the parameters commonly used for weight-vector
/// workloads (degree `8192`, modulus chain `[60, 40, 40, 60]`, scale
/// `2^40`). Smaller parameters are useful for tests; production deployments
/// should treat these as part of the coordinator configuration.
pub struct CkksConfig {
    /// The degree `N` of the polynomial modulus `X^N + 1`. Must be a power
    /// of two. One ciphertext chunk carries `N` weights.
    pub poly_modulus_degree: usize,
    /// The bit sizes of the coefficient-modulus chain. The ciphertext
    /// modulus is `sum(bits)` bits wide; the chain length determines the
    /// number of levels.
    pub coeff_modulus_bits: Vec<u32>,
    /// The scaling exponent: weights are encoded at scale `2^scale_bits`.
    pub scale_bits: u32,
}

impl Default for CkksConfig {
    fn default() -> Self {
        Self {
            poly_modulus_degree: 8192,
            coeff_modulus_bits: vec![60, 40, 40, 60],
            scale_bits: 40,
        }
    }
}

impl CkksConfig {
    /// Checks the parameters for consistency.
    ///
    /// # Errors
    /// Fails if the degree is not a power of two of at least `16`, the
    /// modulus chain is empty, or the scale does not fit the modulus.
    pub fn validate(&self) -> Result<(), CkksError> {
        if self.poly_modulus_degree < 16 || !self.poly_modulus_degree.is_power_of_two() {
            return Err(CkksError::InvalidConfig(
                "poly_modulus_degree must be a power of two of at least 16",
            ));
        }
        if self.coeff_modulus_bits.is_empty() {
            return Err(CkksError::InvalidConfig(
                "the coefficient-modulus chain must not be empty",
            ));
        }
        if self.scale_bits == 0 || self.scale_bits >= self.total_modulus_bits() {
            return Err(CkksError::InvalidConfig(
                "scale_bits must be positive and smaller than the total modulus bits",
            ));
        }
        Ok(())
    }

    /// Gets the total bit width of the ciphertext modulus.
    pub fn total_modulus_bits(&self) -> u32 {
        self.coeff_modulus_bits.iter().sum()
    }

    /// Computes the ciphertext modulus `q`: the largest odd integer of
    /// [`total_modulus_bits()`] bits.
    ///
    /// [`total_modulus_bits()`]: CkksConfig::total_modulus_bits
    pub fn modulus(&self) -> BigUint {
        (BigUint::from(1_u8) << self.total_modulus_bits() as usize) - 1_u8
    }

    /// Gets the encoding scale `2^scale_bits`.
    pub fn scale(&self) -> f64 {
        2_f64.powi(self.scale_bits as i32)
    }

    /// Gets the level of a freshly encrypted ciphertext.
    pub fn fresh_level(&self) -> usize {
        self.coeff_modulus_bits.len() - 1
    }

    /// Derives the absolute error bound ε of the decode of an aggregate of
    /// up to `max_added` ciphertexts.
    ///
    /// Covers the per-ciphertext noise plus the encode rounding step.
    pub fn tolerance(&self, max_added: usize) -> f64 {
        (ERROR_BOUND * max_added as u64 + 1) as f64 / self.scale()
    }
}
