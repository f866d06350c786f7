//! PRNG utilities for the crypto primitives.
//!
//! See the [crypto module] documentation since this is a private module anyways.
//!
//! [crypto module]: crate::crypto

use num::{bigint::BigUint, traits::identities::Zero};
use rand::RngCore;
use rand_chacha::ChaCha20Rng;

/// Generates a secure pseudo-random integer.
///
/// Draws from a uniform distribution over the integers between zero (included) and
/// `max_int` (excluded). Employs the `ChaCha20` stream cipher as a PRNG.
pub fn generate_integer(prng: &mut ChaCha20Rng, max_int: &BigUint) -> BigUint {
    if max_int.is_zero() {
        return BigUint::zero();
    }
    let mut bytes = max_int.to_bytes_le();
    let mut rand_int = max_int.clone();
    while &rand_int >= max_int {
        prng.fill_bytes(&mut bytes);
        rand_int = BigUint::from_bytes_le(&bytes);
    }
    rand_int
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_generate_integer_below_bound() {
        let mut prng = ChaCha20Rng::from_seed([0_u8; 32]);
        let max_int = BigUint::from(1_u8) << 256;
        for _ in 0..100 {
            assert!(generate_integer(&mut prng, &max_int) < max_int);
        }
    }

    #[test]
    fn test_generate_integer_deterministic() {
        let max_int = BigUint::from(1_u8) << 256;
        let mut first = ChaCha20Rng::from_seed([7_u8; 32]);
        let mut second = ChaCha20Rng::from_seed([7_u8; 32]);
        for _ in 0..10 {
            assert_eq!(
                generate_integer(&mut first, &max_int),
                generate_integer(&mut second, &max_int),
            );
        }
    }

    #[test]
    fn test_generate_integer_zero_bound() {
        let mut prng = ChaCha20Rng::from_seed([0_u8; 32]);
        assert_eq!(generate_integer(&mut prng, &BigUint::zero()), BigUint::zero());
    }
}
