//! Arithmetic in the negacyclic ring `Z_q[X]/(X^N + 1)`.
//!
//! Polynomials are coefficient vectors of `BigUint` reduced into `[0, q)`.
//! Multiplication is only ever needed against the ternary secret key, so a
//! sparse signed accumulation replaces a general convolution.

use num::{
    bigint::{BigInt, BigUint},
    Integer,
    Zero,
};

/// Adds two polynomials coefficient-wise modulo `q`.
pub(super) fn add(a: &[BigUint], b: &[BigUint], q: &BigUint) -> Vec<BigUint> {
    a.iter().zip(b.iter()).map(|(x, y)| (x + y) % q).collect()
}

/// Multiplies a polynomial by a ternary polynomial `s` in the negacyclic ring.
///
/// `X^N = -1`, so products that wrap past the degree come back negated.
pub(super) fn mul_ternary(a: &[BigUint], s: &[i8], q: &BigUint) -> Vec<BigUint> {
    let n = a.len();
    let mut acc = vec![BigInt::zero(); n];
    for (j, &sj) in s.iter().enumerate() {
        if sj == 0 {
            continue;
        }
        for (i, ai) in a.iter().enumerate() {
            let k = i + j;
            let (index, wrapped) = if k < n { (k, false) } else { (k - n, true) };
            let term = BigInt::from(ai.clone());
            if (sj < 0) ^ wrapped {
                acc[index] -= term;
            } else {
                acc[index] += term;
            }
        }
    }
    acc.into_iter().map(|x| reduce(x, q)).collect()
}

/// Reduces a signed integer into the canonical representative in `[0, q)`.
pub(super) fn reduce(x: BigInt, q: &BigUint) -> BigUint {
    let modulus = BigInt::from(q.clone());
    // safe unwrap: mod_floor of a positive modulus is non-negative
    x.mod_floor(&modulus).to_biguint().unwrap()
}

/// Maps a canonical representative to its centered value in `(-q/2, q/2]`.
pub(super) fn center(x: &BigUint, q: &BigUint) -> BigInt {
    let half = q >> 1_usize;
    if x > &half {
        BigInt::from(x.clone()) - BigInt::from(q.clone())
    } else {
        BigInt::from(x.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly(coeffs: &[u32]) -> Vec<BigUint> {
        coeffs.iter().map(|&c| BigUint::from(c)).collect()
    }

    #[test]
    fn test_add_wraps_modulus() {
        let q = BigUint::from(17_u8);
        let sum = add(&poly(&[16, 3]), &poly(&[5, 2]), &q);
        assert_eq!(sum, poly(&[4, 5]));
    }

    #[test]
    fn test_mul_ternary_identity() {
        // s = 1 (constant polynomial) leaves the operand unchanged
        let q = BigUint::from(97_u8);
        let a = poly(&[1, 2, 3, 4]);
        let mut s = vec![0_i8; 4];
        s[0] = 1;
        assert_eq!(mul_ternary(&a, &s, &q), a);
    }

    #[test]
    fn test_mul_ternary_negacyclic_wrap() {
        // (X^3) * (X) = X^4 = -1 in Z_q[X]/(X^4 + 1)
        let q = BigUint::from(97_u8);
        let mut a = poly(&[0, 0, 0, 0]);
        a[3] = BigUint::from(1_u8);
        let mut s = vec![0_i8; 4];
        s[1] = 1;
        let product = mul_ternary(&a, &s, &q);
        assert_eq!(product, poly(&[96, 0, 0, 0]));
    }

    #[test]
    fn test_reduce_and_center() {
        let q = BigUint::from(17_u8);
        assert_eq!(reduce(BigInt::from(-1), &q), BigUint::from(16_u8));
        assert_eq!(reduce(BigInt::from(35), &q), BigUint::from(1_u8));
        assert_eq!(center(&BigUint::from(16_u8), &q), BigInt::from(-1));
        assert_eq!(center(&BigUint::from(3_u8), &q), BigInt::from(3));
    }
}
