//! Public-key and hash primitives behind the trust-chain verifier.
//!
//! The verifier only needs the raw RSA public operation and SHA-256, so the
//! engine is a trait: targets with a hardware crypto block can plug it in,
//! everything else uses [`SoftwareCrypto`].

use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// Size of a SHA-256 digest.
pub const SHA256_SIZE: usize = 32;

/// Largest supported RSA modulus (3072 bits).
pub const RSA_MAX_MODULUS_SIZE: usize = 384;

/// Crypto primitives used for manifest verification.
pub trait CryptoEngine: Send + Sync {
    /// Compute `signature ^ exponent mod modulus`.
    ///
    /// Returns the result left-padded to the modulus length, or `None` when
    /// the key or signature is out of range.
    fn rsa_public(&self, modulus: &[u8], exponent: &[u8], signature: &[u8]) -> Option<Vec<u8>>;

    /// SHA-256 of `data`.
    fn sha256(&self, data: &[u8]) -> [u8; SHA256_SIZE];
}

/// Pure-software engine built on `num-bigint` and `sha2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCrypto;

impl CryptoEngine for SoftwareCrypto {
    fn rsa_public(&self, modulus: &[u8], exponent: &[u8], signature: &[u8]) -> Option<Vec<u8>> {
        let n = BigUint::from_bytes_be(modulus);
        let e = BigUint::from_bytes_be(exponent);
        let size = modulus_size(&n);
        if size == 0 || size > RSA_MAX_MODULUS_SIZE || e.bits() == 0 {
            return None;
        }
        if signature.len() != size {
            return None;
        }

        let s = BigUint::from_bytes_be(signature);
        if s >= n {
            return None;
        }
        Some(left_pad(&s.modpow(&e, &n).to_bytes_be(), size))
    }

    fn sha256(&self, data: &[u8]) -> [u8; SHA256_SIZE] {
        let mut digest = [0u8; SHA256_SIZE];
        digest.copy_from_slice(&Sha256::digest(data));
        digest
    }
}

/// Length in bytes of a modulus, ignoring leading zero bytes.
pub(crate) fn modulus_size(n: &BigUint) -> usize {
    ((n.bits() + 7) / 8) as usize
}

/// Left-pad big-endian bytes with zeros to `size`.
pub(crate) fn left_pad(bytes: &[u8], size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}
