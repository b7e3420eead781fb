//! RS256: RSASSA-PKCS1-v1_5 with SHA-256.

use super::crypto::{CryptoEngine, SHA256_SIZE};

/// DER `DigestInfo` prefix for a SHA-256 digest.
const SHA256_DIGEST_INFO: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
    0x00, 0x04, 0x20,
];

/// Minimum number of 0xFF padding bytes.
const MIN_PADDING: usize = 8;

/// Verify an RS256 signature over `input` with the public key `(n, e)`.
pub fn verify(
    engine: &dyn CryptoEngine,
    input: &[u8],
    signature: &[u8],
    modulus: &[u8],
    exponent: &[u8],
) -> bool {
    let Some(encoded) = engine.rsa_public(modulus, exponent, signature) else {
        return false;
    };
    let Some(signed_digest) = decode_digest(&encoded) else {
        return false;
    };
    signed_digest == engine.sha256(input)
}

/// Unwrap `00 01 FF.. 00 DigestInfo H`, requiring the exact SHA-256 layout.
fn decode_digest(encoded: &[u8]) -> Option<[u8; SHA256_SIZE]> {
    let rest = encoded.strip_prefix(&[0x00, 0x01])?;
    let padding = rest.iter().take_while(|&&b| b == 0xff).count();
    if padding < MIN_PADDING {
        return None;
    }
    let rest = rest[padding..].strip_prefix(&[0x00])?;
    let digest = rest.strip_prefix(&SHA256_DIGEST_INFO)?;
    <[u8; SHA256_SIZE]>::try_from(digest).ok()
}

/// Build the encoded message for `digest` at modulus size `size`.
///
/// Returns `None` when the modulus is too small to hold the encoding.
pub(crate) fn encode_digest(digest: &[u8; SHA256_SIZE], size: usize) -> Option<Vec<u8>> {
    let fixed = 3 + SHA256_DIGEST_INFO.len() + SHA256_SIZE;
    let padding = size.checked_sub(fixed)?;
    if padding < MIN_PADDING {
        return None;
    }
    let mut encoded = Vec::with_capacity(size);
    encoded.extend_from_slice(&[0x00, 0x01]);
    encoded.resize(2 + padding, 0xff);
    encoded.push(0x00);
    encoded.extend_from_slice(&SHA256_DIGEST_INFO);
    encoded.extend_from_slice(digest);
    Some(encoded)
}
