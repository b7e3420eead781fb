//! Development signer for update manifests.
//!
//! Builds the same three-hop token the verifier checks: a root key signs a
//! signing-key token (`sjwk`), the signing key signs a payload carrying the
//! manifest's SHA-256. Keys are plain RSA components, so this is for test
//! rigs and lab builds only; production manifests are signed by the service.

use std::path::Path;

use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::{json, Value};

use super::crypto::{left_pad, modulus_size, CryptoEngine, SoftwareCrypto};
use super::{jws, rs256, ALG_RS256};
use crate::error::{AgentError, AgentResult};

/// RSA private key material.
#[derive(Clone)]
pub struct RsaSigningKey {
    kid: String,
    n: BigUint,
    e: BigUint,
    d: BigUint,
}

impl std::fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigningKey")
            .field("kid", &self.kid)
            .field("bits", &self.n.bits())
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct KeyFile {
    kid: String,
    n: String,
    e: String,
    d: String,
}

impl RsaSigningKey {
    /// Build a key from hex-encoded components.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidParameter`] when a component is not hex or
    /// the modulus is too small for an RS256 signature.
    pub fn from_hex(kid: impl Into<String>, n: &str, e: &str, d: &str) -> AgentResult<Self> {
        let parse = |name: &str, value: &str| {
            BigUint::parse_bytes(value.as_bytes(), 16).ok_or_else(|| {
                AgentError::InvalidParameter(format!("key component '{}' is not hex", name))
            })
        };
        Self::from_parts(kid.into(), parse("n", n)?, parse("e", e)?, parse("d", d)?)
    }

    /// Parse a JSON key file: `{"kid", "n", "e", "d"}` with base64url components.
    pub fn from_json(text: &str) -> AgentResult<Self> {
        let file: KeyFile = serde_json::from_str(text)
            .map_err(|e| AgentError::malformed("signing key", e.to_string()))?;
        let component = |name: &str, value: &str| {
            jws::decode(value)
                .map(|bytes| BigUint::from_bytes_be(&bytes))
                .ok_or_else(|| {
                    AgentError::malformed("signing key", format!("invalid '{}'", name))
                })
        };
        Self::from_parts(
            file.kid,
            component("n", &file.n)?,
            component("e", &file.e)?,
            component("d", &file.d)?,
        )
    }

    /// Load a JSON key file.
    pub fn load(path: &Path) -> AgentResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    fn from_parts(kid: String, n: BigUint, e: BigUint, d: BigUint) -> AgentResult<Self> {
        if modulus_size(&n) < 64 || e.bits() == 0 || d.bits() == 0 {
            return Err(AgentError::InvalidParameter(
                "RSA key must have a modulus of at least 512 bits".to_string(),
            ));
        }
        Ok(Self { kid, n, e, d })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Big-endian modulus.
    pub fn modulus(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }

    /// Big-endian public exponent.
    pub fn exponent(&self) -> Vec<u8> {
        self.e.to_bytes_be()
    }

    /// RS256 signature over `input`.
    pub fn sign(&self, input: &[u8]) -> AgentResult<Vec<u8>> {
        let size = modulus_size(&self.n);
        let digest = SoftwareCrypto.sha256(input);
        let encoded = rs256::encode_digest(&digest, size).ok_or_else(|| {
            AgentError::InvalidParameter("modulus too small for RS256".to_string())
        })?;
        let m = BigUint::from_bytes_be(&encoded);
        Ok(left_pad(&m.modpow(&self.d, &self.n).to_bytes_be(), size))
    }
}

/// Build a compact token `b64(header).b64(payload).b64(signature)`.
pub fn compact(header: &Value, payload: &Value, key: &RsaSigningKey) -> AgentResult<String> {
    let signed = format!(
        "{}.{}",
        jws::encode(header.to_string().as_bytes()),
        jws::encode(payload.to_string().as_bytes())
    );
    let signature = key.sign(signed.as_bytes())?;
    Ok(format!("{}.{}", signed, jws::encode(&signature)))
}

/// Token carrying `signing`'s public key, signed by `root`.
pub fn signing_key_token(root: &RsaSigningKey, signing: &RsaSigningKey) -> AgentResult<String> {
    let header = json!({ "alg": ALG_RS256, "kid": root.kid() });
    let payload = json!({
        "kty": "RSA",
        "n": jws::encode(&signing.modulus()),
        "e": jws::encode(&signing.exponent()),
        "alg": ALG_RS256,
        "kid": signing.kid(),
    });
    compact(&header, &payload, root)
}

/// Sign a manifest with the full root → signing key → digest chain.
///
/// # Arguments
///
/// * `manifest` - Exact manifest bytes the device will receive
/// * `root` - Key whose public half is in the device's root key table
/// * `signing` - Intermediate key certified by `root`
pub fn sign_manifest(
    manifest: &[u8],
    root: &RsaSigningKey,
    signing: &RsaSigningKey,
) -> AgentResult<String> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let header = json!({
        "alg": ALG_RS256,
        "sjwk": signing_key_token(root, signing)?,
    });
    let payload = json!({ "sha256": STANDARD.encode(SoftwareCrypto.sha256(manifest)) });
    compact(&header, &payload, signing)
}
