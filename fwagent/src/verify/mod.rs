//! Update manifest trust-chain verification.
//!
//! # Architecture
//!
//! ```text
//! signature token
//!   header { alg: RS256, sjwk } ──────────────┐
//!   payload { sha256 }                        │
//!   signature ◄── signing key                 ▼
//!                      ▲              sjwk token
//!                      │                header { alg: RS256, kid } ──► RootKeyTable
//!                      └────────────── payload { kty, n, e, kid }
//!                                       signature ◄── root key
//! ```
//!
//! The root key certifies the signing key, the signing key signs the outer
//! token, and the outer payload pins the SHA-256 of the manifest bytes. Any
//! failure anywhere yields the same opaque result.

mod crypto;
mod jws;
mod root_keys;
mod rs256;
pub mod signer;

pub use crypto::{CryptoEngine, SoftwareCrypto, RSA_MAX_MODULUS_SIZE, SHA256_SIZE};
pub use jws::CompactToken;
pub use root_keys::{RootKey, RootKeyTable};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{AgentError, AgentResult};

/// The only accepted signature algorithm.
pub const ALG_RS256: &str = "RS256";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenHeader {
    alg: String,
    sjwk: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyTokenHeader {
    alg: String,
    kid: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SigningKeyClaims {
    kty: String,
    n: String,
    e: String,
    alg: String,
    #[allow(dead_code)]
    kid: String,
}

#[derive(Deserialize)]
struct DigestClaims {
    sha256: String,
}

/// Trust-chain link that rejected a token, for trace output only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    TokenShape,
    Header,
    KeyToken,
    UnknownRoot,
    KeySignature,
    KeyClaims,
    TokenSignature,
    Digest,
}

/// Verifies update manifests against a root key table.
pub struct ManifestVerifier {
    root_keys: RootKeyTable,
    engine: Box<dyn CryptoEngine>,
}

impl ManifestVerifier {
    /// Create a verifier using the software crypto engine.
    pub fn new(root_keys: RootKeyTable) -> Self {
        Self::with_engine(root_keys, Box::new(SoftwareCrypto))
    }

    /// Create a verifier using a custom crypto engine.
    pub fn with_engine(root_keys: RootKeyTable, engine: Box<dyn CryptoEngine>) -> Self {
        Self { root_keys, engine }
    }

    pub fn root_keys(&self) -> &RootKeyTable {
        &self.root_keys
    }

    /// Whether `token` is a valid signature of `manifest`.
    pub fn verify(&self, manifest: &[u8], token: &str) -> bool {
        match self.walk_chain(manifest, token) {
            Ok(()) => {
                debug!("manifest signature accepted");
                true
            }
            Err(rejection) => {
                trace!(?rejection, "trust chain walk stopped");
                debug!("manifest signature rejected");
                false
            }
        }
    }

    /// Like [`verify`](Self::verify), as a result.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::VerificationFailed`] for any rejected token.
    pub fn check(&self, manifest: &[u8], token: &str) -> AgentResult<()> {
        if self.verify(manifest, token) {
            Ok(())
        } else {
            Err(AgentError::VerificationFailed)
        }
    }

    fn walk_chain(&self, manifest: &[u8], token: &str) -> Result<(), Rejection> {
        let outer = CompactToken::split(token).ok_or(Rejection::TokenShape)?;
        let header: TokenHeader = decode_json(outer.header()).ok_or(Rejection::Header)?;
        if header.alg != ALG_RS256 {
            return Err(Rejection::Header);
        }

        let key_token = CompactToken::split(&header.sjwk).ok_or(Rejection::KeyToken)?;
        let key_header: KeyTokenHeader =
            decode_json(key_token.header()).ok_or(Rejection::KeyToken)?;
        if key_header.alg != ALG_RS256 {
            return Err(Rejection::KeyToken);
        }

        let root = self
            .root_keys
            .find(key_header.kid.as_bytes())
            .ok_or(Rejection::UnknownRoot)?;
        let key_signature = key_token.signature().ok_or(Rejection::KeySignature)?;
        if !rs256::verify(
            self.engine.as_ref(),
            key_token.signed_input(),
            &key_signature,
            &root.modulus,
            &root.exponent,
        ) {
            return Err(Rejection::KeySignature);
        }

        let claims: SigningKeyClaims =
            decode_json(key_token.payload()).ok_or(Rejection::KeyClaims)?;
        if claims.kty != "RSA" || claims.alg != ALG_RS256 {
            return Err(Rejection::KeyClaims);
        }
        let modulus = jws::decode(&claims.n).ok_or(Rejection::KeyClaims)?;
        let exponent = jws::decode(&claims.e).ok_or(Rejection::KeyClaims)?;

        let signature = outer.signature().ok_or(Rejection::TokenSignature)?;
        if !rs256::verify(
            self.engine.as_ref(),
            outer.signed_input(),
            &signature,
            &modulus,
            &exponent,
        ) {
            return Err(Rejection::TokenSignature);
        }

        let digest: DigestClaims = decode_json(outer.payload()).ok_or(Rejection::Digest)?;
        let signed_digest = STANDARD
            .decode(digest.sha256.as_bytes())
            .map_err(|_| Rejection::Digest)?;
        if signed_digest.len() != SHA256_SIZE || signed_digest != self.engine.sha256(manifest) {
            return Err(Rejection::Digest);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ManifestVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestVerifier")
            .field("root_keys", &self.root_keys.len())
            .finish()
    }
}

fn decode_json<T: DeserializeOwned>(segment: Option<Vec<u8>>) -> Option<T> {
    serde_json::from_slice(&segment?).ok()
}
