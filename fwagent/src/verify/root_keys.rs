//! Trusted root key table.
//!
//! Root keys are data: the built-in set is compiled from `root_keys.json`
//! and deployments can trust additional keys from a JSON file of the same
//! shape:
//!
//! ```json
//! [{"kid": "contoso.root.1", "n": "<base64url modulus>", "e": "AQAB"}]
//! ```
//!
//! The built-in set holds production public keys only and ships empty.
//! The development root, whose private half lives in `testing::keys`, is
//! only reachable through `RootKeyTable::development` with the `testing`
//! feature.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use super::jws;
use crate::error::{AgentError, AgentResult};

const BUILTIN_ROOT_KEYS: &str = include_str!("root_keys.json");

#[cfg(any(test, feature = "testing"))]
const DEVELOPMENT_ROOT_KEYS: &str = include_str!("development_root_keys.json");

/// One trusted RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootKey {
    /// Key id matched against the `kid` of a signing-key token.
    pub kid: String,
    /// Big-endian modulus.
    pub modulus: Vec<u8>,
    /// Big-endian public exponent.
    pub exponent: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RootKeyRecord {
    kid: String,
    n: String,
    e: String,
}

/// Table of trusted root keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootKeyTable {
    keys: Vec<RootKey>,
}

impl RootKeyTable {
    /// An empty table that trusts nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// The production keys compiled into this build.
    pub fn builtin() -> Self {
        Self::compiled(BUILTIN_ROOT_KEYS, "built-in")
    }

    /// The development root `fwagent.dev.root.1`.
    ///
    /// Its private key is public; never trust it on a real device.
    #[cfg(any(test, feature = "testing"))]
    pub fn development() -> Self {
        Self::compiled(DEVELOPMENT_ROOT_KEYS, "development")
    }

    fn compiled(text: &str, name: &str) -> Self {
        match Self::from_json(text) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, table = name, "root key table is invalid, trusting no keys");
                Self::default()
            }
        }
    }

    /// Parse a JSON key list.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Malformed`] for invalid JSON, bad base64url or an
    /// empty key component.
    pub fn from_json(text: &str) -> AgentResult<Self> {
        let records: Vec<RootKeyRecord> = serde_json::from_str(text)
            .map_err(|e| AgentError::malformed("root key table", e.to_string()))?;

        let mut table = Self::default();
        for record in records {
            let modulus = decode_component(&record.kid, "n", &record.n)?;
            let exponent = decode_component(&record.kid, "e", &record.e)?;
            table.insert(RootKey {
                kid: record.kid,
                modulus,
                exponent,
            });
        }
        Ok(table)
    }

    /// Load a JSON key list from a file.
    pub fn load(path: &Path) -> AgentResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let table = Self::from_json(&text)?;
        debug!(path = %path.display(), keys = table.len(), "loaded root keys");
        Ok(table)
    }

    /// Add a key, replacing any key with the same id.
    pub fn insert(&mut self, key: RootKey) {
        self.keys.retain(|existing| existing.kid != key.kid);
        self.keys.push(key);
    }

    /// Merge another table into this one.
    pub fn extend(&mut self, other: RootKeyTable) {
        for key in other.keys {
            self.insert(key);
        }
    }

    /// Find a key by exact id bytes.
    pub fn find(&self, kid: &[u8]) -> Option<&RootKey> {
        self.keys.iter().find(|key| key.kid.as_bytes() == kid)
    }

    /// Key ids in table order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|key| key.kid.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn decode_component(kid: &str, name: &str, value: &str) -> AgentResult<Vec<u8>> {
    match jws::decode(value) {
        Some(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Err(AgentError::malformed(
            "root key table",
            format!("key '{}' has an invalid '{}'", kid, name),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_table_excludes_development_root() {
        let table = RootKeyTable::builtin();
        assert!(table.find(b"fwagent.dev.root.1").is_none());
    }

    #[test]
    fn test_development_table_has_development_root() {
        let table = RootKeyTable::development();
        let key = table.find(b"fwagent.dev.root.1").unwrap();
        assert_eq!(key.modulus.len(), 256);
        assert_eq!(key.exponent, vec![0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_find_requires_exact_match() {
        let table = RootKeyTable::development();
        assert!(table.find(b"fwagent.dev.root").is_none());
        assert!(table.find(b"fwagent.dev.root.10").is_none());
        assert!(table.find(b"").is_none());
    }

    #[test]
    fn test_insert_replaces_same_kid() {
        let mut table = RootKeyTable::new();
        table.insert(RootKey {
            kid: "k".into(),
            modulus: vec![1],
            exponent: vec![3],
        });
        table.insert(RootKey {
            kid: "k".into(),
            modulus: vec![2],
            exponent: vec![3],
        });
        assert_eq!(table.len(), 1);
        assert_eq!(table.find(b"k").unwrap().modulus, vec![2]);
    }

    #[test]
    fn test_from_json_rejects_bad_component() {
        let result = RootKeyTable::from_json(r#"[{"kid": "k", "n": "", "e": "AQAB"}]"#);
        assert!(matches!(result, Err(AgentError::Malformed { .. })));

        let result = RootKeyTable::from_json(r#"[{"kid": "k", "n": "a+b/", "e": "AQAB"}]"#);
        assert!(matches!(result, Err(AgentError::Malformed { .. })));
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let result =
            RootKeyTable::from_json(r#"[{"kid": "k", "n": "AQAB", "e": "AQAB", "d": "AQAB"}]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_and_extend() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keys.json");
        std::fs::write(&path, r#"[{"kid": "extra", "n": "wQ", "e": "EQ"}]"#).unwrap();

        let mut table = RootKeyTable::development();
        table.extend(RootKeyTable::load(&path).unwrap());

        assert_eq!(table.len(), 2);
        assert_eq!(table.find(b"extra").unwrap().modulus, vec![0xc1]);
        assert_eq!(table.kids().collect::<Vec<_>>(), ["fwagent.dev.root.1", "extra"]);
    }
}
