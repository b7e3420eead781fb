//! Integration tests for manifest signature verification.
//!
//! These tests exercise the two-level RS256 chain end to end:
//! - the development chain against the development root table
//! - the default configuration refusing the development chain
//! - tampering with the manifest or any token segment
//! - every `alg` field pinned to RS256
//! - trusting an additional root loaded from a key file
//!
//! Run with: `cargo test --test trust_chain`

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use sha2::{Digest, Sha256};
use serde_json::{json, Value};

use fwagent::testing::keys::{self, ROOT_KID, SIGNING_KID};
use fwagent::testing::{MemoryTransport, RecordingCloud, ScriptedDriver};
use fwagent::verify::signer::{compact, sign_manifest, RsaSigningKey};
use fwagent::verify::{ManifestVerifier, RootKey, RootKeyTable};
use fwagent::{Agent, AgentConfig, AgentError, AgentState};

// ============================================================================
// Helper Functions
// ============================================================================

const MANIFEST: &[u8] = br#"{"updateId":{"provider":"Contoso","name":"IoTDevice","version":"3.1"}}"#;

fn dev_verifier() -> ManifestVerifier {
    ManifestVerifier::new(RootKeyTable::development())
}

/// A table trusting the development signing key as a root.
fn alternate_root(signing: &RsaSigningKey) -> RootKeyTable {
    let mut table = RootKeyTable::new();
    table.insert(RootKey {
        kid: signing.kid().to_string(),
        modulus: signing.modulus(),
        exponent: signing.exponent(),
    });
    table
}

/// Sign with the development signing key acting as root.
fn sign_with_alternate_chain(manifest: &[u8]) -> String {
    let root = keys::root_key().unwrap();
    let signing = keys::signing_key().unwrap();
    sign_manifest(manifest, &signing, &root).unwrap()
}

fn flip(token: &str, index: usize) -> String {
    let mut bytes = token.as_bytes().to_vec();
    bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
    String::from_utf8(bytes).unwrap()
}

// ============================================================================
// Verification
// ============================================================================

#[test]
fn test_development_table_trusts_dev_root() {
    let table = RootKeyTable::development();
    assert!(table.find(ROOT_KID.as_bytes()).is_some());
    assert!(table.find(SIGNING_KID.as_bytes()).is_none());

    let token = keys::sign(MANIFEST).unwrap();
    assert!(dev_verifier().verify(MANIFEST, &token));
    assert!(dev_verifier().check(MANIFEST, &token).is_ok());
}

#[test]
fn test_default_config_rejects_development_chain() {
    let forged = br#"{"updateId":{"provider":"Mallory","name":"IoTDevice","version":"9.9"}}"#;
    let token = keys::sign(forged).unwrap();

    let defaults = AgentConfig::default();
    assert!(defaults.root_keys.find(ROOT_KID.as_bytes()).is_none());
    let verifier = ManifestVerifier::new(defaults.root_keys);
    assert!(!verifier.verify(forged, &token));
    assert!(!ManifestVerifier::new(RootKeyTable::builtin()).verify(forged, &token));
}

#[test]
fn test_every_manifest_byte_is_covered() {
    let token = keys::sign(MANIFEST).unwrap();
    let verifier = dev_verifier();
    for index in (0..MANIFEST.len()).step_by(7) {
        let mut tampered = MANIFEST.to_vec();
        tampered[index] ^= 0x01;
        assert!(
            !verifier.verify(&tampered, &token),
            "byte {} not covered",
            index
        );
    }
    assert!(!verifier.verify(&MANIFEST[..MANIFEST.len() - 1], &token));
}

#[test]
fn test_tampered_token_is_rejected() {
    let token = keys::sign(MANIFEST).unwrap();
    let verifier = dev_verifier();
    let dots: Vec<usize> = token.match_indices('.').map(|(i, _)| i).collect();
    assert_eq!(dots.len(), 2);

    let positions = [
        5,
        dots[0] - 3,
        dots[0] + 4,
        dots[1] - 5,
        dots[1] + 2,
        token.len() - 10,
    ];
    for index in positions {
        let tampered = flip(&token, index);
        assert!(!verifier.verify(MANIFEST, &tampered), "position {}", index);
    }
    assert!(!verifier.verify(MANIFEST, &token[..dots[1]]));
    assert!(!verifier.verify(MANIFEST, ""));
}

#[test]
fn test_check_reports_opaque_failure() {
    let token = keys::sign(b"other").unwrap();
    let result = dev_verifier().check(MANIFEST, &token);
    assert!(matches!(result, Err(AgentError::VerificationFailed)));
}

#[test]
fn test_unknown_root_is_rejected() {
    let token = sign_with_alternate_chain(MANIFEST);
    assert!(!dev_verifier().verify(MANIFEST, &token));

    let signing = keys::signing_key().unwrap();
    let verifier = ManifestVerifier::new(alternate_root(&signing));
    assert!(verifier.verify(MANIFEST, &token));
    assert!(!verifier.verify(MANIFEST, &keys::sign(MANIFEST).unwrap()));
}

// ============================================================================
// Algorithm Pinning
// ============================================================================

fn with_alg(mut object: Value, alg: Option<&str>) -> Value {
    if let Some(alg) = alg {
        object["alg"] = json!(alg);
    }
    object
}

/// A correctly signed development chain whose three `alg` fields are chosen
/// by the caller; `None` omits the field.
fn sign_with_algs(
    outer: Option<&str>,
    key_header: Option<&str>,
    key_claims: Option<&str>,
) -> String {
    let root = keys::root_key().unwrap();
    let signing = keys::signing_key().unwrap();
    let claims = with_alg(
        json!({
            "kty": "RSA",
            "n": URL_SAFE_NO_PAD.encode(signing.modulus()),
            "e": URL_SAFE_NO_PAD.encode(signing.exponent()),
            "kid": signing.kid(),
        }),
        key_claims,
    );
    let sjwk = compact(
        &with_alg(json!({"kid": root.kid()}), key_header),
        &claims,
        &root,
    )
    .unwrap();
    let digest = STANDARD.encode(Sha256::digest(MANIFEST));
    compact(
        &with_alg(json!({"sjwk": sjwk}), outer),
        &json!({"sha256": digest}),
        &signing,
    )
    .unwrap()
}

const RS256: Option<&str> = Some("RS256");
const REJECTED_ALGS: [Option<&str>; 3] = [Some("HS256"), Some("none"), None];

#[test]
fn test_pinned_algs_accept_rs256() {
    assert!(dev_verifier().verify(MANIFEST, &sign_with_algs(RS256, RS256, RS256)));
}

#[test]
fn test_outer_header_alg_is_pinned() {
    for alg in REJECTED_ALGS {
        let token = sign_with_algs(alg, RS256, RS256);
        let result = dev_verifier().check(MANIFEST, &token);
        assert!(
            matches!(result, Err(AgentError::VerificationFailed)),
            "alg {:?}",
            alg
        );
    }
}

#[test]
fn test_signing_key_header_alg_is_pinned() {
    for alg in REJECTED_ALGS {
        let token = sign_with_algs(RS256, alg, RS256);
        let result = dev_verifier().check(MANIFEST, &token);
        assert!(
            matches!(result, Err(AgentError::VerificationFailed)),
            "alg {:?}",
            alg
        );
    }
}

#[test]
fn test_signing_key_claims_alg_is_pinned() {
    for alg in REJECTED_ALGS {
        let token = sign_with_algs(RS256, RS256, alg);
        let result = dev_verifier().check(MANIFEST, &token);
        assert!(
            matches!(result, Err(AgentError::VerificationFailed)),
            "alg {:?}",
            alg
        );
    }
}

// ============================================================================
// Root Key Files
// ============================================================================

#[test]
fn test_root_key_file_extends_table() {
    let signing = keys::signing_key().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roots.json");
    let records = json!([{
        "kid": signing.kid(),
        "n": URL_SAFE_NO_PAD.encode(signing.modulus()),
        "e": URL_SAFE_NO_PAD.encode(signing.exponent()),
    }]);
    std::fs::write(&path, records.to_string()).unwrap();

    let mut table = RootKeyTable::development();
    table.extend(RootKeyTable::load(&path).unwrap());
    assert_eq!(table.len(), 2);
    assert_eq!(table.kids().collect::<Vec<_>>(), vec![ROOT_KID, SIGNING_KID]);

    let verifier = ManifestVerifier::new(table);
    assert!(verifier.verify(MANIFEST, &keys::sign(MANIFEST).unwrap()));
    assert!(verifier.verify(MANIFEST, &sign_with_alternate_chain(MANIFEST)));
}

#[test]
fn test_bad_root_key_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roots.json");
    std::fs::write(&path, r#"[{"kid": "k", "n": "!!", "e": "AQAB"}]"#).unwrap();
    assert!(matches!(
        RootKeyTable::load(&path),
        Err(AgentError::Malformed { .. })
    ));
    assert!(RootKeyTable::load(&dir.path().join("missing.json")).is_err());
}

// ============================================================================
// Agent Integration
// ============================================================================

#[test]
fn test_agent_uses_configured_roots() {
    let signing = keys::signing_key().unwrap();
    let config = AgentConfig::new("Contoso", "IoTDevice")
        .with_installed_criteria("1.0")
        .with_root_keys(alternate_root(&signing));
    let cloud = RecordingCloud::new();
    let agent = Agent::start(
        config,
        Box::new(cloud.clone()),
        Box::new(MemoryTransport::new()),
        ScriptedDriver::new().boxed(),
        None,
    )
    .unwrap();

    let manifest = json!({
        "updateId": {"provider": "Contoso", "name": "IoTDevice", "version": "1.0"},
        "compatibility": [{"deviceManufacturer": "Contoso", "deviceModel": "IoTDevice"}],
        "instructions": {"steps": [{"type": "inline", "files": ["f1"],
            "handlerProperties": {"installedCriteria": "1.0"}}]},
        "files": {"f1": {"fileName": "a.bin", "sizeInBytes": 1,
            "hashes": {"sha256": "bjQLnP+zepicpUTmu3gKLHiQHT+zNzh2hRGjBhevoB0="}}}
    })
    .to_string();
    let document = |signature: String| {
        json!({"deviceUpdate": {"__t": "c", "service": {
            "workflow": {"action": 3, "id": "wf"},
            "updateManifest": manifest,
            "updateManifestSignature": signature,
        }}})
        .to_string()
    };

    let dev_signed = document(keys::sign(manifest.as_bytes()).unwrap());
    let rejected = agent.handle_properties(dev_signed.as_bytes(), 1);
    assert!(matches!(rejected, Err(AgentError::VerificationFailed)));
    assert_eq!(agent.state(), AgentState::Failed);

    let alternate_signed = document(sign_with_alternate_chain(manifest.as_bytes()));
    agent
        .handle_properties(alternate_signed.as_bytes(), 2)
        .unwrap();
    agent.process_events();
    assert_eq!(agent.state(), AgentState::Idle);
}
