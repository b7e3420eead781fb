//! Property-based tests for untrusted input handling.
//!
//! Manifests, service properties and signature tokens all arrive from the
//! network. These tests check that arbitrary input is rejected cleanly and
//! that every fixed capacity is honored.
//!
//! Run with: `cargo test --test manifest_properties`

use proptest::prelude::*;
use serde_json::json;

use fwagent::config::WORKFLOW_ID_SIZE;
use fwagent::manifest::{self, ManifestCapacity, ScratchArena};
use fwagent::report::{ServiceLimits, ServiceRequest};
use fwagent::verify::{ManifestVerifier, RootKeyTable};
use fwagent::AgentError;

// ============================================================================
// Helper Functions
// ============================================================================

fn limits() -> ServiceLimits {
    ServiceLimits {
        manifest_size: 1024,
        signature_size: 3072,
        files_max: 4,
    }
}

fn manifest_with(steps: usize, files: usize) -> String {
    let step = json!({
        "type": "inline",
        "handler": "microsoft/swupdate:1",
        "files": ["f0"],
        "handlerProperties": {"installedCriteria": "1.0"}
    });
    let files: serde_json::Map<String, serde_json::Value> = (0..files)
        .map(|i| {
            (
                format!("f{}", i),
                json!({"fileName": format!("fw{}.bin", i), "sizeInBytes": 10 + i,
                       "hashes": {"sha256": "AAAA"}}),
            )
        })
        .collect();
    json!({
        "updateId": {"provider": "Contoso", "name": "IoTDevice", "version": "1.0"},
        "compatibility": [{"deviceManufacturer": "Contoso", "deviceModel": "IoTDevice"}],
        "instructions": {"steps": vec![step; steps]},
        "files": files
    })
    .to_string()
}

// ============================================================================
// Manifest Parser
// ============================================================================

proptest! {
    #[test]
    fn test_parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = manifest::parse(
            &bytes,
            ScratchArena::with_capacity(256),
            ManifestCapacity { steps: 2, files: 2 },
        );
    }

    #[test]
    fn test_parse_arbitrary_json_never_panics(text in "[\\[\\]{}\":,a-z0-9 ]{0,200}") {
        let _ = manifest::parse(
            text.as_bytes(),
            ScratchArena::with_capacity(256),
            ManifestCapacity { steps: 2, files: 2 },
        );
    }

    #[test]
    fn test_capacity_bounds_steps_and_files(
        steps in 0usize..6,
        files in 0usize..6,
        max_steps in 1usize..4,
        max_files in 1usize..4,
    ) {
        let text = manifest_with(steps, files);
        let content = manifest::parse(
            text.as_bytes(),
            ScratchArena::with_capacity(4096),
            ManifestCapacity { steps: max_steps, files: max_files },
        )?;

        prop_assert_eq!(content.steps.len(), steps.min(max_steps));
        prop_assert_eq!(content.dropped_steps, steps - steps.min(max_steps));
        prop_assert_eq!(content.files.len(), files.min(max_files));
        prop_assert_eq!(content.dropped_files, files - files.min(max_files));
    }

    #[test]
    fn test_scratch_arena_is_never_overrun(size in 0usize..200) {
        let text = manifest_with(1, 1);
        match manifest::parse(
            text.as_bytes(),
            ScratchArena::with_capacity(size),
            ManifestCapacity { steps: 1, files: 1 },
        ) {
            Ok(content) => prop_assert!(content.arena().used() <= size),
            Err(e) => prop_assert!(e.is_buffer_exhausted(), "unexpected error {}", e),
        }
    }

    #[test]
    fn test_escaped_strings_are_decoded(provider in "[ -~]{1,24}") {
        let text = json!({
            "updateId": {"provider": provider, "name": "n", "version": "v"}
        })
        .to_string();
        let content = manifest::parse(
            text.as_bytes(),
            ScratchArena::with_capacity(256),
            ManifestCapacity { steps: 1, files: 1 },
        )?;
        prop_assert_eq!(content.identity().provider, provider);
    }
}

// ============================================================================
// Service Property
// ============================================================================

proptest! {
    #[test]
    fn test_workflow_id_bound(id in "[a-f0-9-]{0,80}") {
        let doc = json!({"service": {"workflow": {"action": 3, "id": id}}}).to_string();
        let result = ServiceRequest::from_properties(doc.as_bytes(), limits());
        if id.len() <= WORKFLOW_ID_SIZE {
            let request = result?.expect("service present");
            prop_assert_eq!(request.workflow.id, id);
        } else {
            prop_assert!(matches!(result, Err(AgentError::BufferExhausted(_))));
        }
    }

    #[test]
    fn test_action_code_is_echoed(code in any::<i32>()) {
        let doc = json!({"service": {"workflow": {"action": code}}}).to_string();
        let request = ServiceRequest::from_properties(doc.as_bytes(), limits())?
            .expect("service present");
        prop_assert_eq!(request.workflow.action.code(), i64::from(code));
    }

    #[test]
    fn test_service_parser_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = ServiceRequest::from_properties(&bytes, limits());
    }
}

// ============================================================================
// Signature Tokens
// ============================================================================

proptest! {
    #[test]
    fn test_arbitrary_tokens_never_verify(token in "[A-Za-z0-9_.-]{0,400}") {
        let verifier = ManifestVerifier::new(RootKeyTable::development());
        let body: &[u8] = b"{}";
        prop_assert!(!verifier.verify(body, &token));
    }
}
