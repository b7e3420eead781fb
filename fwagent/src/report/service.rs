//! Inbound `service` writable property.
//!
//! ```json
//! {
//!   "deviceUpdate": {
//!     "__t": "c",
//!     "service": {
//!       "workflow": { "action": 3, "id": "...", "retryTimestamp": "..." },
//!       "updateManifest": "{...}",
//!       "updateManifestSignature": "eyJ...",
//!       "fileUrls": { "f1": "http://..." }
//!     }
//!   }
//! }
//! ```
//!
//! The component wrapper is optional. Unknown keys are ignored, and
//! `updateManifest`, `updateManifestSignature` or `fileUrls` values of the
//! wrong type are skipped rather than rejected.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use super::documents::COMPONENT_NAME;
use crate::config::{AgentConfig, FILE_URL_SIZE, RETRY_TIMESTAMP_SIZE, WORKFLOW_ID_SIZE};
use crate::error::{AgentError, AgentResult};
use crate::workflow::WorkflowAction;

const WHAT: &str = "service property";

/// Workflow correlation data, echoed verbatim in reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub action: WorkflowAction,
    pub id: String,
    pub retry_timestamp: String,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            action: WorkflowAction::Other(0),
            id: String::new(),
            retry_timestamp: String::new(),
        }
    }
}

/// Size bounds applied to a service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceLimits {
    pub manifest_size: usize,
    pub signature_size: usize,
    pub files_max: usize,
}

impl ServiceLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            manifest_size: config.manifest_size(),
            signature_size: config.signature_size,
            files_max: config.files_max(),
        }
    }
}

/// A parsed `service` property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRequest {
    pub workflow: Workflow,
    pub update_manifest: String,
    pub update_manifest_signature: String,
    /// Download URL per file id.
    pub file_urls: BTreeMap<String, String>,
}

impl ServiceRequest {
    /// Extract the `service` property from a writable-property document.
    ///
    /// Returns `Ok(None)` when the document carries no `service` property.
    ///
    /// # Errors
    ///
    /// * [`AgentError::Malformed`] for invalid JSON or a badly typed workflow
    /// * [`AgentError::BufferExhausted`] when a value exceeds its bound
    pub fn from_properties(document: &[u8], limits: ServiceLimits) -> AgentResult<Option<Self>> {
        let root: Value = serde_json::from_slice(document)
            .map_err(|e| AgentError::malformed(WHAT, e.to_string()))?;
        let body = match root.get(COMPONENT_NAME) {
            Some(component) => component,
            None => &root,
        };
        match body.get("service") {
            Some(service) => Self::from_value(service, limits).map(Some),
            None => Ok(None),
        }
    }

    /// Parse the value of the `service` property.
    pub fn from_value(service: &Value, limits: ServiceLimits) -> AgentResult<Self> {
        let service = service
            .as_object()
            .ok_or_else(|| AgentError::malformed(WHAT, "service must be an object"))?;

        let mut request = Self::default();
        if let Some(workflow) = service.get("workflow") {
            request.workflow = parse_workflow(workflow)?;
        }
        if let Some(Value::String(manifest)) = service.get("updateManifest") {
            request.update_manifest = bounded(manifest, limits.manifest_size, "update manifest")?;
        }
        if let Some(Value::String(signature)) = service.get("updateManifestSignature") {
            request.update_manifest_signature =
                bounded(signature, limits.signature_size, "update manifest signature")?;
        }
        if let Some(Value::Object(urls)) = service.get("fileUrls") {
            for (id, url) in urls {
                if request.file_urls.len() >= limits.files_max {
                    warn!(file = %id, max = limits.files_max, "file URL beyond capacity dropped");
                    continue;
                }
                let url = url
                    .as_str()
                    .ok_or_else(|| AgentError::malformed(WHAT, "file URL must be a string"))?;
                request
                    .file_urls
                    .insert(id.clone(), bounded(url, FILE_URL_SIZE, "file URL")?);
            }
        }
        Ok(request)
    }

    /// URL for a file id.
    pub fn file_url(&self, id: &str) -> Option<&str> {
        self.file_urls.get(id).map(String::as_str)
    }
}

fn parse_workflow(value: &Value) -> AgentResult<Workflow> {
    let fields = value
        .as_object()
        .ok_or_else(|| AgentError::malformed(WHAT, "workflow must be an object"))?;

    let mut workflow = Workflow::default();
    if let Some(action) = fields.get("action") {
        let code = action
            .as_i64()
            .filter(|code| i32::try_from(*code).is_ok())
            .ok_or_else(|| AgentError::malformed(WHAT, "workflow action must be an integer"))?;
        workflow.action = WorkflowAction::from_code(code);
    }
    if let Some(id) = fields.get("id") {
        let id = id
            .as_str()
            .ok_or_else(|| AgentError::malformed(WHAT, "workflow id must be a string"))?;
        workflow.id = bounded(id, WORKFLOW_ID_SIZE, "workflow id")?;
    }
    if let Some(timestamp) = fields.get("retryTimestamp") {
        let timestamp = timestamp.as_str().ok_or_else(|| {
            AgentError::malformed(WHAT, "workflow retryTimestamp must be a string")
        })?;
        workflow.retry_timestamp = bounded(timestamp, RETRY_TIMESTAMP_SIZE, "retry timestamp")?;
    }
    Ok(workflow)
}

fn bounded(value: &str, max: usize, what: &'static str) -> AgentResult<String> {
    if value.len() > max {
        return Err(AgentError::BufferExhausted(what));
    }
    Ok(value.to_string())
}
