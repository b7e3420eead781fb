//! Reported-property document builders.

use serde_json::{json, Map, Value};

use super::service::Workflow;
use super::AckStatus;
use crate::manifest::UpdateIdentity;
use crate::workflow::{result_code, AgentState};

/// Component holding every update agent property.
pub const COMPONENT_NAME: &str = "deviceUpdate";

/// Interface id reported in `deviceProperties`.
pub const INTERFACE_ID: &str = "dtmi:azure:iot:deviceUpdate;1";

/// Device properties the service matches compatibility against.
pub const COMPAT_PROPERTY_NAMES: &str = "manufacturer,model";

fn component(name: &str, value: Value) -> Value {
    let mut body = Map::new();
    body.insert("__t".to_string(), json!("c"));
    body.insert(name.to_string(), value);
    let mut root = Map::new();
    root.insert(COMPONENT_NAME.to_string(), Value::Object(body));
    Value::Object(root)
}

/// Startup report announcing the device identity.
pub fn startup(
    manufacturer: &str,
    model: &str,
    agent_version: &str,
    delivery_version: &str,
) -> Value {
    component(
        "agent",
        json!({
            "deviceProperties": {
                "manufacturer": manufacturer,
                "model": model,
                "interfaceId": INTERFACE_ID,
                "aduVer": agent_version,
                "doVer": delivery_version,
            },
            "compatPropertyNames": COMPAT_PROPERTY_NAMES,
        }),
    )
}

/// Inputs of a state report.
#[derive(Debug, Clone, Copy)]
pub struct StateReport<'a> {
    pub state: AgentState,
    pub workflow: &'a Workflow,
    /// Identity of the current manifest.
    pub update: &'a UpdateIdentity,
    /// Steps in the current manifest; zero when none was accepted.
    pub step_count: usize,
}

/// Agent state report.
///
/// `installedUpdateId` is present only when idle with a manifest loaded;
/// `lastInstallResult` only outside a deployment with a manifest loaded.
pub fn state(report: &StateReport<'_>) -> Value {
    let mut agent = Map::new();
    agent.insert("state".to_string(), json!(report.state.code()));

    let workflow = report.workflow;
    if !workflow.id.is_empty() {
        let mut value = Map::new();
        value.insert("action".to_string(), json!(workflow.action.code()));
        value.insert("id".to_string(), json!(workflow.id));
        if !workflow.retry_timestamp.is_empty() {
            value.insert(
                "retryTimestamp".to_string(),
                json!(workflow.retry_timestamp),
            );
        }
        agent.insert("workflow".to_string(), Value::Object(value));
    }

    if report.step_count > 0 {
        if report.state == AgentState::Idle {
            let update = report.update;
            let installed = json!({
                "provider": update.provider,
                "name": update.name,
                "version": update.version,
            });
            agent.insert(
                "installedUpdateId".to_string(),
                json!(installed.to_string()),
            );
        }

        if report.state != AgentState::DeploymentInProgress {
            let code = if report.state == AgentState::Idle {
                result_code::APPLY_SUCCESS
            } else {
                result_code::FAILURE
            };
            let steps: Map<String, Value> = (0..report.step_count)
                .map(|i| (format!("step_{}", i), install_result(code)))
                .collect();
            let mut result = install_result(code);
            if let Value::Object(fields) = &mut result {
                fields.insert("stepResults".to_string(), Value::Object(steps));
            }
            agent.insert("lastInstallResult".to_string(), result);
        }
    }

    component("agent", Value::Object(agent))
}

fn install_result(code: u32) -> Value {
    json!({
        "resultCode": code,
        "extendedResultCode": 0,
        "resultDetails": "",
    })
}

/// Acknowledgement of a `service` writable property.
///
/// # Arguments
///
/// * `status` - Outcome of processing the property
/// * `version` - Desired-property version being acknowledged
/// * `description` - Free text, usually empty
/// * `workflow` - Workflow received with the property
/// * `update_manifest` - Manifest text received with the property
pub fn service_ack(
    status: AckStatus,
    version: u64,
    description: &str,
    workflow: &Workflow,
    update_manifest: &str,
) -> Value {
    let mut flow = Map::new();
    flow.insert("action".to_string(), json!(workflow.action.code()));
    flow.insert("id".to_string(), json!(workflow.id));
    if !workflow.retry_timestamp.is_empty() {
        flow.insert(
            "retryTimestamp".to_string(),
            json!(workflow.retry_timestamp),
        );
    }

    component(
        "service",
        json!({
            "ac": status.code(),
            "av": version,
            "ad": description,
            "value": {
                "workflow": Value::Object(flow),
                "updateManifest": update_manifest,
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowAction;

    fn workflow() -> Workflow {
        Workflow {
            action: WorkflowAction::ApplyDeployment,
            id: "4b5f".to_string(),
            retry_timestamp: String::new(),
        }
    }

    fn identity() -> UpdateIdentity {
        UpdateIdentity {
            provider: "Contoso".to_string(),
            name: "IoTDevice".to_string(),
            version: "1.0.1".to_string(),
        }
    }

    #[test]
    fn test_startup_document() {
        let doc = startup("Contoso", "IoTDevice", "fwagent;0.1", "");
        assert_eq!(doc["deviceUpdate"]["__t"], "c");
        let agent = &doc["deviceUpdate"]["agent"];
        assert_eq!(agent["deviceProperties"]["manufacturer"], "Contoso");
        assert_eq!(agent["deviceProperties"]["interfaceId"], INTERFACE_ID);
        assert_eq!(agent["compatPropertyNames"], "manufacturer,model");
    }

    #[test]
    fn test_in_progress_state_has_no_result() {
        let workflow = workflow();
        let update = identity();
        let doc = state(&StateReport {
            state: AgentState::DeploymentInProgress,
            workflow: &workflow,
            update: &update,
            step_count: 1,
        });
        let agent = &doc["deviceUpdate"]["agent"];
        assert_eq!(agent["state"], 6);
        assert_eq!(agent["workflow"]["action"], 3);
        assert_eq!(agent["workflow"]["id"], "4b5f");
        assert!(agent.get("installedUpdateId").is_none());
        assert!(agent.get("lastInstallResult").is_none());
    }

    #[test]
    fn test_idle_state_reports_installed_update() {
        let workflow = workflow();
        let update = identity();
        let doc = state(&StateReport {
            state: AgentState::Idle,
            workflow: &workflow,
            update: &update,
            step_count: 2,
        });
        let agent = &doc["deviceUpdate"]["agent"];
        let installed: Value =
            serde_json::from_str(agent["installedUpdateId"].as_str().unwrap()).unwrap();
        assert_eq!(installed["version"], "1.0.1");
        assert_eq!(agent["lastInstallResult"]["resultCode"], 700);
        assert_eq!(
            agent["lastInstallResult"]["stepResults"]["step_1"]["resultCode"],
            700
        );
    }

    #[test]
    fn test_failed_state_reports_failure_code() {
        let workflow = workflow();
        let update = identity();
        let doc = state(&StateReport {
            state: AgentState::Failed,
            workflow: &workflow,
            update: &update,
            step_count: 1,
        });
        let agent = &doc["deviceUpdate"]["agent"];
        assert_eq!(agent["state"], 255);
        assert!(agent.get("installedUpdateId").is_none());
        assert_eq!(agent["lastInstallResult"]["resultCode"], 0);
    }

    #[test]
    fn test_state_without_workflow_or_manifest() {
        let workflow = Workflow::default();
        let update = UpdateIdentity::default();
        let doc = state(&StateReport {
            state: AgentState::Idle,
            workflow: &workflow,
            update: &update,
            step_count: 0,
        });
        assert_eq!(doc, json!({"deviceUpdate": {"__t": "c", "agent": {"state": 0}}}));
    }

    #[test]
    fn test_repeated_state_reports_are_identical() {
        let workflow = Workflow {
            retry_timestamp: "2022-01-26T11:33:29.9680598Z".to_string(),
            ..workflow()
        };
        let update = identity();
        let report = StateReport {
            state: AgentState::Idle,
            workflow: &workflow,
            update: &update,
            step_count: 1,
        };
        assert_eq!(state(&report).to_string(), state(&report).to_string());
        assert_eq!(
            state(&report)["deviceUpdate"]["agent"]["workflow"]["retryTimestamp"],
            "2022-01-26T11:33:29.9680598Z"
        );
    }

    #[test]
    fn test_service_ack() {
        let doc = service_ack(AckStatus::Success, 7, "", &workflow(), "{}");
        let service = &doc["deviceUpdate"]["service"];
        assert_eq!(service["ac"], 200);
        assert_eq!(service["av"], 7);
        assert_eq!(service["ad"], "");
        assert_eq!(service["value"]["workflow"]["id"], "4b5f");
        assert_eq!(service["value"]["updateManifest"], "{}");
    }
}
