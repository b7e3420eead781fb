//! Agent, step and workflow state codes.
//!
//! The numeric values are part of the reported-property wire format and must
//! not change.

use std::fmt;

/// Overall agent state reported as `agent.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// No deployment running; last one (if any) succeeded.
    Idle,
    /// A manifest was accepted and steps are being processed.
    DeploymentInProgress,
    /// The last deployment failed.
    Failed,
}

impl AgentState {
    /// Wire code.
    pub fn code(&self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::DeploymentInProgress => 6,
            Self::Failed => 255,
        }
    }

    /// Get a display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DeploymentInProgress => "deployment in progress",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of one manifest step.
///
/// States only move forward, except to [`StepState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StepState {
    Idle,
    ManifestDownloadStarted,
    ManifestDownloadSucceeded,
    FirmwareDownloadStarted,
    FirmwareDownloadSucceeded,
    FirmwareInstallStarted,
    FirmwareInstallSucceeded,
    FirmwareApplyStarted,
    FirmwareApplySucceeded,
    Failed,
}

impl StepState {
    /// Wire code.
    pub fn code(&self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::ManifestDownloadStarted => 1,
            Self::ManifestDownloadSucceeded => 2,
            Self::FirmwareDownloadStarted => 3,
            Self::FirmwareDownloadSucceeded => 4,
            Self::FirmwareInstallStarted => 5,
            Self::FirmwareInstallSucceeded => 6,
            Self::FirmwareApplyStarted => 7,
            Self::FirmwareApplySucceeded => 8,
            Self::Failed => 255,
        }
    }

    /// State reached when the download started in this state completes.
    pub fn download_succeeded(&self) -> Option<Self> {
        match self {
            Self::ManifestDownloadStarted => Some(Self::ManifestDownloadSucceeded),
            Self::FirmwareDownloadStarted => Some(Self::FirmwareDownloadSucceeded),
            _ => None,
        }
    }

    /// Get a display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ManifestDownloadStarted => "manifest download started",
            Self::ManifestDownloadSucceeded => "manifest download succeeded",
            Self::FirmwareDownloadStarted => "firmware download started",
            Self::FirmwareDownloadSucceeded => "firmware download succeeded",
            Self::FirmwareInstallStarted => "firmware install started",
            Self::FirmwareInstallSucceeded => "firmware install succeeded",
            Self::FirmwareApplyStarted => "firmware apply started",
            Self::FirmwareApplySucceeded => "firmware apply succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Workflow action requested by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAction {
    /// Download, install and apply the attached manifest.
    ApplyDeployment,
    /// Abandon the current workflow.
    Cancel,
    /// Any other code; echoed back but not acted upon.
    Other(i64),
}

impl WorkflowAction {
    /// Interpret a wire code.
    pub fn from_code(code: i64) -> Self {
        match code {
            3 => Self::ApplyDeployment,
            255 => Self::Cancel,
            other => Self::Other(other),
        }
    }

    /// Wire code.
    pub fn code(&self) -> i64 {
        match self {
            Self::ApplyDeployment => 3,
            Self::Cancel => 255,
            Self::Other(code) => *code,
        }
    }
}

/// Result codes reported in `lastInstallResult`.
pub mod result_code {
    pub const FAILURE: u32 = 0;
    pub const IDLE_SUCCESS: u32 = 200;
    pub const APPLY_SUCCESS: u32 = 700;
    pub const APPLY_IN_PROGRESS: u32 = 701;
}
