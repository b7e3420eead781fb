//! Agent configuration.
//!
//! [`AgentConfig`] carries the device identity, the fixed capacities that bound
//! every table and buffer the agent owns, and the tick-based timeout budgets of
//! the downloader. Values can be built in code with the `with_*` methods or
//! loaded from an INI file through [`ConfigFile`].

mod file;

pub use file::{config_file_path, ConfigFile};

use crate::error::{AgentError, AgentResult};
use crate::verify::RootKeyTable;

/// Default number of proxy (leaf) devices the agent can update.
pub const DEFAULT_PROXY_UPDATE_COUNT: usize = 0;

/// Default scratch arena size for parsed manifest strings.
pub const DEFAULT_SCRATCH_SIZE: usize = 2048;

/// Base size of the update manifest buffer.
pub const MANIFEST_BASE_SIZE: usize = 1024;

/// Extra manifest room reserved per proxy device.
pub const MANIFEST_SIZE_PER_PROXY: usize = 256;

/// Default maximum size of the detached signature token.
pub const DEFAULT_SIGNATURE_SIZE: usize = 3072;

/// Maximum length of a workflow id.
pub const WORKFLOW_ID_SIZE: usize = 48;

/// Maximum length of a workflow retry timestamp.
pub const RETRY_TIMESTAMP_SIZE: usize = 80;

/// Maximum length of a file download URL.
pub const FILE_URL_SIZE: usize = 320;

/// Default version string reported as `aduVer`.
pub const DEFAULT_AGENT_VERSION: &str = concat!("fwagent;", env!("CARGO_PKG_VERSION"));

/// Tick-based timeout budgets for the downloader.
///
/// One tick is one periodic event, nominally one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Ticks to wait for the first DNS answer; doubled on every retry.
    pub dns_initial: u32,
    /// Number of DNS re-queries after the first one.
    pub dns_retransmit_count: u32,
    /// Ticks to wait for the HTTP connection.
    pub http_connect: u32,
    /// Ticks allowed for the whole HTTP body transfer.
    pub http_download: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dns_initial: 1,
            dns_retransmit_count: 3,
            http_connect: 30,
            http_download: 300,
        }
    }
}

/// Configuration for an [`Agent`](crate::agent::Agent).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Host device manufacturer, matched against manifest compatibility.
    pub manufacturer: String,
    /// Host device model, matched against manifest compatibility.
    pub model: String,
    /// Installed criteria of the running host firmware.
    ///
    /// Empty means the host driver is asked through `UpdateCheck`.
    pub installed_criteria: String,
    /// Version reported as `aduVer` in the startup report.
    pub agent_version: String,
    /// Version reported as `doVer` in the startup report.
    pub delivery_version: String,
    /// Number of proxy devices; sizes the step, file and device tables.
    pub proxy_update_count: usize,
    /// Capacity of the scratch arena holding parsed manifest strings.
    pub scratch_size: usize,
    /// Maximum accepted signature token size.
    pub signature_size: usize,
    /// Downloader timeout budgets.
    pub timeouts: Timeouts,
    /// Trusted root keys for manifest verification.
    pub root_keys: RootKeyTable,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            manufacturer: String::new(),
            model: String::new(),
            installed_criteria: String::new(),
            agent_version: DEFAULT_AGENT_VERSION.to_string(),
            delivery_version: String::new(),
            proxy_update_count: DEFAULT_PROXY_UPDATE_COUNT,
            scratch_size: DEFAULT_SCRATCH_SIZE,
            signature_size: DEFAULT_SIGNATURE_SIZE,
            timeouts: Timeouts::default(),
            root_keys: RootKeyTable::builtin(),
        }
    }
}

impl AgentConfig {
    /// Create a configuration for the given host identity.
    pub fn new(manufacturer: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Set the installed criteria of the running host firmware.
    pub fn with_installed_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.installed_criteria = criteria.into();
        self
    }

    /// Set the number of proxy devices.
    pub fn with_proxy_update_count(mut self, count: usize) -> Self {
        self.proxy_update_count = count;
        self
    }

    /// Set the scratch arena capacity.
    pub fn with_scratch_size(mut self, size: usize) -> Self {
        self.scratch_size = size;
        self
    }

    /// Set the maximum signature token size.
    pub fn with_signature_size(mut self, size: usize) -> Self {
        self.signature_size = size;
        self
    }

    /// Set the downloader timeouts.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replace the trusted root key table.
    pub fn with_root_keys(mut self, keys: RootKeyTable) -> Self {
        self.root_keys = keys;
        self
    }

    /// Set the versions reported at startup.
    pub fn with_versions(
        mut self,
        agent_version: impl Into<String>,
        delivery_version: impl Into<String>,
    ) -> Self {
        self.agent_version = agent_version.into();
        self.delivery_version = delivery_version.into();
        self
    }

    /// Maximum number of steps kept from a manifest.
    pub fn steps_max(&self) -> usize {
        1 + self.proxy_update_count
    }

    /// Maximum number of files kept from a manifest.
    pub fn files_max(&self) -> usize {
        1 + 2 * self.proxy_update_count
    }

    /// Number of device slots, host included.
    pub fn device_count(&self) -> usize {
        1 + self.proxy_update_count
    }

    /// Maximum accepted update manifest size, also the detached manifest bound.
    pub fn manifest_size(&self) -> usize {
        MANIFEST_BASE_SIZE + self.proxy_update_count * MANIFEST_SIZE_PER_PROXY
    }

    /// Check that the configuration can start an agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidParameter`] for an empty host identity or a
    /// zero-sized buffer.
    pub fn validate(&self) -> AgentResult<()> {
        if self.manufacturer.is_empty() || self.model.is_empty() {
            return Err(AgentError::InvalidParameter(
                "device manufacturer and model must not be empty".to_string(),
            ));
        }
        if self.scratch_size == 0 || self.signature_size == 0 {
            return Err(AgentError::InvalidParameter(
                "scratch and signature buffers must not be empty".to_string(),
            ));
        }
        if self.timeouts.dns_initial == 0
            || self.timeouts.http_connect == 0
            || self.timeouts.http_download == 0
        {
            return Err(AgentError::InvalidParameter(
                "timeouts must be at least one tick".to_string(),
            ));
        }
        Ok(())
    }
}
