//! Update manifest data model.
//!
//! Parsed strings live in the content's [`ScratchArena`]; the structures here
//! only hold [`Span`] views into it. Per-step runtime fields (state, matched
//! device, resolved download target) are filled in by the workflow.

use serde::Serialize;

use super::arena::{ScratchArena, Span};
use crate::workflow::StepState;

/// Step type for an update applied directly from a firmware file.
pub const STEP_TYPE_INLINE: &str = "inline";

/// Step type for an update described by a detached (proxy) manifest.
pub const STEP_TYPE_REFERENCE: &str = "reference";

/// Handler name accepted for steps that carry no explicit type.
pub const HANDLER_SWUPDATE: &str = "microsoft/swupdate:1";

/// Update identity (`updateId`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateId {
    pub provider: Span,
    pub name: Span,
    pub version: Span,
}

/// Owned copy of an update identity, used in reports and notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateIdentity {
    pub provider: String,
    pub name: String,
    pub version: String,
}

/// Device criteria a step applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Compatibility {
    pub manufacturer: Span,
    pub model: Span,
    pub group: Span,
}

/// A file declared in the manifest `files` map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileEntry {
    pub id: Span,
    pub name: Span,
    pub size_in_bytes: u32,
    /// Base64 SHA-256 digest.
    pub sha256: Span,
}

/// Everything needed to download one file, resolved from the manifest and
/// the service's `fileUrls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    pub id: String,
    pub name: String,
    pub size_in_bytes: u32,
    pub sha256: String,
    pub url: String,
}

/// How a step is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Firmware file referenced directly.
    Inline,
    /// Firmware described by a detached manifest file.
    Reference,
    /// Type absent; treated as inline for the swupdate handler.
    Unspecified,
    /// Unknown type string.
    Unsupported,
}

/// One unit of update work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub step_type: Span,
    pub handler: Span,
    pub installed_criteria: Span,
    /// First entry of the step's `files` list.
    pub file_id: Span,
    pub detached_manifest_file_id: Span,
    pub state: StepState,
    pub result_code: u32,
    /// Index into the device table once matched.
    pub device: Option<usize>,
    /// Download target once resolved.
    pub target: Option<FileTarget>,
    /// Installed criteria taken from a detached manifest.
    pub proxy_installed_criteria: Option<String>,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            step_type: Span::default(),
            handler: Span::default(),
            installed_criteria: Span::default(),
            file_id: Span::default(),
            detached_manifest_file_id: Span::default(),
            state: StepState::Idle,
            result_code: 0,
            device: None,
            target: None,
            proxy_installed_criteria: None,
        }
    }
}

/// Maximum number of steps and files kept from one manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestCapacity {
    pub steps: usize,
    pub files: usize,
}

/// A parsed update manifest.
#[derive(Debug, Clone)]
pub struct UpdateManifestContent {
    pub(crate) arena: ScratchArena,
    pub manifest_version: Span,
    pub update_id: UpdateId,
    pub compatibility: Compatibility,
    pub steps: Vec<Step>,
    pub files: Vec<FileEntry>,
    /// Steps present in the input but beyond capacity.
    pub dropped_steps: usize,
    /// Files present in the input but beyond capacity.
    pub dropped_files: usize,
}

impl UpdateManifestContent {
    /// Content with no manifest loaded.
    pub fn empty() -> Self {
        Self {
            arena: ScratchArena::with_capacity(0),
            manifest_version: Span::default(),
            update_id: UpdateId::default(),
            compatibility: Compatibility::default(),
            steps: Vec::new(),
            files: Vec::new(),
            dropped_steps: 0,
            dropped_files: 0,
        }
    }

    /// Text behind a span of this content.
    pub fn text(&self, span: Span) -> &str {
        self.arena.text(span)
    }

    /// Raw bytes behind a span of this content.
    pub fn bytes(&self, span: Span) -> &[u8] {
        self.arena.bytes(span)
    }

    /// The scratch arena backing this content.
    pub fn arena(&self) -> &ScratchArena {
        &self.arena
    }

    /// Owned update identity.
    pub fn identity(&self) -> UpdateIdentity {
        UpdateIdentity {
            provider: self.text(self.update_id.provider).to_string(),
            name: self.text(self.update_id.name).to_string(),
            version: self.text(self.update_id.version).to_string(),
        }
    }

    /// Find a declared file by id.
    pub fn find_file(&self, id: &str) -> Option<&FileEntry> {
        self.files.iter().find(|file| self.bytes(file.id) == id.as_bytes())
    }

    /// Classify a step by its type and handler.
    pub fn step_kind(&self, step: &Step) -> StepKind {
        match self.text(step.step_type) {
            STEP_TYPE_INLINE => StepKind::Inline,
            STEP_TYPE_REFERENCE => StepKind::Reference,
            "" if self.text(step.handler) == HANDLER_SWUPDATE => StepKind::Unspecified,
            _ => StepKind::Unsupported,
        }
    }

    /// Installed criteria for a step, preferring a detached manifest's value.
    pub fn installed_criteria<'a>(&'a self, step: &'a Step) -> &'a str {
        match &step.proxy_installed_criteria {
            Some(criteria) => criteria,
            None => self.text(step.installed_criteria),
        }
    }

    /// Whether any steps were kept.
    pub fn has_steps(&self) -> bool {
        !self.steps.is_empty()
    }
}
