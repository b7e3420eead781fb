//! Deployment workflow: agent and step state machines.
//!
//! # Architecture
//!
//! ```text
//!  service property ──► verify ──► parse ──► Update ─┐
//!                                                    │ per Idle step
//!                               ┌────────────────────┘
//!                               ▼
//!             installed? ── yes ──► FirmwareApplySucceeded
//!                │ no
//!                ▼
//!     FirmwareDownloadStarted ──► DownloadInstall ──► download ──► install
//!                                                                    │
//!                                       Apply ◄──────────────────────┘
//!                                         │
//!                                         ▼
//!                                Idle or Failed + report
//! ```
//!
//! Reference steps take a detour first: their detached manifest is
//! downloaded (`ManifestDownloadStarted` to `ManifestDownloadSucceeded`) and
//! its single step is checked on the parent's behalf.

pub(crate) mod engine;
mod state;

pub use state::{result_code, AgentState, StepState, WorkflowAction};
