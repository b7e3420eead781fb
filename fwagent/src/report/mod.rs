//! Cloud reporting: outbound property documents and inbound service requests.
//!
//! # Architecture
//!
//! ```text
//!                 writable properties
//! cloud ──────────────────────────────► ServiceRequest::from_properties
//!   ▲                                          │
//!   │  startup / state / service ack           ▼
//!   └────────── CloudClient::report ◄──── documents::*
//! ```
//!
//! Every document lives under the `deviceUpdate` component. Builders are
//! pure functions of agent state, so reporting twice without a state change
//! produces identical documents.

mod documents;
mod service;

pub use documents::{
    service_ack, startup, state, StateReport, COMPAT_PROPERTY_NAMES, COMPONENT_NAME,
    INTERFACE_ID,
};
pub use service::{ServiceLimits, ServiceRequest, Workflow};

use serde_json::Value;

use crate::error::AgentResult;

/// Outbound channel to the cloud service.
///
/// Implementations publish a reported-property document. Failures are
/// logged by the agent and never change workflow state.
pub trait CloudClient: Send {
    /// Publish one reported-property document.
    fn report(&mut self, document: &Value) -> AgentResult<()>;
}

impl<F> CloudClient for F
where
    F: FnMut(&Value) -> AgentResult<()> + Send,
{
    fn report(&mut self, document: &Value) -> AgentResult<()> {
        self(document)
    }
}

/// Status of a service acknowledgement (`ac`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Success,
    BadFormat,
    NotFound,
    InternalError,
}

impl AckStatus {
    /// Wire code.
    pub fn code(&self) -> u32 {
        match self {
            Self::Success => 200,
            Self::BadFormat => 400,
            Self::NotFound => 404,
            Self::InternalError => 500,
        }
    }
}
