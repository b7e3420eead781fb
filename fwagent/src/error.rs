//! Error types for the update agent.
//!
//! Every fallible operation in the crate returns [`AgentResult`]. The variants
//! mirror the failure classes the workflow distinguishes when deciding whether
//! a step fails, a download is abandoned or a service request is rejected.

use thiserror::Error;

use crate::device::DriverError;

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur while receiving, verifying or applying an update.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Caller misuse: empty identity, zero capacity, missing driver, bad URL.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A manifest, token or service document is structurally invalid.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// Manifest trust-chain verification failed.
    ///
    /// Carries no detail on purpose: callers cannot learn which link of the
    /// chain was rejected.
    #[error("update manifest verification failed")]
    VerificationFailed,

    /// No matching device, file or download URL.
    #[error("{0} not found")]
    NotFound(String),

    /// DNS, connection or HTTP failure, including timeouts.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device driver reported a failure.
    #[error("device driver error: {0}")]
    DriverError(#[from] DriverError),

    /// A fixed-capacity buffer or table is full.
    #[error("buffer exhausted: {0}")]
    BufferExhausted(&'static str),

    /// Configuration file could not be read or holds an invalid value.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while loading keys or configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Shorthand for a [`AgentError::Malformed`] error.
    pub fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            reason: reason.into(),
        }
    }

    /// Whether this error came from a full buffer rather than bad input.
    pub fn is_buffer_exhausted(&self) -> bool {
        matches!(self, Self::BufferExhausted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_failed_is_opaque() {
        let message = AgentError::VerificationFailed.to_string();
        assert_eq!(message, "update manifest verification failed");
    }

    #[test]
    fn test_malformed_display() {
        let err = AgentError::malformed("manifest", "expected object");
        assert_eq!(err.to_string(), "malformed manifest: expected object");
    }

    #[test]
    fn test_driver_error_converts() {
        let err: AgentError = DriverError::new(5, "flash busy").into();
        assert!(matches!(err, AgentError::DriverError(_)));
        assert!(err.to_string().contains("flash busy"));
    }

    #[test]
    fn test_is_buffer_exhausted() {
        assert!(AgentError::BufferExhausted("scratch").is_buffer_exhausted());
        assert!(!AgentError::NotFound("device".into()).is_buffer_exhausted());
    }
}
