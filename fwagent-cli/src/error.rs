//! CLI error type.

use std::fmt;

use fwagent::{AgentError, AgentState};

/// Errors surfaced to the user by `main`.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file problem.
    Config(String),
    /// Library error.
    Agent(AgentError),
    /// File system error.
    Io(std::io::Error),
    /// Bad command-line arguments.
    Usage(String),
    /// A deployment ended in a state other than idle.
    Deployment(AgentState),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Agent(e) => write!(f, "{}", e),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Deployment(state) => write!(f, "Deployment ended in state '{}'", state),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Agent(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AgentError> for CliError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Config(msg) => CliError::Config(msg),
            other => CliError::Agent(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
