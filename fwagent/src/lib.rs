//! fwagent - Secure firmware update agent
//!
//! This library receives signed update manifests from a cloud service,
//! verifies them against trusted root keys, downloads firmware over HTTP with
//! integrity checks and drives device drivers through install and apply,
//! reporting progress back to the service.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  properties  ┌──────────────────────────────────────────┐
//! │   cloud    │ ───────────► │ Agent                                    │
//! │            │ ◄─────────── │  verify ─► manifest ─► workflow          │
//! └────────────┘   reports    │                          │               │
//!                             │              downloader ◄┘──► devices    │
//!                             └───────────────┬──────────────────┬───────┘
//!                                             │ Transport        │ DeviceDriver
//!                                             ▼                  ▼
//!                                        DNS / HTTP        host and proxies
//! ```
//!
//! # Example
//!
//! ```no_run
//! use fwagent::testing::{MemoryTransport, RecordingCloud, ScriptedDriver};
//! use fwagent::{Agent, AgentConfig};
//!
//! let agent = Agent::start(
//!     AgentConfig::new("Contoso", "IoTDevice").with_installed_criteria("1.0"),
//!     Box::new(RecordingCloud::new()),
//!     Box::new(MemoryTransport::new()),
//!     ScriptedDriver::new().boxed(),
//!     None,
//! )?;
//! agent.handle_properties(br#"{"deviceUpdate": {"__t": "c"}}"#, 1)?;
//! agent.tick();
//! agent.process_events();
//! # Ok::<(), fwagent::AgentError>(())
//! ```

pub mod agent;
pub mod config;
pub mod device;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod report;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod verify;
pub mod workflow;

pub use agent::{Agent, NotifyCallback, UpdateNotice};
pub use config::AgentConfig;
pub use device::{DeviceDriver, DriverCommand, DriverError, DriverReply};
pub use error::{AgentError, AgentResult};
pub use workflow::{AgentState, StepState};
