//! In-memory collaborators for tests, demos and the `simulate` command.
//!
//! Each type is a cheap cloneable handle: hand one clone to the agent and
//! keep another to script behavior and inspect what happened.

mod cloud;
mod driver;
pub mod keys;
mod transport;

pub use cloud::RecordingCloud;
pub use driver::{RecordedCommand, ScriptedDriver};
pub use transport::{DnsMode, MemoryTransport};
