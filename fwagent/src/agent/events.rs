//! Agent event queue.
//!
//! Network callbacks and application calls never touch agent state; they
//! post an [`AgentEvent`] and the next [`Agent::process_events`] call
//! performs the work under the agent lock.
//!
//! [`Agent::process_events`]: super::Agent::process_events

use tokio::sync::mpsc;
use tracing::trace;

/// Work items for the agent's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentEvent {
    /// A verified manifest is waiting for its update check.
    Update,
    /// Download and install the pending steps.
    DownloadInstall,
    /// Apply the installed steps.
    Apply,
    /// A DNS answer may be available.
    DnsResponse,
    /// The HTTP connection is established.
    HttpConnectDone,
    /// HTTP body data may be available.
    HttpReceive,
    /// One timer tick elapsed.
    Periodic,
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::DownloadInstall => "download and install",
            Self::Apply => "apply",
            Self::DnsResponse => "dns response",
            Self::HttpConnectDone => "http connect done",
            Self::HttpReceive => "http receive",
            Self::Periodic => "periodic",
        }
    }
}

/// Cloneable handle for posting events from any thread.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl EventNotifier {
    /// Queue an event. Events posted after the agent is dropped are discarded.
    pub fn post(&self, event: AgentEvent) {
        trace!(event = event.name(), "event posted");
        let _ = self.tx.send(event);
    }
}

/// Create a connected notifier and receiver.
pub fn channel() -> (EventNotifier, mpsc::UnboundedReceiver<AgentEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventNotifier { tx }, rx)
}
