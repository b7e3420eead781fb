use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{AgentError, AgentResult};
use crate::report::CloudClient;

/// Cloud client that keeps every reported document.
#[derive(Debug, Clone, Default)]
pub struct RecordingCloud {
    inner: Arc<Mutex<CloudLog>>,
}

#[derive(Debug, Default)]
struct CloudLog {
    documents: Vec<Value>,
    offline: bool,
}

impl RecordingCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reports fail.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Every document reported so far.
    pub fn documents(&self) -> Vec<Value> {
        self.inner.lock().documents.clone()
    }

    /// The latest reported document.
    pub fn last(&self) -> Option<Value> {
        self.inner.lock().documents.last().cloned()
    }

    /// The latest document carrying `deviceUpdate.agent.state`.
    pub fn last_state_report(&self) -> Option<Value> {
        self.inner
            .lock()
            .documents
            .iter()
            .rev()
            .find(|doc| doc.pointer("/deviceUpdate/agent/state").is_some())
            .cloned()
    }

    /// Documents carrying a `deviceUpdate.service` acknowledgement.
    pub fn service_acks(&self) -> Vec<Value> {
        self.inner
            .lock()
            .documents
            .iter()
            .filter(|doc| doc.pointer("/deviceUpdate/service").is_some())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.inner.lock().documents.clear();
    }
}

impl CloudClient for RecordingCloud {
    fn report(&mut self, document: &Value) -> AgentResult<()> {
        let mut log = self.inner.lock();
        if log.offline {
            return Err(AgentError::Transport("cloud client offline".to_string()));
        }
        log.documents.push(document.clone());
        Ok(())
    }
}
