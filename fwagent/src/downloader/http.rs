//! Transport backed by the system resolver and blocking `reqwest`.
//!
//! Slow work runs on short-lived worker threads that hand results back
//! through channels and post an event; the agent thread only ever polls.

use std::collections::HashMap;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::transport::{Received, Resolution, Transport};
use crate::agent::{AgentEvent, EventNotifier};
use crate::error::{AgentError, AgentResult};

/// Size of one body read.
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Chunks buffered between the reader thread and the agent.
const CHUNK_QUEUE_DEPTH: usize = 8;

type BodyChunk = Result<Bytes, String>;

/// HTTP transport for real deployments.
pub struct ThreadedHttpTransport {
    notifier: Option<EventNotifier>,
    answers: Arc<Mutex<HashMap<String, Ipv4Addr>>>,
    connection: Option<SocketAddr>,
    body: Option<Receiver<BodyChunk>>,
    cancel: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl ThreadedHttpTransport {
    /// Create a transport whose requests give up after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            notifier: None,
            answers: Arc::new(Mutex::new(HashMap::new())),
            connection: None,
            body: None,
            cancel: Arc::new(AtomicBool::new(false)),
            request_timeout,
        }
    }

    fn notifier(&self) -> AgentResult<EventNotifier> {
        self.notifier
            .clone()
            .ok_or_else(|| AgentError::InvalidParameter("transport is not attached".to_string()))
    }
}

impl Default for ThreadedHttpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl Transport for ThreadedHttpTransport {
    fn attach(&mut self, notifier: EventNotifier) {
        self.notifier = Some(notifier);
    }

    fn dns_query(&mut self, host: &str) -> AgentResult<Resolution> {
        if let Some(address) = self.answers.lock().get(host) {
            return Ok(Resolution::Resolved(*address));
        }

        let notifier = self.notifier()?;
        let answers = Arc::clone(&self.answers);
        let host = host.to_string();
        thread::Builder::new()
            .name("fwagent-dns".to_string())
            .spawn(move || {
                let found = (host.as_str(), 0)
                    .to_socket_addrs()
                    .ok()
                    .and_then(|mut addrs| {
                        addrs.find_map(|addr| match addr.ip() {
                            IpAddr::V4(v4) => Some(v4),
                            IpAddr::V6(_) => None,
                        })
                    });
                match found {
                    Some(address) => {
                        debug!(host = %host, address = %address, "resolved");
                        answers.lock().insert(host, address);
                    }
                    None => debug!(host = %host, "no IPv4 address"),
                }
                notifier.post(AgentEvent::DnsResponse);
            })
            .map_err(|e| AgentError::Transport(format!("DNS worker: {}", e)))?;

        Ok(Resolution::InProgress)
    }

    fn dns_response(&mut self, host: &str) -> Option<Ipv4Addr> {
        self.answers.lock().get(host).copied()
    }

    fn connect(&mut self, address: SocketAddr, host: &str) -> AgentResult<()> {
        let notifier = self.notifier()?;
        debug!(host = %host, address = %address, "connecting");
        self.connection = Some(address);
        notifier.post(AgentEvent::HttpConnectDone);
        Ok(())
    }

    fn send_request(&mut self, host: &str, resource: &str) -> AgentResult<()> {
        let address = self
            .connection
            .ok_or_else(|| AgentError::Transport("not connected".to_string()))?;
        let notifier = self.notifier()?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.request_timeout)
            .resolve(host, address)
            .build()
            .map_err(|e| AgentError::Transport(format!("failed to create HTTP client: {}", e)))?;
        let url = format!("http://{}:{}{}", host, address.port(), resource);

        self.cancel = Arc::new(AtomicBool::new(false));
        let cancel = Arc::clone(&self.cancel);
        let (tx, rx) = mpsc::sync_channel(CHUNK_QUEUE_DEPTH);
        self.body = Some(rx);

        thread::Builder::new()
            .name("fwagent-http".to_string())
            .spawn(move || stream_body(client, url, tx, cancel, notifier))
            .map_err(|e| AgentError::Transport(format!("HTTP worker: {}", e)))?;
        Ok(())
    }

    fn receive(&mut self) -> AgentResult<Received> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| AgentError::Transport("no request in flight".to_string()))?;
        match body.try_recv() {
            Ok(Ok(chunk)) => Ok(Received::Data(chunk)),
            Ok(Err(reason)) => Err(AgentError::Transport(reason)),
            Err(TryRecvError::Empty) => Ok(Received::WouldBlock),
            Err(TryRecvError::Disconnected) => Ok(Received::Done),
        }
    }

    fn release(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.body = None;
        self.connection = None;
    }
}

fn stream_body(
    client: reqwest::blocking::Client,
    url: String,
    tx: SyncSender<BodyChunk>,
    cancel: Arc<AtomicBool>,
    notifier: EventNotifier,
) {
    let mut response = match client.get(&url).send() {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            let _ = tx.send(Err(format!("HTTP {} from {}", response.status(), url)));
            notifier.post(AgentEvent::HttpReceive);
            return;
        }
        Err(e) => {
            let _ = tx.send(Err(format!("request failed: {}", e)));
            notifier.post(AgentEvent::HttpReceive);
            return;
        }
    };

    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    while !cancel.load(Ordering::Relaxed) {
        let chunk = match response.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => Ok(Bytes::copy_from_slice(&buffer[..n])),
            Err(e) => Err(format!("failed to read response: {}", e)),
        };
        let failed = chunk.is_err();
        if tx.send(chunk).is_err() {
            return;
        }
        notifier.post(AgentEvent::HttpReceive);
        if failed {
            return;
        }
    }

    if cancel.load(Ordering::Relaxed) {
        warn!(url = %url, "download cancelled");
        return;
    }
    drop(tx);
    notifier.post(AgentEvent::HttpReceive);
}
