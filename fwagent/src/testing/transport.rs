use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::agent::{AgentEvent, EventNotifier};
use crate::downloader::{FileUrl, Received, Resolution, Transport};
use crate::error::{AgentError, AgentResult};

/// How the in-memory resolver answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsMode {
    /// Known names resolve in the query call itself.
    Immediate,
    /// Queries return in progress; the answer follows a `DnsResponse` event.
    Deferred,
    /// Queries never get an answer.
    Silent,
}

/// Transport serving bodies from memory.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryNetwork>>,
}

#[derive(Debug)]
struct MemoryNetwork {
    notifier: Option<EventNotifier>,
    dns_mode: DnsMode,
    hosts: HashMap<String, Ipv4Addr>,
    bodies: HashMap<(String, String), Bytes>,
    chunk_size: usize,
    stall_connect: bool,
    stall_body: bool,
    connection: Option<SocketAddr>,
    response: Option<Result<(Bytes, usize), String>>,
    dns_queries: usize,
    requests: Vec<String>,
    releases: usize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryNetwork {
                notifier: None,
                dns_mode: DnsMode::Immediate,
                hosts: HashMap::new(),
                bodies: HashMap::new(),
                chunk_size: 256,
                stall_connect: false,
                stall_body: false,
                connection: None,
                response: None,
                dns_queries: 0,
                requests: Vec::new(),
                releases: 0,
            })),
        }
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `GET url`. Named hosts become resolvable at
    /// 127.0.0.1 unless already mapped.
    pub fn serve(&self, url: &str, body: impl Into<Bytes>) -> AgentResult<()> {
        let parsed = FileUrl::parse(url)?;
        let host = parsed.host_name();
        let mut network = self.inner.lock();
        if let crate::downloader::Host::Name(name) = &parsed.host {
            network
                .hosts
                .entry(name.clone())
                .or_insert(Ipv4Addr::LOCALHOST);
        }
        network.bodies.insert((host, parsed.resource), body.into());
        Ok(())
    }

    /// Map a host name to an address.
    pub fn resolve(&self, host: &str, address: Ipv4Addr) {
        self.inner.lock().hosts.insert(host.to_string(), address);
    }

    pub fn set_dns_mode(&self, mode: DnsMode) {
        self.inner.lock().dns_mode = mode;
    }

    /// Largest chunk returned by one `receive` call.
    pub fn set_chunk_size(&self, size: usize) {
        self.inner.lock().chunk_size = size.max(1);
    }

    /// Never complete connections.
    pub fn set_stall_connect(&self, stall: bool) {
        self.inner.lock().stall_connect = stall;
    }

    /// Hold back body data. Lifting the stall announces a pending response.
    pub fn set_stall_body(&self, stall: bool) {
        let mut network = self.inner.lock();
        network.stall_body = stall;
        if !stall && network.response.is_some() {
            Self::post(&network, AgentEvent::HttpReceive);
        }
    }

    /// DNS queries received.
    pub fn dns_queries(&self) -> usize {
        self.inner.lock().dns_queries
    }

    /// Requests sent, as `host resource`.
    pub fn requests(&self) -> Vec<String> {
        self.inner.lock().requests.clone()
    }

    /// Number of `release` calls.
    pub fn releases(&self) -> usize {
        self.inner.lock().releases
    }

    /// Whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    fn post(network: &MemoryNetwork, event: AgentEvent) {
        if let Some(notifier) = &network.notifier {
            notifier.post(event);
        }
    }
}

impl Transport for MemoryTransport {
    fn attach(&mut self, notifier: EventNotifier) {
        self.inner.lock().notifier = Some(notifier);
    }

    fn dns_query(&mut self, host: &str) -> AgentResult<Resolution> {
        let mut network = self.inner.lock();
        network.dns_queries += 1;
        match network.dns_mode {
            DnsMode::Immediate => network
                .hosts
                .get(host)
                .copied()
                .map(Resolution::Resolved)
                .ok_or_else(|| AgentError::Transport(format!("unknown host {}", host))),
            DnsMode::Deferred => {
                Self::post(&network, AgentEvent::DnsResponse);
                Ok(Resolution::InProgress)
            }
            DnsMode::Silent => Ok(Resolution::InProgress),
        }
    }

    fn dns_response(&mut self, host: &str) -> Option<Ipv4Addr> {
        let network = self.inner.lock();
        match network.dns_mode {
            DnsMode::Silent => None,
            _ => network.hosts.get(host).copied(),
        }
    }

    fn connect(&mut self, address: SocketAddr, _host: &str) -> AgentResult<()> {
        let mut network = self.inner.lock();
        network.connection = Some(address);
        if !network.stall_connect {
            Self::post(&network, AgentEvent::HttpConnectDone);
        }
        Ok(())
    }

    fn send_request(&mut self, host: &str, resource: &str) -> AgentResult<()> {
        let mut network = self.inner.lock();
        if network.connection.is_none() {
            return Err(AgentError::Transport("not connected".to_string()));
        }
        network.requests.push(format!("{} {}", host, resource));
        let response = match network.bodies.get(&(host.to_string(), resource.to_string())) {
            Some(body) => Ok((body.clone(), 0)),
            None => Err(format!("HTTP 404 for {}", resource)),
        };
        network.response = Some(response);
        if !network.stall_body {
            Self::post(&network, AgentEvent::HttpReceive);
        }
        Ok(())
    }

    fn receive(&mut self) -> AgentResult<Received> {
        let mut network = self.inner.lock();
        if network.stall_body {
            return Ok(Received::WouldBlock);
        }
        let chunk_size = network.chunk_size;
        match network.response.as_mut() {
            None => Err(AgentError::Transport("no request in flight".to_string())),
            Some(Err(status)) => Err(AgentError::Transport(status.clone())),
            Some(Ok((body, offset))) => {
                if *offset >= body.len() {
                    return Ok(Received::Done);
                }
                let end = (*offset + chunk_size).min(body.len());
                let chunk = body.slice(*offset..end);
                *offset = end;
                Ok(Received::Data(chunk))
            }
        }
    }

    fn release(&mut self) {
        let mut network = self.inner.lock();
        network.connection = None;
        network.response = None;
        network.releases += 1;
    }
}
