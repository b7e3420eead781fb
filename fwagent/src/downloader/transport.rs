//! Network transport seam used by the downloader.
//!
//! Every call returns immediately. Completion of a DNS query, a connection
//! or new body data is signalled by posting the matching
//! [`AgentEvent`](crate::agent::AgentEvent)
//! through the notifier handed over in [`Transport::attach`]; the downloader
//! then polls for the result on the next event.

use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;

use crate::agent::EventNotifier;
use crate::error::AgentResult;

/// Outcome of starting a DNS query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Answer available immediately (cached or literal).
    Resolved(Ipv4Addr),
    /// Query sent; [`AgentEvent::DnsResponse`](crate::agent::AgentEvent::DnsResponse) follows.
    InProgress,
}

/// Outcome of polling the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// The next chunk of body bytes.
    Data(Bytes),
    /// Nothing buffered; [`AgentEvent::HttpReceive`](crate::agent::AgentEvent::HttpReceive) follows when there is.
    WouldBlock,
    /// The body has ended.
    Done,
}

/// Non-blocking DNS + HTTP client.
pub trait Transport: Send {
    /// Receive the notifier used to signal completions.
    fn attach(&mut self, notifier: EventNotifier);

    /// Start resolving `host`.
    fn dns_query(&mut self, host: &str) -> AgentResult<Resolution>;

    /// Answer of the last query for `host`, once available.
    fn dns_response(&mut self, host: &str) -> Option<Ipv4Addr>;

    /// Open a connection; [`AgentEvent::HttpConnectDone`](crate::agent::AgentEvent::HttpConnectDone) follows.
    fn connect(&mut self, address: SocketAddr, host: &str) -> AgentResult<()>;

    /// Send `GET resource` on the open connection.
    fn send_request(&mut self, host: &str, resource: &str) -> AgentResult<()>;

    /// Poll the response body.
    fn receive(&mut self) -> AgentResult<Received>;

    /// Drop the connection and anything in flight.
    fn release(&mut self);
}
