//! `http://host[:port]/resource` file URLs.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{AgentError, AgentResult};

const HTTP_SCHEME: &str = "http://";

/// Default HTTP port.
pub const HTTP_PORT: u16 = 80;

/// Download host: a literal address needs no DNS lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Address(Ipv4Addr),
    Name(String),
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{}", address),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A parsed download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUrl {
    pub host: Host,
    pub port: u16,
    /// Request path, always starting with `/`.
    pub resource: String,
}

impl FileUrl {
    /// Parse a plain-HTTP URL.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidParameter`] for another scheme, a missing
    /// host or resource separator, or a bad port.
    pub fn parse(url: &str) -> AgentResult<Self> {
        let invalid = |reason: &str| AgentError::InvalidParameter(format!("url {}: {}", url, reason));

        let rest = url
            .strip_prefix(HTTP_SCHEME)
            .ok_or_else(|| invalid("only http:// is supported"))?;
        let slash = rest.find('/').ok_or_else(|| invalid("missing resource"))?;
        let (authority, resource) = rest.split_at(slash);

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| invalid("bad port"))?,
            ),
            None => (authority, HTTP_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let host = match host.parse::<Ipv4Addr>() {
            Ok(address) => Host::Address(address),
            Err(_) => Host::Name(host.to_string()),
        };

        Ok(Self {
            host,
            port,
            resource: resource.to_string(),
        })
    }

    /// Host name as sent in the `Host` header.
    pub fn host_name(&self) -> String {
        self.host.to_string()
    }
}
