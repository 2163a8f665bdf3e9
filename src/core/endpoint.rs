//! Endpoint identity.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
};

use crate::config::ShareScope;

/// Identity of one backend endpoint: address, numeric port, and the hostname
/// it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub addr: IpAddr,
    pub port: u16,
    pub hostname: String,
}

impl EndpointKey {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }

    /// Key used for registry deduplication under `scope`. DIRECTOR sharing
    /// drops the hostname so equal (address, port) pairs collapse; HOST
    /// sharing keeps the full triple.
    pub fn registry_key(&self, scope: ShareScope) -> RegistryKey {
        let hostname = match scope {
            ShareScope::Director => None,
            ShareScope::Host => Some(self.hostname.clone()),
        };
        RegistryKey {
            hostname,
            addr: self.addr,
            port: self.port,
        }
    }

    /// Stats name tail: `host.addr:port` under HOST scope, `addr:port`
    /// otherwise.
    pub fn name_tail(&self, scope: ShareScope) -> String {
        match scope {
            ShareScope::Director => format!("{}", self.socket_addr()),
            ShareScope::Host => format!("{}.{}", self.hostname, self.socket_addr()),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Deduplication key inside a backend registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub hostname: Option<String>,
    pub addr: IpAddr,
    pub port: u16,
}
