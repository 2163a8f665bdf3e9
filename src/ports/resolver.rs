use std::{net::IpAddr, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

/// A single address produced by a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddr {
    pub addr: IpAddr,
    pub port: u16,
    /// Hostname the address was resolved from, for HOST-scope keying.
    pub hostname: String,
}

/// Result of an address lookup. The address list is deduplicated; `ttl` is
/// present only when the backing resolver can supply one.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub addresses: Vec<ResolvedAddr>,
    pub ttl: Option<Duration>,
}

/// One SRV record from a service lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    pub priority: u16,
    pub weight: u16,
    pub target: String,
    pub port: u16,
}

/// Result of an SRV lookup.
#[derive(Debug, Clone, Default)]
pub struct SrvResolution {
    pub records: Vec<SrvTarget>,
    pub ttl: Option<Duration>,
}

/// Errors produced by a name resolver.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ResolveError {
    /// The system resolver failed; carries its numeric code and reason.
    #[error("getaddrinfo {code} ({reason})")]
    System { code: i32, reason: String },

    /// The DNS client failed.
    #[error("dns lookup failed: {0}")]
    Dns(String),

    /// Service lookups are not supported by this resolver.
    #[error("resolver does not support service lookups")]
    SrvUnsupported,

    /// The resolver was shut down while the lookup was pending.
    #[error("resolver shut down")]
    Shutdown,
}

/// Result type alias for resolver operations
pub type ResolveResult<T> = Result<T, ResolveError>;

/// NameResolver defines the port (interface) for turning symbolic hosts and
/// service names into live address sets.
///
/// Implementations must be safe to share across directors and their domain
/// workers; a single instance may serve many concurrent lookups.
#[async_trait]
pub trait NameResolver: Send + Sync + 'static {
    /// Resolve `host` into a deduplicated address list. `port` is the numeric
    /// port attached to each returned address.
    ///
    /// An empty address list is a valid outcome and is reported as success;
    /// callers decide how to treat it.
    async fn lookup(&self, host: &str, port: u16) -> ResolveResult<Resolution>;

    /// Resolve a service name into SRV records.
    async fn lookup_srv(&self, service: &str) -> ResolveResult<SrvResolution>;

    /// Whether lookups carry a DNS TTL.
    fn provides_ttl(&self) -> bool;

    /// Whether [`NameResolver::lookup_srv`] is supported.
    fn provides_srv(&self) -> bool;
}
