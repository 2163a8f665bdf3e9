//! System address-resolution adapter.
//!
//! Wraps the operating system's resolver (`getaddrinfo` under the hood, via
//! `tokio::net::lookup_host`). Lookups return no TTL and no SRV records, so
//! directors built on this adapter must take their resolve interval from
//! configuration.

use async_trait::async_trait;

use crate::ports::resolver::{
    NameResolver, Resolution, ResolveError, ResolveResult, ResolvedAddr, SrvResolution,
};

/// The default resolver: synchronous OS address resolution surfaced through
/// tokio's blocking pool.
#[derive(Debug, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NameResolver for SystemResolver {
    async fn lookup(&self, host: &str, port: u16) -> ResolveResult<Resolution> {
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ResolveError::System {
                code: e.raw_os_error().unwrap_or(0),
                reason: e.to_string(),
            })?;

        let mut addresses: Vec<ResolvedAddr> = Vec::new();
        for sockaddr in addrs {
            let resolved = ResolvedAddr {
                addr: sockaddr.ip(),
                port: sockaddr.port(),
                hostname: host.to_string(),
            };
            if !addresses.contains(&resolved) {
                addresses.push(resolved);
            }
        }

        Ok(Resolution {
            addresses,
            ttl: None,
        })
    }

    async fn lookup_srv(&self, _service: &str) -> ResolveResult<SrvResolution> {
        Err(ResolveError::SrvUnsupported)
    }

    fn provides_ttl(&self) -> bool {
        false
    }

    fn provides_srv(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_localhost() {
        let resolver = SystemResolver::new();
        let resolution = resolver.lookup("localhost", 8080).await.unwrap();
        assert!(!resolution.addresses.is_empty());
        assert!(resolution.addresses.iter().all(|a| a.port == 8080));
        assert!(resolution.addresses.iter().all(|a| a.addr.is_loopback()));
        assert!(resolution.ttl.is_none());
    }

    #[tokio::test]
    async fn test_lookup_failure_carries_reason() {
        let resolver = SystemResolver::new();
        let err = resolver
            .lookup("does-not-exist.invalid", 80)
            .await
            .unwrap_err();
        match err {
            ResolveError::System { reason, .. } => assert!(!reason.is_empty()),
            other => panic!("expected a system resolver error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_srv_unsupported() {
        let resolver = SystemResolver::new();
        let err = resolver.lookup_srv("_http._tcp.example.com").await;
        assert!(matches!(err, Err(ResolveError::SrvUnsupported)));
        assert!(!resolver.provides_srv());
        assert!(!resolver.provides_ttl());
    }
}
