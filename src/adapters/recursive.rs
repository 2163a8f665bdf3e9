//! Recursive DNS client adapter backed by `hickory-resolver`.
//!
//! Lookups through this adapter carry DNS TTLs and support SRV queries, which
//! unlocks the `ttl_from` variants other than `cfg` and `Director::service`.
//!
//! Configuration is two-phase: [`RecursiveResolverBuilder`] holds the
//! init-only knobs and `build()` consumes it into the immutable
//! [`RecursiveResolver`] runtime handle. Once built there is no way to touch
//! the settings again; late reconfiguration is a type error rather than a
//! runtime one.

use std::{
    net::IpAddr,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use hickory_resolver::{
    Resolver, TokioResolver,
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};
use tokio::sync::Semaphore;

use crate::{
    LOG_TARGET,
    config::{DnsClientConfig, Namespace, RecursionMode, Transport, ValidationError},
    ports::resolver::{
        NameResolver, Resolution, ResolveError, ResolveResult, ResolvedAddr, SrvResolution,
        SrvTarget,
    },
};

/// Init-phase configuration for the recursive client.
///
/// `idle_timeout` and `follow_redirects` are accepted for configuration
/// compatibility; connection reuse and CNAME chasing are managed internally
/// by the DNS client.
#[derive(Debug, Default)]
pub struct RecursiveResolverBuilder {
    cfg: DnsClientConfig,
}

impl RecursiveResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: DnsClientConfig) -> Self {
        Self { cfg }
    }

    pub fn namespaces(mut self, namespaces: Vec<Namespace>) -> Self {
        self.cfg.namespaces = namespaces;
        self
    }

    pub fn transports(mut self, transports: Vec<Transport>) -> Self {
        self.cfg.transports = transports;
        self
    }

    /// Upstream server IP addresses. Empty selects the system configuration.
    pub fn upstreams(mut self, upstreams: Vec<String>) -> Self {
        self.cfg.upstreams = upstreams;
        self
    }

    /// Hostname TLS upstreams must authenticate as.
    pub fn tls_auth_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.tls_auth_name = Some(name.into());
        self
    }

    pub fn idle_timeout(mut self, seconds: f64) -> Self {
        self.cfg.idle_timeout = seconds;
        self
    }

    pub fn query_timeout(mut self, seconds: f64) -> Self {
        self.cfg.query_timeout = seconds;
        self
    }

    pub fn max_outstanding(mut self, limit: u32) -> Self {
        self.cfg.max_outstanding = limit;
        self
    }

    /// Number of pre-allocated lookup contexts.
    pub fn parallel(mut self, contexts: usize) -> Self {
        self.cfg.parallel = contexts;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.cfg.follow_redirects = follow;
        self
    }

    pub fn mode(mut self, mode: RecursionMode) -> Self {
        self.cfg.mode = mode;
        self
    }

    /// Consume the builder into the immutable runtime handle.
    pub fn build(self) -> Result<RecursiveResolver, ValidationError> {
        let cfg = self.cfg;

        for namespace in &cfg.namespaces {
            match namespace {
                Namespace::Dns | Namespace::Localnames => {}
                other => {
                    return Err(ValidationError::InvalidField {
                        field: "namespaces".to_string(),
                        message: format!("{other:?} is not available with this client"),
                    });
                }
            }
        }

        if cfg.transports.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "transports".to_string(),
                message: "at least one transport is required".to_string(),
            });
        }

        if cfg.parallel == 0 {
            return Err(ValidationError::InvalidField {
                field: "parallel".to_string(),
                message: "context pool must hold at least one context".to_string(),
            });
        }

        if cfg.mode == RecursionMode::Recursing {
            tracing::warn!(
                target: LOG_TARGET,
                "full recursion is not available with this client, resolving in stub mode"
            );
        }

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs_f64(cfg.query_timeout);
        if cfg.max_outstanding > 0 {
            opts.num_concurrent_reqs = cfg.max_outstanding as usize;
        }

        let inner = if cfg.upstreams.is_empty() {
            Resolver::builder_tokio()
                .map_err(|e| ValidationError::InvalidField {
                    field: "upstreams".to_string(),
                    message: format!("system resolver configuration unavailable: {e}"),
                })?
                .with_options(opts)
                .build()
        } else {
            let mut ips = Vec::with_capacity(cfg.upstreams.len());
            for upstream in &cfg.upstreams {
                let ip: IpAddr =
                    upstream
                        .parse()
                        .map_err(|_| ValidationError::InvalidField {
                            field: "upstreams".to_string(),
                            message: format!("'{upstream}' is not an IP address"),
                        })?;
                ips.push(ip);
            }
            let group = if cfg.transports.contains(&Transport::Tls) {
                let auth_name =
                    cfg.tls_auth_name
                        .clone()
                        .ok_or_else(|| ValidationError::InvalidField {
                            field: "tls_auth_name".to_string(),
                            message: "required when the TLS transport has explicit upstreams"
                                .to_string(),
                        })?;
                NameServerConfigGroup::from_ips_tls(&ips, 853, auth_name, true)
            } else {
                NameServerConfigGroup::from_ips_clear(&ips, 53, true)
            };
            let resolver_config = ResolverConfig::from_parts(None, Vec::new(), group);
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build()
        };

        Ok(RecursiveResolver {
            inner,
            contexts: Semaphore::new(cfg.parallel),
        })
    }
}

/// Immutable runtime handle over the recursive DNS client.
///
/// Holds a pool of `parallel` lookup contexts; a resolve call blocks until a
/// context is free and returns it on every exit path, including failure.
#[derive(Debug)]
pub struct RecursiveResolver {
    inner: TokioResolver,
    contexts: Semaphore,
}

impl RecursiveResolver {
    /// Builder entry point; see [`RecursiveResolverBuilder`].
    pub fn builder() -> RecursiveResolverBuilder {
        RecursiveResolverBuilder::new()
    }
}

fn remaining_ttl(valid_until: Instant) -> Duration {
    valid_until.saturating_duration_since(Instant::now())
}

#[async_trait]
impl NameResolver for RecursiveResolver {
    async fn lookup(&self, host: &str, port: u16) -> ResolveResult<Resolution> {
        let _context = self
            .contexts
            .acquire()
            .await
            .map_err(|_| ResolveError::Shutdown)?;

        let lookup = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| ResolveError::Dns(e.to_string()))?;

        let ttl = remaining_ttl(lookup.as_lookup().valid_until());
        let mut addresses: Vec<ResolvedAddr> = Vec::new();
        for addr in lookup.iter() {
            let resolved = ResolvedAddr {
                addr,
                port,
                hostname: host.to_string(),
            };
            if !addresses.contains(&resolved) {
                addresses.push(resolved);
            }
        }

        Ok(Resolution {
            addresses,
            ttl: Some(ttl),
        })
    }

    async fn lookup_srv(&self, service: &str) -> ResolveResult<SrvResolution> {
        let _context = self
            .contexts
            .acquire()
            .await
            .map_err(|_| ResolveError::Shutdown)?;

        let lookup = self
            .inner
            .srv_lookup(service)
            .await
            .map_err(|e| ResolveError::Dns(e.to_string()))?;

        let ttl = remaining_ttl(lookup.as_lookup().valid_until());
        let mut records = Vec::new();
        for record in lookup.iter() {
            let target = record.target().to_utf8();
            let target = target.trim_end_matches('.');
            // A root target means "service decidedly not available" (RFC 2782).
            if target.is_empty() {
                continue;
            }
            records.push(SrvTarget {
                priority: record.priority(),
                weight: record.weight(),
                target: target.to_string(),
                port: record.port(),
            });
        }

        Ok(SrvResolution {
            records,
            ttl: Some(ttl),
        })
    }

    fn provides_ttl(&self) -> bool {
        true
    }

    fn provides_srv(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_rejects_unavailable_namespace() {
        let err = RecursiveResolver::builder()
            .namespaces(vec![Namespace::Dns, Namespace::Netbios])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("namespaces"));
    }

    #[tokio::test]
    async fn test_builder_rejects_empty_transports() {
        let err = RecursiveResolver::builder()
            .transports(Vec::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("transports"));
    }

    #[tokio::test]
    async fn test_builder_rejects_empty_context_pool() {
        let err = RecursiveResolver::builder().parallel(0).build().unwrap_err();
        assert!(err.to_string().contains("parallel"));
    }

    #[tokio::test]
    async fn test_builder_rejects_bad_upstream() {
        let err = RecursiveResolver::builder()
            .upstreams(vec!["nameserver.example".to_string()])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("upstreams"));
    }

    #[tokio::test]
    async fn test_tls_upstreams_require_auth_name() {
        let err = RecursiveResolver::builder()
            .transports(vec![Transport::Tls])
            .upstreams(vec!["192.0.2.53".to_string()])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("tls_auth_name"));

        let resolver = RecursiveResolver::builder()
            .transports(vec![Transport::Tls])
            .upstreams(vec!["192.0.2.53".to_string()])
            .tls_auth_name("dns.example.com")
            .build();
        assert!(resolver.is_ok());
    }

    #[tokio::test]
    async fn test_build_with_explicit_upstream() {
        let resolver = RecursiveResolver::builder()
            .upstreams(vec!["192.0.2.53".to_string()])
            .query_timeout(0.5)
            .parallel(2)
            .build()
            .unwrap();
        assert!(resolver.provides_ttl());
        assert!(resolver.provides_srv());
    }
}
