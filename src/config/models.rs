//! Configuration data structures for dyndir.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files.
//! They are intentionally serde-friendly and include defaults so that minimal
//! configs remain concise. Durations are expressed as f64 seconds; sub-second
//! values are meaningful (short TTLs are common in test rigs).
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Backend sharing scope: how endpoint keys are deduplicated in the registry.
///
/// Under `Director` the key is (address, port) and backends are shared across
/// all directors using that scope; under `Host` the key is (hostname, address,
/// port) and sharing is confined to the owning director.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShareScope {
    #[default]
    Director,
    Host,
}

/// Where a domain's resolve interval comes from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtlSource {
    /// Always the configured `ttl`.
    #[default]
    Cfg,
    /// The DNS TTL when present, the configured `ttl` otherwise.
    Dns,
    /// min(DNS TTL, configured `ttl`).
    Min,
    /// max(DNS TTL, configured `ttl`).
    Max,
}

/// Health probe template cloned per acquired backend.
///
/// The director never runs probes itself; a template is handed to the host's
/// probe subsystem through the [`crate::ports::probe::ProbeRunner`] port.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProbeTemplate {
    /// Request path the prober should hit.
    pub path: String,
    /// Seconds between probe rounds.
    pub interval: f64,
    /// Per-probe timeout in seconds.
    pub timeout: f64,
    /// Number of recent probes considered for the verdict.
    pub window: u32,
    /// Number of successes within the window required to be healthy.
    pub threshold: u32,
}

impl Default for ProbeTemplate {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            interval: 5.0,
            timeout: 2.0,
            window: 8,
            threshold: 3,
        }
    }
}

/// Namespaces a recursive DNS client may consult.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Namespace {
    Dns,
    Localnames,
    Netbios,
    Mdns,
    Nis,
}

/// Transports a recursive DNS client may use, in preference order.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Udp,
    Tcp,
    Tls,
}

/// Recursion mode of the DNS client.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecursionMode {
    Recursing,
    #[default]
    Stub,
}

/// Settings for the recursive DNS client.
///
/// All of these are init-phase only: they feed
/// [`crate::adapters::RecursiveResolverBuilder`], which consumes them into an
/// immutable runtime handle. There is no way to change them afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DnsClientConfig {
    /// Namespaces to consult.
    pub namespaces: Vec<Namespace>,
    /// Transports in preference order.
    pub transports: Vec<Transport>,
    /// Upstream server IP addresses; empty means the system configuration.
    pub upstreams: Vec<String>,
    /// Hostname to authenticate TLS upstreams as; required with the TLS
    /// transport and explicit upstreams.
    pub tls_auth_name: Option<String>,
    /// Seconds an idle upstream connection is kept open.
    pub idle_timeout: f64,
    /// Per-query timeout in seconds.
    pub query_timeout: f64,
    /// Cap on outstanding queries per context (0 = client default).
    pub max_outstanding: u32,
    /// Number of pre-allocated lookup contexts; a resolve call blocks until
    /// one is free.
    pub parallel: usize,
    /// Whether CNAME redirects are followed.
    pub follow_redirects: bool,
    /// Recursion mode.
    pub mode: RecursionMode,
}

impl Default for DnsClientConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![Namespace::Dns],
            transports: vec![Transport::Udp, Transport::Tcp],
            upstreams: Vec::new(),
            tls_auth_name: None,
            idle_timeout: 10.0,
            query_timeout: 5.0,
            max_outstanding: 0,
            parallel: 16,
            follow_redirects: true,
            mode: RecursionMode::Stub,
        }
    }
}

/// Director construction parameters.
///
/// Defaults match the documented parameter table: port `http`, DIRECTOR
/// sharing, one hour TTL, two hour domain idle eviction, ten second cold
/// wait. I/O timeouts left at `None` inherit the host's globals.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DirectorConfig {
    /// Default port for `backend()` calls, numeric or symbolic.
    pub port: String,
    /// Default Host header for backends and DIRECTOR-scope probes.
    pub host_header: Option<String>,
    /// Backend sharing scope.
    pub share: ShareScope,
    /// Probe template cloned per backend.
    pub probe: Option<ProbeTemplate>,
    /// CIDR entries filtering resolved addresses.
    pub whitelist: Option<Vec<String>>,
    /// Minimum resolve interval / fallback TTL in seconds.
    pub ttl: f64,
    /// Per-backend connect timeout in seconds.
    pub connect_timeout: Option<f64>,
    /// Per-backend first-byte timeout in seconds.
    pub first_byte_timeout: Option<f64>,
    /// Per-backend between-bytes timeout in seconds.
    pub between_bytes_timeout: Option<f64>,
    /// Idle seconds before a domain is evicted.
    pub domain_usage_timeout: f64,
    /// Max seconds a request waits on a cold domain.
    pub first_lookup_timeout: f64,
    /// Per-backend connection cap (0 = unlimited).
    pub max_connections: u32,
    /// PROXY protocol version: 0 (off), 1, or 2.
    pub proxy_header: u8,
    /// Where the resolve interval comes from.
    pub ttl_from: TtlSource,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            port: "http".to_string(),
            host_header: None,
            share: ShareScope::Director,
            probe: None,
            whitelist: None,
            ttl: 3600.0,
            connect_timeout: None,
            first_byte_timeout: None,
            between_bytes_timeout: None,
            domain_usage_timeout: 7200.0,
            first_lookup_timeout: 10.0,
            max_connections: 0,
            proxy_header: 0,
            ttl_from: TtlSource::Cfg,
        }
    }
}

impl DirectorConfig {
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs_f64(self.ttl)
    }

    pub fn domain_usage_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.domain_usage_timeout)
    }

    pub fn first_lookup_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.first_lookup_timeout)
    }

    pub fn connect_timeout_duration(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs_f64)
    }

    pub fn first_byte_timeout_duration(&self) -> Option<Duration> {
        self.first_byte_timeout.map(Duration::from_secs_f64)
    }

    pub fn between_bytes_timeout_duration(&self) -> Option<Duration> {
        self.between_bytes_timeout.map(Duration::from_secs_f64)
    }
}

/// Top-level configuration file: named directors plus an optional shared DNS
/// client section.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DirectorsFile {
    pub directors: HashMap<String, DirectorConfig>,
    pub dns: Option<DnsClientConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_director_defaults() {
        let config = DirectorConfig::default();
        assert_eq!(config.port, "http");
        assert_eq!(config.share, ShareScope::Director);
        assert_eq!(config.ttl, 3600.0);
        assert_eq!(config.domain_usage_timeout, 7200.0);
        assert_eq!(config.first_lookup_timeout, 10.0);
        assert_eq!(config.proxy_header, 0);
        assert_eq!(config.ttl_from, TtlSource::Cfg);
        assert!(config.connect_timeout_duration().is_none());
    }

    #[test]
    fn test_duration_helpers() {
        let config = DirectorConfig {
            ttl: 0.1,
            connect_timeout: Some(1.5),
            ..DirectorConfig::default()
        };
        assert_eq!(config.ttl_duration(), Duration::from_millis(100));
        assert_eq!(
            config.connect_timeout_duration(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_share_scope_rename() {
        let scope: ShareScope = serde_json::from_str("\"HOST\"").unwrap();
        assert_eq!(scope, ShareScope::Host);
        let scope: ShareScope = serde_json::from_str("\"DIRECTOR\"").unwrap();
        assert_eq!(scope, ShareScope::Director);
    }

    #[test]
    fn test_ttl_source_rename() {
        let src: TtlSource = serde_json::from_str("\"min\"").unwrap();
        assert_eq!(src, TtlSource::Min);
    }

    #[test]
    fn test_dns_client_defaults() {
        let config = DnsClientConfig::default();
        assert_eq!(config.namespaces, vec![Namespace::Dns]);
        assert_eq!(config.transports, vec![Transport::Udp, Transport::Tcp]);
        assert!(config.upstreams.is_empty());
        assert_eq!(config.parallel, 16);
        assert_eq!(config.mode, RecursionMode::Stub);
    }
}
