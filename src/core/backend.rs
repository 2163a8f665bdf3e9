//! Backend objects handed out to request callers.

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    core::endpoint::EndpointKey,
    ports::probe::{ProbeHandle, ProbeHealth},
};

/// PROXY protocol version prepended on backend connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyVersion {
    #[default]
    Off,
    V1,
    V2,
}

impl ProxyVersion {
    /// Map the raw configuration value; anything above 2 is rejected by
    /// validation before this is reached.
    pub fn from_config(raw: u8) -> Self {
        match raw {
            1 => ProxyVersion::V1,
            2 => ProxyVersion::V2,
            _ => ProxyVersion::Off,
        }
    }
}

/// Construction attributes for a backend: per-endpoint I/O limits and
/// connection behaviour. `None` timeouts inherit the host's globals.
#[derive(Debug, Clone, Default)]
pub struct BackendAttrs {
    pub connect_timeout: Option<Duration>,
    pub first_byte_timeout: Option<Duration>,
    pub between_bytes_timeout: Option<Duration>,
    pub max_connections: u32,
    pub proxy: ProxyVersion,
    pub host_header: Option<String>,
}

/// One live backend endpoint.
///
/// Owned by the [`crate::core::BackendRegistry`]; shared out to domains and
/// request callers as [`BackendRef`]. Immutable after construction apart from
/// the probe health cell, which the host's prober writes.
#[derive(Debug)]
pub struct Backend {
    name: String,
    key: EndpointKey,
    attrs: BackendAttrs,
    probe: Option<ProbeHandle>,
}

impl Backend {
    pub(crate) fn new(
        name: String,
        key: EndpointKey,
        attrs: BackendAttrs,
        probe: Option<ProbeHandle>,
    ) -> Self {
        Self {
            name,
            key,
            attrs,
            probe,
        }
    }

    /// Stats registration name, `director(host.addr:port)` or
    /// `director(addr:port)` depending on the sharing scope.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub fn attrs(&self) -> &BackendAttrs {
        &self.attrs
    }

    pub fn probe(&self) -> Option<&ProbeHandle> {
        self.probe.as_ref()
    }

    /// Whether this backend may serve traffic: probeless backends always
    /// qualify, probed ones while healthy or not yet judged.
    pub fn eligible(&self) -> bool {
        match &self.probe {
            None => true,
            Some(probe) => matches!(probe.health(), ProbeHealth::Healthy | ProbeHealth::Unknown),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Shared handle to a backend.
pub type BackendRef = Arc<Backend>;
