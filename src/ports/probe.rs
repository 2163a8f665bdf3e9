use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use crate::config::ProbeTemplate;

const PROBE_UNKNOWN: u8 = 0;
const PROBE_HEALTHY: u8 = 1;
const PROBE_SICK: u8 = 2;

/// Health verdict reported by the host's probe subsystem.
///
/// `Unknown` means the prober has not delivered a verdict yet; members in
/// that state are still served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeHealth {
    Unknown,
    Healthy,
    Sick,
}

/// Shared health cell written by the probe driver and read on every pick.
#[derive(Debug)]
pub struct ProbeState {
    status: AtomicU8,
}

impl ProbeState {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(PROBE_UNKNOWN),
        }
    }

    pub fn health(&self) -> ProbeHealth {
        match self.status.load(Ordering::Acquire) {
            PROBE_HEALTHY => ProbeHealth::Healthy,
            PROBE_SICK => ProbeHealth::Sick,
            _ => ProbeHealth::Unknown,
        }
    }

    pub fn set_health(&self, health: ProbeHealth) {
        let raw = match health {
            ProbeHealth::Unknown => PROBE_UNKNOWN,
            ProbeHealth::Healthy => PROBE_HEALTHY,
            ProbeHealth::Sick => PROBE_SICK,
        };
        self.status.store(raw, Ordering::Release);
    }
}

impl Default for ProbeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle tying a backend to its attached probe.
#[derive(Debug, Clone)]
pub struct ProbeHandle {
    state: Arc<ProbeState>,
}

impl ProbeHandle {
    pub fn new(state: Arc<ProbeState>) -> Self {
        Self { state }
    }

    pub fn health(&self) -> ProbeHealth {
        self.state.health()
    }

    pub fn state(&self) -> &Arc<ProbeState> {
        &self.state
    }
}

/// ProbeRunner defines the port the host's probe subsystem implements.
///
/// The director clones its probe template per acquired backend and attaches
/// it here; the runner keeps the returned handle's health current until the
/// backend is released and `detach` is called.
pub trait ProbeRunner: Send + Sync + 'static {
    /// Start probing `endpoint` under `template`. `host_header` is the Host
    /// value probes should carry, when one applies.
    fn attach(
        &self,
        backend: &str,
        endpoint: SocketAddr,
        host_header: Option<&str>,
        template: &ProbeTemplate,
    ) -> ProbeHandle;

    /// Stop probing for a handle; the backend is going away.
    fn detach(&self, backend: &str, handle: &ProbeHandle);
}
