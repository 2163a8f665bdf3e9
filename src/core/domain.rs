//! Per-(host, port) resolution engine.
//!
//! Each `Domain` owns one background worker task driving the
//! resolve / reconcile / publish / sleep cycle and serves `pick()` calls from
//! the most recently published address-set snapshot. The worker is the only
//! writer: it builds a new set off to the side, swaps the pointer, and only
//! then releases the references that fell out. Request callers read the
//! snapshot and advance a shared round-robin cursor with a fetch-add, so
//! concurrent picks land on distinct members without holding a lock.
//!
//! A domain is created lazily by the first request that mentions its
//! (host, port) pair and dies when its worker exits: on `stop()`, or when no
//! request has touched it for `domain_usage_timeout` at a wake-up.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::{
    sync::{Notify, watch},
    time::{sleep, timeout},
};

use crate::{
    LOG_TARGET,
    config::{ShareScope, TtlSource},
    core::{
        backend::{Backend, BackendAttrs, BackendRef},
        director::{DirectorInner, DirectorShared},
        endpoint::EndpointKey,
    },
    ports::resolver::ResolvedAddr,
};

/// Progress of a domain's first lookup, observed by cold `pick()` callers and
/// by `discard()` waiting for workers to wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    /// No address set has ever been published.
    Cold,
    /// An address set is published and the worker keeps it fresh.
    Ready,
    /// The first lookup failed; nothing is published yet.
    Failed,
    /// The worker has exited and all references are released.
    Done,
}

/// Errors surfaced to request callers of `backend()` / `service()`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PickError {
    /// `first_lookup_timeout` elapsed before the first resolution completed.
    #[error("domain {domain}: first lookup still pending after {waited:?}")]
    ColdTimeout { domain: String, waited: Duration },

    /// The lookup failed (or produced nothing usable) and no address set has
    /// ever been published.
    #[error("domain {domain}: no address resolved")]
    LookupFailed { domain: String },

    /// Members exist but every one of them is probing sick.
    #[error("domain {domain}: no healthy backend")]
    NoHealthyBackend { domain: String },

    /// The director is cooling; new domains are not admitted.
    #[error("director {director} is cooling, new domains are not admitted")]
    Cooling { director: String },

    /// `service()` needs an SRV-capable resolver.
    #[error("director {director}: resolver does not support service lookups")]
    SrvUnsupported { director: String },

    /// Neither the call nor the request carried a host.
    #[error("director {director}: no host to resolve")]
    NoHost { director: String },

    /// The per-call port override did not parse.
    #[error("director {director}: invalid port '{port}'")]
    InvalidPort { director: String, port: String },

    /// `service()` was called with an empty name.
    #[error("service name must not be empty")]
    EmptyService,

    /// Every SRV priority tier was exhausted without a usable backend.
    #[error("service {service}: no usable target")]
    NoUsableTarget { service: String },
}

/// One published member of the address set.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub(crate) key: EndpointKey,
    pub(crate) backend: BackendRef,
}

/// Immutable address-set snapshot, replaced wholesale on reconcile.
#[derive(Debug, Default)]
pub(crate) struct AddressSet {
    pub(crate) members: Vec<Member>,
}

struct ReconcilePlan {
    survivors: Vec<Member>,
    added: Vec<EndpointKey>,
    removed: Vec<Member>,
}

/// Split the old set against the freshly resolved keys. Survivors keep their
/// insertion order, additions go to the back. `None` means nothing changed
/// and the published snapshot must stay pointer-identical.
fn split_members(old: &AddressSet, keys: &[EndpointKey]) -> Option<ReconcilePlan> {
    let mut survivors = Vec::with_capacity(keys.len());
    let mut removed = Vec::new();
    for member in &old.members {
        if keys.contains(&member.key) {
            survivors.push(member.clone());
        } else {
            removed.push(member.clone());
        }
    }
    let added: Vec<EndpointKey> = keys
        .iter()
        .filter(|key| !old.members.iter().any(|m| &m.key == *key))
        .cloned()
        .collect();
    if added.is_empty() && removed.is_empty() {
        return None;
    }
    Some(ReconcilePlan {
        survivors,
        added,
        removed,
    })
}

/// Resolve interval for the next cycle. A missing DNS TTL always falls back
/// to the configured value.
pub(crate) fn effective_ttl(
    source: TtlSource,
    configured: Duration,
    dns: Option<Duration>,
) -> Duration {
    match (source, dns) {
        (TtlSource::Cfg, _) | (_, None) => configured,
        (TtlSource::Dns, Some(dns)) => dns,
        (TtlSource::Min, Some(dns)) => configured.min(dns),
        (TtlSource::Max, Some(dns)) => configured.max(dns),
    }
}

/// The per-(host, port) unit owning a resolution cycle.
pub struct Domain {
    shared: Arc<DirectorShared>,
    director: Weak<DirectorInner>,
    host: String,
    port: u16,
    addresses: ArcSwap<AddressSet>,
    cursor: AtomicUsize,
    epoch: Instant,
    last_used_ms: AtomicU64,
    state_tx: watch::Sender<LookupState>,
    stopping: AtomicBool,
    wake: Notify,
}

impl Domain {
    /// Create the domain and spawn its worker. Must run inside a tokio
    /// runtime.
    pub(crate) fn start(
        shared: Arc<DirectorShared>,
        director: Weak<DirectorInner>,
        host: &str,
        port: u16,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(LookupState::Cold);
        let domain = Arc::new(Self {
            shared,
            director,
            host: host.to_string(),
            port,
            addresses: ArcSwap::from_pointee(AddressSet::default()),
            cursor: AtomicUsize::new(0),
            epoch: Instant::now(),
            last_used_ms: AtomicU64::new(0),
            state_tx,
            stopping: AtomicBool::new(false),
            wake: Notify::new(),
        });
        domain.touch();
        tokio::spawn(domain.clone().run());
        domain
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Record a use. `last_used` only moves forward.
    pub(crate) fn touch(&self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.last_used_ms.fetch_max(now_ms, Ordering::AcqRel);
    }

    fn idle_for(&self) -> Duration {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now_ms.saturating_sub(self.last_used_ms.load(Ordering::Acquire)))
    }

    /// Ask the worker to exit at its next wake-up. Never blocks; calling it
    /// again is a no-op.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LookupState> {
        self.state_tx.subscribe()
    }

    fn debug_enabled(&self) -> bool {
        self.shared.debug.load(Ordering::Relaxed)
    }

    /// Return the next backend in round-robin order, skipping members whose
    /// probe reports sick. Cold domains wait up to `first_lookup_timeout`
    /// for the worker's first result.
    pub async fn pick(&self) -> Result<BackendRef, PickError> {
        self.touch();

        if *self.state_tx.borrow() == LookupState::Cold {
            let wait = self.shared.config.first_lookup_timeout_duration();
            let mut state_rx = self.state_tx.subscribe();
            let outcome = timeout(wait, async {
                loop {
                    if *state_rx.borrow_and_update() != LookupState::Cold {
                        break;
                    }
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
            if outcome.is_err() && *self.state_tx.borrow() == LookupState::Cold {
                return Err(PickError::ColdTimeout {
                    domain: self.label(),
                    waited: wait,
                });
            }
        }

        let set = self.addresses.load();
        if set.members.is_empty() {
            return Err(PickError::LookupFailed {
                domain: self.label(),
            });
        }

        let len = set.members.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..len {
            let member = &set.members[start.wrapping_add(offset) % len];
            if member.backend.eligible() {
                return Ok(member.backend.clone());
            }
        }
        Err(PickError::NoHealthyBackend {
            domain: self.label(),
        })
    }

    pub(crate) async fn run(self: Arc<Self>) {
        let usage_timeout = self.shared.config.domain_usage_timeout_duration();
        loop {
            if self.stopping.load(Ordering::Acquire) {
                break;
            }
            if self.idle_for() > usage_timeout {
                tracing::info!(
                    target: LOG_TARGET,
                    group = %self.shared.group,
                    director = %self.shared.name,
                    domain = %self.label(),
                    "timeout"
                );
                break;
            }
            let Some(ttl) = self.cycle().await else {
                // A stop interrupted the lookup; the loop head handles it.
                continue;
            };
            tokio::select! {
                _ = sleep(ttl) => {}
                _ = self.wake.notified() => {}
            }
        }
        self.finish().await;
    }

    /// One resolve / reconcile / publish pass. Returns the sleep interval, or
    /// `None` when the lookup was interrupted by `stop()`.
    async fn cycle(&self) -> Option<Duration> {
        let configured_ttl = self.shared.config.ttl_duration();
        let lookup_started = Instant::now();
        let result = tokio::select! {
            result = self.shared.resolver.lookup(&self.host, self.port) => result,
            _ = self.wake.notified() => return None,
        };
        let results_at = Instant::now();
        crate::metrics::increment_lookup(&self.shared.name, &self.label(), result.is_ok());

        let ttl = match result {
            Ok(resolution) => {
                let dns_ttl = resolution.ttl;
                let keys = self.filter(resolution.addresses);
                if keys.is_empty() {
                    tracing::warn!(
                        target: LOG_TARGET,
                        group = %self.shared.group,
                        director = %self.shared.name,
                        domain = %self.label(),
                        "lookup returned no usable address"
                    );
                    self.record_cold_failure();
                    configured_ttl
                } else {
                    self.reconcile(keys);
                    self.state_tx.send_if_modified(|state| {
                        if *state == LookupState::Ready {
                            false
                        } else {
                            *state = LookupState::Ready;
                            true
                        }
                    });
                    effective_ttl(self.shared.config.ttl_from, configured_ttl, dns_ttl)
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    group = %self.shared.group,
                    director = %self.shared.name,
                    domain = %self.label(),
                    %error,
                    "lookup failed"
                );
                self.record_cold_failure();
                configured_ttl
            }
        };

        tracing::debug!(
            target: LOG_TARGET,
            group = %self.shared.group,
            director = %self.shared.name,
            domain = %self.label(),
            lookup = ?results_at.duration_since(lookup_started),
            update = ?results_at.elapsed(),
            "cycle"
        );
        Some(ttl)
    }

    /// A failure before the first success is recorded so cold waiters fail
    /// fast. Once an address set is published the state stays `Ready` and
    /// stale members keep serving.
    fn record_cold_failure(&self) {
        self.state_tx.send_if_modified(|state| {
            if *state == LookupState::Cold {
                *state = LookupState::Failed;
                true
            } else {
                false
            }
        });
    }

    /// Apply whitelist and deduplicate the resolved addresses into endpoint
    /// keys, preserving response order.
    fn filter(&self, addresses: Vec<ResolvedAddr>) -> Vec<EndpointKey> {
        let mut keys: Vec<EndpointKey> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if let Some(whitelist) = &self.shared.whitelist {
                if !whitelist.permits(address.addr) {
                    tracing::info!(
                        target: LOG_TARGET,
                        group = %self.shared.group,
                        director = %self.shared.name,
                        domain = %self.label(),
                        addr = %address.addr,
                        "whitelist mismatch"
                    );
                    continue;
                }
            }
            let key = EndpointKey {
                addr: address.addr,
                port: address.port,
                hostname: address.hostname,
            };
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn reconcile(&self, keys: Vec<EndpointKey>) {
        let old = self.addresses.load_full();
        let Some(plan) = split_members(&old, &keys) else {
            return;
        };

        let mut members = plan.survivors;
        for key in plan.added {
            let backend = self.acquire_backend(&key);
            if self.debug_enabled() {
                tracing::debug!(
                    target: LOG_TARGET,
                    group = %self.shared.group,
                    director = %self.shared.name,
                    domain = %self.label(),
                    backend = %backend.name(),
                    "added"
                );
            }
            members.push(Member {
                key: key.clone(),
                backend,
            });
        }
        self.addresses.store(Arc::new(AddressSet { members }));

        // Old references go only after the new set is visible.
        for member in plan.removed {
            if self.debug_enabled() {
                tracing::debug!(
                    target: LOG_TARGET,
                    group = %self.shared.group,
                    director = %self.shared.name,
                    domain = %self.label(),
                    backend = %member.backend.name(),
                    "deleted"
                );
            }
            self.release_member(&member);
        }
    }

    fn acquire_backend(&self, key: &EndpointKey) -> BackendRef {
        let shared = &self.shared;
        let config = &shared.config;
        let attrs = BackendAttrs {
            connect_timeout: config.connect_timeout_duration(),
            first_byte_timeout: config.first_byte_timeout_duration(),
            between_bytes_timeout: config.between_bytes_timeout_duration(),
            max_connections: config.max_connections,
            proxy: shared.proxy,
            host_header: config.host_header.clone(),
        };
        shared.registry.acquire(&shared.name, key, |name| {
            let probe = match (&shared.prober, &config.probe) {
                (Some(runner), Some(template)) => {
                    let probe_host = match shared.registry.scope() {
                        ShareScope::Director => config.host_header.as_deref(),
                        ShareScope::Host => config
                            .host_header
                            .as_deref()
                            .or(Some(key.hostname.as_str())),
                    };
                    Some(runner.attach(&name, key.socket_addr(), probe_host, template))
                }
                _ => None,
            };
            Backend::new(name, key.clone(), attrs, probe)
        })
    }

    fn release_member(&self, member: &Member) {
        if let Some(last) = self.shared.registry.release(&member.key) {
            if let (Some(runner), Some(handle)) = (&self.shared.prober, last.probe()) {
                runner.detach(last.name(), handle);
            }
        }
    }

    /// Wind down: release every reference, unlink from the director, publish
    /// `Done`.
    async fn finish(self: &Arc<Self>) {
        let old = self.addresses.swap(Arc::new(AddressSet::default()));
        for member in old.members.iter() {
            self.release_member(member);
        }
        tracing::info!(
            target: LOG_TARGET,
            group = %self.shared.group,
            director = %self.shared.name,
            domain = %self.label(),
            "deleted"
        );
        if let Some(director) = self.director.upgrade() {
            director.unlink_domain(&self.host, self.port).await;
        }
        self.state_tx.send_replace(LookupState::Done);
    }
}
