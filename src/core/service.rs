//! SRV-driven service domains.
//!
//! A `ServiceDomain` resolves a service name to SRV records each cycle and
//! keeps one child [`Domain`] per (target, port) alive through the parent
//! director. The children are owned by the director's domain map like any
//! other domain; the service only records their keys plus priority and
//! weight, so a child that drops out of the SRV response simply loses its
//! metadata here and is later reaped by its own idle timeout.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use rand::Rng;
use tokio::{
    sync::{Notify, watch},
    time::{sleep, timeout},
};

use crate::{
    LOG_TARGET,
    core::{
        backend::BackendRef,
        director::{DirectorInner, DirectorShared},
        domain::{LookupState, PickError, effective_ttl},
    },
    ports::resolver::SrvTarget,
};

/// Key plus selection metadata for one SRV target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SrvChild {
    pub(crate) priority: u16,
    pub(crate) weight: u16,
    pub(crate) host: String,
    pub(crate) port: u16,
}

/// Remove and return the lowest-priority tier from `pool`.
fn next_tier(pool: &mut Vec<SrvChild>) -> Vec<SrvChild> {
    let Some(tier) = pool.iter().map(|child| child.priority).min() else {
        return Vec::new();
    };
    let mut members = Vec::new();
    let mut index = 0;
    while index < pool.len() {
        if pool[index].priority == tier {
            members.push(pool.swap_remove(index));
        } else {
            index += 1;
        }
    }
    members
}

/// Remove one child from `tier`, weighted by the SRV weight field. Zero
/// weights are drawn only once every positive weight is gone.
fn weighted_take(tier: &mut Vec<SrvChild>) -> SrvChild {
    let total: u32 = tier.iter().map(|child| child.weight as u32).sum();
    if total == 0 {
        let index = rand::rng().random_range(0..tier.len());
        return tier.swap_remove(index);
    }
    let mut roll = rand::rng().random_range(0..total);
    for index in 0..tier.len() {
        let weight = tier[index].weight as u32;
        if weight == 0 {
            continue;
        }
        if roll < weight {
            return tier.swap_remove(index);
        }
        roll -= weight;
    }
    // Weights sum to `total`, so the loop always returns.
    unreachable!("weighted draw exhausted a non-empty tier")
}

/// Domain variant driven by SRV records.
pub struct ServiceDomain {
    shared: Arc<DirectorShared>,
    director: Weak<DirectorInner>,
    name: String,
    children: ArcSwap<Vec<SrvChild>>,
    epoch: Instant,
    last_used_ms: AtomicU64,
    state_tx: watch::Sender<LookupState>,
    stopping: AtomicBool,
    wake: Notify,
}

impl ServiceDomain {
    pub(crate) fn start(
        shared: Arc<DirectorShared>,
        director: Weak<DirectorInner>,
        name: &str,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(LookupState::Cold);
        let service = Arc::new(Self {
            shared,
            director,
            name: name.to_string(),
            children: ArcSwap::from_pointee(Vec::new()),
            epoch: Instant::now(),
            last_used_ms: AtomicU64::new(0),
            state_tx,
            stopping: AtomicBool::new(false),
            wake: Notify::new(),
        });
        service.touch();
        tokio::spawn(service.clone().run());
        service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn touch(&self) {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.last_used_ms.fetch_max(now_ms, Ordering::AcqRel);
    }

    fn idle_for(&self) -> Duration {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now_ms.saturating_sub(self.last_used_ms.load(Ordering::Acquire)))
    }

    /// Ask the worker to exit at its next wake-up; never blocks.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LookupState> {
        self.state_tx.subscribe()
    }

    /// Select a backend: lowest SRV priority tier first, weighted within the
    /// tier, falling through to higher tiers when a child cannot deliver.
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
                    domain: self.name.clone(),
                    waited: wait,
                });
            }
        }

        let children = self.children.load_full();
        if children.is_empty() {
            return Err(PickError::LookupFailed {
                domain: self.name.clone(),
            });
        }
        let Some(director) = self.director.upgrade() else {
            return Err(PickError::NoUsableTarget {
                service: self.name.clone(),
            });
        };

        let mut pool: Vec<SrvChild> = children.as_ref().clone();
        while !pool.is_empty() {
            let mut tier = next_tier(&mut pool);
            while !tier.is_empty() {
                let child = weighted_take(&mut tier);
                let Some(domain) = director.existing_domain(&child.host, child.port).await else {
                    continue;
                };
                if let Ok(backend) = domain.pick().await {
                    return Ok(backend);
                }
            }
        }
        Err(PickError::NoUsableTarget {
            service: self.name.clone(),
        })
    }

    async fn run(self: Arc<Self>) {
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
                    service = %self.name,
                    "timeout"
                );
                break;
            }
            let Some(ttl) = self.cycle().await else {
                continue;
            };
            tokio::select! {
                _ = sleep(ttl) => {}
                _ = self.wake.notified() => {}
            }
        }
        self.finish().await;
    }

    async fn cycle(&self) -> Option<Duration> {
        let configured_ttl = self.shared.config.ttl_duration();
        let result = tokio::select! {
            result = self.shared.resolver.lookup_srv(&self.name) => result,
            _ = self.wake.notified() => return None,
        };
        crate::metrics::increment_lookup(&self.shared.name, &self.name, result.is_ok());

        let ttl = match result {
            Ok(resolution) => {
                let dns_ttl = resolution.ttl;
                let children = dedup_children(&resolution.records);
                if children.is_empty() {
                    tracing::warn!(
                        target: LOG_TARGET,
                        group = %self.shared.group,
                        director = %self.shared.name,
                        service = %self.name,
                        "lookup returned no usable target"
                    );
                    self.record_cold_failure();
                    configured_ttl
                } else {
                    self.reconcile(children).await;
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
                    service = %self.name,
                    %error,
                    "lookup failed"
                );
                self.record_cold_failure();
                configured_ttl
            }
        };
        Some(ttl)
    }

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

    /// Ensure a child domain exists per target and publish the new metadata.
    /// Vanished targets keep their domains; the idle timeout reaps them.
    async fn reconcile(&self, children: Vec<SrvChild>) {
        if let Some(director) = self.director.upgrade() {
            for child in &children {
                if let Err(error) = director.domain_for(&child.host, child.port).await {
                    tracing::warn!(
                        target: LOG_TARGET,
                        group = %self.shared.group,
                        director = %self.shared.name,
                        service = %self.name,
                        target_host = %child.host,
                        %error,
                        "target rejected"
                    );
                }
            }
        }
        let old = self.children.load_full();
        if *old == children {
            return;
        }
        self.children.store(Arc::new(children));
    }

    async fn finish(self: &Arc<Self>) {
        self.children.store(Arc::new(Vec::new()));
        tracing::info!(
            target: LOG_TARGET,
            group = %self.shared.group,
            director = %self.shared.name,
            service = %self.name,
            "deleted"
        );
        if let Some(director) = self.director.upgrade() {
            director.unlink_service(&self.name).await;
        }
        self.state_tx.send_replace(LookupState::Done);
    }
}

/// Collapse SRV records onto unique (target, port) children, first record
/// wins for priority and weight.
fn dedup_children(records: &[SrvTarget]) -> Vec<SrvChild> {
    let mut children: Vec<SrvChild> = Vec::with_capacity(records.len());
    for record in records {
        if children
            .iter()
            .any(|child| child.host == record.target && child.port == record.port)
        {
            continue;
        }
        children.push(SrvChild {
            priority: record.priority,
            weight: record.weight,
            host: record.target.clone(),
            port: record.port,
        });
    }
    children
}
