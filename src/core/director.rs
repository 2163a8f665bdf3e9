//! The public entry point called from request processing.
//!
//! A `Director` routes `backend(host, port)` and `service(name)` calls to
//! per-(host, port) [`Domain`]s and per-name [`ServiceDomain`]s, creating
//! them lazily on first use. It also wires into the host's lifecycle:
//! `warm()` / `cool()` / `discard()` mirror configuration load, drain and
//! teardown.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

use scc::HashMap;

use crate::{
    LOG_TARGET,
    adapters::SystemResolver,
    config::{DirectorConfig, DirectorConfigValidator, ValidationError},
    core::{
        backend::{BackendRef, ProxyVersion},
        domain::{Domain, LookupState, PickError},
        registry::BackendRegistry,
        service::ServiceDomain,
        whitelist::Whitelist,
    },
    ports::{probe::ProbeRunner, resolver::NameResolver},
};

// Director lifecycle states
const STATE_WARM: u8 = 0;
const STATE_COOLING: u8 = 1;

/// Request-scoped inputs the host hands to `backend()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestCtx<'a> {
    /// The in-flight request's Host header, used when `backend()` is called
    /// with an empty host.
    pub host_header: Option<&'a str>,
}

/// Everything a domain worker needs from its director, bundled so workers
/// never keep the director itself alive.
pub(crate) struct DirectorShared {
    pub(crate) group: String,
    pub(crate) name: String,
    pub(crate) config: DirectorConfig,
    pub(crate) default_port: u16,
    pub(crate) proxy: ProxyVersion,
    pub(crate) resolver: Arc<dyn NameResolver>,
    pub(crate) registry: Arc<BackendRegistry>,
    pub(crate) whitelist: Option<Whitelist>,
    pub(crate) prober: Option<Arc<dyn ProbeRunner>>,
    pub(crate) debug: AtomicBool,
}

pub(crate) struct DirectorInner {
    shared: Arc<DirectorShared>,
    domains: HashMap<(String, u16), Arc<Domain>>,
    services: HashMap<String, Arc<ServiceDomain>>,
    state: AtomicU8,
}

impl DirectorInner {
    /// Find or create the domain for (host, port). Creation is refused while
    /// the director is cooling.
    pub(crate) async fn domain_for(
        self: &Arc<Self>,
        host: &str,
        port: u16,
    ) -> Result<Arc<Domain>, PickError> {
        let key = (host.to_string(), port);
        match self.domains.entry_async(key).await {
            scc::hash_map::Entry::Occupied(entry) => Ok(entry.get().clone()),
            scc::hash_map::Entry::Vacant(entry) => {
                if self.state.load(Ordering::Acquire) == STATE_COOLING {
                    return Err(PickError::Cooling {
                        director: self.shared.name.clone(),
                    });
                }
                let domain = Domain::start(
                    self.shared.clone(),
                    Arc::downgrade(self),
                    host,
                    port,
                );
                entry.insert_entry(domain.clone());
                crate::metrics::set_domain_count(&self.shared.name, self.domains.len());
                Ok(domain)
            }
        }
    }

    pub(crate) async fn existing_domain(&self, host: &str, port: u16) -> Option<Arc<Domain>> {
        self.domains
            .get_async(&(host.to_string(), port))
            .await
            .map(|entry| entry.get().clone())
    }

    pub(crate) async fn unlink_domain(&self, host: &str, port: u16) {
        self.domains.remove_async(&(host.to_string(), port)).await;
        crate::metrics::set_domain_count(&self.shared.name, self.domains.len());
    }

    async fn service_for(self: &Arc<Self>, name: &str) -> Result<Arc<ServiceDomain>, PickError> {
        match self.services.entry_async(name.to_string()).await {
            scc::hash_map::Entry::Occupied(entry) => Ok(entry.get().clone()),
            scc::hash_map::Entry::Vacant(entry) => {
                if self.state.load(Ordering::Acquire) == STATE_COOLING {
                    return Err(PickError::Cooling {
                        director: self.shared.name.clone(),
                    });
                }
                let service = ServiceDomain::start(self.shared.clone(), Arc::downgrade(self), name);
                entry.insert_entry(service.clone());
                Ok(service)
            }
        }
    }

    pub(crate) async fn unlink_service(&self, name: &str) {
        self.services.remove_async(&name.to_string()).await;
    }
}

/// The configured object routing requests to a dynamic set of backends.
pub struct Director {
    inner: Arc<DirectorInner>,
}

impl Director {
    /// Validate the configuration and construct the director.
    ///
    /// `group` names the configuration instance the director belongs to (it
    /// prefixes every log record); `resolver` defaults to the system
    /// resolver, which rules out `ttl_from` variants other than `cfg` and
    /// makes `service()` a configuration error. The optional `prober` is the
    /// host's probe subsystem; without it, probe templates are inert.
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        config: DirectorConfig,
        resolver: Option<Arc<dyn NameResolver>>,
        prober: Option<Arc<dyn ProbeRunner>>,
    ) -> Result<Self, ValidationError> {
        let resolver: Arc<dyn NameResolver> =
            resolver.unwrap_or_else(|| Arc::new(SystemResolver::new()));
        DirectorConfigValidator::validate(&config, resolver.provides_ttl())?;
        let default_port = DirectorConfigValidator::resolve_port(&config.port)?;
        let whitelist = match &config.whitelist {
            Some(entries) => Some(
                Whitelist::parse(entries)
                    .map_err(|reason| ValidationError::InvalidWhitelist { reason })?,
            ),
            None => None,
        };

        let shared = Arc::new(DirectorShared {
            group: group.into(),
            name: name.into(),
            default_port,
            proxy: ProxyVersion::from_config(config.proxy_header),
            resolver,
            registry: BackendRegistry::for_scope(config.share),
            whitelist,
            prober,
            debug: AtomicBool::new(false),
            config,
        });

        Ok(Self {
            inner: Arc::new(DirectorInner {
                shared,
                domains: HashMap::default(),
                services: HashMap::default(),
                state: AtomicU8::new(STATE_WARM),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.shared.name
    }

    pub fn group(&self) -> &str {
        &self.inner.shared.group
    }

    /// Toggle per-backend `added` / `deleted` debug event emission.
    pub fn set_debug(&self, enabled: bool) {
        self.inner.shared.debug.store(enabled, Ordering::Relaxed);
    }

    /// Number of live domains (including service children).
    pub fn domain_count(&self) -> usize {
        self.inner.domains.len()
    }

    /// Resolve a backend for (host, port). An empty host falls back to the
    /// request's Host header, an empty port to the director's configured
    /// default.
    pub async fn backend(
        &self,
        ctx: &RequestCtx<'_>,
        host: &str,
        port: &str,
    ) -> Result<BackendRef, PickError> {
        let host = if host.is_empty() {
            ctx.host_header.unwrap_or("")
        } else {
            host
        };
        if host.is_empty() {
            return Err(PickError::NoHost {
                director: self.name().to_string(),
            });
        }
        let port = if port.is_empty() {
            self.inner.shared.default_port
        } else {
            DirectorConfigValidator::resolve_port(port).map_err(|_| PickError::InvalidPort {
                director: self.name().to_string(),
                port: port.to_string(),
            })?
        };
        let domain = self.inner.domain_for(host, port).await?;
        domain.pick().await
    }

    /// Resolve a backend through SRV records for `name`. Requires a resolver
    /// capable of service lookups.
    pub async fn service(&self, name: &str) -> Result<BackendRef, PickError> {
        if name.is_empty() {
            return Err(PickError::EmptyService);
        }
        if !self.inner.shared.resolver.provides_srv() {
            return Err(PickError::SrvUnsupported {
                director: self.name().to_string(),
            });
        }
        let service = self.inner.service_for(name).await?;
        service.pick().await
    }

    /// Configuration warm event. Domains spawn their workers at creation, so
    /// this only reopens admission after a cool; calling it repeatedly is
    /// harmless.
    pub fn warm(&self) {
        self.inner.state.store(STATE_WARM, Ordering::Release);
    }

    /// Configuration cool event: refuse new domains and ask every existing
    /// worker to wind down. Does not wait.
    pub async fn cool(&self) {
        self.inner.state.store(STATE_COOLING, Ordering::Release);
        self.inner
            .services
            .scan_async(|_, service| service.stop())
            .await;
        self.inner
            .domains
            .scan_async(|_, domain| domain.stop())
            .await;
        tracing::info!(
            target: LOG_TARGET,
            group = %self.inner.shared.group,
            director = %self.inner.shared.name,
            "cooling"
        );
    }

    /// Configuration discard event: cool, then wait for every worker to
    /// reach `Done` and release its references. By design there is no
    /// timeout; cool must precede discard.
    pub async fn discard(&self) {
        self.cool().await;

        let mut services = Vec::new();
        self.inner
            .services
            .scan_async(|_, service| services.push(service.clone()))
            .await;
        for service in services {
            let mut state_rx = service.subscribe();
            while *state_rx.borrow_and_update() != LookupState::Done {
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        }

        let mut domains = Vec::new();
        self.inner
            .domains
            .scan_async(|_, domain| domains.push(domain.clone()))
            .await;
        for domain in domains {
            let mut state_rx = domain.subscribe();
            while *state_rx.borrow_and_update() != LookupState::Done {
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        }

        tracing::info!(
            target: LOG_TARGET,
            group = %self.inner.shared.group,
            director = %self.inner.shared.name,
            "discarded"
        );
    }
}
