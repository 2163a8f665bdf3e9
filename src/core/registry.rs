//! Refcounted backend sharing.
//!
//! The registry deduplicates backend objects by endpoint key within a sharing
//! scope. DIRECTOR-scope sharing spans every director in the process (one
//! registry instance behind a process-wide handle); HOST-scope sharing is
//! confined to the owning director, which holds its own instance.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use once_cell::sync::Lazy;

use crate::{
    config::ShareScope,
    core::{
        backend::{Backend, BackendRef},
        endpoint::{EndpointKey, RegistryKey},
    },
    metrics,
};

/// Process-wide registry backing DIRECTOR-scope sharing.
static DIRECTOR_SCOPE_REGISTRY: Lazy<Arc<BackendRegistry>> =
    Lazy::new(|| Arc::new(BackendRegistry::new(ShareScope::Director)));

#[derive(Debug)]
struct RegistryEntry {
    backend: BackendRef,
    refs: usize,
}

/// Shared map of endpoint-keyed backend objects with reference counts.
#[derive(Debug)]
pub struct BackendRegistry {
    scope: ShareScope,
    entries: Mutex<HashMap<RegistryKey, RegistryEntry>>,
}

impl BackendRegistry {
    pub fn new(scope: ShareScope) -> Self {
        Self {
            scope,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The registry serving `scope`: the process-wide instance for DIRECTOR
    /// sharing, a fresh per-director instance for HOST sharing.
    pub fn for_scope(scope: ShareScope) -> Arc<BackendRegistry> {
        match scope {
            ShareScope::Director => DIRECTOR_SCOPE_REGISTRY.clone(),
            ShareScope::Host => Arc::new(BackendRegistry::new(scope)),
        }
    }

    pub fn scope(&self) -> ShareScope {
        self.scope
    }

    /// Number of live backend objects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RegistryKey, RegistryEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look up or construct the backend for `key`. An existing entry has its
    /// reference count bumped; otherwise `build` is invoked with the stats
    /// registration name and the result registered at refcount 1.
    pub fn acquire(
        &self,
        director: &str,
        key: &EndpointKey,
        build: impl FnOnce(String) -> Backend,
    ) -> BackendRef {
        let registry_key = key.registry_key(self.scope);
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(&registry_key) {
            entry.refs += 1;
            return entry.backend.clone();
        }

        let name = format!("{director}({})", key.name_tail(self.scope));
        let backend = Arc::new(build(name));
        metrics::register_backend(backend.name());
        entries.insert(
            registry_key,
            RegistryEntry {
                backend: backend.clone(),
                refs: 1,
            },
        );
        backend
    }

    /// Drop one reference to the backend for `key`. Returns the backend when
    /// this was the last reference, so the caller can detach its probe; the
    /// entry is deregistered from stats and removed.
    pub fn release(&self, key: &EndpointKey) -> Option<BackendRef> {
        let registry_key = key.registry_key(self.scope);
        let mut entries = self.lock();
        let entry = entries.get_mut(&registry_key)?;
        entry.refs -= 1;
        if entry.refs > 0 {
            return None;
        }
        let backend = entry.backend.clone();
        entries.remove(&registry_key);
        metrics::deregister_backend(backend.name());
        Some(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::BackendAttrs;

    fn key(host: &str, addr: &str) -> EndpointKey {
        EndpointKey {
            addr: addr.parse().unwrap(),
            port: 80,
            hostname: host.to_string(),
        }
    }

    fn build(name: String, key: &EndpointKey) -> Backend {
        Backend::new(name, key.clone(), BackendAttrs::default(), None)
    }

    #[test]
    fn test_acquire_deduplicates_within_scope() {
        let registry = BackendRegistry::new(ShareScope::Director);
        let k1 = key("a.example.com", "10.1.0.1");
        let k2 = key("b.example.com", "10.1.0.1");

        let first = registry.acquire("d1", &k1, |n| build(n, &k1));
        let second = registry.acquire("d2", &k2, |n| build(n, &k2));

        // DIRECTOR scope keys on (address, port) only.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(first.name(), "d1(10.1.0.1:80)");
    }

    #[test]
    fn test_host_scope_distinguishes_hostnames() {
        let registry = BackendRegistry::new(ShareScope::Host);
        let k1 = key("a.example.com", "10.2.0.1");
        let k2 = key("b.example.com", "10.2.0.1");

        let first = registry.acquire("d", &k1, |n| build(n, &k1));
        let second = registry.acquire("d", &k2, |n| build(n, &k2));

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 2);
        assert_eq!(first.name(), "d(a.example.com.10.2.0.1:80)");
    }

    #[test]
    fn test_acquire_release_round_trip() {
        let registry = BackendRegistry::new(ShareScope::Host);
        let k = key("a.example.com", "10.3.0.1");
        assert!(registry.is_empty());

        let backend = registry.acquire("d", &k, |n| build(n, &k));
        assert_eq!(registry.len(), 1);

        let released = registry.release(&k);
        assert!(released.is_some());
        assert!(Arc::ptr_eq(&backend, &released.unwrap()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_honours_refcount() {
        let registry = BackendRegistry::new(ShareScope::Host);
        let k = key("a.example.com", "10.4.0.1");

        let _first = registry.acquire("d", &k, |n| build(n, &k));
        let _second = registry.acquire("d", &k, |n| build(n, &k));

        // First release only drops a reference.
        assert!(registry.release(&k).is_none());
        assert_eq!(registry.len(), 1);

        // Second release destroys the entry.
        assert!(registry.release(&k).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_unknown_key_is_harmless() {
        let registry = BackendRegistry::new(ShareScope::Host);
        assert!(registry.release(&key("a.example.com", "10.5.0.1")).is_none());
    }
}
