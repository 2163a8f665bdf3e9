//! Lightweight metrics helpers for dyndir.
//!
//! This module exposes a small set of convenience functions wrapping the
//! `metrics` crate macros. It intentionally avoids embedding a concrete
//! exporter (the host can initialize any compatible recorder externally)
//! while still documenting and describing the director-specific metric
//! names.
//!
//! Provided metrics (labels vary by family):
//! * `dyndir_backend_up` (gauge per live backend, keyed by its stats name)
//! * `dyndir_lookups_total` (counter, labels: director, domain, result)
//! * `dyndir_domains` (gauge)
//!
//! Backend registration and deregistration track the registry's reference
//! counts: a backend's gauge exists exactly while the object is alive.
use std::{collections::HashMap, sync::Mutex};

use metrics::{Unit, counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::Lazy;

// Director-specific metric names
pub const DYNDIR_BACKEND_UP: &str = "dyndir_backend_up";
pub const DYNDIR_LOOKUPS_TOTAL: &str = "dyndir_lookups_total";
pub const DYNDIR_DOMAINS: &str = "dyndir_domains";

/// Shadow map of live backend gauges, for introspection and tests.
pub static BACKEND_GAUGES: Lazy<Mutex<HashMap<String, f64>>> = Lazy::new(|| {
    // Register metric descriptions
    describe_gauge!(
        DYNDIR_BACKEND_UP,
        "Liveness of individual backend objects (1 while registered)."
    );
    describe_counter!(
        DYNDIR_LOOKUPS_TOTAL,
        Unit::Count,
        "Total resolution cycles, by director, domain and result."
    );
    describe_gauge!(DYNDIR_DOMAINS, "Number of live domains per director.");

    Mutex::new(HashMap::new())
});

/// Register a live backend under its stats name.
pub fn register_backend(name: &str) {
    if let Ok(mut gauges) = BACKEND_GAUGES.lock() {
        gauges.insert(name.to_string(), 1.0);
    } else {
        tracing::error!("Failed to acquire lock for backend gauges");
        return;
    }
    gauge!(DYNDIR_BACKEND_UP, "backend" => name.to_string()).set(1.0);
}

/// Deregister a backend whose last reference was released.
pub fn deregister_backend(name: &str) {
    if let Ok(mut gauges) = BACKEND_GAUGES.lock() {
        gauges.remove(name);
    } else {
        tracing::error!("Failed to acquire lock for backend gauges");
        return;
    }
    gauge!(DYNDIR_BACKEND_UP, "backend" => name.to_string()).set(0.0);
}

/// Whether a backend is currently registered, by stats name.
pub fn backend_registered(name: &str) -> bool {
    BACKEND_GAUGES
        .lock()
        .map(|gauges| gauges.contains_key(name))
        .unwrap_or(false)
}

/// Count one resolution cycle.
pub fn increment_lookup(director: &str, domain: &str, ok: bool) {
    counter!(
        DYNDIR_LOOKUPS_TOTAL,
        "director" => director.to_string(),
        "domain" => domain.to_string(),
        "result" => if ok { "ok" } else { "error" },
    )
    .increment(1);
}

/// Track the number of live domains for a director.
pub fn set_domain_count(director: &str, count: usize) {
    gauge!(DYNDIR_DOMAINS, "director" => director.to_string()).set(count as f64);
}
