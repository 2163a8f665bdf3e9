//! Dyndir - a dynamic, DNS-driven backend director for HTTP reverse proxies.
//!
//! A *director* resolves symbolic hosts (or SRV service names) into live sets
//! of backend endpoints, keeps those sets fresh against a name resolution
//! service, shares backend objects across directors according to a configured
//! scope, retires endpoints that disappear from DNS, and evicts whole domains
//! that no request has consulted for a configurable idle period.
//!
//! The crate is a library meant to be embedded in a reverse-proxy host. The
//! host keeps ownership of request handling, connection management and probe
//! driving; it reaches the director through [`Director::backend`] and
//! [`Director::service`], and the director reaches back out through the
//! **ports** in [`ports`] (name resolution, probe attachment).
//!
//! # Quick Example
//! ```no_run
//! use dyndir::{Director, DirectorConfig, RequestCtx};
//!
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // System resolver, default parameters (port "http", TTL 3600s).
//! let director = Director::new("boot", "origin", DirectorConfig::default(), None, None)?;
//! let ctx = RequestCtx::default();
//! let backend = director.backend(&ctx, "app.example.com", "").await?;
//! println!("routing to {}", backend.name());
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the lookup engine inside `core`:
//! * [`ports::resolver::NameResolver`] - the resolution seam. Two adapters are
//!   provided: [`SystemResolver`] (OS address resolution, no TTL/SRV) and
//!   [`RecursiveResolver`] (hickory-resolver, TTL and SRV capable).
//! * [`core::Domain`] - one background worker per (host, port) driving the
//!   resolve / reconcile / publish / sleep cycle.
//! * [`core::ServiceDomain`] - SRV fan-out spawning one child domain per
//!   target, selected by priority tier and weight.
//! * [`core::BackendRegistry`] - refcounted, scope-keyed backend sharing.
//!
//! # Concurrency
//! Request-facing `pick()` calls read an immutable address-set snapshot
//! published through an atomic pointer swap; the per-domain worker is the only
//! writer. Round-robin cursors advance with an atomic fetch-add so concurrent
//! picks land on distinct members.
//!
//! # Logging
//! Every director event record is emitted under the tracing target
//! [`LOG_TARGET`] so operators can grep one token across subscribers.
//!
//! # License
//! Dual-licensed under either MIT or Apache-2.0 at your option.
pub mod adapters;
pub mod config;
pub mod core;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;

pub use crate::{
    adapters::{RecursiveResolver, RecursiveResolverBuilder, SystemResolver},
    config::{DirectorConfig, ShareScope, TtlSource},
    core::{BackendRef, Director, PickError, RequestCtx},
    ports::resolver::NameResolver,
};

/// Tracing target borne by every director event record, kept greppable as a
/// single literal token.
pub const LOG_TARGET: &str = "vmod-dynamic";
