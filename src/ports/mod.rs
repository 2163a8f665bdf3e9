pub mod probe;
pub mod resolver;

/// Re-export commonly used types from ports
pub use probe::{ProbeHandle, ProbeHealth, ProbeRunner, ProbeState};
pub use resolver::{
    NameResolver, Resolution, ResolveError, ResolveResult, ResolvedAddr, SrvResolution, SrvTarget,
};
