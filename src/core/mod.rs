pub mod backend;
pub mod director;
pub mod domain;
pub mod endpoint;
pub mod registry;
pub mod service;
pub mod whitelist;

pub use backend::{Backend, BackendAttrs, BackendRef, ProxyVersion};
pub use director::{Director, RequestCtx};
pub use domain::{Domain, LookupState, PickError};
pub use endpoint::EndpointKey;
pub use registry::BackendRegistry;
pub use service::ServiceDomain;
pub use whitelist::Whitelist;
