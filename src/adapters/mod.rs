pub mod recursive;
pub mod system;

/// Re-export commonly used types from adapters
pub use recursive::{RecursiveResolver, RecursiveResolverBuilder};
pub use system::SystemResolver;
