//! Dynamic HTTP server library.
//!
//! Endpoints can be added and removed while the server runs. Every change
//! compiles a fresh routing table that is swapped in atomically, so each
//! request is routed by exactly one complete table.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::schema::ServerConfig;
pub use http::DynHttpServer;
pub use lifecycle::Shutdown;
pub use routing::{Endpoint, EndpointId, EndpointRegistry, RegistryError};
