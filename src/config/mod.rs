//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → endpoints.rs (reconcile [[endpoints]] into the registry)
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → mpsc channel to the server
//!     → endpoints.rs applies the difference as one registry batch
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Listener settings are read once at startup

pub mod endpoints;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use endpoints::ConfiguredEndpoints;
pub use loader::{load_config, ConfigError};
pub use schema::{
    EndpointConfig, ListenerConfig, ObservabilityConfig, RoutingConfig, ServerConfig,
    TimeoutConfig,
};
pub use validation::ValidationError;
