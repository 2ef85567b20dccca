//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (control path):
//!     add / remove / apply
//!     → registry.rs (copy list, apply change, detect duplicates)
//!     → table.rs (compile full list into immutable RoutingTable)
//!     → dispatcher.rs (atomic swap of Arc<RoutingTable>)
//!
//! Incoming Request (method, path)
//!     → dispatcher.rs (load current table once)
//!     → table.rs (match path, then method, then catch-all)
//!     → endpoint handler, trailing-slash redirect, or 404
//! ```
//!
//! # Design Decisions
//! - Tables are rebuilt from scratch on every change, never patched
//! - Readers are lock-free; only registry mutations serialize
//! - Endpoint identity is a handle, not a value

pub mod dispatcher;
pub mod endpoint;
pub mod registry;
pub mod table;

pub use dispatcher::Dispatcher;
pub use endpoint::{Endpoint, EndpointBuilder, EndpointId, Handler};
pub use registry::{Change, EndpointRegistry, RegistryError};
pub use table::{PathParams, Resolution, RoutingTable, TableError, TableOptions};
