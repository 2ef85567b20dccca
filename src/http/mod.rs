//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum::serve)
//!     → request.rs (assign x-request-id)
//!     → TraceLayer / TimeoutLayer
//!     → server.rs (single fallback service: the Dispatcher)
//!     → routing (current table → endpoint handler)
//!     → response.rs (configured static responses)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::StaticResponse;
pub use server::{DynHttpServer, ServerError};
