//! Endpoint definitions and handler capability.
//!
//! # Responsibilities
//! - Give every endpoint a process-unique identity
//! - Hold the method set, path patterns and handler of one registration
//! - Erase handler types behind a cloneable tower service
//!
//! # Design Decisions
//! - Equality is identity, never structure: two endpoints built from the
//!   same methods, paths and handler are distinct registry entries
//! - Cloning an `Endpoint` clones the handle, not the identity
//! - Immutable after `build()`

use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

/// Global atomic counter for endpoint identities.
static ENDPOINT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of an endpoint registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    fn next() -> Self {
        Self(ENDPOINT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

impl From<&Endpoint> for EndpointId {
    fn from(endpoint: &Endpoint) -> Self {
        endpoint.id()
    }
}

/// Type-erased request handler.
///
/// Anything axum accepts as a handler, or any infallible tower service, can be
/// turned into a `Handler`. The compiled table invokes it unmodified.
#[derive(Clone)]
pub struct Handler(BoxCloneSyncService<Request, Response, Infallible>);

impl Handler {
    /// Wrap an axum handler (async fn or closure with extractors).
    pub fn new<H, T>(handler: H) -> Self
    where
        H: axum::handler::Handler<T, ()> + Sync,
        T: 'static,
    {
        Self(BoxCloneSyncService::new(handler.with_state(())))
    }

    /// Wrap an infallible tower service.
    pub fn from_service<S>(service: S) -> Self
    where
        S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Future: Send + 'static,
    {
        Self(BoxCloneSyncService::new(
            service.map_response(IntoResponse::into_response),
        ))
    }

    /// Run the handler to completion.
    pub async fn call(self, request: Request) -> Response {
        match self.0.oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

struct EndpointInner {
    id: EndpointId,
    name: Option<String>,
    methods: Option<Vec<Method>>,
    paths: Option<Vec<String>>,
    handler: Handler,
}

/// One registered rule set (methods × paths) bound to a handler.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    /// Start building an endpoint around `handler`.
    ///
    /// Without further calls the endpoint is a global catch-all: any method,
    /// any path.
    pub fn builder<H, T>(handler: H) -> EndpointBuilder
    where
        H: axum::handler::Handler<T, ()> + Sync,
        T: 'static,
    {
        EndpointBuilder::new(Handler::new(handler))
    }

    /// Start building an endpoint around an already erased handler.
    pub fn with_handler(handler: Handler) -> EndpointBuilder {
        EndpointBuilder::new(handler)
    }

    pub fn id(&self) -> EndpointId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Methods this endpoint is restricted to. `None` matches any method.
    pub fn methods(&self) -> Option<&[Method]> {
        self.inner.methods.as_deref()
    }

    /// Path patterns. `None` makes the endpoint a catch-all on `/`.
    pub fn paths(&self) -> Option<&[String]> {
        self.inner.paths.as_deref()
    }

    pub fn handler(&self) -> &Handler {
        &self.inner.handler
    }

    pub fn is_catch_all(&self) -> bool {
        self.inner.paths.is_none()
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Endpoint {}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("methods", &self.inner.methods)
            .field("paths", &self.inner.paths)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.name {
            Some(name) => write!(f, "{} ({})", self.inner.id, name),
            None => write!(f, "{}", self.inner.id),
        }
    }
}

/// Builder for [`Endpoint`].
#[derive(Debug)]
pub struct EndpointBuilder {
    name: Option<String>,
    methods: Option<Vec<Method>>,
    paths: Option<Vec<String>>,
    handler: Handler,
}

impl EndpointBuilder {
    fn new(handler: Handler) -> Self {
        Self {
            name: None,
            methods: None,
            paths: None,
            handler,
        }
    }

    /// Label used in logs. Does not take part in identity.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict the endpoint to these methods.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    /// Register the endpoint on these path patterns.
    pub fn paths<P>(mut self, paths: impl IntoIterator<Item = P>) -> Self
    where
        P: Into<String>,
    {
        self.paths = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Freeze the definition and assign a fresh identity.
    pub fn build(self) -> Endpoint {
        Endpoint {
            inner: Arc::new(EndpointInner {
                id: EndpointId::next(),
                name: self.name,
                methods: self.methods,
                paths: self.paths,
                handler: self.handler,
            }),
        }
    }
}
