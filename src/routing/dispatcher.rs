//! Swappable request dispatcher.
//!
//! # Responsibilities
//! - Hold the single current routing table
//! - Publish replacement tables atomically
//! - Serve every request against one consistent table
//!
//! # Design Decisions
//! - `ArcSwap` instead of a lock: readers never block each other or a writer
//! - A request loads the table once; a concurrent swap cannot split its
//!   routing decision across two tables
//! - The load guard is never held across an await point

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use axum::extract::Request;
use axum::response::Response;
use tower::Service;

use crate::routing::table::{ResponseFuture, RoutingTable};

/// Atomic holder of the current routing table.
///
/// Clones share the same cell, so a clone handed to the transport observes
/// every table installed through any other clone.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<ArcSwap<RoutingTable>>,
}

impl Dispatcher {
    /// Create a dispatcher serving an empty table.
    pub fn new() -> Self {
        Self::with_table(RoutingTable::empty())
    }

    pub fn with_table(table: RoutingTable) -> Self {
        Self {
            table: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// The table in effect at the instant of the call.
    pub fn read(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    /// Install `table` as current and return the table it superseded.
    pub fn replace(&self, table: RoutingTable) -> Arc<RoutingTable> {
        let generation = table.generation();
        let previous = self.table.swap(Arc::new(table));
        tracing::debug!(
            previous_generation = previous.generation(),
            generation,
            "Routing table swapped"
        );
        previous
    }

    /// Route a request against the current table and run its handler.
    pub async fn dispatch(&self, request: Request) -> Response {
        self.route(request).await
    }

    fn route(&self, request: Request) -> ResponseFuture {
        self.table.load().dispatch(request)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("table", &*self.table.load())
            .finish()
    }
}

impl Service<Request> for Dispatcher {
    type Response = Response;
    type Error = Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Response, Infallible>> + Send + 'static>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let response = self.route(request);
        Box::pin(async move { Ok(response.await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::endpoint::Endpoint;
    use crate::routing::table::TableOptions;
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    fn table_answering(body: &'static str, generation: u64) -> RoutingTable {
        let endpoint = Endpoint::builder(move || async move { body }).build();
        RoutingTable::compile(&[endpoint], TableOptions::default(), generation).unwrap()
    }

    async fn get(dispatcher: &Dispatcher, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = dispatcher.dispatch(request).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn starts_empty() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.read().generation(), 0);
        let (status, _) = get(&dispatcher, "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn replace_is_visible_to_clones() {
        let dispatcher = Dispatcher::new();
        let transport_side = dispatcher.clone();

        let previous = dispatcher.replace(table_answering("one", 1));
        assert_eq!(previous.generation(), 0);
        assert_eq!(get(&transport_side, "/").await.1, "one");

        dispatcher.replace(table_answering("two", 2));
        assert_eq!(get(&transport_side, "/").await.1, "two");
        assert_eq!(transport_side.read().generation(), 2);
    }

    #[tokio::test]
    async fn captured_table_survives_replace() {
        let dispatcher = Dispatcher::with_table(table_answering("old", 1));
        let captured = dispatcher.read();

        dispatcher.replace(table_answering("new", 2));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = captured.dispatch(request).await;
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"old");
        assert_eq!(dispatcher.read().generation(), 2);
    }

    #[tokio::test]
    async fn service_impl_dispatches() {
        let dispatcher = Dispatcher::with_table(table_answering("svc", 1));
        let request = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let response = dispatcher.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Even generations route `/p`, odd ones route `/q`; everything else
    /// falls to a catch-all. Every handler reports its table's generation.
    fn alternating_table(generation: u64) -> RoutingTable {
        let routed = if generation % 2 == 0 { "/p" } else { "/q" };
        let path = Endpoint::builder(move || async move { format!("path {generation}") })
            .paths([routed])
            .build();
        let fallback =
            Endpoint::builder(move || async move { format!("fallback {generation}") }).build();
        RoutingTable::compile(&[path, fallback], TableOptions::default(), generation).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatch_sees_whole_tables() {
        let dispatcher = Dispatcher::with_table(alternating_table(1));

        let mut readers = tokio::task::JoinSet::new();
        for reader in 0..8 {
            let dispatcher = dispatcher.clone();
            let uri = if reader % 2 == 0 { "/p" } else { "/q" };
            readers.spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..200 {
                    seen.push((uri, get(&dispatcher, uri).await.1));
                    tokio::task::yield_now().await;
                }
                seen
            });
        }

        for generation in 2..200 {
            dispatcher.replace(alternating_table(generation));
            tokio::task::yield_now().await;
        }

        while let Some(result) = readers.join_next().await {
            for (uri, body) in result.unwrap() {
                let (kind, generation) = body.split_once(' ').unwrap();
                let generation: u64 = generation.parse().unwrap();
                let routes_p = generation % 2 == 0;
                let expected = if (uri == "/p") == routes_p { "path" } else { "fallback" };
                assert_eq!(kind, expected, "{uri} answered {body:?}");
            }
        }
    }
}
