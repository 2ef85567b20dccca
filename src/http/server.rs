//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Own the endpoint registry and its dispatcher for the server lifetime
//! - Create the Axum Router whose only service is the dispatcher
//! - Wire up middleware (request ID, tracing, timeout)
//! - Apply configuration reloads while serving
//! - Stop accepting on shutdown and let in-flight requests finish

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ConfiguredEndpoints, ServerConfig};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::routing::{Dispatcher, EndpointRegistry, RegistryError};

/// Errors raised while assembling or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Configured endpoints could not be registered.
    #[error("failed to register configured endpoints: {0}")]
    Registry(#[from] RegistryError),

    /// The transport failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP server whose routes can change while it runs.
pub struct DynHttpServer {
    config: ServerConfig,
    registry: Arc<EndpointRegistry>,
    configured: ConfiguredEndpoints,
}

impl DynHttpServer {
    /// Create a server and register the endpoints declared in `config`.
    ///
    /// The configuration is validated first, whether it came from a file or
    /// was built in code.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let registry = Arc::new(EndpointRegistry::new(
            Dispatcher::new(),
            config.routing.into(),
        ));
        let mut configured = ConfiguredEndpoints::new();
        configured.sync(&registry, &config.endpoints)?;

        Ok(Self {
            config,
            registry,
            configured,
        })
    }

    /// Registration API shared with application code.
    pub fn registry(&self) -> Arc<EndpointRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.registry.dispatcher()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, dispatcher: Dispatcher) -> Router {
        Router::new()
            .fallback_service(dispatcher)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` are applied while serving;
    /// listener settings in them are ignored.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let router = Self::build_router(&self.config, self.dispatcher().clone());
        let reload_shutdown = shutdown.resubscribe();
        let reloader = tokio::spawn(self.apply_updates(config_updates, reload_shutdown));

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        reloader.abort();
        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    async fn apply_updates(
        mut self,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                update = config_updates.recv() => match update {
                    Some(config) => self.reconfigure(config),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Apply a configuration to the running server.
    ///
    /// Routing options and endpoints change together or not at all.
    fn reconfigure(&mut self, config: ServerConfig) {
        if let Err(errors) = validate_config(&config) {
            let e = ConfigError::Validation(errors);
            tracing::error!(
                error = %e,
                "Rejected configuration update, keeping current configuration"
            );
            return;
        }

        if config.listener != self.config.listener || config.timeouts != self.config.timeouts {
            tracing::warn!("Listener and timeout changes take effect after restart");
        }

        match self.configured.sync_with_options(
            &self.registry,
            config.routing.into(),
            &config.endpoints,
        ) {
            Ok(summary) if summary.is_noop() => {
                tracing::debug!("Configuration reload changed no endpoints");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to apply configuration update, keeping current routing"
                );
                return;
            }
        }

        self.config.routing = config.routing;
        self.config.endpoints = config.endpoints;
        self.config.observability = config.observability;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::routing::Endpoint;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn endpoint_config(name: &str, path: &str, body: &str) -> EndpointConfig {
        EndpointConfig {
            name: name.to_string(),
            methods: None,
            paths: Some(vec![path.to_string()]),
            status: 200,
            body: body.to_string(),
            content_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn new_registers_configured_endpoints() {
        let mut config = ServerConfig::default();
        config.endpoints.push(endpoint_config("ping", "/ping", "pong"));

        let server = DynHttpServer::new(config).unwrap();
        assert_eq!(server.registry().len(), 1);
    }

    #[test]
    fn new_rejects_conflicting_endpoints() {
        let mut config = ServerConfig::default();
        config.endpoints.push(endpoint_config("x", "/a/{x}", "x"));
        config.endpoints.push(endpoint_config("y", "/a/{y}", "y"));

        assert!(matches!(
            DynHttpServer::new(config),
            Err(ServerError::Registry(RegistryError::Compile(_)))
        ));
    }

    #[test]
    fn new_rejects_invalid_endpoint_settings() {
        let mut config = ServerConfig::default();
        let mut bad = endpoint_config("x", "/x", "x");
        bad.methods = Some(vec!["GE T".to_string()]);
        bad.status = 1000;
        config.endpoints.push(bad);

        match DynHttpServer::new(config) {
            Err(ServerError::Config(ConfigError::Validation(errors))) => {
                assert_eq!(errors.len(), 2);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("invalid endpoint was accepted"),
        }
    }

    #[tokio::test]
    async fn router_routes_through_dispatcher_and_sets_request_id() {
        let server = DynHttpServer::new(ServerConfig::default()).unwrap();
        let router = DynHttpServer::build_router(server.config(), server.dispatcher().clone());

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/late").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));

        server
            .registry()
            .add(Endpoint::builder(|| async { "late" }).paths(["/late"]).build())
            .unwrap();

        let response = router
            .oneshot(Request::builder().uri("/late").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn reconfigure_applies_endpoints_and_options() {
        let mut server = DynHttpServer::new(ServerConfig::default()).unwrap();

        let mut next = ServerConfig::default();
        next.routing.strict_slash = false;
        next.endpoints.push(endpoint_config("a", "/a", "a"));
        server.reconfigure(next.clone());

        assert_eq!(server.registry().len(), 1);
        assert!(!server.registry().options().strict_slash);
        assert_eq!(server.config().endpoints, next.endpoints);
    }

    #[test]
    fn reconfigure_keeps_state_on_failure() {
        let mut config = ServerConfig::default();
        config.endpoints.push(endpoint_config("a", "/a/{x}", "a"));
        let mut server = DynHttpServer::new(config.clone()).unwrap();

        let mut next = config.clone();
        next.endpoints.push(endpoint_config("b", "/a/{y}", "b"));
        server.reconfigure(next);

        assert_eq!(server.registry().len(), 1);
        assert_eq!(server.config().endpoints, config.endpoints);
    }

    #[test]
    fn rejected_reload_keeps_routing_options() {
        let mut config = ServerConfig::default();
        config.endpoints.push(endpoint_config("a", "/a/{x}", "a"));
        let mut server = DynHttpServer::new(config.clone()).unwrap();
        let generation = server.registry().generation();

        let mut next = config.clone();
        next.routing.strict_slash = false;
        next.endpoints.push(endpoint_config("b", "/a/{y}", "b"));
        server.reconfigure(next);

        assert!(server.registry().options().strict_slash);
        assert!(server.config().routing.strict_slash);
        assert_eq!(server.registry().generation(), generation);
        assert_eq!(server.registry().len(), 1);
    }

    #[test]
    fn invalid_reload_is_ignored() {
        let mut config = ServerConfig::default();
        config.endpoints.push(endpoint_config("a", "/a", "a"));
        let mut server = DynHttpServer::new(config.clone()).unwrap();
        let generation = server.registry().generation();

        let mut next = config.clone();
        next.routing.strict_slash = false;
        next.endpoints[0].methods = Some(vec!["GE T".to_string()]);
        server.reconfigure(next);

        assert!(server.registry().options().strict_slash);
        assert_eq!(server.registry().generation(), generation);
        assert_eq!(server.config(), &config);
    }
}
