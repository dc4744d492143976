//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with one route per configured endpoint
//! - Build each endpoint's proxy and handler from the factory chain
//! - Wire up middleware (instrumentation entry, timeout, tracing)
//! - Bind server to listener and stop on the shutdown signal

use std::time::Duration;

use axum::{
    http::Method,
    routing::{on_service, MethodFilter},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::instrumentation::InstrumentationLayer;
use crate::pipeline::{HandlerFactory, ProxyError, ProxyFactory};

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("endpoint {endpoint}: {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: ProxyError,
    },

    #[error("endpoint {endpoint}: unsupported method {method:?}")]
    Method { endpoint: String, method: String },
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Build every endpoint through the given factories.
    pub fn new(
        config: GatewayConfig,
        proxy_factory: &dyn ProxyFactory,
        handler_factory: &dyn HandlerFactory,
        entry: InstrumentationLayer,
    ) -> Result<Self, ServerError> {
        let router = Self::build_router(&config, proxy_factory, handler_factory, entry)?;
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        proxy_factory: &dyn ProxyFactory,
        handler_factory: &dyn HandlerFactory,
        entry: InstrumentationLayer,
    ) -> Result<Router, ServerError> {
        let mut router = Router::new();

        for endpoint in &config.endpoints {
            let filter = Method::from_bytes(endpoint.method.to_uppercase().as_bytes())
                .ok()
                .and_then(|method| MethodFilter::try_from(method).ok())
                .ok_or_else(|| ServerError::Method {
                    endpoint: endpoint.endpoint.clone(),
                    method: endpoint.method.clone(),
                })?;

            let proxy = proxy_factory
                .new_proxy(endpoint)
                .map_err(|source| ServerError::Endpoint {
                    endpoint: endpoint.endpoint.clone(),
                    source,
                })?;
            let handler = handler_factory.new_handler(endpoint, proxy);

            tracing::debug!(
                method = %endpoint.method,
                endpoint = %endpoint.endpoint,
                backends = endpoint.backends.len(),
                "Registering endpoint"
            );
            router = router.route(&endpoint.endpoint, on_service(filter, handler));
        }

        Ok(router
            .layer(entry)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http()))
    }

    /// The assembled router, e.g. to drive it without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            endpoints = self.config.endpoints.len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
