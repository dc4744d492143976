//! Startup orchestration.
//!
//! # Responsibilities
//! - Register instrumentation from the extension config
//! - Start the optional sample buffer, bound to shutdown
//! - Compose the decorated factory chain (backend → proxy → handler)
//! - Build the server in dependency order
//!
//! # Design Decisions
//! - Instrumentation failures degrade to an undecorated pipeline
//! - Endpoint construction errors are fatal

use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::http::{GatewayServer, ServerError};
use crate::instrumentation::{
    BufferedSampleSource, ContextTransactionManager, Instrumentation, TracerClient,
};
use crate::lifecycle::Shutdown;
use crate::observability::LogTracer;
use crate::pipeline::{
    BackendFactory, DefaultHandlerFactory, DefaultProxyFactory, HttpBackendFactory,
};

/// Segment name of backend calls.
pub const BACKEND_SEGMENT: &str = "backend";
/// Segment name of endpoint proxy composition.
pub const PROXY_SEGMENT: &str = "proxy";

/// Register instrumentation backed by the log tracer.
pub async fn init_instrumentation(config: &GatewayConfig, service: &str) -> Instrumentation {
    let service = service.to_string();
    Instrumentation::register(
        &config.extra_config,
        move || Ok(Arc::new(LogTracer::new(service)) as Arc<dyn TracerClient>),
        Arc::new(ContextTransactionManager),
        Duration::from_secs(config.timeouts.tracer_connect_secs),
    )
    .await
}

/// Switch the sampling gate to a pre-drawn buffer when `sample_buffer` is set.
///
/// The producer task stops on `shutdown`. Must run inside a tokio runtime.
pub fn start_sample_buffer(
    instrumentation: Instrumentation,
    shutdown: &Shutdown,
) -> Instrumentation {
    let capacity = match instrumentation.application() {
        Some(app) if app.config.sample_buffer > 0 => app.config.sample_buffer,
        _ => return instrumentation,
    };

    tracing::info!(capacity, "Starting sample buffer");
    let samples = BufferedSampleSource::start(capacity, shutdown.subscribe());
    instrumentation.with_sample_source(samples)
}

/// Build the server with every factory decorated by `instrumentation`.
pub fn build_server(
    config: GatewayConfig,
    instrumentation: &Instrumentation,
) -> Result<GatewayServer, ServerError> {
    let backends = Arc::new(HttpBackendFactory::new(Duration::from_secs(
        config.timeouts.request_secs,
    )));
    build_server_with(config, instrumentation, backends)
}

/// Same as [`build_server`], over an arbitrary backend factory.
pub fn build_server_with(
    config: GatewayConfig,
    instrumentation: &Instrumentation,
    backends: Arc<dyn BackendFactory>,
) -> Result<GatewayServer, ServerError> {
    let backend_factory = instrumentation.backend_factory(BACKEND_SEGMENT, backends);

    let proxy_factory = instrumentation.proxy_factory(
        PROXY_SEGMENT,
        Arc::new(DefaultProxyFactory::new(backend_factory)),
    );

    let handler_factory = instrumentation.handler_factory(Arc::new(DefaultHandlerFactory));

    GatewayServer::new(
        config,
        proxy_factory.as_ref(),
        handler_factory.as_ref(),
        instrumentation.middleware(),
    )
}
