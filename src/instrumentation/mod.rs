//! Request pipeline instrumentation.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → router.rs  InstrumentationLayer (sampling gate → TransactionLayer or pass-through)
//!     → router.rs  NamedHandlerFactory (transaction name = endpoint path)
//!     → proxy.rs   ProxySegmentFactory (internal segment "(name) /endpoint")
//!     → backend.rs BackendSegmentFactory (external segment per backend call)
//! ```
//!
//! # Design Decisions
//! - The [`Instrumentation`] handle is passed explicitly to every factory
//! - Disabled instrumentation returns the undecorated stage itself
//! - Segments and transactions end through drop guards, on every exit path
//! - Decorators never wrap or swallow downstream errors

pub mod apm;
pub mod application;
pub mod backend;
pub mod config;
pub mod proxy;
pub mod router;
pub mod sampling;
pub mod wire;

use std::sync::Arc;
use std::time::Duration;

use crate::config::ExtraConfig;
use crate::pipeline::{BackendFactory, BoxError, HandlerFactory, Middleware, ProxyFactory, SharedProxy};

pub use apm::{
    ActiveTransaction, ContextTransactionManager, ExternalSegment, Segment, TracerClient,
    Transaction, TransactionManager,
};
pub use application::{Application, InstrumentationError};
pub use backend::{BackendSegment, BackendSegmentFactory};
pub use config::{config_getter, InstrumentationConfig, SamplingRate, NAMESPACE};
pub use proxy::{EmptyMiddleware, ProxySegmentFactory, ProxySegmentMiddleware};
pub use router::{InstrumentationLayer, NamedHandlerFactory, TransactionLayer};
pub use sampling::{BufferedSampleSource, FastRandSource, SampleSource, SamplingGate};
pub use wire::WireRequest;

/// Handle deciding how the pipeline gets decorated.
///
/// Holds the application when tracing is enabled; every decorator factory
/// hands back its input untouched otherwise.
#[derive(Clone)]
pub struct Instrumentation {
    app: Option<Arc<Application>>,
    samples: Arc<dyn SampleSource>,
}

impl Default for Instrumentation {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Instrumentation {
    pub fn disabled() -> Self {
        Self {
            app: None,
            samples: Arc::new(FastRandSource),
        }
    }

    pub fn enabled(app: Application) -> Self {
        Self {
            app: Some(Arc::new(app)),
            samples: Arc::new(FastRandSource),
        }
    }

    /// Replace the random source used by the sampling gate.
    pub fn with_sample_source(mut self, samples: Arc<dyn SampleSource>) -> Self {
        self.samples = samples;
        self
    }

    /// Build the application from the extension config.
    ///
    /// Failures are logged and leave instrumentation disabled; the gateway
    /// keeps serving. A tracer that does not connect in time is logged but
    /// kept, it may still connect later.
    pub async fn register<F>(
        extra: &ExtraConfig,
        tracer_factory: F,
        manager: Arc<dyn TransactionManager>,
        connect_timeout: Duration,
    ) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn TracerClient>, BoxError>,
    {
        let app = match Application::new(extra, tracer_factory, manager) {
            Ok(app) => app,
            Err(e) => {
                tracing::error!(error = %e, "Error initializing instrumentation");
                return Self::disabled();
            }
        };

        if let Err(e) = app.tracer.wait_for_connection(connect_timeout).await {
            tracing::error!(error = %e, "Error initializing instrumentation");
        }

        tracing::info!(
            rate = app.sampling_rate().percent(),
            "Instrumentation enabled"
        );
        Self::enabled(app)
    }

    pub fn is_enabled(&self) -> bool {
        self.app.is_some()
    }

    pub fn application(&self) -> Option<&Arc<Application>> {
        self.app.as_ref()
    }

    /// Decorate a backend factory with external segments.
    pub fn backend_factory(
        &self,
        segment_name: &str,
        next: Arc<dyn BackendFactory>,
    ) -> Arc<dyn BackendFactory> {
        match &self.app {
            Some(app) => Arc::new(BackendSegmentFactory::new(app.clone(), segment_name, next)),
            None => next,
        }
    }

    /// Decorate a single backend proxy with external segments.
    pub fn backend(&self, segment_name: &str, next: SharedProxy) -> SharedProxy {
        match &self.app {
            Some(app) => Arc::new(BackendSegment::new(app.clone(), segment_name, next)),
            None => next,
        }
    }

    /// Decorate a proxy factory with per-endpoint internal segments.
    pub fn proxy_factory(
        &self,
        segment_name: &str,
        next: Arc<dyn ProxyFactory>,
    ) -> Arc<dyn ProxyFactory> {
        match &self.app {
            Some(app) => Arc::new(ProxySegmentFactory::new(app.clone(), segment_name, next)),
            None => next,
        }
    }

    /// Middleware starting an internal segment named `segment_name`.
    pub fn proxy_middleware(&self, segment_name: &str) -> Arc<dyn Middleware> {
        match &self.app {
            Some(app) => Arc::new(ProxySegmentMiddleware::new(app.clone(), segment_name)),
            None => Arc::new(EmptyMiddleware),
        }
    }

    /// Decorate a handler factory so transactions carry the endpoint name.
    pub fn handler_factory(&self, next: Arc<dyn HandlerFactory>) -> Arc<dyn HandlerFactory> {
        match &self.app {
            Some(app) => Arc::new(NamedHandlerFactory::new(app.clone(), next)),
            None => next,
        }
    }

    /// Entry middleware installed ahead of every endpoint handler.
    pub fn middleware(&self) -> InstrumentationLayer {
        match &self.app {
            Some(app) => InstrumentationLayer::new(
                app.tracer.clone(),
                SamplingGate::new(app.sampling_rate(), self.samples.clone()),
            ),
            None => InstrumentationLayer::passthrough(),
        }
    }

    /// Flush and close the tracer client.
    pub async fn shutdown(&self, timeout: Duration) {
        if let Some(app) = &self.app {
            app.tracer.shutdown(timeout).await;
        }
    }
}
