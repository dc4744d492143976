//! Instrumentation application: the tracer, its transaction manager and the
//! resolved config, built once at startup.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ExtraConfig;
use crate::instrumentation::apm::{TracerClient, TransactionManager};
use crate::instrumentation::config::{config_getter, InstrumentationConfig, SamplingRate};
use crate::pipeline::BoxError;

/// Errors raised while building the instrumentation application.
#[derive(Debug, Error)]
pub enum InstrumentationError {
    #[error("no config for the instrumentation module: {0}")]
    Config(String),

    #[error("invalid instrumentation config: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unable to start the tracer: {0}")]
    Start(#[source] BoxError),
}

/// Read-only bundle shared by every decorator.
pub struct Application {
    pub manager: Arc<dyn TransactionManager>,
    pub tracer: Arc<dyn TracerClient>,
    pub config: InstrumentationConfig,
}

impl Application {
    /// Resolve the config and start the tracer client.
    ///
    /// The tracer factory only runs when the config is valid.
    pub fn new<F>(
        extra: &ExtraConfig,
        tracer_factory: F,
        manager: Arc<dyn TransactionManager>,
    ) -> Result<Self, InstrumentationError>
    where
        F: FnOnce() -> Result<Arc<dyn TracerClient>, BoxError>,
    {
        let config = config_getter(extra)?;
        let tracer = tracer_factory().map_err(InstrumentationError::Start)?;

        Ok(Self {
            manager,
            tracer,
            config,
        })
    }

    pub fn sampling_rate(&self) -> SamplingRate {
        self.config.sampling_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrumentation::apm::ContextTransactionManager;
    use crate::instrumentation::config::NAMESPACE;
    use crate::observability::tracer::LogTracer;
    use serde_json::json;

    fn extra(rate: i64) -> ExtraConfig {
        let mut map = ExtraConfig::new();
        map.insert(NAMESPACE.to_string(), json!({ "rate": rate }));
        map
    }

    #[test]
    fn test_new_application() {
        let app = Application::new(
            &extra(30),
            || Ok(Arc::new(LogTracer::new("test")) as Arc<dyn TracerClient>),
            Arc::new(ContextTransactionManager),
        )
        .unwrap();
        assert_eq!(app.sampling_rate().percent(), 30);
    }

    #[test]
    fn test_factory_not_called_without_config() {
        let result = Application::new(
            &ExtraConfig::new(),
            || -> Result<Arc<dyn TracerClient>, BoxError> { panic!("factory must not run") },
            Arc::new(ContextTransactionManager),
        );
        assert!(matches!(result, Err(InstrumentationError::Config(_))));
    }

    #[test]
    fn test_factory_error() {
        let result = Application::new(
            &extra(100),
            || Err("license key missing".into()),
            Arc::new(ContextTransactionManager),
        );
        let err = result.err().unwrap();
        assert_eq!(err.to_string(), "unable to start the tracer: license key missing");
    }
}
