//! Per-endpoint proxy composition.
//!
//! # Responsibilities
//! - Wire every backend of an endpoint behind its request builder
//! - Fan a request out to several backends concurrently
//! - Merge the backend responses into one
//!
//! # Design Decisions
//! - A single backend is returned as-is (no merge overhead)
//! - Partial failures still answer, flagged with `is_complete = false`
//! - Later backends win on key conflicts

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::config::EndpointConfig;
use crate::pipeline::{
    BackendFactory, Proxy, ProxyError, ProxyFactory, ProxyRequest, ProxyResponse,
    RequestBuilder, RequestContext, SharedProxy,
};

/// Proxy factory composing the backends of an endpoint.
pub struct DefaultProxyFactory {
    backend_factory: Arc<dyn BackendFactory>,
}

impl DefaultProxyFactory {
    pub fn new(backend_factory: Arc<dyn BackendFactory>) -> Self {
        Self { backend_factory }
    }
}

impl ProxyFactory for DefaultProxyFactory {
    fn new_proxy(&self, cfg: &EndpointConfig) -> Result<SharedProxy, ProxyError> {
        let mut backends: Vec<SharedProxy> = cfg
            .backends
            .iter()
            .map(|backend| {
                let next = self.backend_factory.new_backend(backend);
                Arc::new(RequestBuilder::new(backend, next)) as SharedProxy
            })
            .collect();

        match backends.len() {
            0 => Err(ProxyError::NoBackends(cfg.endpoint.clone())),
            1 => Ok(backends.remove(0)),
            _ => Ok(Arc::new(MergeProxy::new(backends))),
        }
    }
}

/// Calls every backend concurrently and merges their data.
pub struct MergeProxy {
    backends: Vec<SharedProxy>,
}

impl MergeProxy {
    pub fn new(backends: Vec<SharedProxy>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl Proxy for MergeProxy {
    async fn call(
        &self,
        ctx: &RequestContext,
        req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let calls = self.backends.iter().map(|backend| {
            let mut req = req.clone();
            async move { backend.call(ctx, &mut req).await }
        });
        let results = join_all(calls).await;

        let mut merged = ProxyResponse::with_status(200);
        let mut first_error = None;
        let mut succeeded = 0;

        for result in results {
            match result {
                Ok(resp) => {
                    succeeded += 1;
                    merged.is_complete &= resp.is_complete;
                    merged.data.extend(resp.data);
                    merged.metadata.headers.extend(resp.metadata.headers);
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %req.path, "Backend failed during merge");
                    merged.is_complete = false;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(merged),
        }
    }
}
