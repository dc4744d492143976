//! Gateway request pipeline.
//!
//! # Data Flow
//! ```text
//! axum Request
//!     → handler.rs (HandlerFactory: HTTP request → ProxyRequest)
//!     → proxy.rs (ProxyFactory: per-endpoint composition, backend fan-out/merge)
//!     → backend.rs (RequestBuilder → BackendFactory: outbound HTTP call)
//!     ← ProxyResponse (merged JSON data + metadata)
//!     ← handler.rs renders the response
//! ```
//!
//! # Design Decisions
//! - Every stage is a value implementing [`Proxy`], shared as `Arc<dyn Proxy>`
//! - Factories are built once per endpoint/backend at startup
//! - Request-scoped state travels in [`RequestContext`], never in globals
//! - Decorators wrap factories without changing their types

pub mod backend;
pub mod error;
pub mod handler;
pub mod proxy;
pub mod request;

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use tower::util::BoxCloneSyncService;

use crate::config::{BackendConfig, EndpointConfig};

pub use backend::{HttpBackendFactory, RequestBuilder};
pub use error::{BoxError, ProxyError, TranslationError};
pub use handler::DefaultHandlerFactory;
pub use proxy::{DefaultProxyFactory, MergeProxy};
pub use request::{Headers, Metadata, ProxyRequest, ProxyResponse, RequestContext};

/// A single stage of the proxy pipeline.
#[async_trait]
pub trait Proxy: Send + Sync {
    /// Process the request, possibly mutating it for later stages.
    async fn call(
        &self,
        ctx: &RequestContext,
        req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError>;
}

pub type SharedProxy = Arc<dyn Proxy>;

/// Final HTTP handler of an endpoint.
pub type Handler = BoxCloneSyncService<Request<Body>, Response, Infallible>;

/// Builds the proxy that talks to one backend.
pub trait BackendFactory: Send + Sync {
    fn new_backend(&self, cfg: &BackendConfig) -> SharedProxy;
}

impl<F> BackendFactory for F
where
    F: Fn(&BackendConfig) -> SharedProxy + Send + Sync,
{
    fn new_backend(&self, cfg: &BackendConfig) -> SharedProxy {
        self(cfg)
    }
}

/// Builds the proxy stack of one endpoint.
pub trait ProxyFactory: Send + Sync {
    fn new_proxy(&self, cfg: &EndpointConfig) -> Result<SharedProxy, ProxyError>;
}

impl<F> ProxyFactory for F
where
    F: Fn(&EndpointConfig) -> Result<SharedProxy, ProxyError> + Send + Sync,
{
    fn new_proxy(&self, cfg: &EndpointConfig) -> Result<SharedProxy, ProxyError> {
        self(cfg)
    }
}

/// Builds the HTTP handler of one endpoint around its proxy.
pub trait HandlerFactory: Send + Sync {
    fn new_handler(&self, cfg: &EndpointConfig, proxy: SharedProxy) -> Handler;
}

impl<F> HandlerFactory for F
where
    F: Fn(&EndpointConfig, SharedProxy) -> Handler + Send + Sync,
{
    fn new_handler(&self, cfg: &EndpointConfig, proxy: SharedProxy) -> Handler {
        self(cfg, proxy)
    }
}

/// Wraps exactly one downstream proxy into a new one.
pub trait Middleware: Send + Sync {
    /// Compose the middleware, rejecting anything but a single downstream stage.
    fn try_layer(&self, next: Vec<SharedProxy>) -> Result<SharedProxy, ProxyError>;

    /// Compose the middleware.
    ///
    /// # Panics
    ///
    /// Panics when `next` does not hold exactly one proxy. That is a wiring
    /// bug, not a runtime condition.
    fn layer(&self, next: Vec<SharedProxy>) -> SharedProxy {
        self.try_layer(next).unwrap_or_else(|e| panic!("{e}"))
    }
}

/// Checks the single-downstream rule shared by every proxy middleware.
pub fn single_proxy(mut next: Vec<SharedProxy>) -> Result<SharedProxy, ProxyError> {
    match next.len() {
        0 => Err(ProxyError::NotEnoughProxies),
        1 => Ok(next.remove(0)),
        _ => Err(ProxyError::TooManyProxies),
    }
}

/// Proxy that returns an empty, complete response.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProxy;

#[async_trait]
impl Proxy for NoopProxy {
    async fn call(
        &self,
        _ctx: &RequestContext,
        _req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        Ok(ProxyResponse::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_proxy_rule() {
        assert!(matches!(
            single_proxy(vec![]),
            Err(ProxyError::NotEnoughProxies)
        ));

        let two: Vec<SharedProxy> = vec![Arc::new(NoopProxy), Arc::new(NoopProxy)];
        assert!(matches!(single_proxy(two), Err(ProxyError::TooManyProxies)));

        assert!(single_proxy(vec![Arc::new(NoopProxy)]).is_ok());
    }
}
