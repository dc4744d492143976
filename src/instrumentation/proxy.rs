//! Internal segments around endpoint proxy composition.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EndpointConfig;
use crate::instrumentation::apm::SegmentGuard;
use crate::instrumentation::application::Application;
use crate::pipeline::{
    single_proxy, Middleware, Proxy, ProxyError, ProxyFactory, ProxyRequest, ProxyResponse,
    RequestContext, SharedProxy,
};

/// Segment label of an endpoint: `"(<segment name>) <endpoint path>"`.
pub fn segment_label(segment_name: &str, endpoint: &str) -> String {
    format!("({}) {}", segment_name, endpoint)
}

/// Proxy factory wrapping every endpoint proxy in an internal segment.
pub struct ProxySegmentFactory {
    app: Arc<Application>,
    segment_name: String,
    next: Arc<dyn ProxyFactory>,
}

impl ProxySegmentFactory {
    pub fn new(app: Arc<Application>, segment_name: &str, next: Arc<dyn ProxyFactory>) -> Self {
        Self {
            app,
            segment_name: segment_name.to_string(),
            next,
        }
    }
}

impl ProxyFactory for ProxySegmentFactory {
    fn new_proxy(&self, cfg: &EndpointConfig) -> Result<SharedProxy, ProxyError> {
        let next = self.next.new_proxy(cfg)?;
        let middleware = ProxySegmentMiddleware::new(
            self.app.clone(),
            segment_label(&self.segment_name, &cfg.endpoint),
        );
        middleware.try_layer(vec![next])
    }
}

/// Middleware starting an internal segment around its single downstream proxy.
pub struct ProxySegmentMiddleware {
    app: Arc<Application>,
    segment_name: Arc<str>,
}

impl ProxySegmentMiddleware {
    pub fn new(app: Arc<Application>, segment_name: impl Into<String>) -> Self {
        Self {
            app,
            segment_name: Arc::from(segment_name.into()),
        }
    }
}

impl Middleware for ProxySegmentMiddleware {
    fn try_layer(&self, next: Vec<SharedProxy>) -> Result<SharedProxy, ProxyError> {
        let next = single_proxy(next)?;
        Ok(Arc::new(ProxySegment {
            app: self.app.clone(),
            segment_name: self.segment_name.clone(),
            next,
        }))
    }
}

struct ProxySegment {
    app: Arc<Application>,
    segment_name: Arc<str>,
    next: SharedProxy,
}

#[async_trait]
impl Proxy for ProxySegment {
    async fn call(
        &self,
        ctx: &RequestContext,
        req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let Some(tx) = self.app.manager.transaction_from_context(ctx.extensions()) else {
            return self.next.call(ctx, req).await;
        };

        let _segment = SegmentGuard::new(tx.start_segment(&self.segment_name));
        self.next.call(ctx, req).await
    }
}

/// Middleware used when instrumentation is disabled: enforces the
/// single-downstream rule and returns the downstream proxy untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyMiddleware;

impl Middleware for EmptyMiddleware {
    fn try_layer(&self, next: Vec<SharedProxy>) -> Result<SharedProxy, ProxyError> {
        single_proxy(next)
    }
}
