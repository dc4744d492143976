//! External segments around backend calls.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::instrumentation::apm::ExternalSegmentGuard;
use crate::instrumentation::application::Application;
use crate::instrumentation::wire::WireRequest;
use crate::pipeline::{
    BackendFactory, Proxy, ProxyError, ProxyRequest, ProxyResponse, RequestContext, SharedProxy,
};

/// Backend factory whose proxies record an external segment per call.
pub struct BackendSegmentFactory {
    app: Arc<Application>,
    segment_name: Arc<str>,
    next: Arc<dyn BackendFactory>,
}

impl BackendSegmentFactory {
    pub fn new(app: Arc<Application>, segment_name: &str, next: Arc<dyn BackendFactory>) -> Self {
        Self {
            app,
            segment_name: Arc::from(segment_name),
            next,
        }
    }
}

impl BackendFactory for BackendSegmentFactory {
    fn new_backend(&self, cfg: &BackendConfig) -> SharedProxy {
        Arc::new(BackendSegment {
            app: self.app.clone(),
            segment_name: self.segment_name.clone(),
            next: self.next.new_backend(cfg),
        })
    }
}

/// Backend proxy wrapped in an external segment.
pub struct BackendSegment {
    app: Arc<Application>,
    segment_name: Arc<str>,
    next: SharedProxy,
}

impl BackendSegment {
    pub fn new(app: Arc<Application>, segment_name: &str, next: SharedProxy) -> Self {
        Self {
            app,
            segment_name: Arc::from(segment_name),
            next,
        }
    }
}

#[async_trait]
impl Proxy for BackendSegment {
    async fn call(
        &self,
        ctx: &RequestContext,
        req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let Some(tx) = self.app.manager.transaction_from_context(ctx.extensions()) else {
            return self.next.call(ctx, req).await;
        };

        let mut wire = WireRequest::from_proxy_request(req)?;
        let mut segment = ExternalSegmentGuard::new(self.app.manager.start_external_segment(
            tx.as_ref(),
            &self.segment_name,
            &mut wire,
        ));
        wire.write_headers(&mut req.headers);

        let result = self.next.call(ctx, req).await;
        if let Ok(resp) = &result {
            segment.set_status_code(resp.metadata.status_code);
        }

        result
    }
}
