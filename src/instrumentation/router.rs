//! Router-level instrumentation.
//!
//! # Responsibilities
//! - Open a transaction per traced request ([`TransactionLayer`])
//! - Gate that middleware behind the sampling decision ([`InstrumentationLayer`])
//! - Name the transaction after the endpoint path ([`NamedHandlerFactory`])
//!
//! # Request states
//! ```text
//! Unsampled --(gate = false)--> no transaction (plain pipeline)
//! Unsampled --(gate = true)---> transaction active --(handler done)--> ended
//! ```

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{body::Body, http::Request, response::Response};
use futures_util::future::BoxFuture;
use tower::{util::BoxCloneSyncService, Layer, Service};

use crate::config::EndpointConfig;
use crate::instrumentation::apm::{
    ActiveTransaction, TracerClient, TransactionGuard, TransactionManager,
};
use crate::instrumentation::application::Application;
use crate::instrumentation::config::SamplingRate;
use crate::instrumentation::sampling::SamplingGate;
use crate::pipeline::{Handler, HandlerFactory, SharedProxy};

/// Handler factory naming the active transaction after the endpoint.
pub struct NamedHandlerFactory {
    app: Arc<Application>,
    next: Arc<dyn HandlerFactory>,
}

impl NamedHandlerFactory {
    pub fn new(app: Arc<Application>, next: Arc<dyn HandlerFactory>) -> Self {
        Self { app, next }
    }
}

impl HandlerFactory for NamedHandlerFactory {
    fn new_handler(&self, cfg: &EndpointConfig, proxy: SharedProxy) -> Handler {
        let inner = self.next.new_handler(cfg, proxy);
        BoxCloneSyncService::new(NamedHandler {
            manager: self.app.manager.clone(),
            endpoint: Arc::from(cfg.endpoint.as_str()),
            inner,
        })
    }
}

#[derive(Clone)]
struct NamedHandler {
    manager: Arc<dyn TransactionManager>,
    endpoint: Arc<str>,
    inner: Handler,
}

impl Service<Request<Body>> for NamedHandler {
    type Response = Response;
    type Error = Infallible;
    type Future = <Handler as Service<Request<Body>>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if let Some(tx) = self.manager.transaction_from_context(req.extensions()) {
            tx.set_name(&self.endpoint);
        }
        self.inner.call(req)
    }
}

/// Tracer entry middleware: one transaction per request.
#[derive(Clone)]
pub struct TransactionLayer {
    tracer: Arc<dyn TracerClient>,
}

impl TransactionLayer {
    pub fn new(tracer: Arc<dyn TracerClient>) -> Self {
        Self { tracer }
    }
}

impl<S> Layer<S> for TransactionLayer {
    type Service = TransactionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TransactionService {
            tracer: self.tracer.clone(),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct TransactionService<S> {
    tracer: Arc<dyn TracerClient>,
    inner: S,
}

impl<S> Service<Request<Body>> for TransactionService<S>
where
    S: Service<Request<Body>, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let name = format!("{} {}", req.method(), req.uri().path());
        let tx = self.tracer.start_transaction(&name);
        req.extensions_mut().insert(ActiveTransaction(tx.clone()));

        let guard = TransactionGuard::new(tx);
        let future = self.inner.call(req);
        Box::pin(async move {
            let response = future.await?;
            guard.set_web_response(response.status().as_u16());
            Ok(response)
        })
    }
}

/// Sampling-gated entry middleware.
///
/// Without a tracer (instrumentation disabled or rate 0) every request goes
/// straight to the inner service.
#[derive(Clone)]
pub struct InstrumentationLayer {
    traced: Option<(TransactionLayer, SamplingGate)>,
}

impl InstrumentationLayer {
    pub fn new(tracer: Arc<dyn TracerClient>, gate: SamplingGate) -> Self {
        if gate.rate() == SamplingRate::NEVER {
            return Self::passthrough();
        }
        Self {
            traced: Some((TransactionLayer::new(tracer), gate)),
        }
    }

    pub fn passthrough() -> Self {
        Self { traced: None }
    }

    pub fn is_passthrough(&self) -> bool {
        self.traced.is_none()
    }
}

impl<S: Clone> Layer<S> for InstrumentationLayer {
    type Service = InstrumentationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentationService {
            traced: self
                .traced
                .as_ref()
                .map(|(layer, gate)| (layer.layer(inner.clone()), gate.clone())),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct InstrumentationService<S> {
    inner: S,
    traced: Option<(TransactionService<S>, SamplingGate)>,
}

impl<S> Service<Request<Body>> for InstrumentationService<S>
where
    S: Service<Request<Body>, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if let Some((traced, _)) = self.traced.as_mut() {
            if traced.poll_ready(cx)?.is_pending() {
                return Poll::Pending;
            }
        }
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        match self.traced.as_mut() {
            Some((traced, gate)) if gate.decide() => traced.call(req),
            _ => Box::pin(self.inner.call(req)),
        }
    }
}
