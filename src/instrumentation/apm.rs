//! Tracer collaborator contract.
//!
//! The gateway never implements tracing itself. It drives a tracer through
//! these traits: a [`TracerClient`] opens transactions, a [`Transaction`]
//! opens segments, and a [`TransactionManager`] finds the transaction of the
//! current request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Extensions;

use crate::instrumentation::wire::WireRequest;
use crate::pipeline::BoxError;

/// Timing span nested under a transaction. Consumed when ended.
pub trait Segment: Send {
    fn end(self: Box<Self>);
}

/// Segment marking a call out to a backend.
pub trait ExternalSegment: Send {
    fn set_status_code(&mut self, code: u16);
    fn end(self: Box<Self>);
}

/// Tracer-managed span covering one inbound request.
pub trait Transaction: Send + Sync {
    fn set_name(&self, name: &str);
    fn start_segment(&self, name: &str) -> Box<dyn Segment>;
    fn start_external_segment(&self, name: &str, req: &mut WireRequest) -> Box<dyn ExternalSegment>;
    fn set_web_response(&self, status: u16);
    fn end(&self);
}

/// Tracer client owning the connection to the APM backend.
#[async_trait]
pub trait TracerClient: Send + Sync {
    fn start_transaction(&self, name: &str) -> Arc<dyn Transaction>;

    async fn wait_for_connection(&self, timeout: Duration) -> Result<(), BoxError>;

    async fn shutdown(&self, timeout: Duration);
}

/// Looks up transactions in request contexts and starts external segments.
pub trait TransactionManager: Send + Sync {
    fn transaction_from_context(&self, ctx: &Extensions) -> Option<Arc<dyn Transaction>>;

    fn start_external_segment(
        &self,
        tx: &dyn Transaction,
        name: &str,
        req: &mut WireRequest,
    ) -> Box<dyn ExternalSegment>;
}

/// Request extension holding the transaction of the current request.
#[derive(Clone)]
pub struct ActiveTransaction(pub Arc<dyn Transaction>);

impl fmt::Debug for ActiveTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActiveTransaction")
    }
}

/// Manager reading the [`ActiveTransaction`] extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextTransactionManager;

impl TransactionManager for ContextTransactionManager {
    fn transaction_from_context(&self, ctx: &Extensions) -> Option<Arc<dyn Transaction>> {
        ctx.get::<ActiveTransaction>().map(|active| active.0.clone())
    }

    fn start_external_segment(
        &self,
        tx: &dyn Transaction,
        name: &str,
        req: &mut WireRequest,
    ) -> Box<dyn ExternalSegment> {
        tx.start_external_segment(name, req)
    }
}

/// Ends the wrapped segment when dropped, on every exit path.
pub struct SegmentGuard {
    segment: Option<Box<dyn Segment>>,
}

impl SegmentGuard {
    pub fn new(segment: Box<dyn Segment>) -> Self {
        Self {
            segment: Some(segment),
        }
    }
}

impl Drop for SegmentGuard {
    fn drop(&mut self) {
        if let Some(segment) = self.segment.take() {
            segment.end();
        }
    }
}

/// Ends the wrapped external segment when dropped, on every exit path.
pub struct ExternalSegmentGuard {
    segment: Option<Box<dyn ExternalSegment>>,
}

impl ExternalSegmentGuard {
    pub fn new(segment: Box<dyn ExternalSegment>) -> Self {
        Self {
            segment: Some(segment),
        }
    }

    pub fn set_status_code(&mut self, code: u16) {
        if let Some(segment) = self.segment.as_mut() {
            segment.set_status_code(code);
        }
    }
}

impl Drop for ExternalSegmentGuard {
    fn drop(&mut self) {
        if let Some(segment) = self.segment.take() {
            segment.end();
        }
    }
}

/// Ends the transaction when dropped.
pub struct TransactionGuard {
    tx: Arc<dyn Transaction>,
}

impl TransactionGuard {
    pub fn new(tx: Arc<dyn Transaction>) -> Self {
        Self { tx }
    }

    pub fn set_web_response(&self, status: u16) {
        self.tx.set_web_response(status);
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        self.tx.end();
    }
}
