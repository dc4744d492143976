//! Tracer reporting transactions and segments as structured log events.
//!
//! # Design Decisions
//! - Trace ids are UUID v4 (32 hex digits), span ids random 64-bit values
//! - Outbound wire requests get a W3C `traceparent` header
//! - A transaction reports once, however many times `end` is called

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::HeaderValue;

use crate::instrumentation::{ExternalSegment, Segment, TracerClient, Transaction, WireRequest};
use crate::observability::metrics;
use crate::pipeline::BoxError;

pub const TRACEPARENT: &str = "traceparent";

/// [`TracerClient`] backed by the `tracing` subscriber.
#[derive(Debug)]
pub struct LogTracer {
    service: String,
}

impl LogTracer {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl TracerClient for LogTracer {
    fn start_transaction(&self, name: &str) -> Arc<dyn Transaction> {
        Arc::new(LogTransaction::new(&self.service, name))
    }

    async fn wait_for_connection(&self, _timeout: Duration) -> Result<(), BoxError> {
        // Nothing to connect to.
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) {
        tracing::info!(service = %self.service, "Tracer shut down");
    }
}

/// Transaction of the [`LogTracer`].
#[derive(Debug)]
pub struct LogTransaction {
    service: String,
    trace_id: String,
    name: Mutex<String>,
    status: AtomicU16,
    started: Instant,
    ended: AtomicBool,
}

impl LogTransaction {
    fn new(service: &str, name: &str) -> Self {
        Self {
            service: service.to_string(),
            trace_id: uuid::Uuid::new_v4().simple().to_string(),
            name: Mutex::new(name.to_string()),
            status: AtomicU16::new(0),
            started: Instant::now(),
            ended: AtomicBool::new(false),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn name(&self) -> String {
        self.name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}

impl Transaction for LogTransaction {
    fn set_name(&self, name: &str) {
        *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }

    fn start_segment(&self, name: &str) -> Box<dyn Segment> {
        Box::new(LogSegment {
            trace_id: self.trace_id.clone(),
            name: name.to_string(),
            started: Instant::now(),
        })
    }

    fn start_external_segment(&self, name: &str, req: &mut WireRequest) -> Box<dyn ExternalSegment> {
        let span_id = format!("{:016x}", fastrand::u64(1..));
        let traceparent = format!("00-{}-{}-01", self.trace_id, span_id);
        if let Ok(value) = HeaderValue::from_str(&traceparent) {
            req.headers.insert(TRACEPARENT, value);
        }

        Box::new(LogExternalSegment {
            trace_id: self.trace_id.clone(),
            span_id,
            name: name.to_string(),
            method: req.method.to_string(),
            url: req.uri.to_string(),
            status: None,
            started: Instant::now(),
        })
    }

    fn set_web_response(&self, status: u16) {
        self.status.store(status, Ordering::Relaxed);
    }

    fn end(&self) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        let duration = self.started.elapsed();
        let status = self.status.load(Ordering::Relaxed);
        tracing::info!(
            service = %self.service,
            trace_id = %self.trace_id,
            transaction = %self.name(),
            status,
            duration_ms = duration.as_secs_f64() * 1000.0,
            "Transaction finished"
        );
        metrics::record_transaction(status, duration);
    }
}

struct LogSegment {
    trace_id: String,
    name: String,
    started: Instant,
}

impl Segment for LogSegment {
    fn end(self: Box<Self>) {
        tracing::debug!(
            trace_id = %self.trace_id,
            segment = %self.name,
            duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
            "Segment finished"
        );
    }
}

struct LogExternalSegment {
    trace_id: String,
    span_id: String,
    name: String,
    method: String,
    url: String,
    status: Option<u16>,
    started: Instant,
}

impl ExternalSegment for LogExternalSegment {
    fn set_status_code(&mut self, code: u16) {
        self.status = Some(code);
    }

    fn end(self: Box<Self>) {
        tracing::debug!(
            trace_id = %self.trace_id,
            span_id = %self.span_id,
            segment = %self.name,
            method = %self.method,
            url = %self.url,
            status = ?self.status,
            duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
            "External segment finished"
        );
    }
}
