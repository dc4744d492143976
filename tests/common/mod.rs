//! Shared fakes and utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Extensions;
use gateway_instrumentation::config::ExtraConfig;
use gateway_instrumentation::instrumentation::{
    ActiveTransaction, Application, ExternalSegment, InstrumentationConfig, Segment,
    TracerClient, Transaction, TransactionManager, WireRequest, NAMESPACE,
};
use gateway_instrumentation::pipeline::{
    BoxError, Proxy, ProxyError, ProxyRequest, ProxyResponse, RequestContext,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Everything the fake tracer observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartTransaction(String),
    SetName(String),
    WebResponse(u16),
    EndTransaction,
    StartSegment(String),
    EndSegment(String),
    StartExternal {
        name: String,
        method: String,
        url: String,
        content_length: Option<u64>,
    },
    SetStatusCode(u16),
    EndExternal(String),
    Lookup { found: bool },
}

#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

pub struct RecordingTransaction {
    pub recorder: Arc<Recorder>,
    /// Header injected into outbound wire requests, if any.
    pub inject: Option<(&'static str, &'static str)>,
}

impl Transaction for RecordingTransaction {
    fn set_name(&self, name: &str) {
        self.recorder.push(Event::SetName(name.to_string()));
    }

    fn start_segment(&self, name: &str) -> Box<dyn Segment> {
        self.recorder.push(Event::StartSegment(name.to_string()));
        Box::new(RecordingSegment {
            recorder: self.recorder.clone(),
            name: name.to_string(),
        })
    }

    fn start_external_segment(&self, name: &str, req: &mut WireRequest) -> Box<dyn ExternalSegment> {
        self.recorder.push(Event::StartExternal {
            name: name.to_string(),
            method: req.method.to_string(),
            url: req.uri.to_string(),
            content_length: req.content_length,
        });
        if let Some((key, value)) = self.inject {
            req.headers.insert(key, value.parse().unwrap());
        }
        Box::new(RecordingSegment {
            recorder: self.recorder.clone(),
            name: name.to_string(),
        })
    }

    fn set_web_response(&self, status: u16) {
        self.recorder.push(Event::WebResponse(status));
    }

    fn end(&self) {
        self.recorder.push(Event::EndTransaction);
    }
}

struct RecordingSegment {
    recorder: Arc<Recorder>,
    name: String,
}

impl Segment for RecordingSegment {
    fn end(self: Box<Self>) {
        self.recorder.push(Event::EndSegment(self.name.clone()));
    }
}

impl ExternalSegment for RecordingSegment {
    fn set_status_code(&mut self, code: u16) {
        self.recorder.push(Event::SetStatusCode(code));
    }

    fn end(self: Box<Self>) {
        self.recorder.push(Event::EndExternal(self.name.clone()));
    }
}

/// Manager reading the transaction from the context, recording every lookup.
pub struct RecordingManager {
    pub recorder: Arc<Recorder>,
}

impl TransactionManager for RecordingManager {
    fn transaction_from_context(&self, ctx: &Extensions) -> Option<Arc<dyn Transaction>> {
        let tx = ctx.get::<ActiveTransaction>().map(|active| active.0.clone());
        self.recorder.push(Event::Lookup { found: tx.is_some() });
        tx
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

pub struct RecordingTracer {
    pub recorder: Arc<Recorder>,
    pub inject: Option<(&'static str, &'static str)>,
}

#[async_trait]
impl TracerClient for RecordingTracer {
    fn start_transaction(&self, name: &str) -> Arc<dyn Transaction> {
        self.recorder.push(Event::StartTransaction(name.to_string()));
        Arc::new(RecordingTransaction {
            recorder: self.recorder.clone(),
            inject: self.inject,
        })
    }

    async fn wait_for_connection(&self, _timeout: Duration) -> Result<(), BoxError> {
        Ok(())
    }

    async fn shutdown(&self, _timeout: Duration) {}
}

/// Application wired to the recording fakes.
pub fn application(recorder: &Arc<Recorder>, rate: i64) -> Application {
    Application {
        manager: Arc::new(RecordingManager {
            recorder: recorder.clone(),
        }),
        tracer: Arc::new(RecordingTracer {
            recorder: recorder.clone(),
            inject: None,
        }),
        config: InstrumentationConfig {
            instrumentation_rate: rate,
            ..Default::default()
        },
    }
}

/// Context carrying a recording transaction.
pub fn traced_context(recorder: &Arc<Recorder>) -> RequestContext {
    traced_context_injecting(recorder, None)
}

pub fn traced_context_injecting(
    recorder: &Arc<Recorder>,
    inject: Option<(&'static str, &'static str)>,
) -> RequestContext {
    let tx: Arc<dyn Transaction> = Arc::new(RecordingTransaction {
        recorder: recorder.clone(),
        inject,
    });
    RequestContext::new().with(ActiveTransaction(tx))
}

pub fn extra_config(rate: i64) -> ExtraConfig {
    let mut extra = ExtraConfig::new();
    extra.insert(NAMESPACE.to_string(), serde_json::json!({ "rate": rate }));
    extra
}

/// Proxy answering through a closure and counting calls.
pub struct FnProxy<F> {
    f: F,
    calls: Arc<Mutex<Vec<ProxyRequest>>>,
}

impl<F> FnProxy<F>
where
    F: Fn(&mut ProxyRequest) -> Result<ProxyResponse, ProxyError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests seen so far, as they arrived.
    pub fn calls(&self) -> Arc<Mutex<Vec<ProxyRequest>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl<F> Proxy for FnProxy<F>
where
    F: Fn(&mut ProxyRequest) -> Result<ProxyResponse, ProxyError> + Send + Sync,
{
    async fn call(
        &self,
        _ctx: &RequestContext,
        req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        self.calls.lock().unwrap().push(req.clone());
        (self.f)(req)
    }
}

pub fn ok_proxy(status: u16) -> FnProxy<impl Fn(&mut ProxyRequest) -> Result<ProxyResponse, ProxyError> + Send + Sync> {
    FnProxy::new(move |_req: &mut ProxyRequest| Ok(ProxyResponse::with_status(status)))
}

pub fn failing_proxy() -> FnProxy<impl Fn(&mut ProxyRequest) -> Result<ProxyResponse, ProxyError> + Send + Sync> {
    FnProxy::new(|_req: &mut ProxyRequest| Err(ProxyError::BackendStatus { status: 503 }))
}

/// Proxy that answers only after `delay`.
pub struct SlowProxy {
    pub delay: Duration,
}

#[async_trait]
impl Proxy for SlowProxy {
    async fn call(
        &self,
        _ctx: &RequestContext,
        _req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        tokio::time::sleep(self.delay).await;
        Ok(ProxyResponse::with_status(200))
    }
}

/// Start a backend answering `(status, body)` and recording raw request heads.
pub async fn start_recording_backend(
    status: u16,
    body: &'static str,
) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let heads = Arc::new(Mutex::new(Vec::new()));
    let recorded = heads.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let heads = recorded.clone();
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }
                        heads
                            .lock()
                            .unwrap()
                            .push(String::from_utf8_lossy(&buf).to_lowercase());

                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, heads)
}
