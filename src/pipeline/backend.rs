//! Outbound backend calls.
//!
//! # Responsibilities
//! - Rewrite the endpoint request into the backend request (host, path, method)
//! - Send the request over the shared HTTP client
//! - Decode the JSON body into response data
//!
//! # Design Decisions
//! - One pooled hyper client shared by every backend
//! - Non-2xx answers are errors so the endpoint can report partial results
//! - Non-object JSON bodies are kept under a `content` key

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

use crate::config::BackendConfig;
use crate::pipeline::error::TranslationError;
use crate::pipeline::request::{canonical_header_key, is_connection_header};
use crate::pipeline::{
    BackendFactory, Headers, Metadata, Proxy, ProxyError, ProxyRequest, ProxyResponse,
    RequestContext, SharedProxy,
};

/// Largest backend body the gateway buffers.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Backend factory sending requests over HTTP.
#[derive(Clone)]
pub struct HttpBackendFactory {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HttpBackendFactory {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }
}

impl BackendFactory for HttpBackendFactory {
    fn new_backend(&self, cfg: &BackendConfig) -> SharedProxy {
        Arc::new(HttpBackend {
            client: self.client.clone(),
            timeout: self.timeout,
            host: cfg.host.clone(),
        })
    }
}

struct HttpBackend {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    host: String,
}

#[async_trait]
impl Proxy for HttpBackend {
    async fn call(
        &self,
        _ctx: &RequestContext,
        req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        let request = to_hyper_request(req)?;

        tracing::debug!(
            backend = %self.host,
            method = %req.method,
            url = %req.url,
            "Calling backend"
        );

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|e| ProxyError::Backend(Box::new(e)))?
            .map_err(|e| ProxyError::Backend(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(backend = %self.host, status = %status, "Backend returned error status");
            return Err(ProxyError::BackendStatus {
                status: status.as_u16(),
            });
        }

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(canonical_header_key(name.as_str()))
                    .or_default()
                    .push(value.to_string());
            }
        }

        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_BODY_BYTES)
            .await
            .map_err(|e| ProxyError::Backend(Box::new(e)))?;

        Ok(ProxyResponse {
            data: decode_data(&bytes)?,
            is_complete: true,
            metadata: Metadata {
                status_code: status.as_u16(),
                headers,
            },
        })
    }
}

fn to_hyper_request(req: &ProxyRequest) -> Result<Request<Body>, ProxyError> {
    let method = Method::from_bytes(req.method.to_uppercase().as_bytes())
        .map_err(|_| TranslationError::Method(req.method.clone()))?;

    let mut builder = Request::builder().method(method).uri(req.url.as_str());
    if let Some(headers) = builder.headers_mut() {
        for (name, values) in req.headers.iter().filter(|(name, _)| !is_connection_header(name)) {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TranslationError::Header { name: name.clone() })?;
            for value in values {
                let value = HeaderValue::from_str(value)
                    .map_err(|_| TranslationError::Header { name: name.clone() })?;
                headers.append(header.clone(), value);
            }
        }
    }

    let body = req.body.clone().map(Body::from).unwrap_or_else(Body::empty);
    builder
        .body(body)
        .map_err(|e| ProxyError::Backend(Box::new(e)))
}

fn decode_data(bytes: &[u8]) -> Result<Map<String, Value>, ProxyError> {
    if bytes.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("content".to_string(), other);
            Ok(map)
        }
    }
}

/// Rewrites the endpoint request into the request for one backend.
pub struct RequestBuilder {
    host: String,
    url_pattern: String,
    method: String,
    next: SharedProxy,
}

impl RequestBuilder {
    pub fn new(cfg: &BackendConfig, next: SharedProxy) -> Self {
        Self {
            host: cfg.host.trim_end_matches('/').to_string(),
            url_pattern: cfg.url_pattern.clone(),
            method: cfg.method.clone(),
            next,
        }
    }

    fn backend_url(&self, req: &ProxyRequest) -> Result<Url, ProxyError> {
        let mut path = self.url_pattern.clone();
        for (key, value) in &req.params {
            path = path.replace(&format!("{{{}}}", key), value);
        }
        let mut raw = format!("{}{}", self.host, path);
        if let Some(query) = &req.query {
            raw.push('?');
            raw.push_str(query);
        }
        Url::parse(&raw).map_err(|e| {
            ProxyError::Translation(TranslationError::Url {
                reason: e.to_string(),
                url: raw,
            })
        })
    }
}

#[async_trait]
impl Proxy for RequestBuilder {
    async fn call(
        &self,
        ctx: &RequestContext,
        req: &mut ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        req.url = self.backend_url(req)?;
        req.method = self.method.clone();
        self.next.call(ctx, req).await
    }
}
