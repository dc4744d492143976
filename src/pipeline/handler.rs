//! Endpoint HTTP handler.
//!
//! # Responsibilities
//! - Translate the inbound axum request into a [`ProxyRequest`]
//! - Hand the request extensions to the pipeline as its [`RequestContext`]
//! - Render the proxy response (or error) as JSON

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Path,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Json, RequestPartsExt,
};
use tower::{service_fn, util::BoxCloneSyncService};
use url::Url;

use crate::config::EndpointConfig;
use crate::pipeline::request::{canonical_header_key, is_connection_header};
use crate::pipeline::{Handler, HandlerFactory, ProxyRequest, RequestContext, SharedProxy};

/// Largest request body the gateway buffers.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Header flagging responses where some backend failed.
pub const X_COMPLETE: &str = "x-gateway-completed";

/// Handler factory rendering proxy responses as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHandlerFactory;

impl HandlerFactory for DefaultHandlerFactory {
    fn new_handler(&self, cfg: &EndpointConfig, proxy: SharedProxy) -> Handler {
        let endpoint: Arc<str> = Arc::from(cfg.endpoint.as_str());
        BoxCloneSyncService::new(service_fn(move |request: Request<Body>| {
            let proxy = proxy.clone();
            let endpoint = endpoint.clone();
            async move { Ok::<_, Infallible>(handle(proxy, &endpoint, request).await) }
        }))
    }
}

async fn handle(proxy: SharedProxy, endpoint: &str, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    let params = parts
        .extract::<Path<HashMap<String, String>>>()
        .await
        .map(|Path(params)| params)
        .unwrap_or_default();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(endpoint, error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let url = match Url::parse(&format!("http://{}{}", host, parts.uri)) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(endpoint, error = %e, "Invalid request url");
            return (StatusCode::BAD_REQUEST, "Invalid request url").into_response();
        }
    };

    let mut req = ProxyRequest::new(parts.method.as_str(), url);
    req.params = params;
    req.body = body;
    for (name, value) in &parts.headers {
        if is_connection_header(name.as_str()) {
            continue;
        }
        match value.to_str() {
            Ok(value) => req
                .headers
                .entry(canonical_header_key(name.as_str()))
                .or_default()
                .push(value.to_string()),
            Err(_) => {
                tracing::debug!(endpoint, header = %name, "Dropping non-ASCII header value")
            }
        }
    }

    let ctx = RequestContext::from_extensions(parts.extensions);
    match proxy.call(&ctx, &mut req).await {
        Ok(resp) => {
            let mut response = Json(resp.data).into_response();
            if !resp.is_complete {
                response
                    .headers_mut()
                    .insert(X_COMPLETE, header::HeaderValue::from_static("false"));
            }
            response
        }
        Err(e) => {
            tracing::error!(endpoint, error = %e, "Proxy error");
            let status = e.status_code();
            (status, e.to_string()).into_response()
        }
    }
}
