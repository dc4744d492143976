//! A pipeline built with instrumentation off (or sampling nothing) answers
//! exactly like the undecorated one.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::Request,
    Router,
};
use gateway_instrumentation::config::{BackendConfig, EndpointConfig, GatewayConfig};
use gateway_instrumentation::instrumentation::{Instrumentation, InstrumentationLayer};
use gateway_instrumentation::lifecycle::startup;
use gateway_instrumentation::pipeline::{
    BackendFactory, DefaultHandlerFactory, DefaultProxyFactory, ProxyError, ProxyRequest,
    ProxyResponse, SharedProxy,
};
use gateway_instrumentation::GatewayServer;
use serde_json::Value;
use tower::ServiceExt;

mod common;
use common::{Event, FnProxy, Recorder};

fn backend(host: &str, url_pattern: &str, method: &str) -> BackendConfig {
    BackendConfig {
        host: host.into(),
        url_pattern: url_pattern.into(),
        method: method.into(),
    }
}

fn config() -> GatewayConfig {
    GatewayConfig {
        endpoints: vec![
            EndpointConfig {
                endpoint: "/items/{id}".into(),
                method: "GET".into(),
                backends: vec![
                    backend("http://catalog.local", "/catalog/{id}", "GET"),
                    backend("http://stock.local", "/stock/{id}", "GET"),
                ],
            },
            EndpointConfig {
                endpoint: "/orders".into(),
                method: "POST".into(),
                backends: vec![backend("http://orders.local", "/orders", "PUT")],
            },
        ],
        ..Default::default()
    }
}

/// Backends answering from the request alone; `stock` fails for ids divisible
/// by 5, both fail for ids divisible by 7.
fn fake_backends() -> Arc<dyn BackendFactory> {
    Arc::new(|cfg: &BackendConfig| -> SharedProxy {
        let host = cfg.host.clone();
        Arc::new(FnProxy::new(move |req: &mut ProxyRequest| {
            let id: u32 = req
                .url
                .path()
                .rsplit('/')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            if id % 7 == 0 || (id % 5 == 0 && host.contains("stock")) {
                return Err(ProxyError::BackendStatus { status: 500 });
            }

            let mut resp = ProxyResponse::with_status(200);
            resp.data.insert(
                host.trim_start_matches("http://").to_string(),
                serde_json::json!({
                    "url": req.url.as_str(),
                    "method": req.method,
                    "body": req.body.as_ref().map(|b| b.len()),
                    "trace": req.header("traceparent"),
                }),
            );
            Ok(resp)
        }))
    })
}

fn plain_router() -> Router {
    GatewayServer::new(
        config(),
        &DefaultProxyFactory::new(fake_backends()),
        &DefaultHandlerFactory,
        InstrumentationLayer::passthrough(),
    )
    .unwrap()
    .router()
}

fn decorated_router(instrumentation: &Instrumentation) -> Router {
    startup::build_server_with(config(), instrumentation, fake_backends())
        .unwrap()
        .router()
}

fn generated_requests() -> Vec<Request<Body>> {
    (1..=50u32)
        .map(|i| {
            let builder = Request::builder().header("host", "gateway.local");
            match i % 4 {
                0 => builder
                    .method("POST")
                    .uri("/orders")
                    .body(Body::from(format!("{{\"order\":{}}}", i)))
                    .unwrap(),
                1 => builder
                    .uri(format!("/items/{}?page={}", i, i / 3))
                    .body(Body::empty())
                    .unwrap(),
                2 => builder
                    .uri(format!("/unknown/{}", i))
                    .body(Body::empty())
                    .unwrap(),
                _ => builder
                    .uri(format!("/items/{}", i))
                    .header("x-request-id", i.to_string())
                    .body(Body::empty())
                    .unwrap(),
            }
        })
        .collect()
}

async fn outcomes(router: Router) -> Vec<(u16, Option<String>, Vec<u8>)> {
    let mut out = Vec::new();
    for request in generated_requests() {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let complete = response
            .headers()
            .get("x-gateway-completed")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        out.push((status, complete, body.to_vec()));
    }
    out
}

#[tokio::test]
async fn test_disabled_matches_undecorated() {
    let expected = outcomes(plain_router()).await;
    let actual = outcomes(decorated_router(&Instrumentation::disabled())).await;
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_rate_zero_matches_undecorated() {
    let recorder = Recorder::new();
    let instrumentation = Instrumentation::enabled(common::application(&recorder, 0));

    let expected = outcomes(plain_router()).await;
    let actual = outcomes(decorated_router(&instrumentation)).await;
    assert_eq!(actual, expected);

    assert_eq!(recorder.count(|e| matches!(e, Event::StartTransaction(_))), 0);
    assert_eq!(recorder.count(|e| matches!(e, Event::StartSegment(_))), 0);
    assert_eq!(recorder.count(|e| matches!(e, Event::StartExternal { .. })), 0);
}

#[tokio::test]
async fn test_outcomes_cover_every_path() {
    let outcomes = outcomes(plain_router()).await;
    let statuses: Vec<u16> = outcomes.iter().map(|(s, _, _)| *s).collect();

    assert!(statuses.contains(&200));
    assert!(statuses.contains(&404));
    assert!(statuses.contains(&500));
    assert!(outcomes
        .iter()
        .any(|(_, complete, _)| complete.as_deref() == Some("false")));

    let merged = outcomes.iter().any(|(status, complete, body)| {
        *status == 200
            && complete.is_none()
            && serde_json::from_slice::<Value>(body)
                .map(|v| v.get("catalog.local").is_some() && v.get("stock.local").is_some())
                .unwrap_or(false)
    });
    assert!(merged);
}
