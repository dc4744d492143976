//! Backend-agnostic request and response shapes.
//!
//! # Design Decisions
//! - Headers are multi-valued and keyed by their canonical form (`Content-Type`)
//! - The body is buffered so a request can be cloned for backend fan-out
//! - Response data is a JSON object so several backends can be merged

use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::Extensions;
use serde_json::{Map, Value};
use url::Url;

/// Multi-valued header map keyed by canonical header name.
pub type Headers = HashMap<String, Vec<String>>;

/// Request-scoped context shared by every stage of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    extensions: Extensions,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from the extensions of the inbound HTTP request.
    pub fn from_extensions(extensions: Extensions) -> Self {
        Self { extensions }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Attach a value to the context, builder style.
    pub fn with<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.extensions.insert(value);
        self
    }
}

/// Request travelling through the proxy pipeline.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: String,
    pub url: Url,
    pub path: String,
    pub query: Option<String>,
    pub params: HashMap<String, String>,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl ProxyRequest {
    /// Create a request with no headers, params or body.
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        let path = url.path().to_string();
        let query = url.query().map(str::to_string);
        Self {
            method: method.into(),
            url,
            path,
            query,
            params: HashMap::new(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of a header, looked up case-insensitively.
    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }

    /// Append a header value under its canonical name.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .entry(canonical_header_key(name))
            .or_default()
            .push(value.into());
    }
}

/// Response metadata returned by a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub status_code: u16,
    pub headers: Headers,
}

/// Response travelling back through the proxy pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyResponse {
    pub data: Map<String, Value>,
    pub is_complete: bool,
    pub metadata: Metadata,
}

impl ProxyResponse {
    pub fn with_status(status_code: u16) -> Self {
        Self {
            data: Map::new(),
            is_complete: true,
            metadata: Metadata {
                status_code,
                headers: Headers::new(),
            },
        }
    }
}

/// Headers that describe one connection and are never forwarded to backends.
/// `Host` is set by the client from the backend URL.
const NOT_FORWARDED: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// Whether a header belongs to the inbound connection rather than the request.
pub fn is_connection_header(name: &str) -> bool {
    NOT_FORWARDED
        .iter()
        .any(|header| header.eq_ignore_ascii_case(name))
}

/// Canonical MIME header form: first letter and every letter after a hyphen
/// upper-cased, the rest lower-cased (`x-request-id` → `X-Request-Id`).
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
