//! Wire-level view of an outbound backend request, built for the tracer.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};

use crate::pipeline::request::canonical_header_key;
use crate::pipeline::{Headers, ProxyRequest, TranslationError};

/// Outbound request as the tracer sees it. Never sent to the backend.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
}

impl WireRequest {
    /// Build the wire request from a pipeline request.
    ///
    /// Headers are deep-copied; names or values `http` cannot represent are
    /// left out, so only a bad method or URL is an error. The content length
    /// is only taken from a single, non-`chunked` `Content-Length` value, and
    /// only when the request carries a body.
    pub fn from_proxy_request(req: &ProxyRequest) -> Result<Self, TranslationError> {
        let method = Method::from_bytes(req.method.to_uppercase().as_bytes())
            .map_err(|_| TranslationError::Method(req.method.clone()))?;

        let uri = req
            .url
            .as_str()
            .parse::<Uri>()
            .map_err(|e| TranslationError::Url {
                url: req.url.to_string(),
                reason: e.to_string(),
            })?;

        let mut headers = HeaderMap::with_capacity(req.headers.len());
        for (name, values) in &req.headers {
            let Ok(header) = HeaderName::from_bytes(name.as_bytes()) else {
                tracing::debug!(header = %name, "Skipping unrepresentable header name");
                continue;
            };
            for value in values {
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        headers.append(header.clone(), value);
                    }
                    Err(_) => {
                        tracing::debug!(header = %name, "Skipping unrepresentable header value")
                    }
                }
            }
        }

        let content_length = match (&req.body, req.header_values("Content-Length")) {
            (Some(_), Some([value])) if value != "chunked" => value.parse::<u64>().ok(),
            _ => None,
        };

        Ok(Self {
            method,
            uri,
            headers,
            content_length,
        })
    }

    /// Write the wire headers back onto a pipeline header map.
    ///
    /// Only names present on the wire are touched. A name with any value that
    /// is not visible ASCII keeps its pipeline values.
    pub fn write_headers(&self, headers: &mut Headers) {
        for name in self.headers.keys() {
            let values: Result<Vec<String>, _> = self
                .headers
                .get_all(name)
                .iter()
                .map(|value| value.to_str().map(str::to_string))
                .collect();
            let Ok(values) = values else {
                continue;
            };

            headers.retain(|key, _| !key.eq_ignore_ascii_case(name.as_str()));
            headers.insert(canonical_header_key(name.as_str()), values);
        }
    }
}
