//! Request and response types exchanged with a transport.

use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use url::Url;

use crate::error::{TransportError, TransportResult};

/// A transport-ready request: address resolved, headers validated, body encoded.
///
/// Plugins receive a mutable `BuiltRequest` before every attempt, so anything
/// that must be recomputed per attempt (credentials, signatures) belongs in a
/// plugin rather than in the original parameters.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    /// HTTP method.
    pub method: Method,

    /// Fully resolved URL including query.
    pub url: Url,

    /// Request headers.
    pub headers: HeaderMap,

    /// Encoded request body (empty for body-less requests).
    pub body: Bytes,
}

impl BuiltRequest {
    /// Creates a body-less request with no headers.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a header, replacing any existing value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Sets a header from string parts, validating both.
    pub fn try_set_header(&mut self, name: &str, value: &str) -> TransportResult<()> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            TransportError::ConfigurationError(format!("invalid header name '{name}': {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            TransportError::ConfigurationError(format!("invalid value for header '{name}': {e}"))
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Returns a header value if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Appends a query pair to the URL.
    pub fn append_query(&mut self, key: &str, value: &str) {
        self.url.query_pairs_mut().append_pair(key, value);
    }

    /// Returns the host portion of the URL.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Returns the path portion of the URL.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the size of the encoded body in bytes.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}

impl fmt::Display for BuiltRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Response metadata reported by a transport.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// Status code.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HeaderMap,

    /// Final URL after any transport-level redirects.
    pub url: Url,
}

impl ResponseMeta {
    /// Creates metadata with no headers.
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url,
        }
    }

    /// Adds a header, replacing any existing value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns `true` for 2xx status codes.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `content-type` header, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }
}

/// Everything a transport produces for one execution.
///
/// Mirrors the `(body?, response, error?)` triple of callback-style network
/// stacks: a transport may report a response *and* an error (for example a
/// truncated body), so the parts are independent.
#[derive(Debug, Clone, Default)]
pub struct TransportOutcome {
    /// Response body, if any was received.
    pub body: Option<Bytes>,

    /// Response metadata, if the remote endpoint answered.
    pub response: Option<ResponseMeta>,

    /// Transport-level failure, if any.
    pub error: Option<TransportError>,
}

impl TransportOutcome {
    /// A completed exchange.
    pub fn success(response: ResponseMeta, body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(body.into()),
            response: Some(response),
            error: None,
        }
    }

    /// A failed exchange with no response.
    pub fn failure(error: TransportError) -> Self {
        Self {
            body: None,
            response: None,
            error: Some(error),
        }
    }

    /// Returns `true` if the transport reported an error.
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the status code, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|r| r.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_built_request_headers() {
        let mut request = BuiltRequest::new(Method::GET, url("https://api.example.com/users"));
        request.try_set_header("x-trace", "abc").unwrap();
        assert_eq!(request.header("x-trace"), Some("abc"));

        assert!(request.try_set_header("bad header", "v").is_err());
        assert!(request.try_set_header("x-ok", "line\nbreak").is_err());
    }

    #[test]
    fn test_built_request_query_and_display() {
        let mut request = BuiltRequest::new(Method::GET, url("https://api.example.com/search"));
        request.append_query("q", "rust lang");
        assert_eq!(request.url.query(), Some("q=rust+lang"));
        assert_eq!(request.host(), Some("api.example.com"));
        assert_eq!(request.path(), "/search");
        assert_eq!(
            request.to_string(),
            "GET https://api.example.com/search?q=rust+lang"
        );
    }

    #[test]
    fn test_outcome_constructors() {
        let meta = ResponseMeta::new(StatusCode::OK, url("https://example.com/"));
        let ok = TransportOutcome::success(meta, "hello");
        assert!(!ok.is_error());
        assert_eq!(ok.status(), Some(StatusCode::OK));
        assert_eq!(ok.body.as_deref(), Some(&b"hello"[..]));

        let failed = TransportOutcome::failure(TransportError::Timeout);
        assert!(failed.is_error());
        assert!(failed.status().is_none());
    }

    #[test]
    fn test_response_meta_content_type() {
        let meta = ResponseMeta::new(StatusCode::CREATED, url("https://example.com/"))
            .with_header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        assert!(meta.is_success());
        assert_eq!(meta.content_type(), Some("application/json"));
    }
}
