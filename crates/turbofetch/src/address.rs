//! Addresses, call parameters and the request factory.
//!
//! A logical call is an [`Address`] plus [`RequestParameters`]. The manager
//! turns the pair into a transport-ready [`BuiltRequest`] through a
//! [`RequestFactory`]; a factory failure short-circuits the whole request
//! before anything is registered.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderName, HeaderValue, Method};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;
use url::Url;

use turbofetch_transport_traits::BuiltRequest;

use crate::cache::CachePolicy;
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::plugins::Plugin;

// ============================================================================
// ADDRESS
// ============================================================================

/// A logical address: an absolute URL, or a path resolved against the
/// manager's base URL, plus extra query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    raw: String,
    query: Vec<(String, String)>,
}

impl Address {
    /// Creates an address from a URL or path.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            query: Vec::new(),
        }
    }

    /// Appends a query pair.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// The address as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Extra query pairs, in insertion order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<Url> for Address {
    fn from(url: Url) -> Self {
        Self::new(String::from(url))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ============================================================================
// BODY
// ============================================================================

/// Description of a request body; encoded by the request factory.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Raw bytes with an explicit content type.
    Bytes {
        /// Payload.
        data: Bytes,
        /// Value for the `content-type` header.
        content_type: String,
    },
    /// UTF-8 text, sent as `text/plain`.
    Text(String),
    /// JSON document, sent as `application/json`.
    Json(Value),
    /// Form pairs, sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
    /// A value whose serialization failed; building the request reports
    /// [`Error::Encoding`] with this message.
    Unencodable(String),
}

impl Body {
    /// Serializes `value` into a JSON body.
    ///
    /// Serialization failures are kept in the body and reported when the
    /// request is built, so the call site still gets a task.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Json(value),
            Err(e) => Self::Unencodable(e.to_string()),
        }
    }

    /// Raw bytes with a content type.
    pub fn bytes(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self::Bytes {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Plain text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// URL-encoded form.
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns `true` for [`Body::Empty`].
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Encodes the body, returning the bytes and default content type.
    pub fn encode(&self) -> Result<Option<(Bytes, String)>> {
        let encoded = match self {
            Self::Empty => None,
            Self::Bytes { data, content_type } => Some((data.clone(), content_type.clone())),
            Self::Text(text) => Some((
                Bytes::from(text.clone()),
                "text/plain; charset=utf-8".to_string(),
            )),
            Self::Json(value) => {
                let data = serde_json::to_vec(value).map_err(|e| Error::Encoding(e.to_string()))?;
                Some((Bytes::from(data), "application/json".to_string()))
            }
            Self::Form(pairs) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                Some((
                    Bytes::from(encoded),
                    "application/x-www-form-urlencoded".to_string(),
                ))
            }
            Self::Unencodable(reason) => return Err(Error::Encoding(reason.clone())),
        };
        Ok(encoded)
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// Everything about a call except its address.
#[derive(Clone, Default)]
pub struct RequestParameters {
    /// HTTP method (defaults to GET).
    pub method: Method,
    /// Call-level headers; these override manager defaults.
    pub headers: Vec<(String, String)>,
    /// Body description.
    pub body: Body,
    /// Call-level plugins, merged after the manager's defaults.
    pub plugins: Vec<Arc<dyn Plugin>>,
    /// Cache behaviour for this call.
    pub cache_policy: CachePolicy,
}

impl RequestParameters {
    /// GET with no headers, body or plugins.
    pub fn get() -> Self {
        Self::default()
    }

    /// POST with the given body.
    pub fn post(body: Body) -> Self {
        Self::default().with_method(Method::POST).with_body(body)
    }

    /// Sets the method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Adds a call-level plugin.
    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Adds an already shared call-level plugin.
    #[must_use]
    pub fn with_shared_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Sets the cache policy.
    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }
}

impl fmt::Debug for RequestParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestParameters")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.id()).collect::<Vec<_>>(),
            )
            .field("cache_policy", &self.cache_policy)
            .finish()
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Resolves an address and parameters to a transport-ready request.
pub trait RequestFactory: Send + Sync + fmt::Debug {
    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns a construction error ([`Error::InvalidAddress`],
    /// [`Error::InvalidHeader`] or [`Error::Encoding`]).
    fn build(&self, address: &Address, parameters: &RequestParameters) -> Result<BuiltRequest>;
}

/// The stock factory: URL resolution with the `url` crate, header validation
/// and body encoding.
#[derive(Debug, Clone, Default)]
pub struct DefaultRequestFactory {
    base_url: Option<Url>,
    default_headers: Vec<(String, String)>,
    user_agent: Option<String>,
}

impl DefaultRequestFactory {
    /// Creates a factory with no base URL and no default headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory from manager configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `base_url` is not an absolute URL.
    pub fn from_config(config: &ManagerConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| Error::configuration(format!("invalid base_url '{raw}': {e}")))
            })
            .transpose()?;

        Ok(Self {
            base_url,
            default_headers: config
                .default_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Sets the base URL relative addresses are joined with.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    fn resolve(&self, address: &Address) -> Result<Url> {
        let raw = address.as_str().trim();
        let mut url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    Error::invalid_address(raw, "relative address and no base URL configured")
                })?;
                base.join(raw)
                    .map_err(|e| Error::invalid_address(raw, e.to_string()))?
            }
            Err(e) => return Err(Error::invalid_address(raw, e.to_string())),
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_address(
                raw,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::invalid_address(raw, "missing host"));
        }

        if !address.query().is_empty() {
            url.query_pairs_mut().extend_pairs(address.query());
        }
        Ok(url)
    }
}

fn insert_header(request: &mut BuiltRequest, name: &str, value: &str) -> Result<()> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::invalid_header(name, e.to_string()))?;
    let header_value =
        HeaderValue::from_str(value).map_err(|e| Error::invalid_header(name, e.to_string()))?;
    request.set_header(header_name, header_value);
    Ok(())
}

impl RequestFactory for DefaultRequestFactory {
    fn build(&self, address: &Address, parameters: &RequestParameters) -> Result<BuiltRequest> {
        let url = self.resolve(address)?;
        let mut request = BuiltRequest::new(parameters.method.clone(), url);

        if let Some(agent) = &self.user_agent {
            insert_header(&mut request, USER_AGENT.as_str(), agent)?;
        }
        for (name, value) in self.default_headers.iter().chain(&parameters.headers) {
            insert_header(&mut request, name, value)?;
        }

        if let Some((data, content_type)) = parameters.body.encode()? {
            if !request.headers.contains_key(CONTENT_TYPE) {
                insert_header(&mut request, CONTENT_TYPE.as_str(), &content_type)?;
            }
            request.body = data;
        }

        trace!(request = %request, body_len = request.body_len(), "built request");
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(address: impl Into<Address>, parameters: &RequestParameters) -> Result<BuiltRequest> {
        DefaultRequestFactory::new().build(&address.into(), parameters)
    }

    #[test]
    fn test_absolute_address_with_query() {
        let address = Address::new("https://api.example.com/search").with_query("q", "rust");
        let request = build(address, &RequestParameters::get()).unwrap();
        assert_eq!(request.url.as_str(), "https://api.example.com/search?q=rust");
        assert_eq!(request.method, Method::GET);
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_rejects_missing_host_and_bad_scheme() {
        for raw in ["https://", "", "ftp://files.example.com/a", "not a url"] {
            let err = build(raw, &RequestParameters::get()).unwrap_err();
            assert!(
                matches!(err, Error::InvalidAddress { .. }),
                "{raw:?} produced {err:?}"
            );
        }
    }

    #[test]
    fn test_relative_address_joins_base() {
        let factory = DefaultRequestFactory::new()
            .with_base_url(Url::parse("https://api.example.com/v1/").unwrap())
            .with_default_header("x-client", "turbofetch");
        let request = factory
            .build(&Address::new("users/7"), &RequestParameters::get())
            .unwrap();
        assert_eq!(request.url.as_str(), "https://api.example.com/v1/users/7");
        assert_eq!(request.header("x-client"), Some("turbofetch"));
    }

    #[test]
    fn test_call_headers_override_defaults() {
        let factory = DefaultRequestFactory::new().with_default_header("accept", "text/html");
        let parameters = RequestParameters::get().with_header("accept", "application/json");
        let request = factory
            .build(&Address::new("https://example.com/"), &parameters)
            .unwrap();
        assert_eq!(request.header("accept"), Some("application/json"));
    }

    #[test]
    fn test_invalid_header_is_construction_error() {
        let parameters = RequestParameters::get().with_header("bad header", "x");
        let err = build("https://example.com/", &parameters).unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
        assert!(err.is_construction());
    }

    #[test]
    fn test_body_encoding() {
        let request = build(
            "https://example.com/items",
            &RequestParameters::post(Body::json(&json!({"name": "widget"}))),
        )
        .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(&request.body[..], br#"{"name":"widget"}"#);

        let request = build(
            "https://example.com/login",
            &RequestParameters::post(Body::form([("user", "a b"), ("pass", "x&y")])),
        )
        .unwrap();
        assert_eq!(
            request.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(&request.body[..], b"user=a+b&pass=x%26y");
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let parameters = RequestParameters::post(Body::text("hi"))
            .with_header("content-type", "text/markdown");
        let request = build("https://example.com/notes", &parameters).unwrap();
        assert_eq!(request.header("content-type"), Some("text/markdown"));
    }

    #[test]
    fn test_unencodable_body() {
        use std::collections::HashMap;

        // Maps with non-string keys cannot become JSON objects.
        let mut map = HashMap::new();
        map.insert(vec![1u8], "value");
        let body = Body::json(&map);
        assert!(matches!(body, Body::Unencodable(_)));

        let err = build("https://example.com/", &RequestParameters::post(body)).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }
}
