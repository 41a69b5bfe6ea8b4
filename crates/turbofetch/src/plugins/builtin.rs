//! Plugins shipped with the crate.

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::{HeaderName, HeaderValue};
use parking_lot::RwLock;
use tracing::warn;
use uuid::Uuid;

use turbofetch_transport_traits::BuiltRequest;

use crate::address::RequestParameters;
use crate::metadata::{CORRELATION_ID_KEY, UserInfo};
use crate::plugins::core::{Plugin, PluginError, PluginId, PluginResult, Priority, Verification};
use crate::response::Exchange;

// ============================================================================
// HEADERS
// ============================================================================

/// Sets a fixed list of headers on every attempt.
#[derive(Debug, Clone)]
pub struct HeadersPlugin {
    headers: Vec<(HeaderName, HeaderValue)>,
    priority: Priority,
}

impl HeadersPlugin {
    /// Creates the plugin, validating every header.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Configuration`] for an invalid name or value.
    pub fn new<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> PluginResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| {
                let (name, value) = (name.as_ref(), value.as_ref());
                let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    PluginError::configuration(format!("invalid header name '{name}': {e}"))
                })?;
                let header_value = HeaderValue::from_str(value).map_err(|e| {
                    PluginError::configuration(format!("invalid value for '{name}': {e}"))
                })?;
                Ok((header_name, header_value))
            })
            .collect::<PluginResult<Vec<_>>>()?;

        Ok(Self {
            headers,
            priority: Priority::NORMAL,
        })
    }

    /// Overrides the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl Plugin for HeadersPlugin {
    fn id(&self) -> PluginId {
        PluginId::derived::<Self>(&self.headers)
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    async fn prepare(&self, _: &RequestParameters, request: &mut BuiltRequest, _: &UserInfo) {
        for (name, value) in &self.headers {
            request.set_header(name.clone(), value.clone());
        }
    }
}

// ============================================================================
// BEARER AUTH
// ============================================================================

/// Shared, swappable access token.
///
/// Clones share the token, so a recovery action can refresh it and every
/// subsequently prepared request picks up the new value.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Replaces the token.
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Removes the token.
    pub fn clear(&self) {
        *self.token.write() = None;
    }

    /// Current token.
    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// Adds `authorization: Bearer <token>` from a [`TokenStore`].
///
/// The store is read in `prepare`, i.e. on every attempt, never cached.
#[derive(Debug, Clone)]
pub struct BearerAuthPlugin {
    store: TokenStore,
}

impl BearerAuthPlugin {
    /// Creates the plugin over a shared store.
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Plugin for BearerAuthPlugin {
    fn id(&self) -> PluginId {
        PluginId::of::<Self>()
    }

    fn priority(&self) -> Priority {
        Priority::REQUIRED
    }

    async fn prepare(&self, _: &RequestParameters, request: &mut BuiltRequest, _: &UserInfo) {
        let Some(token) = self.store.get() else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.set_header(AUTHORIZATION, value);
            }
            Err(e) => warn!(error = %e, "token is not a valid header value; sending without it"),
        }
    }
}

// ============================================================================
// STATUS VALIDATION
// ============================================================================

/// Rejects responses whose status falls outside an accepted range.
#[derive(Debug, Clone)]
pub struct StatusValidationPlugin {
    accepted: Range<u16>,
}

impl StatusValidationPlugin {
    /// Accepts statuses in `accepted`.
    pub fn new(accepted: Range<u16>) -> Self {
        Self { accepted }
    }
}

impl Default for StatusValidationPlugin {
    fn default() -> Self {
        Self::new(200..300)
    }
}

#[async_trait]
impl Plugin for StatusValidationPlugin {
    fn id(&self) -> PluginId {
        PluginId::derived::<Self>(&self.accepted)
    }

    async fn verify(&self, exchange: &Exchange) -> Verification {
        match exchange.status() {
            Some(status) if !self.accepted.contains(&status.as_u16()) => {
                Verification::Reject(PluginError::unacceptable_status(status))
            }
            _ => Verification::Accept,
        }
    }
}

// ============================================================================
// REQUEST ID
// ============================================================================

/// Stamps a correlation id on the request and in [`UserInfo`].
///
/// The id is generated on the first attempt and reused on retries.
#[derive(Debug, Clone)]
pub struct RequestIdPlugin {
    header: HeaderName,
}

impl RequestIdPlugin {
    /// Uses the `x-request-id` header.
    pub fn new() -> Self {
        Self {
            header: HeaderName::from_static("x-request-id"),
        }
    }

    /// Uses a custom header.
    pub fn with_header(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for RequestIdPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for RequestIdPlugin {
    fn id(&self) -> PluginId {
        PluginId::derived::<Self>(&self.header)
    }

    fn priority(&self) -> Priority {
        Priority::HIGH
    }

    async fn prepare(&self, _: &RequestParameters, request: &mut BuiltRequest, user_info: &UserInfo) {
        let id = user_info.correlation_id().unwrap_or_else(|| {
            let id = Uuid::new_v4().to_string();
            user_info.insert(CORRELATION_ID_KEY, id.clone());
            id
        });
        if let Ok(value) = HeaderValue::from_str(&id) {
            request.set_header(self.header.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use turbofetch_transport_traits::ResponseMeta;
    use url::Url;

    fn request() -> BuiltRequest {
        BuiltRequest::new(Method::GET, Url::parse("https://example.com/").unwrap())
    }

    fn exchange(status: u16) -> Exchange {
        let url = Url::parse("https://example.com/").unwrap();
        Exchange::new(
            request(),
            ResponseMeta::new(StatusCode::from_u16(status).unwrap(), url),
            Bytes::new(),
        )
    }

    #[tokio::test]
    async fn test_headers_plugin() {
        let plugin = HeadersPlugin::new([("x-app", "demo"), ("accept", "application/json")]).unwrap();
        let mut req = request();
        plugin
            .prepare(&RequestParameters::get(), &mut req, &UserInfo::new())
            .await;
        assert_eq!(req.header("x-app"), Some("demo"));
        assert_eq!(req.header("accept"), Some("application/json"));

        assert!(HeadersPlugin::new([("bad name", "x")]).is_err());
        let other = HeadersPlugin::new([("x-app", "other")]).unwrap();
        assert_ne!(plugin.id(), other.id());
    }

    #[tokio::test]
    async fn test_bearer_reads_store_each_time() {
        let store = TokenStore::with_token("old");
        let plugin = BearerAuthPlugin::new(store.clone());
        let params = RequestParameters::get();
        let info = UserInfo::new();

        let mut first = request();
        plugin.prepare(&params, &mut first, &info).await;
        assert_eq!(first.header("authorization"), Some("Bearer old"));

        store.set("new");
        let mut second = request();
        plugin.prepare(&params, &mut second, &info).await;
        assert_eq!(second.header("authorization"), Some("Bearer new"));

        store.clear();
        let mut third = request();
        plugin.prepare(&params, &mut third, &info).await;
        assert!(third.header("authorization").is_none());
    }

    #[tokio::test]
    async fn test_status_validation() {
        let plugin = StatusValidationPlugin::default();
        assert!(plugin.verify(&exchange(204)).await.is_accept());
        match plugin.verify(&exchange(401)).await {
            Verification::Reject(PluginError::UnacceptableStatus { status }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }

        let lenient = StatusValidationPlugin::new(200..500);
        assert!(lenient.verify(&exchange(404)).await.is_accept());
    }

    #[tokio::test]
    async fn test_request_id_is_stable_across_attempts() {
        let plugin = RequestIdPlugin::new();
        let params = RequestParameters::get();
        let info = UserInfo::new();

        let mut first = request();
        plugin.prepare(&params, &mut first, &info).await;
        let mut second = request();
        plugin.prepare(&params, &mut second, &info).await;

        let id = info.correlation_id().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(first.header("x-request-id"), Some(id.as_str()));
        assert_eq!(second.header("x-request-id"), Some(id.as_str()));
    }
}
