//! Core plugin trait and types.
//!
//! A plugin participates in a request's lifecycle through up to six hooks,
//! each with a no-op default. Hooks run in descending [`Priority`] order for
//! every phase, so a high-priority plugin both prepares first and observes
//! first.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;

use turbofetch_transport_traits::BuiltRequest;

use crate::address::RequestParameters;
use crate::metadata::UserInfo;
use crate::response::Exchange;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors a plugin reports when rejecting a response
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PluginError {
    /// The response was rejected for a plugin-specific reason
    #[error("Response rejected: {message}")]
    Rejected {
        /// Why the plugin rejected the response
        message: String,
    },

    /// The response status code is outside the accepted set
    #[error("Unacceptable status code: {status}")]
    UnacceptableStatus {
        /// The rejected status
        status: StatusCode,
    },

    /// Plugin configuration is invalid
    #[error("Invalid plugin configuration: {message}")]
    Configuration {
        /// What is wrong with the configuration
        message: String,
    },

    /// External system error
    #[error("External system error: {source}")]
    External {
        /// Underlying error
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PluginError {
    /// Create a rejection
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create a status rejection
    pub const fn unacceptable_status(status: StatusCode) -> Self {
        Self::UnacceptableStatus { status }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap an external error
    pub fn external(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::External {
            source: Box::new(error),
        }
    }
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

// ============================================================================
// IDENTITY AND ORDERING
// ============================================================================

/// Stable plugin identity used for deduplication.
///
/// Two plugins with equal ids are the same plugin as far as the pipeline is
/// concerned; only the first occurrence survives a merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(Cow<'static, str>);

impl PluginId {
    /// An explicit id.
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self(id.into())
    }

    /// An id derived from the plugin's type name alone, for plugins with no
    /// distinguishing configuration.
    pub fn of<T: ?Sized>() -> Self {
        Self(Cow::Borrowed(type_name::<T>()))
    }

    /// An id derived from the type name plus a configuration fingerprint.
    pub fn derived<T: ?Sized>(config: &impl fmt::Debug) -> Self {
        Self(Cow::Owned(format!("{}({config:?})", type_name::<T>())))
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for PluginId {
    fn from(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }
}

/// Hook ordering weight. Higher runs earlier in every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(i32);

impl Priority {
    /// Runs after most plugins.
    pub const LOW: Self = Self(250);
    /// Default priority.
    pub const NORMAL: Self = Self(500);
    /// Runs before most plugins.
    pub const HIGH: Self = Self(750);
    /// Plugins that must see the request first (authentication, correlation).
    pub const REQUIRED: Self = Self(1000);

    /// Creates a priority from a raw weight.
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// The raw weight.
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// A plugin's verdict on an exchange.
#[derive(Debug)]
pub enum Verification {
    /// The exchange is acceptable.
    Accept,
    /// The exchange is rejected; the error becomes the attempt's error.
    Reject(PluginError),
}

impl Verification {
    /// Returns `true` for [`Verification::Accept`].
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

// ============================================================================
// PLUGIN TRAIT
// ============================================================================

/// Request lifecycle middleware.
///
/// Per attempt the hooks run as `prepare` → `will_send` → (transport) →
/// `verify` → `did_receive`. `did_finish` runs once per logical request after
/// the retry decision is resolved; `was_cancelled` runs once if a registered
/// request is cancelled instead.
///
/// # Examples
///
/// ```rust,no_run
/// use turbofetch::async_trait;
/// use turbofetch::{BuiltRequest, Plugin, PluginId, RequestParameters, UserInfo};
///
/// #[derive(Debug)]
/// struct ApiVersion;
///
/// #[async_trait]
/// impl Plugin for ApiVersion {
///     fn id(&self) -> PluginId {
///         PluginId::of::<Self>()
///     }
///
///     async fn prepare(
///         &self,
///         _parameters: &RequestParameters,
///         request: &mut BuiltRequest,
///         _user_info: &UserInfo,
///     ) {
///         request.append_query("api-version", "2024-01");
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync + fmt::Debug {
    /// Identity used for deduplication.
    fn id(&self) -> PluginId;

    /// Ordering weight.
    fn priority(&self) -> Priority {
        Priority::NORMAL
    }

    /// Mutate the outgoing request. Runs before every attempt.
    async fn prepare(
        &self,
        _parameters: &RequestParameters,
        _request: &mut BuiltRequest,
        _user_info: &UserInfo,
    ) {
    }

    /// Observe the request about to be handed to the transport.
    async fn will_send(
        &self,
        _parameters: &RequestParameters,
        _request: &BuiltRequest,
        _user_info: &UserInfo,
    ) {
    }

    /// Accept or reject a response. Not called when the transport failed.
    async fn verify(&self, _exchange: &Exchange) -> Verification {
        Verification::Accept
    }

    /// Observe an attempt's exchange, whatever `verify` decided.
    async fn did_receive(
        &self,
        _parameters: &RequestParameters,
        _exchange: &Exchange,
        _user_info: &UserInfo,
    ) {
    }

    /// Observe the final exchange of the logical request.
    async fn did_finish(&self, _exchange: &Exchange, _user_info: &UserInfo) {}

    /// Called when a registered request is cancelled.
    fn was_cancelled(&self, _parameters: &RequestParameters, _user_info: &UserInfo) {}
}
