//! Error types for request orchestration.

use http::StatusCode;
use thiserror::Error;
use turbofetch_transport_traits::TransportError;

use crate::plugins::{PluginError, PluginId};

/// Result type for TurboFetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a request can finish with.
///
/// All variants funnel through the manager's single finalization path, so a
/// completion sink only ever has to match on this one type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The address could not be resolved to an absolute http(s) URL with a host.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The address as supplied by the caller.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A header name or value is not valid HTTP.
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader {
        /// Header name as supplied.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request body could not be encoded.
    #[error("Failed to encode request body: {0}")]
    Encoding(String),

    /// The transport reported a failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A plugin rejected the response during `verify`.
    #[error("Response rejected by plugin '{plugin}': {source}")]
    Verification {
        /// The rejecting plugin.
        plugin: PluginId,
        /// The rejection reason.
        #[source]
        source: PluginError,
    },

    /// A plugin rejected the response because of its status code.
    #[error("Unacceptable status code {status} (rejected by plugin '{plugin}')")]
    Status {
        /// The rejecting plugin.
        plugin: PluginId,
        /// The status code that was rejected.
        status: StatusCode,
    },

    /// The final response could not be converted to the requested shape.
    #[error("Failed to decode response: {0}")]
    Decoding(String),

    /// The request was cancelled before it finished.
    #[error("Request was cancelled")]
    Cancelled,

    /// `CachePolicy::ReturnCacheOnly` was requested and nothing was cached.
    #[error("No cached response for {0}")]
    CacheMiss(String),

    /// The manager was configured with invalid settings.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid header error
    pub fn invalid_header(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a decoding error
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Converts a plugin rejection into the error it surfaces as.
    pub(crate) fn from_rejection(plugin: PluginId, source: PluginError) -> Self {
        match source {
            PluginError::UnacceptableStatus { status } => Self::Status { plugin, status },
            source => Self::Verification { plugin, source },
        }
    }

    /// Returns `true` for construction failures (address, header, body).
    ///
    /// These never reach the registry and are never retried.
    pub const fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddress { .. } | Self::InvalidHeader { .. } | Self::Encoding(_)
        )
    }

    /// Returns `true` if trying the same request again could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            Self::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Returns `true` if the request was cancelled, either by the caller or
    /// as observed by the transport.
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Transport(TransportError::Cancelled)
        )
    }

    /// Returns the rejected status code, if this is a status rejection.
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
