//! Transport error types.

use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors a transport can report for a single execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost mid-exchange.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The transport gave up waiting for the remote endpoint.
    #[error("Operation timed out")]
    Timeout,

    /// The transport observed the execution being aborted.
    #[error("Execution cancelled by transport")]
    Cancelled,

    /// The remote endpoint answered with something that is not a valid response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Returns `true` for connectivity failures that may succeed when tried again.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::ConnectionLost(_) | Self::Timeout | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::Timeout,
            std::io::ErrorKind::ConnectionRefused => Self::ConnectionFailed(err.to_string()),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
                Self::ConnectionLost(err.to_string())
            }
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::ConnectionFailed("refused".into()).is_retryable());
        assert!(TransportError::ConnectionLost("reset".into()).is_retryable());
        assert!(!TransportError::Cancelled.is_retryable());
        assert!(!TransportError::InvalidResponse("garbage".into()).is_retryable());
        assert!(!TransportError::ConfigurationError("bad".into()).is_retryable());
    }

    #[test]
    fn test_io_error_mapping() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(TransportError::from(timed_out), TransportError::Timeout);

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope");
        assert!(matches!(
            TransportError::from(refused),
            TransportError::ConnectionFailed(_)
        ));

        let other = std::io::Error::other("disk on fire");
        assert!(matches!(TransportError::from(other), TransportError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::ConnectionLost("peer closed".into());
        assert_eq!(err.to_string(), "Connection lost: peer closed");
    }
}
