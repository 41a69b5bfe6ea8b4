//! Recovery coordination: per-request retry and stop-the-line.
//!
//! After every attempt the manager asks its [`RecoveryCoordinator`] what to
//! do with the exchange:
//!
//! - [`RetryDecision::Proceed`] finalizes the request.
//! - [`RetryDecision::Retry`] re-dispatches only that request, as long as its
//!   attempt count is below `max_attempts`.
//! - [`RetryDecision::StopTheLine`] pauses the whole manager. The first
//!   request to flip the manager from running to paused runs
//!   [`RecoveryCoordinator::action`] once; every request that finishes while
//!   paused, or is started while paused, waits in the queue. When the action
//!   resolves the trigger is finalized (or retried) according to its
//!   [`RecoveryOutcome`] and the queue is released.
//!
//! The action receives a recovery view of the manager: same transport,
//! factory, plugins, cache and configuration, but with recovery disabled, so
//! requests it issues (a token refresh, say) can never pause anything.

use std::fmt;

use async_trait::async_trait;
use http::StatusCode;

use crate::address::RequestParameters;
use crate::error::Error;
use crate::manager::RequestManager;
use crate::metadata::UserInfo;
use crate::response::Exchange;

/// What to do with an attempt's exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Finalize with this exchange.
    Proceed,
    /// Try this request again.
    Retry,
    /// Pause the manager and run the recovery action.
    StopTheLine,
}

/// How the request that stopped the line is resolved.
#[derive(Debug)]
pub enum RecoveryOutcome {
    /// Finalize with the original exchange.
    UseOriginal,
    /// Finalize with a substitute exchange.
    PassOver(Exchange),
    /// Dispatch the request again (subject to `max_attempts`).
    Retry,
}

impl RecoveryOutcome {
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::UseOriginal => "use_original",
            Self::PassOver(_) => "pass_over",
            Self::Retry => "retry",
        }
    }
}

/// Policy deciding how failures are retried and recovered from.
#[async_trait]
pub trait RecoveryCoordinator: Send + Sync + fmt::Debug {
    /// Classifies an attempt's exchange. Called outside the manager lock.
    fn verify(
        &self,
        exchange: &Exchange,
        parameters: &RequestParameters,
        user_info: &UserInfo,
    ) -> RetryDecision;

    /// Recovers from a stop-the-line verdict. Runs at most once per pause.
    ///
    /// A panic here is caught and treated as [`RecoveryOutcome::UseOriginal`]
    /// so the manager always resumes.
    async fn action(
        &self,
        _manager: RequestManager,
        _parameters: &RequestParameters,
        _exchange: &Exchange,
        _user_info: &UserInfo,
    ) -> RecoveryOutcome {
        RecoveryOutcome::UseOriginal
    }
}

/// Retries transient failures, never stops the line.
///
/// Transport errors are retried when [`TransportError::is_retryable`] says
/// so; responses are retried when their status is in `statuses`, whether or
/// not a plugin rejected them.
///
/// [`TransportError::is_retryable`]: turbofetch_transport_traits::TransportError::is_retryable
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    statuses: Vec<StatusCode>,
    retry_transport_errors: bool,
}

impl RetryPolicy {
    /// 408, 429, 500, 502, 503 and 504, plus retryable transport errors.
    pub fn new() -> Self {
        Self {
            statuses: vec![
                StatusCode::REQUEST_TIMEOUT,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
            retry_transport_errors: true,
        }
    }

    /// Replaces the retried statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Enables or disables retrying transport errors.
    #[must_use]
    pub fn with_transport_errors(mut self, retry: bool) -> Self {
        self.retry_transport_errors = retry;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryCoordinator for RetryPolicy {
    fn verify(&self, exchange: &Exchange, _: &RequestParameters, _: &UserInfo) -> RetryDecision {
        if let Some(Error::Transport(err)) = &exchange.error {
            return if self.retry_transport_errors && err.is_retryable() {
                RetryDecision::Retry
            } else {
                RetryDecision::Proceed
            };
        }
        match exchange.status() {
            Some(status) if self.statuses.contains(&status) => RetryDecision::Retry,
            _ => RetryDecision::Proceed,
        }
    }
}
