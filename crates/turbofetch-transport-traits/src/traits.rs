//! Core transport trait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::message::{BuiltRequest, TransportOutcome};

/// The contract every network stack implements to be driven by TurboFetch.
///
/// A transport executes one [`BuiltRequest`] asynchronously and reports a
/// [`TransportOutcome`]. Aborting an execution is done by dropping the
/// returned future; implementations must release any resources (sockets,
/// in-flight streams) when that happens. Timeout policy belongs here too: the
/// orchestration layer only counts attempts, never elapsed time.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Executes a single request.
    fn execute(
        &self,
        request: BuiltRequest,
    ) -> Pin<Box<dyn Future<Output = TransportOutcome> + Send + '_>>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(
        &self,
        request: BuiltRequest,
    ) -> Pin<Box<dyn Future<Output = TransportOutcome> + Send + '_>> {
        (**self).execute(request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(
        &self,
        request: BuiltRequest,
    ) -> Pin<Box<dyn Future<Output = TransportOutcome> + Send + '_>> {
        (**self).execute(request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
