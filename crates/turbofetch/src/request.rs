//! One logical request bound to its plugin pipeline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Span, debug};

use turbofetch_transport_traits::BuiltRequest;

use crate::address::RequestParameters;
use crate::cache::{CachePolicy, CachedResponse, cache_key};
use crate::error::Error;
use crate::manager::{ManagerCore, RequestId};
use crate::metadata::UserInfo;
use crate::plugins::PluginPipeline;
use crate::response::Exchange;

/// A registered request: the built base request, its parameters, the merged
/// pipeline and its metadata bag.
///
/// Each attempt starts again from `base`, so headers added by `prepare` never
/// accumulate across retries.
#[derive(Debug)]
pub(crate) struct Request {
    pub(crate) id: RequestId,
    base: BuiltRequest,
    pub(crate) parameters: Arc<RequestParameters>,
    pub(crate) pipeline: PluginPipeline,
    pub(crate) user_info: UserInfo,
    stopped: CancellationToken,
    pub(crate) span: Span,
}

impl Request {
    pub(crate) fn new(
        id: RequestId,
        base: BuiltRequest,
        parameters: RequestParameters,
        pipeline: PluginPipeline,
        span: Span,
    ) -> Self {
        Self {
            id,
            base,
            parameters: Arc::new(parameters),
            pipeline,
            user_info: UserInfo::new(),
            stopped: CancellationToken::new(),
            span,
        }
    }

    /// Marks the request stopped and aborts an in-flight transport call.
    pub(crate) fn stop(&self) {
        self.stopped.cancel();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Runs one attempt: `prepare`, cache lookup or `will_send` plus
    /// transport, `verify`, `did_receive`, cache store.
    ///
    /// Returns `None` if the request was stopped; a late result is dropped
    /// rather than delivered.
    pub(crate) async fn perform(&self, attempt: u32, core: &ManagerCore) -> Option<Exchange> {
        self.user_info.set_attempt(attempt);
        let parameters = &*self.parameters;
        let policy = parameters.cache_policy;

        let mut request = self.base.clone();
        self.pipeline
            .prepare(parameters, &mut request, &self.user_info)
            .await;
        if self.is_stopped() {
            return None;
        }

        let key = cache_key(&request);
        let cached = match (&core.cache, &key) {
            (Some(cache), Some(key)) if policy.allows_lookup(&request) => cache.get(key),
            _ => None,
        };

        let mut exchange = if let Some(cached) = cached {
            debug!(attempt, "served from cache");
            Exchange::from_cache(request, cached)
        } else if policy == CachePolicy::ReturnCacheOnly {
            let target = request.to_string();
            Exchange::failure(request, Error::CacheMiss(target))
        } else {
            self.pipeline
                .will_send(parameters, &request, &self.user_info)
                .await;
            debug!(attempt, transport = core.transport.name(), "sending");

            let outcome = tokio::select! {
                biased;
                () = self.stopped.cancelled() => return None,
                outcome = core.transport.execute(request.clone()) => outcome,
            };
            if self.is_stopped() {
                return None;
            }
            Exchange::from_outcome(request, outcome)
        };

        if exchange.error.is_none()
            && let Some(rejection) = self.pipeline.verify(&exchange).await
        {
            exchange.error = Some(rejection);
        }

        self.pipeline
            .did_receive(parameters, &exchange, &self.user_info)
            .await;
        if self.is_stopped() {
            return None;
        }

        if let (Some(cache), Some(key), Some(response)) = (&core.cache, key, &exchange.response)
            && exchange.is_success()
            && !exchange.from_cache
            && policy.allows_store(&exchange.request, response)
        {
            cache.put(
                key,
                CachedResponse {
                    response: response.clone(),
                    body: exchange.body.clone().unwrap_or_default(),
                },
            );
        }

        debug!(attempt, status = ?exchange.status(), failed = exchange.error.is_some(), "attempt finished");
        Some(exchange)
    }
}
