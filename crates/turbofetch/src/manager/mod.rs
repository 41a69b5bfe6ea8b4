//! The request manager.
//!
//! [`RequestManager`] owns the registry of in-flight requests and the
//! running/paused flag. Both live in one [`ManagerState`] behind one mutex;
//! every registry read or write and the running-flag compare-and-set happen
//! under it, and no plugin hook or completion sink ever runs while it is held.
//!
//! ## Request lifecycle
//!
//! 1. `request_*` merges plugins, builds the request, registers it (phase
//!    `Idle`) and returns a [`Task`]. A construction failure returns a task
//!    that fails on start and never touches the registry.
//! 2. [`Task::start`] dispatches the request if the manager is running, or
//!    queues it if paused.
//! 3. Each attempt runs on the manager's runtime; its exchange goes through
//!    `try_complete`, which asks the [`RecoveryCoordinator`] what to do.
//! 4. Finalization removes the entry, runs `did_finish` and delivers the
//!    decoded result to the completion sink.

mod builder;

pub use builder::RequestManagerBuilder;

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use turbofetch_transport_traits::Transport;

use crate::address::{Address, RequestFactory, RequestParameters};
use crate::cache::ResponseCache;
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::plugins::{Plugin, PluginPipeline};
use crate::recovery::{RecoveryCoordinator, RecoveryOutcome, RetryDecision};
use crate::request::Request;
use crate::response::{self, DataResponse, Exchange, Image};
use crate::task::{Completion, Task, TaskCell, TaskDriver, TaskFuture};

/// Identity of one registered request.
///
/// Issued from a per-manager monotonic counter (shared with the recovery
/// view), never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Where a registered request is in its dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Registered, task not started.
    Idle,
    /// Waiting for the manager to resume.
    Queued,
    /// An attempt is running.
    InFlight,
    /// Triggered the current pause; its recovery action is running.
    Recovering,
}

struct RequestState {
    request: Arc<Request>,
    attempt: u32,
    phase: Phase,
    completion: Completion,
    task: Arc<TaskCell>,
}

struct ManagerState {
    is_running: bool,
    registry: HashMap<RequestId, RequestState>,
}

/// Collaborators shared by a manager and its recovery view.
pub(crate) struct ManagerCore {
    pub(crate) config: ManagerConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) factory: Arc<dyn RequestFactory>,
    pub(crate) plugins: Vec<Arc<dyn Plugin>>,
    pub(crate) cache: Option<Arc<dyn ResponseCache>>,
    pub(crate) runtime: Handle,
    next_id: AtomicU64,
}

impl ManagerCore {
    pub(crate) fn new(
        config: ManagerConfig,
        transport: Arc<dyn Transport>,
        factory: Arc<dyn RequestFactory>,
        plugins: Vec<Arc<dyn Plugin>>,
        cache: Option<Arc<dyn ResponseCache>>,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            transport,
            factory,
            plugins,
            cache,
            runtime,
            next_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

struct ManagerInner {
    core: Arc<ManagerCore>,
    recovery: Option<Arc<dyn RecoveryCoordinator>>,
    state: Mutex<ManagerState>,
    recovery_view: OnceLock<RequestManager>,
}

/// One attempt ready to be spawned.
struct Dispatch {
    request: Arc<Request>,
    attempt: u32,
}

/// Entry point for issuing requests.
///
/// Cheap to clone; clones share the registry and the running flag.
///
/// # Examples
///
/// ```rust,ignore
/// let manager = RequestManager::builder()
///     .with_transport(my_transport)
///     .with_plugin(StatusValidationPlugin::default())
///     .with_recovery(RetryPolicy::default())
///     .build()?;
///
/// let user: User = manager
///     .decodable("https://api.example.com/users/7", RequestParameters::get())
///     .await?;
/// ```
#[derive(Clone)]
pub struct RequestManager {
    inner: Arc<ManagerInner>,
}

impl RequestManager {
    /// Returns a builder.
    pub fn builder() -> RequestManagerBuilder {
        RequestManagerBuilder::new()
    }

    pub(crate) fn from_core(
        core: Arc<ManagerCore>,
        recovery: Option<Arc<dyn RecoveryCoordinator>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                core,
                recovery,
                state: Mutex::new(ManagerState {
                    is_running: true,
                    registry: HashMap::new(),
                }),
                recovery_view: OnceLock::new(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Callback-style operations
    // ------------------------------------------------------------------

    /// Requests raw bytes plus response metadata.
    pub fn request_data<S>(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
        sink: S,
    ) -> Task
    where
        S: FnOnce(Result<DataResponse>) + Send + 'static,
    {
        self.request_with(address.into(), parameters, response::decode_data, sink)
    }

    /// Requests a JSON body deserialized as `T`.
    pub fn request_decodable<T, S>(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
        sink: S,
    ) -> Task
    where
        T: DeserializeOwned + Send + 'static,
        S: FnOnce(Result<T>) + Send + 'static,
    {
        self.request_with(
            address.into(),
            parameters,
            response::decode_decodable::<T>,
            sink,
        )
    }

    /// Requests an image.
    pub fn request_image<S>(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
        sink: S,
    ) -> Task
    where
        S: FnOnce(Result<Image>) + Send + 'static,
    {
        self.request_with(address.into(), parameters, response::decode_image, sink)
    }

    /// Requests an arbitrary JSON document. An empty body decodes as `null`.
    pub fn request_json<S>(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
        sink: S,
    ) -> Task
    where
        S: FnOnce(Result<Value>) + Send + 'static,
    {
        self.request_with(address.into(), parameters, response::decode_json, sink)
    }

    /// Requests an endpoint whose body is ignored.
    pub fn request_empty<S>(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
        sink: S,
    ) -> Task
    where
        S: FnOnce(Result<()>) + Send + 'static,
    {
        self.request_with(address.into(), parameters, response::decode_empty, sink)
    }

    // ------------------------------------------------------------------
    // Future-style operations
    // ------------------------------------------------------------------

    /// Starts a data request and returns a future for its result.
    pub fn data(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
    ) -> TaskFuture<DataResponse> {
        self.future_with(address.into(), parameters, response::decode_data)
    }

    /// Starts a decodable request and returns a future for its result.
    pub fn decodable<T>(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
    ) -> TaskFuture<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.future_with(address.into(), parameters, response::decode_decodable::<T>)
    }

    /// Starts an image request and returns a future for its result.
    pub fn image(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
    ) -> TaskFuture<Image> {
        self.future_with(address.into(), parameters, response::decode_image)
    }

    /// Starts a JSON request and returns a future for its result.
    pub fn json(
        &self,
        address: impl Into<Address>,
        parameters: RequestParameters,
    ) -> TaskFuture<Value> {
        self.future_with(address.into(), parameters, response::decode_json)
    }

    /// Starts a no-content request and returns a future for its result.
    pub fn empty(&self, address: impl Into<Address>, parameters: RequestParameters) -> TaskFuture<()> {
        self.future_with(address.into(), parameters, response::decode_empty)
    }

    // ------------------------------------------------------------------
    // Introspection and control
    // ------------------------------------------------------------------

    /// `false` while a recovery action is running.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().is_running
    }

    /// Number of registered requests, started or not.
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Ids of registered requests, ascending.
    pub fn request_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self.inner.state.lock().registry.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancels one request. Returns `false` if it was not registered.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.inner.cancel_request(id)
    }

    /// Cancels every registered request, returning how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids = self.request_ids();
        ids.into_iter()
            .filter(|id| self.inner.cancel_request(*id))
            .count()
    }

    /// The configuration the manager was built with.
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.core.config
    }

    /// Whether this manager has a recovery coordinator.
    pub fn has_recovery(&self) -> bool {
        self.inner.recovery.is_some()
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn request_with<T, D, S>(&self, address: Address, parameters: RequestParameters, decode: D, sink: S) -> Task
    where
        T: Send + 'static,
        D: FnOnce(Exchange) -> Result<T> + Send + 'static,
        S: FnOnce(Result<T>) + Send + 'static,
    {
        let core = &self.inner.core;
        let completion = Completion::new(
            decode,
            sink,
            core.config.completion_queue,
            core.runtime.clone(),
        );
        self.inner.submit(address, parameters, completion)
    }

    fn future_with<T, D>(&self, address: Address, parameters: RequestParameters, decode: D) -> TaskFuture<T>
    where
        T: Send + 'static,
        D: FnOnce(Exchange) -> Result<T> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let task = self.request_with(address, parameters, decode, move |result| {
            // The receiver is gone only if the future was dropped.
            let _ = sender.send(result);
        });
        task.start();
        TaskFuture::new(task, receiver)
    }
}

impl fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (is_running, in_flight) = {
            let state = self.inner.state.lock();
            (state.is_running, state.registry.len())
        };
        f.debug_struct("RequestManager")
            .field("is_running", &is_running)
            .field("in_flight", &in_flight)
            .field("recovery", &self.inner.recovery)
            .field("transport", &self.inner.core.transport.name())
            .finish()
    }
}

impl ManagerInner {
    fn submit(self: &Arc<Self>, address: Address, parameters: RequestParameters, completion: Completion) -> Task {
        let core = &self.core;
        let pipeline = PluginPipeline::merge(&core.plugins, &parameters.plugins);

        let base = match core.factory.build(&address, &parameters) {
            Ok(base) => base,
            Err(error) => {
                debug!(%address, %error, "request construction failed");
                return Task::failed(error, completion);
            }
        };

        let id = core.next_id();
        let span = debug_span!("request", id = %id, method = %base.method, url = %base.url);
        let request = Arc::new(Request::new(id, base, parameters, pipeline, span));
        let cell = Arc::new(TaskCell::new());

        self.state.lock().registry.insert(
            id,
            RequestState {
                request,
                attempt: 0,
                phase: Phase::Idle,
                completion,
                task: Arc::clone(&cell),
            },
        );
        debug!(request_id = %id, "request registered");

        let driver: Arc<dyn TaskDriver> = Arc::clone(self) as Arc<dyn TaskDriver>;
        Task::registered(id, cell, driver)
    }

    /// Bumps the attempt and marks the entry in flight. Caller holds the lock.
    fn dispatch_locked(entry: &mut RequestState) -> Dispatch {
        entry.attempt += 1;
        entry.phase = Phase::InFlight;
        Dispatch {
            request: Arc::clone(&entry.request),
            attempt: entry.attempt,
        }
    }

    fn spawn_attempt(self: &Arc<Self>, dispatch: Dispatch) {
        let inner = Arc::clone(self);
        let span = dispatch.request.span.clone();
        debug!(request_id = %dispatch.request.id, attempt = dispatch.attempt, "dispatching");

        self.core.runtime.spawn(
            async move {
                let Dispatch { request, attempt } = dispatch;
                if let Some(exchange) = request.perform(attempt, &inner.core).await {
                    inner.try_complete(request, exchange).await;
                }
            }
            .instrument(span),
        );
    }

    async fn try_complete(self: &Arc<Self>, request: Arc<Request>, exchange: Exchange) {
        let id = request.id;
        if !self.state.lock().registry.contains_key(&id) {
            debug!(request_id = %id, "dropping result of a request no longer registered");
            return;
        }

        let decision = self.recovery.as_ref().map_or(RetryDecision::Proceed, |coordinator| {
            coordinator.verify(&exchange, &request.parameters, &request.user_info)
        });
        debug!(request_id = %id, ?decision, "attempt classified");

        match decision {
            RetryDecision::Proceed => self.finalize(id, exchange).await,
            RetryDecision::Retry => self.retry(id, exchange).await,
            RetryDecision::StopTheLine => self.stop_the_line(request, exchange).await,
        }
    }

    async fn retry(self: &Arc<Self>, id: RequestId, exchange: Exchange) {
        enum Next {
            Dispatch(Dispatch),
            Queued,
            Exhausted,
        }

        let max_attempts = self.core.config.max_attempts;
        let next = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.registry.get_mut(&id) else {
                return;
            };
            if entry.attempt >= max_attempts {
                Next::Exhausted
            } else if state.is_running {
                Next::Dispatch(Self::dispatch_locked(entry))
            } else {
                entry.phase = Phase::Queued;
                Next::Queued
            }
        };

        match next {
            Next::Dispatch(dispatch) => self.spawn_attempt(dispatch),
            Next::Queued => debug!(request_id = %id, "retry queued until the manager resumes"),
            Next::Exhausted => {
                debug!(request_id = %id, max_attempts, "attempt limit reached");
                self.finalize(id, exchange).await;
            }
        }
    }

    async fn stop_the_line(self: &Arc<Self>, request: Arc<Request>, exchange: Exchange) {
        enum Verdict {
            Recover,
            Absorbed,
            Exhausted,
        }

        let id = request.id;
        let max_attempts = self.core.config.max_attempts;
        let verdict = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.registry.get_mut(&id) else {
                return;
            };
            if state.is_running {
                state.is_running = false;
                entry.phase = Phase::Recovering;
                Verdict::Recover
            } else if entry.attempt < max_attempts {
                entry.phase = Phase::Queued;
                Verdict::Absorbed
            } else {
                Verdict::Exhausted
            }
        };

        match verdict {
            Verdict::Recover => {
                info!(request_id = %id, "stopping the line");
                self.recover(request, exchange).await;
            }
            Verdict::Absorbed => {
                debug!(request_id = %id, "stop-the-line absorbed; queued until the manager resumes");
            }
            Verdict::Exhausted => self.finalize(id, exchange).await,
        }
    }

    /// Runs the recovery action, resolves the trigger, then resumes the queue.
    async fn recover(self: &Arc<Self>, request: Arc<Request>, exchange: Exchange) {
        let id = request.id;
        let outcome = match &self.recovery {
            Some(coordinator) => {
                let view = self.recovery_view().clone();
                let action = coordinator.action(view, &request.parameters, &exchange, &request.user_info);
                AssertUnwindSafe(action)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!(request_id = %id, "recovery action panicked; keeping the original result");
                        RecoveryOutcome::UseOriginal
                    })
            }
            None => RecoveryOutcome::UseOriginal,
        };
        info!(request_id = %id, outcome = outcome.name(), "recovery action resolved");

        match outcome {
            RecoveryOutcome::UseOriginal => self.finalize(id, exchange).await,
            RecoveryOutcome::PassOver(substitute) => self.finalize(id, substitute).await,
            RecoveryOutcome::Retry => {
                let max_attempts = self.core.config.max_attempts;
                let requeued = {
                    let mut state = self.state.lock();
                    match state.registry.get_mut(&id) {
                        Some(entry) if entry.attempt < max_attempts => {
                            entry.phase = Phase::Queued;
                            true
                        }
                        Some(_) => false,
                        None => true,
                    }
                };
                if !requeued {
                    debug!(request_id = %id, max_attempts, "attempt limit reached during recovery");
                    self.finalize(id, exchange).await;
                }
            }
        }

        self.resume(id);
    }

    /// Sets the manager running and dispatches every queued request, the
    /// trigger first.
    fn resume(self: &Arc<Self>, trigger: RequestId) {
        let dispatches = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.is_running = true;

            let mut queued: Vec<RequestId> = state
                .registry
                .iter()
                .filter(|(_, entry)| entry.phase == Phase::Queued)
                .map(|(id, _)| *id)
                .collect();
            queued.sort_unstable_by_key(|id| (*id != trigger, *id));

            queued
                .into_iter()
                .filter_map(|id| state.registry.get_mut(&id).map(Self::dispatch_locked))
                .collect::<Vec<_>>()
        };

        info!(resumed = dispatches.len(), "manager resumed");
        for dispatch in dispatches {
            self.spawn_attempt(dispatch);
        }
    }

    async fn finalize(self: &Arc<Self>, id: RequestId, exchange: Exchange) {
        let removed = self.state.lock().registry.remove(&id);
        let Some(entry) = removed else {
            debug!(request_id = %id, "already finalized or cancelled");
            return;
        };

        entry.task.mark_completed();
        let request = entry.request;
        debug!(request_id = %id, attempt = entry.attempt, failed = exchange.error.is_some(), "finalizing");
        request
            .pipeline
            .did_finish(&exchange, &request.user_info)
            .await;
        entry.completion.complete(Ok(exchange));
    }

    fn cancel_request(&self, id: RequestId) -> bool {
        let removed = self.state.lock().registry.remove(&id);
        let Some(entry) = removed else {
            return false;
        };

        entry.request.stop();
        entry.task.mark_cancelled();
        debug!(request_id = %id, phase = ?entry.phase, "request cancelled");

        let request = entry.request;
        request
            .pipeline
            .was_cancelled(&request.parameters, &request.user_info);
        entry.completion.complete(Err(Error::Cancelled));
        true
    }

    fn recovery_view(&self) -> &RequestManager {
        self.recovery_view
            .get_or_init(|| RequestManager::from_core(Arc::clone(&self.core), None))
    }
}

impl TaskDriver for ManagerInner {
    fn start(self: Arc<Self>, id: RequestId) {
        let dispatch = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.registry.get_mut(&id) else {
                warn!(request_id = %id, "start on a request that is no longer registered");
                return;
            };
            if entry.phase != Phase::Idle {
                return;
            }
            if state.is_running {
                Some(Self::dispatch_locked(entry))
            } else {
                entry.phase = Phase::Queued;
                None
            }
        };

        match dispatch {
            Some(dispatch) => self.spawn_attempt(dispatch),
            None => debug!(request_id = %id, "manager paused; request queued"),
        }
    }

    fn cancel(self: Arc<Self>, id: RequestId) -> bool {
        self.cancel_request(id)
    }
}
