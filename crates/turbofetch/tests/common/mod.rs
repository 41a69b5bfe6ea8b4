//! Common test utilities for integration tests
//!
//! A scripted in-memory [`Transport`], a recording plugin, and polling
//! helpers shared by the manager, pipeline and recovery suites.

#![allow(dead_code)]

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use turbofetch::{
    BuiltRequest, Exchange, Plugin, PluginId, Priority, RequestManager, RequestParameters,
    ResponseMeta, StatusCode, Transport, TransportOutcome, UserInfo, Verification,
};

/// One transport call as observed when it started.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    /// Zero-based index across all calls to this transport.
    pub index: usize,
}

type Responder = dyn Fn(&BuiltRequest, usize) -> TransportOutcome + Send + Sync;

struct MockInner {
    responder: Box<Responder>,
    calls: Mutex<Vec<Call>>,
    counter: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

/// Scripted transport. Clones share call history.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    /// Answers every call with `responder(request, call_index)`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&BuiltRequest, usize) -> TransportOutcome + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(MockInner {
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
                counter: AtomicUsize::new(0),
                gate: None,
            }),
        }
    }

    /// Answers every call with `status` and `body`.
    pub fn fixed(status: u16, body: &'static str) -> Self {
        Self::new(move |request, _| respond(request, status, body))
    }

    /// Like [`MockTransport::new`], but every call waits for a permit from
    /// `gate` after being recorded.
    pub fn gated<F>(gate: Arc<Semaphore>, responder: F) -> Self
    where
        F: Fn(&BuiltRequest, usize) -> TransportOutcome + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(MockInner {
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
                counter: AtomicUsize::new(0),
                gate: Some(gate),
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.inner.calls.lock().iter().map(|c| c.path.clone()).collect()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .field("gated", &self.inner.gate.is_some())
            .finish()
    }
}

impl Transport for MockTransport {
    fn execute(
        &self,
        request: BuiltRequest,
    ) -> Pin<Box<dyn Future<Output = TransportOutcome> + Send + '_>> {
        let index = self.inner.counter.fetch_add(1, Ordering::SeqCst);
        self.inner.calls.lock().push(Call {
            method: request.method.to_string(),
            path: request.path().to_string(),
            authorization: request.header("authorization").map(str::to_string),
            index,
        });

        Box::pin(async move {
            if let Some(gate) = &self.inner.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            (self.inner.responder)(&request, index)
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A response with `status` and `body` for `request`.
pub fn respond(request: &BuiltRequest, status: u16, body: &str) -> TransportOutcome {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    TransportOutcome::success(
        ResponseMeta::new(status, request.url.clone()),
        body.as_bytes().to_vec(),
    )
}

/// Builds a manager on the current runtime with `transport`.
pub fn manager(transport: &MockTransport) -> RequestManager {
    RequestManager::builder()
        .with_transport(transport.clone())
        .with_base_url("https://api.example.com/")
        .build()
        .unwrap()
}

/// Polls `condition` every millisecond for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Records `"<name>:<hook>"` for every hook into a shared log.
#[derive(Debug, Clone)]
pub struct RecordingPlugin {
    name: &'static str,
    priority: Priority,
    log: Arc<Mutex<Vec<String>>>,
    reject: bool,
}

impl RecordingPlugin {
    pub fn new(name: &'static str, priority: i32, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            priority: Priority::new(priority),
            log,
            reject: false,
        }
    }

    /// Rejects every exchange in `verify`.
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    fn record(&self, hook: &str) {
        self.log.lock().push(format!("{}:{hook}", self.name));
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    fn id(&self) -> PluginId {
        PluginId::new(self.name)
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    async fn prepare(&self, _: &RequestParameters, _: &mut BuiltRequest, _: &UserInfo) {
        self.record("prepare");
    }

    async fn will_send(&self, _: &RequestParameters, _: &BuiltRequest, _: &UserInfo) {
        self.record("will_send");
    }

    async fn verify(&self, _: &Exchange) -> Verification {
        self.record("verify");
        if self.reject {
            Verification::Reject(turbofetch::PluginError::rejected(self.name))
        } else {
            Verification::Accept
        }
    }

    async fn did_receive(&self, _: &RequestParameters, _: &Exchange, _: &UserInfo) {
        self.record("did_receive");
    }

    async fn did_finish(&self, _: &Exchange, _: &UserInfo) {
        self.record("did_finish");
    }

    fn was_cancelled(&self, _: &RequestParameters, _: &UserInfo) {
        self.record("was_cancelled");
    }
}

/// Entries of `log` for `hook`, names only, in order.
pub fn hook_order(log: &Mutex<Vec<String>>, hook: &str) -> Vec<String> {
    let suffix = format!(":{hook}");
    log.lock()
        .iter()
        .filter_map(|entry| entry.strip_suffix(&suffix).map(str::to_string))
        .collect()
}
