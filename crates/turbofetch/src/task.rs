//! Cancellable, start-once task handles.
//!
//! Every manager operation returns a [`Task`]. Nothing touches the transport
//! until [`Task::start`]; [`Task::cancel`] is idempotent and safe at any
//! point. Completion is delivered through one single-shot primitive,
//! [`Completion`], on which the callback (`request_*`) and future
//! ([`TaskFuture`]) styles are both built.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::CompletionQueue;
use crate::error::{Error, Result};
use crate::manager::RequestId;
use crate::response::Exchange;

/// Observable state of a task.
///
/// `Idle → Started → {Completed, Cancelled}`, or `Idle → Cancelled` when
/// cancelled before starting. `Started` is entered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not started.
    Idle,
    /// Started; the request is queued or in flight.
    Started,
    /// Finished with a result.
    Completed,
    /// Cancelled.
    Cancelled,
}

#[derive(Debug)]
pub(crate) struct TaskCell {
    state: Mutex<TaskState>,
}

impl TaskCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(TaskState::Idle),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// `Idle → Started`; otherwise returns the current state untouched.
    fn begin(&self) -> std::result::Result<(), TaskState> {
        let mut state = self.state.lock();
        match *state {
            TaskState::Idle => {
                *state = TaskState::Started;
                Ok(())
            }
            other => Err(other),
        }
    }

    pub(crate) fn mark_completed(&self) -> bool {
        self.settle(TaskState::Completed)
    }

    pub(crate) fn mark_cancelled(&self) -> bool {
        self.settle(TaskState::Cancelled)
    }

    fn settle(&self, terminal: TaskState) -> bool {
        let mut state = self.state.lock();
        match *state {
            TaskState::Idle | TaskState::Started => {
                *state = terminal;
                true
            }
            TaskState::Completed | TaskState::Cancelled => false,
        }
    }
}

/// The single-shot completion continuation of one request.
///
/// Holds the decoder and the caller's sink; consumed exactly once by the
/// manager's finalization or cancellation path.
pub(crate) struct Completion {
    deliver: Box<dyn FnOnce(Result<Exchange>) + Send>,
    queue: CompletionQueue,
    runtime: Handle,
}

impl Completion {
    pub(crate) fn new<T, D, S>(decode: D, sink: S, queue: CompletionQueue, runtime: Handle) -> Self
    where
        T: Send + 'static,
        D: FnOnce(Exchange) -> Result<T> + Send + 'static,
        S: FnOnce(Result<T>) + Send + 'static,
    {
        Self {
            deliver: Box::new(move |result| sink(result.and_then(decode))),
            queue,
            runtime,
        }
    }

    /// Delivers on the configured completion queue.
    pub(crate) fn complete(self, result: Result<Exchange>) {
        let deliver = self.deliver;
        match self.queue {
            CompletionQueue::Inline => deliver(result),
            CompletionQueue::Spawn => {
                self.runtime.spawn(async move { deliver(result) });
            }
        }
    }

    /// Delivers on the calling thread regardless of the configured queue.
    pub(crate) fn complete_inline(self, result: Result<Exchange>) {
        (self.deliver)(result);
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// The manager side of a registered task.
pub(crate) trait TaskDriver: Send + Sync {
    fn start(self: Arc<Self>, id: RequestId);
    fn cancel(self: Arc<Self>, id: RequestId) -> bool;
}

enum TaskKind {
    Registered {
        id: RequestId,
        driver: Arc<dyn TaskDriver>,
    },
    /// Construction failed; nothing was registered.
    Failed {
        pending: Mutex<Option<(Error, Completion)>>,
    },
}

/// Handle to one logical request.
///
/// Dropping a task that was never started cancels it. Dropping a started
/// task lets the request run to completion.
#[must_use = "a task does nothing until it is started"]
pub struct Task {
    cell: Arc<TaskCell>,
    kind: TaskKind,
}

impl Task {
    pub(crate) fn registered(id: RequestId, cell: Arc<TaskCell>, driver: Arc<dyn TaskDriver>) -> Self {
        Self {
            cell,
            kind: TaskKind::Registered { id, driver },
        }
    }

    pub(crate) fn failed(error: Error, completion: Completion) -> Self {
        Self {
            cell: Arc::new(TaskCell::new()),
            kind: TaskKind::Failed {
                pending: Mutex::new(Some((error, completion))),
            },
        }
    }

    /// The registry id, or `None` for a request that failed construction.
    pub fn id(&self) -> Option<RequestId> {
        match &self.kind {
            TaskKind::Registered { id, .. } => Some(*id),
            TaskKind::Failed { .. } => None,
        }
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// Starts the request.
    ///
    /// A request that failed construction delivers its error synchronously,
    /// on the calling thread. Starting a cancelled task does nothing.
    ///
    /// # Panics
    ///
    /// Starting a task twice panics in debug builds; release builds log a
    /// warning and ignore the call.
    pub fn start(&self) {
        match self.cell.begin() {
            Ok(()) => match &self.kind {
                TaskKind::Registered { id, driver } => Arc::clone(driver).start(*id),
                TaskKind::Failed { pending } => {
                    let taken = pending.lock().take();
                    if let Some((error, completion)) = taken {
                        self.cell.mark_completed();
                        completion.complete_inline(Err(error));
                    }
                }
            },
            Err(TaskState::Cancelled) => debug!(id = ?self.id(), "start ignored: task was cancelled"),
            Err(state) => {
                debug_assert!(false, "task {:?} started twice (state: {state:?})", self.id());
                warn!(id = ?self.id(), ?state, "task started twice; ignoring");
            }
        }
    }

    /// Cancels the request. Idempotent; a no-op once the request finished.
    pub fn cancel(&self) {
        match &self.kind {
            TaskKind::Registered { id, driver } => {
                Arc::clone(driver).cancel(*id);
            }
            TaskKind::Failed { pending } => {
                let taken = pending.lock().take();
                if let Some((_, completion)) = taken
                    && self.cell.mark_cancelled()
                {
                    completion.complete_inline(Err(Error::Cancelled));
                }
            }
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.cell.state() == TaskState::Idle {
            self.cancel();
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// A started task awaited as a future.
///
/// Dropping the future before it resolves cancels the request.
#[must_use = "futures do nothing unless polled; dropping this cancels the request"]
pub struct TaskFuture<T> {
    task: Task,
    receiver: oneshot::Receiver<Result<T>>,
    finished: bool,
}

impl<T> TaskFuture<T> {
    pub(crate) fn new(task: Task, receiver: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            task,
            receiver,
            finished: false,
        }
    }

    /// The registry id, or `None` for a request that failed construction.
    pub fn id(&self) -> Option<RequestId> {
        self.task.id()
    }

    /// Current task state.
    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// Cancels the request; the future then resolves to [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.task.cancel();
    }
}

impl<T> Future for TaskFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = ready!(Pin::new(&mut this.receiver).poll(cx));
        this.finished = true;
        // A dropped sender means the manager went away without delivering.
        Poll::Ready(result.unwrap_or(Err(Error::Cancelled)))
    }
}

impl<T> Drop for TaskFuture<T> {
    fn drop(&mut self) {
        if !self.finished {
            self.task.cancel();
        }
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("task", &self.task)
            .field("finished", &self.finished)
            .finish()
    }
}
