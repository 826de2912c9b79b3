//! Run context and outbound event queue.
//!
//! A [`Context`] is created by the runner for every run and handed to each
//! handler invocation. It bundles the run's state store, cancellation token,
//! deadline, outbound event queue and a monotonic "done" flag.
//!
//! The outbound queue is bounded and publishing never blocks: when the queue
//! is full, or the run is already done, the event is dropped and
//! [`Context::send_event`] returns `false`. Handlers can therefore fan out
//! events without risking a backpressure deadlock with the dispatcher, at the
//! price of losing events under saturation. Events returned from a handler go
//! through the same queue. Embedders that need guaranteed delivery should size
//! `queue_capacity` for their worst-case fan-out.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::WorkflowConfig,
    error::{Result, WorkflowError},
    event::{Event, EventKind},
    state::StateStore,
    step::StepIndex,
};

/// Per-run handle shared by the dispatcher and all handlers
#[derive(Debug)]
pub struct Context {
    run_id: Uuid,
    workflow_name: String,
    state: StateStore,
    cancel: CancellationToken,
    started_at: Instant,
    timeout: Duration,
    sender: mpsc::Sender<Event>,
    done: AtomicBool,
    steps: Arc<StepIndex>,
}

impl Context {
    /// Create the context of a new run and the receiving end of its queue.
    pub(crate) fn new(
        config: &WorkflowConfig,
        steps: Arc<StepIndex>,
        parent: &CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let context = Self {
            run_id: Uuid::new_v4(),
            workflow_name: config.name.clone(),
            state: StateStore::new(),
            cancel: parent.child_token(),
            started_at: Instant::now(),
            timeout: config.timeout(),
            sender,
            done: AtomicBool::new(false),
            steps,
        };
        (Arc::new(context), receiver)
    }

    /// A context not attached to any run, for exercising handlers in isolation.
    ///
    /// Events sent through it are dropped.
    #[must_use]
    pub fn detached() -> Arc<Self> {
        let (context, _receiver) = Self::new(
            &WorkflowConfig::default(),
            Arc::new(StepIndex::default()),
            &CancellationToken::new(),
        );
        context
    }

    /// Identifier of this run
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Name of the workflow being run
    #[must_use]
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// The run's shared state
    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// When the run started
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time elapsed since the run started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Configured timeout of the run
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Instant at which the run times out
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.started_at + self.timeout
    }

    /// Whether the elapsed time exceeds the timeout
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.elapsed() > self.timeout
    }

    /// Publish an event to the dispatcher.
    ///
    /// Returns `false` when the event was dropped because the run is done or
    /// the queue is full.
    pub fn send_event(&self, event: Event) -> bool {
        if self.is_done() {
            debug!("Run {} is done, dropping event '{}'", self.run_id, event.kind());
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    "Event queue of run {} is full, dropping event '{}'",
                    self.run_id,
                    event.kind()
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!("Run {} has no dispatcher, dropping event '{}'", self.run_id, event.kind());
                false
            }
        }
    }

    /// Whether the run is done; once set it never resets
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    pub(crate) fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Cancel the run. Idempotent.
    ///
    /// Marks the context done and cancels the run's token and every token
    /// derived from it.
    pub fn cancel(&self) {
        self.mark_done();
        self.cancel.cancel();
    }

    /// Whether the run's cancellation token fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A child of the run's cancellation token, to hand to downstream calls
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Race `future` against cancellation and the run deadline.
    pub async fn run_cancellable<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            () = self.cancel.cancelled() => Err(WorkflowError::Cancelled),
            () = tokio::time::sleep_until(self.deadline()) => {
                Err(WorkflowError::timeout(duration_ms(self.timeout)))
            }
            value = future => Ok(value),
        }
    }

    /// Names of the steps registered for this run, in registration order
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.step_names()
    }

    /// Whether any step accepts events of `kind`
    #[must_use]
    pub fn has_handler(&self, kind: &EventKind) -> bool {
        self.steps.has_handler(kind)
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
