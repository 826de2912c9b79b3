//! Handlers, steps and the per-run step index.

use futures::{FutureExt, future::BoxFuture};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use crate::{
    context::Context,
    error::Result,
    event::{Event, EventKind},
    retry::RetryPolicy,
};

/// Future returned by a [`Handler`] invocation
pub type HandlerFuture = BoxFuture<'static, Result<Vec<Event>>>;

/// A function reacting to an event with zero or more new events.
///
/// Every `Fn(Arc<Context>, Event) -> impl Future<Output = Result<Vec<Event>>>`
/// closure is a handler.
pub trait Handler: Send + Sync + 'static {
    /// Handle one event
    fn handle(&self, ctx: Arc<Context>, event: Event) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<Context>, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Event>>> + Send + 'static,
{
    fn handle(&self, ctx: Arc<Context>, event: Event) -> HandlerFuture {
        Box::pin(self(ctx, event))
    }
}

/// Shared, type-erased handler
pub type BoxedHandler = Arc<dyn Handler>;

/// Box a closure as a [`BoxedHandler`]
pub fn handler_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(Arc<Context>, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Event>>> + Send + 'static,
{
    Arc::new(f)
}

/// Invoke a handler, turning a panic into `Err(message)`.
///
/// Covers both a panic while building the future and one while polling it.
pub(crate) async fn invoke_catching_panics(
    handler: &dyn Handler,
    ctx: Arc<Context>,
    event: Event,
) -> std::result::Result<Result<Vec<Event>>, String> {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(ctx, event))) {
        Ok(future) => future,
        Err(payload) => return Err(panic_message(payload.as_ref())),
    };
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(payload.as_ref()))
}

/// Render a panic payload as text
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Configuration of a single step
#[derive(Debug, Clone)]
pub struct StepConfig {
    /// Step name, used in logs and error reports
    pub name: String,
    /// Maximum concurrent invocations of this step within one run (at least 1)
    pub num_workers: usize,
    /// Retry policy applied when the handler fails
    pub retry_policy: Option<RetryPolicy>,
}

impl StepConfig {
    /// Create a single-worker step without retries
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_workers: 1,
            retry_policy: None,
        }
    }

    /// Allow up to `num_workers` concurrent invocations; values below 1 are clamped
    #[must_use]
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Retry failed invocations with `policy`
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

/// A handler registered for one or more event kinds
pub struct Step {
    kinds: Vec<EventKind>,
    handler: BoxedHandler,
    config: StepConfig,
}

impl Step {
    /// Create a step
    pub fn new(kinds: Vec<EventKind>, handler: BoxedHandler, config: StepConfig) -> Self {
        Self {
            kinds,
            handler,
            config,
        }
    }

    /// Step name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Event kinds this step accepts
    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    /// Whether this step accepts `kind`
    pub fn accepts(&self, kind: &EventKind) -> bool {
        self.kinds.contains(kind)
    }

    /// Step configuration
    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    /// The step's handler
    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.config.name)
            .field("kinds", &self.kinds)
            .field("num_workers", &self.config.num_workers)
            .field("retry_policy", &self.config.retry_policy)
            .finish_non_exhaustive()
    }
}

/// Registration index mapping event kinds to steps.
///
/// Append-only while the workflow is configured; every run works on its own
/// frozen snapshot.
#[derive(Debug, Clone, Default)]
pub struct StepIndex {
    steps: Vec<Arc<Step>>,
    by_kind: HashMap<EventKind, Vec<usize>>,
}

impl StepIndex {
    pub(crate) fn register(&mut self, step: Step) {
        let position = self.steps.len();
        for kind in step.kinds() {
            let positions = self.by_kind.entry(kind.clone()).or_default();
            if !positions.contains(&position) {
                positions.push(position);
            }
        }
        self.steps.push(Arc::new(step));
    }

    /// All steps in registration order
    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }

    /// Positions of the steps accepting `kind`, in registration order
    pub fn positions_for(&self, kind: &EventKind) -> &[usize] {
        self.by_kind.get(kind).map_or(&[], Vec::as_slice)
    }

    /// Names of all steps in registration order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Whether any step accepts `kind`
    pub fn has_handler(&self, kind: &EventKind) -> bool {
        self.by_kind.contains_key(kind)
    }

    /// Number of registered steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step is registered
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
