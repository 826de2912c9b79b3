//! Workflow definition and the collected runner.

use futures::FutureExt;
use serde::de::DeserializeOwned;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    config::WorkflowConfig,
    context::Context,
    dispatcher::{DispatchOutcome, Dispatcher, Hooks},
    error::{Result, WorkflowError},
    event::{Event, EventKind, START, STOP, StartEvent, StopEvent},
    hooks::WorkflowHook,
    retry::RetryPolicy,
    state::StateStore,
    step::{BoxedHandler, Step, StepConfig, StepIndex, handler_fn},
    stream::{Launch, StreamStatus, WorkflowStream},
};

/// Outcome of a collected run
#[derive(Debug)]
pub struct RunResult {
    /// Identifier of the run
    pub run_id: Uuid,
    /// The stop or error event that terminated the run; `None` on timeout,
    /// cancellation or idle termination
    pub final_event: Option<Event>,
    /// Snapshot of the run's state store
    pub final_state: StateStore,
    /// The run error, if any
    pub error: Option<WorkflowError>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl RunResult {
    /// Whether the run ended on a stop event without error
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.final_event.as_ref().is_some_and(Event::is_stop)
    }

    /// The stop payload, when the run ended on a stop event
    pub fn stop_event(&self) -> Option<StopEvent> {
        self.final_event.as_ref().and_then(|event| STOP.extract(event))
    }

    /// Deserialize the stop result into `T`
    pub fn result<T: DeserializeOwned>(&self) -> Option<T> {
        let stop = self.stop_event()?;
        serde_json::from_value(stop.result).ok()
    }

    /// The stop payload or the run error.
    ///
    /// `Ok(None)` when the run went idle without stopping.
    pub fn into_result(self) -> Result<Option<StopEvent>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.final_event.as_ref().and_then(|event| STOP.extract(event))),
        }
    }
}

/// An event-driven workflow: a set of steps reacting to event kinds.
///
/// Steps are registered while the workflow is being configured; each run
/// works on a frozen snapshot of the registration index, so a workflow can
/// be run many times, even concurrently.
pub struct Workflow {
    config: WorkflowConfig,
    index: StepIndex,
    hooks: Vec<Arc<dyn WorkflowHook>>,
}

impl Workflow {
    /// Create a workflow with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(WorkflowConfig::new(name))
    }

    /// Create a workflow from a configuration
    pub fn with_config(config: WorkflowConfig) -> Self {
        Self {
            config,
            index: StepIndex::default(),
            hooks: Vec::new(),
        }
    }

    /// Override the run timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Workflow name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Workflow configuration
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Registered steps in registration order
    pub fn steps(&self) -> &[Arc<Step>] {
        self.index.steps()
    }

    /// Register a closure for one event kind under a generated name
    pub fn add_step<K, F, Fut>(&mut self, kind: K, handler: F) -> &mut Self
    where
        K: Into<EventKind>,
        F: Fn(Arc<Context>, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Event>>> + Send + 'static,
    {
        let config = StepConfig::new(format!("step_{}", self.index.len()));
        self.add_handler([kind], handler_fn(handler), config)
    }

    /// Register a closure for one event kind with an explicit step configuration
    pub fn add_step_with_config<K, F, Fut>(&mut self, kind: K, handler: F, config: StepConfig) -> &mut Self
    where
        K: Into<EventKind>,
        F: Fn(Arc<Context>, Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Event>>> + Send + 'static,
    {
        self.add_handler([kind], handler_fn(handler), config)
    }

    /// Register a boxed handler for several event kinds.
    ///
    /// Steps without a retry policy inherit the workflow's `default_retry`.
    pub fn add_handler<I, K>(&mut self, kinds: I, handler: BoxedHandler, mut config: StepConfig) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EventKind>,
    {
        if config.retry_policy.is_none() {
            config.retry_policy = self.config.default_retry.as_ref().map(RetryPolicy::from);
        }
        let kinds: Vec<EventKind> = kinds.into_iter().map(Into::into).collect();
        if kinds.is_empty() {
            warn!("Step '{}' accepts no event kinds and will never run", config.name);
        }
        self.index.register(Step::new(kinds, handler, config));
        self
    }

    /// Register a lifecycle hook
    pub fn add_hook(&mut self, hook: Arc<dyn WorkflowHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    /// Validate the configuration and warn about an unreachable workflow
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if !self.index.has_handler(&EventKind::START) {
            warn!("Workflow '{}' has no step for the start event", self.name());
        }
        Ok(())
    }

    /// Run to completion and collect the result
    pub async fn run(&self, start: StartEvent) -> RunResult {
        self.run_with_cancellation(start, CancellationToken::new()).await
    }

    /// Run to completion; cancelling `parent` cancels the run
    pub async fn run_with_cancellation(&self, start: StartEvent, parent: CancellationToken) -> RunResult {
        let (ctx, dispatcher) = self.prepare(&parent);
        let span = info_span!("workflow_run", workflow = %self.name(), run_id = %ctx.run_id());
        let hooks = self.hook_list();
        async move {
            let outcome = drive(&ctx, dispatcher, &hooks, start).await;
            finish(&ctx, outcome)
        }
        .instrument(span)
        .await
    }

    /// Run in the background and stream every dispatched event.
    ///
    /// The run task is spawned when the stream is first used, which must
    /// happen within a tokio runtime.
    pub fn run_stream(&self, start: StartEvent) -> WorkflowStream {
        self.run_stream_with_cancellation(start, CancellationToken::new())
    }

    /// Stream a run; cancelling `parent` cancels the run
    pub fn run_stream_with_cancellation(&self, start: StartEvent, parent: CancellationToken) -> WorkflowStream {
        let (ctx, dispatcher) = self.prepare(&parent);
        let (events_tx, events_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(StreamStatus::Running);
        let hooks = self.hook_list();
        let span = info_span!("workflow_run", workflow = %self.name(), run_id = %ctx.run_id());

        let task_ctx = Arc::clone(&ctx);
        let launch: Launch = Box::new(move |until| {
            let dispatcher = dispatcher.with_observer(events_tx.clone(), until);
            async move {
                let outcome = drive(&task_ctx, dispatcher, &hooks, start).await;
                let result = finish(&task_ctx, outcome);
                // Publish the outcome before the event channel closes.
                status_tx.send_replace(StreamStatus::Finished {
                    final_event: result.final_event,
                    error: result.error,
                });
                drop(events_tx);
            }
            .instrument(span)
            .boxed()
        });

        WorkflowStream::new(ctx, launch, events_rx, status_rx)
    }

    fn prepare(&self, parent: &CancellationToken) -> (Arc<Context>, Dispatcher) {
        let steps = Arc::new(self.index.clone());
        let (ctx, receiver) = Context::new(&self.config, Arc::clone(&steps), parent);
        let dispatcher = Dispatcher::new(
            Arc::clone(&ctx),
            receiver,
            steps,
            self.hook_list(),
            self.config.tick_interval(),
            self.config.idle_grace(),
        );
        (ctx, dispatcher)
    }

    fn hook_list(&self) -> Hooks {
        self.hooks.iter().cloned().collect()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("config", &self.config)
            .field("steps", &self.index.step_names())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

async fn drive(ctx: &Arc<Context>, dispatcher: Dispatcher, hooks: &Hooks, start: StartEvent) -> DispatchOutcome {
    info!("Starting workflow run {}", ctx.run_id());
    for hook in hooks.iter() {
        hook.on_run_start(ctx);
    }
    ctx.send_event(START.with(start));
    let outcome = dispatcher.run().await;
    for hook in hooks.iter() {
        hook.on_run_end(ctx, outcome.final_event.as_ref(), outcome.error.as_ref());
    }
    outcome
}

fn finish(ctx: &Context, outcome: DispatchOutcome) -> RunResult {
    let duration = ctx.elapsed();
    match &outcome.error {
        Some(error) => warn!("Workflow run {} failed after {duration:?}: {error}", ctx.run_id()),
        None => info!("Workflow run {} finished in {duration:?}", ctx.run_id()),
    }
    RunResult {
        run_id: ctx.run_id(),
        final_event: outcome.final_event,
        final_state: ctx.state().clone(),
        error: outcome.error,
        duration,
    }
}
