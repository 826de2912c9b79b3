//! Event dispatch loop.
//!
//! The dispatcher is the single consumer of a run's event queue. It pops one
//! event at a time, records terminal events, and hands everything else to the
//! steps registered for the event's kind. Handler invocations run as tokio
//! tasks; their returned events are enqueued by the dispatcher itself, in
//! return order, before any further event is popped.
//!
//! An event is dispatched serially (the dispatcher waits for all its steps
//! before popping again) unless every matching step allows more than one
//! worker. Idle termination needs an empty queue, no in-flight invocation,
//! and the grace interval elapsed. A streamed run may also finish on a
//! caller-chosen kind, which is observed but never dispatched.

use futures::FutureExt;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{
    sync::{Semaphore, mpsc},
    task::JoinSet,
    time::{Instant, MissedTickBehavior},
};
use tracing::{Instrument, debug, error, warn};

use crate::{
    context::{Context, duration_ms},
    error::{Result, WorkflowError},
    event::{ERROR, ErrorEvent, Event, EventKind},
    hooks::WorkflowHook,
    step::{Step, StepIndex, invoke_catching_panics},
};

/// How a run ended
#[derive(Debug, Default)]
pub(crate) struct DispatchOutcome {
    pub(crate) final_event: Option<Event>,
    pub(crate) error: Option<WorkflowError>,
}

pub(crate) type Hooks = Arc<[Arc<dyn WorkflowHook>]>;

/// A step failure, reported back to the dispatcher
struct StepFailure {
    step: String,
    error: WorkflowError,
    trigger: Event,
}

struct Completion {
    serial: bool,
    result: std::result::Result<Vec<Event>, StepFailure>,
}

pub(crate) struct Dispatcher {
    ctx: Arc<Context>,
    receiver: mpsc::Receiver<Event>,
    steps: Arc<StepIndex>,
    permits: Vec<Arc<Semaphore>>,
    hooks: Hooks,
    tick_interval: Duration,
    idle_grace: Duration,
    observer: Option<mpsc::Sender<Event>>,
    until: HashSet<EventKind>,
}

impl Dispatcher {
    pub(crate) fn new(
        ctx: Arc<Context>,
        receiver: mpsc::Receiver<Event>,
        steps: Arc<StepIndex>,
        hooks: Hooks,
        tick_interval: Duration,
        idle_grace: Duration,
    ) -> Self {
        // Fresh semaphores per run: worker limits never leak across runs.
        let permits = steps
            .steps()
            .iter()
            .map(|step| Arc::new(Semaphore::new(step.config().num_workers)))
            .collect();
        Self {
            ctx,
            receiver,
            steps,
            permits,
            hooks,
            tick_interval: tick_interval.max(Duration::from_millis(1)),
            idle_grace,
            observer: None,
            until: HashSet::new(),
        }
    }

    /// Forward every popped event to `observer`, finishing the run at the
    /// first event whose kind is in `until`
    pub(crate) fn with_observer(mut self, observer: mpsc::Sender<Event>, until: HashSet<EventKind>) -> Self {
        self.observer = Some(observer);
        self.until = until;
        self
    }

    pub(crate) async fn run(mut self) -> DispatchOutcome {
        let token = self.ctx.cancellation_token();
        let deadline = self.ctx.deadline();
        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: JoinSet<Completion> = JoinSet::new();
        let mut serial_busy = false;
        let mut idle_since: Option<Instant> = None;

        let outcome = loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    debug!("Run {} cancelled", self.ctx.run_id());
                    break DispatchOutcome {
                        final_event: None,
                        error: Some(WorkflowError::Cancelled),
                    };
                }

                () = tokio::time::sleep_until(deadline) => {
                    break self.timed_out();
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    idle_since = None;
                    let completion = match joined {
                        Ok(completion) => completion,
                        Err(join_error) => {
                            // Step tasks catch handler panics themselves; this is a runtime fault.
                            error!("Step task of run {} failed: {join_error}", self.ctx.run_id());
                            self.ctx.mark_done();
                            break DispatchOutcome {
                                final_event: None,
                                error: Some(WorkflowError::panic(join_error.to_string())),
                            };
                        }
                    };
                    if completion.serial {
                        serial_busy = false;
                    }
                    match completion.result {
                        Ok(events) => {
                            for event in events {
                                self.ctx.send_event(event);
                            }
                        }
                        Err(failure) => break self.fail(failure).await,
                    }
                }

                received = self.receiver.recv(), if !serial_busy => {
                    // The context owns a sender, so the channel never closes mid-run.
                    let Some(event) = received else {
                        break DispatchOutcome::default();
                    };
                    idle_since = None;
                    if self.ctx.is_timed_out() {
                        break self.timed_out();
                    }
                    self.observe(&event).await;

                    if event.is_stop() {
                        debug!("Run {} reached stop event", self.ctx.run_id());
                        self.ctx.mark_done();
                        break DispatchOutcome {
                            final_event: Some(event),
                            error: None,
                        };
                    }
                    if event.is_error() {
                        let error = ERROR.extract(&event).map_or_else(
                            || WorkflowError::handler("error event without an error payload"),
                            |payload| payload.error,
                        );
                        warn!("Run {} terminated by error event: {error}", self.ctx.run_id());
                        self.ctx.mark_done();
                        break DispatchOutcome {
                            final_event: Some(event),
                            error: Some(error),
                        };
                    }
                    if self.until.contains(event.kind()) {
                        debug!("Run {} reached '{}', finishing early", self.ctx.run_id(), event.kind());
                        self.ctx.mark_done();
                        break DispatchOutcome {
                            final_event: Some(event),
                            error: None,
                        };
                    }

                    if let Some(serial) = self.dispatch(&mut in_flight, event) {
                        serial_busy = serial;
                    }
                }

                _ = tick.tick() => {
                    if !self.receiver.is_empty() || !in_flight.is_empty() {
                        idle_since = None;
                        continue;
                    }
                    match idle_since {
                        None => idle_since = Some(Instant::now()),
                        Some(since) if since.elapsed() >= self.idle_grace => {
                            debug!("Run {} is idle, finishing without a final event", self.ctx.run_id());
                            self.ctx.mark_done();
                            break DispatchOutcome::default();
                        }
                        Some(_) => {}
                    }
                }
            }
        };

        in_flight.abort_all();
        outcome
    }

    /// Spawn the steps matching `event`; returns whether the dispatch is
    /// serial, or `None` when no step accepts the event.
    fn dispatch(&self, in_flight: &mut JoinSet<Completion>, event: Event) -> Option<bool> {
        let positions = self.steps.positions_for(event.kind());
        if positions.is_empty() {
            debug!("No step accepts event '{}'", event.kind());
            return None;
        }

        let work: Vec<(Arc<Step>, Arc<Semaphore>)> = positions
            .iter()
            .map(|&position| {
                (
                    Arc::clone(&self.steps.steps()[position]),
                    Arc::clone(&self.permits[position]),
                )
            })
            .collect();
        let serial = work.iter().any(|(step, _)| step.config().num_workers <= 1);

        debug!(
            "Dispatching '{}' to {} step(s){}",
            event.kind(),
            work.len(),
            if serial { "" } else { " concurrently" }
        );
        let task = run_steps(Arc::clone(&self.ctx), work, event, Arc::clone(&self.hooks))
            .map(move |result| Completion { serial, result })
            .in_current_span();
        in_flight.spawn(task);
        Some(serial)
    }

    async fn observe(&self, event: &Event) {
        debug!("Dispatcher popped event '{}' ({})", event.kind(), event.id());
        for hook in self.hooks.iter() {
            hook.on_event(&self.ctx, event);
        }
        if let Some(observer) = &self.observer {
            // Waits while the stream buffer is full; cancellation and the deadline end the wait.
            tokio::select! {
                biased;
                () = self.ctx.cancelled() => {}
                () = tokio::time::sleep_until(self.ctx.deadline()) => {}
                // A closed stream only means nobody is listening any more.
                _ = observer.send(event.clone()) => {}
            }
        }
    }

    fn timed_out(&self) -> DispatchOutcome {
        warn!(
            "Run {} timed out after {:?}",
            self.ctx.run_id(),
            self.ctx.timeout()
        );
        self.ctx.mark_done();
        DispatchOutcome {
            final_event: None,
            error: Some(WorkflowError::timeout(duration_ms(self.ctx.timeout()))),
        }
    }

    /// Terminate the run after a step failure by synthesizing an error event
    async fn fail(&self, failure: StepFailure) -> DispatchOutcome {
        error!("Step '{}' failed: {}", failure.step, failure.error);
        let error = failure.error.clone();
        let event = ERROR.with(ErrorEvent::new(failure.error, failure.step).with_trigger(failure.trigger));
        self.observe(&event).await;
        self.ctx.mark_done();
        DispatchOutcome {
            final_event: Some(event),
            error: Some(error),
        }
    }
}

/// Run every matching step for one event in registration order.
///
/// Emitted events are concatenated in that order; the first failure wins.
async fn run_steps(
    ctx: Arc<Context>,
    work: Vec<(Arc<Step>, Arc<Semaphore>)>,
    event: Event,
    hooks: Hooks,
) -> std::result::Result<Vec<Event>, StepFailure> {
    let mut emitted = Vec::new();
    for (step, permits) in work {
        if ctx.is_done() {
            break;
        }
        // Semaphores are never closed while the run holds them.
        let Ok(_permit) = permits.acquire_owned().await else {
            break;
        };
        for hook in hooks.iter() {
            hook.on_step_start(&ctx, step.name(), &event);
        }
        let outcome = run_step(&ctx, &step, &event).await;
        for hook in hooks.iter() {
            hook.on_step_end(&ctx, step.name(), &event, &outcome);
        }
        match outcome {
            Ok(events) => emitted.extend(events),
            Err(error) => {
                return Err(StepFailure {
                    step: step.name().to_string(),
                    error,
                    trigger: event,
                });
            }
        }
    }
    Ok(emitted)
}

/// Invoke one step, applying its retry policy.
///
/// Timeout and cancellation are checked before every attempt. A panic that
/// escapes the handler is fatal and never retried.
async fn run_step(ctx: &Arc<Context>, step: &Step, event: &Event) -> Result<Vec<Event>> {
    let mut retries: u32 = 0;
    loop {
        if ctx.is_timed_out() {
            return Err(WorkflowError::timeout(duration_ms(ctx.timeout())));
        }
        if ctx.is_done() {
            return Err(WorkflowError::Cancelled);
        }

        let error = match invoke_catching_panics(step.handler().as_ref(), Arc::clone(ctx), event.clone()).await {
            Ok(Ok(events)) => {
                if retries > 0 {
                    debug!("Step '{}' succeeded after {} retries", step.name(), retries);
                }
                return Ok(events);
            }
            Ok(Err(error)) => error,
            Err(message) => {
                error!("Step '{}' panicked: {message}", step.name());
                return Err(WorkflowError::step(step.name(), WorkflowError::panic(message)));
            }
        };

        let Some(policy) = step.config().retry_policy.as_ref() else {
            return Err(WorkflowError::step(step.name(), error));
        };
        if !policy.should_retry(&error) {
            return Err(WorkflowError::step(step.name(), error));
        }
        if retries >= policy.max_retries {
            return Err(WorkflowError::retries_exhausted(step.name(), retries + 1, error));
        }

        retries += 1;
        let delay = policy.delay_for_attempt(retries);
        warn!(
            "Step '{}' failed (attempt {}), retrying in {:?}: {}",
            step.name(),
            retries,
            delay,
            error
        );
        tokio::select! {
            () = ctx.cancelled() => return Err(WorkflowError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
