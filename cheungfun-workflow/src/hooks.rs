//! Lifecycle hooks.
//!
//! Hooks observe a run without taking part in it. They are called inline on
//! the dispatcher or the step task, so they should return quickly.

use crate::{
    context::Context,
    error::{Result, WorkflowError},
    event::Event,
};

/// Observer of workflow runs; every method defaults to a no-op
pub trait WorkflowHook: Send + Sync {
    /// Called once before the start event is dispatched
    fn on_run_start(&self, _ctx: &Context) {}

    /// Called for every event the dispatcher pops, including start, stop and error
    fn on_event(&self, _ctx: &Context, _event: &Event) {}

    /// Called before a step handles an event
    fn on_step_start(&self, _ctx: &Context, _step: &str, _event: &Event) {}

    /// Called after a step finished handling an event, retries included
    fn on_step_end(&self, _ctx: &Context, _step: &str, _event: &Event, _outcome: &Result<Vec<Event>>) {}

    /// Called once when the run terminates
    fn on_run_end(&self, _ctx: &Context, _final_event: Option<&Event>, _error: Option<&WorkflowError>) {}
}
