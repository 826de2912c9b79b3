//! Commonly used workflow types.

pub use crate::{
    config::WorkflowConfig,
    context::Context,
    error::{Result, WorkflowError},
    event::{
        ERROR, ErrorEvent, Event, EventFactory, EventKind, HUMAN_RESPONSE, HumanResponseEvent,
        INPUT_REQUIRED, InputRequiredEvent, START, STOP, StartEvent, StopEvent,
    },
    handlers::{Middleware, apply_middleware, chain, fallback, filter, logging, recovery, when},
    hooks::WorkflowHook,
    retry::{RetryConfig, RetryPolicy},
    state::StateStore,
    step::{BoxedHandler, Handler, StepConfig, handler_fn},
    stream::WorkflowStream,
    workflow::{RunResult, Workflow},
};
