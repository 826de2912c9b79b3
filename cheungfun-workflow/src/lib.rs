//! # Cheungfun Workflow
//!
//! Event-driven workflow runtime for Cheungfun.
//!
//! A [`Workflow`] is a set of steps, each reacting to one or more event kinds
//! and emitting further events. A run starts from a single start event and
//! ends on a stop event, an error event, a timeout, cancellation, or when no
//! work is left.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cheungfun_workflow::prelude::*;
//! use serde_json::json;
//!
//! #[derive(Debug, Clone)]
//! struct Process {
//!     value: i64,
//! }
//!
//! const PROCESS: EventFactory<Process> = EventFactory::from_static("process");
//!
//! # async fn example() {
//! let mut workflow = Workflow::new("doubler");
//! workflow
//!     .add_step(EventKind::START, |_ctx, event| async move {
//!         let input = START.extract(&event).and_then(|s| s.input.as_i64()).unwrap_or(0);
//!         Ok(vec![PROCESS.with(Process { value: input * 2 })])
//!     })
//!     .add_step(PROCESS.kind(), |_ctx, event| async move {
//!         let value = PROCESS.extract(&event).map_or(0, |p| p.value);
//!         Ok(vec![STOP.with(StopEvent::new(json!(value)))])
//!     });
//!
//! let result = workflow.run(StartEvent::new(json!(21))).await;
//! assert_eq!(result.result::<i64>(), Some(42));
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
mod dispatcher;
pub mod error;
pub mod event;
pub mod handlers;
pub mod hooks;
pub mod prelude;
pub mod retry;
pub mod state;
pub mod step;
pub mod stream;
pub mod workflow;

pub use config::WorkflowConfig;
pub use context::Context;
pub use error::{Result, WorkflowError};
pub use event::{Event, EventFactory, EventKind};
pub use hooks::WorkflowHook;
pub use retry::{RetryConfig, RetryPolicy};
pub use state::StateStore;
pub use step::{BoxedHandler, Handler, Step, StepConfig, handler_fn};
pub use stream::WorkflowStream;
pub use workflow::{RunResult, Workflow};
