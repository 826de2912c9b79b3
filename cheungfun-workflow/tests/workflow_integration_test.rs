//! Integration tests for collected workflow runs.

use cheungfun_workflow::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Process {
    value: i64,
}

const PROCESS: EventFactory<Process> = EventFactory::from_static("process");

fn start_input(event: &Event) -> i64 {
    START
        .extract(event)
        .and_then(|start| start.input.as_i64())
        .unwrap_or_default()
}

fn stop(result: serde_json::Value) -> Vec<Event> {
    vec![STOP.with(StopEvent::new(result))]
}

#[tokio::test]
async fn test_doubling_workflow() {
    let mut workflow = Workflow::new("doubling");
    workflow
        .add_step(EventKind::START, |_ctx, event| async move {
            Ok(vec![PROCESS.with(Process {
                value: start_input(&event) * 2,
            })])
        })
        .add_step(PROCESS.kind(), |_ctx, event| async move {
            let value = PROCESS.extract(&event).map_or(0, |p| p.value);
            Ok(stop(json!(value)))
        });

    let result = workflow.run(StartEvent::new(json!(21))).await;

    assert!(result.error.is_none());
    assert!(result.is_success());
    assert!(result.final_event.as_ref().unwrap().is_stop());
    assert_eq!(result.result::<i64>(), Some(42));
    assert!(result.final_state.is_empty());
}

#[tokio::test]
async fn test_counter_with_shared_state() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);

    let mut workflow = Workflow::new("counter");
    workflow
        .add_step(EventKind::START, |ctx, _event| async move {
            ctx.state().set("counter", 0);
            Ok(vec![PROCESS.with(Process { value: 1 })])
        })
        .add_step(PROCESS.kind(), move |ctx, event| {
            let recorder = Arc::clone(&recorder);
            async move {
                let value = PROCESS.extract(&event).map_or(0, |p| p.value);
                let counter = ctx.state().get_int("counter").unwrap_or(0) + value;
                ctx.state().set("counter", counter);
                recorder.lock().unwrap().push(counter);
                if counter >= 5 {
                    Ok(stop(json!(counter)))
                } else {
                    Ok(vec![PROCESS.with(Process { value: value + 1 })])
                }
            }
        });

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(*seen.lock().unwrap(), vec![1, 3, 6]);
    assert_eq!(result.result::<i64>(), Some(6));
    assert_eq!(result.final_state.get_int("counter"), Some(6));
}

#[tokio::test]
async fn test_retry_succeeds_on_third_attempt() {
    let _ = tracing_subscriber::fmt::try_init();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let policy = RetryPolicy::new(5)
        .with_initial_delay(Duration::from_millis(10))
        .with_multiplier(2.0);
    let mut workflow = Workflow::new("retry");
    workflow.add_step_with_config(
        EventKind::START,
        move |_ctx, _event| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(WorkflowError::handler("transient failure"))
                } else {
                    Ok(stop(json!("success")))
                }
            }
        },
        StepConfig::new("flaky").with_retry(policy),
    );

    let started = Instant::now();
    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(result.result::<String>(), Some("success".to_string()));
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(result.duration >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_zero_retries_invokes_handler_once() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let mut workflow = Workflow::new("no-retry");
    workflow.add_step_with_config(
        EventKind::START,
        move |_ctx, _event| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<Vec<Event>, _>(WorkflowError::handler("always fails")) }
        },
        StepConfig::new("doomed").with_retry(RetryPolicy::new(0)),
    );

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        result.error,
        Some(WorkflowError::retries_exhausted(
            "doomed",
            1,
            WorkflowError::handler("always fails")
        ))
    );
}

#[tokio::test]
async fn test_non_retryable_error_surfaces_immediately() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let policy = RetryPolicy::new(3)
        .with_initial_delay(Duration::from_millis(1))
        .with_predicate(|err| !err.to_string().contains("fatal"));
    let mut workflow = Workflow::new("predicate");
    workflow.add_step_with_config(
        EventKind::START,
        move |_ctx, _event| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<Vec<Event>, _>(WorkflowError::handler("fatal: bad input")) }
        },
        StepConfig::new("validate").with_retry(policy),
    );

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    let error = result.error.unwrap();
    assert!(matches!(&error, WorkflowError::Step { step, .. } if step == "validate"));
    assert_eq!(error.root_cause(), &WorkflowError::handler("fatal: bad input"));
}

#[tokio::test]
async fn test_steps_inherit_default_retry() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let config = WorkflowConfig::new("inherit").with_default_retry(RetryConfig {
        max_retries: 2,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        multiplier: 2.0,
    });
    let mut workflow = Workflow::with_config(config);
    workflow.add_step(EventKind::START, move |_ctx, _event| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt < 3 {
                Err(WorkflowError::handler("flaky"))
            } else {
                Ok(stop(json!(attempt)))
            }
        }
    });

    assert!(workflow.steps()[0].config().retry_policy.is_some());
    let result = workflow.run(StartEvent::new(json!(null))).await;
    assert_eq!(result.result::<u32>(), Some(3));
}

#[tokio::test]
async fn test_handler_error_becomes_error_event() {
    let mut workflow = Workflow::new("failing");
    workflow.add_step_with_config(
        EventKind::START,
        |_ctx, _event| async move { Err::<Vec<Event>, _>(WorkflowError::handler("boom")) },
        StepConfig::new("explode"),
    );

    let result = workflow.run(StartEvent::new(json!(7))).await;

    let error = result.error.clone().unwrap();
    assert_eq!(error, WorkflowError::step("explode", WorkflowError::handler("boom")));
    let final_event = result.final_event.as_ref().unwrap();
    assert!(final_event.is_error());
    let payload = ERROR.extract(final_event).unwrap();
    assert_eq!(payload.step_name, "explode");
    assert_eq!(start_input(payload.trigger.as_deref().unwrap()), 7);
    assert!(result.into_result().is_err());
}

#[tokio::test]
async fn test_explicit_error_event_terminates_run() {
    let mut workflow = Workflow::new("explicit-error");
    workflow.add_step(EventKind::START, |_ctx, _event| async move {
        Ok(vec![ERROR.with(ErrorEvent::new(
            WorkflowError::handler("invalid document"),
            "validate",
        ))])
    });

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(result.error, Some(WorkflowError::handler("invalid document")));
    assert!(result.final_event.unwrap().is_error());
}

#[tokio::test]
async fn test_no_start_handler_finishes_idle() {
    let workflow = Workflow::with_config(
        WorkflowConfig::new("empty").with_idle_grace(Duration::from_millis(20)),
    );

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert!(result.final_event.is_none());
    assert!(result.error.is_none());
    assert!(result.duration >= Duration::from_millis(20));
    assert_eq!(result.into_result(), Ok(None));
}

#[tokio::test]
async fn test_timeout() {
    let mut workflow = Workflow::new("slow").with_timeout(Duration::from_millis(50));
    workflow.add_step(EventKind::START, |_ctx, _event| async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(stop(json!("too late")))
    });

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(result.error, Some(WorkflowError::timeout(50)));
    assert!(result.final_event.is_none());
    assert!(result.duration < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timeout_interrupts_retries() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let mut workflow = Workflow::new("flaky").with_timeout(Duration::from_millis(70));
    workflow.add_step_with_config(
        EventKind::START,
        move |_ctx, _event| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<Vec<Event>, _>(WorkflowError::handler("still down")) }
        },
        StepConfig::new("flaky")
            .with_retry(RetryPolicy::new(100).with_initial_delay(Duration::from_millis(20))),
    );

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(result.error, Some(WorkflowError::timeout(70)));
    assert!(result.final_event.is_none());
    let seen = attempts.load(Ordering::SeqCst);
    assert!((1..100).contains(&seen));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), seen);
}

#[tokio::test]
async fn test_parent_cancellation() {
    let invocations = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&invocations);

    let mut workflow = Workflow::new("cancellable");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok(vec![PROCESS.with(Process { value: 0 })])
        })
        .add_step(PROCESS.kind(), move |ctx, event| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                // Honors cancellation instead of sleeping blindly.
                ctx.run_cancellable(tokio::time::sleep(Duration::from_millis(5)))
                    .await?;
                let value = PROCESS.extract(&event).map_or(0, |p| p.value);
                Ok(vec![PROCESS.with(Process { value: value + 1 })])
            }
        });

    let parent = CancellationToken::new();
    let trigger = parent.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        trigger.cancel();
    });

    let result = workflow.run_with_cancellation(StartEvent::new(json!(null)), parent).await;

    assert_eq!(result.error, Some(WorkflowError::Cancelled));
    assert!(result.final_event.is_none());
    let after_cancel = invocations.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(invocations.load(Ordering::SeqCst), after_cancel);
}

#[derive(Default)]
struct RecordingHook {
    log: Mutex<Vec<String>>,
}

impl RecordingHook {
    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl WorkflowHook for RecordingHook {
    fn on_run_start(&self, _ctx: &Context) {
        self.log.lock().unwrap().push("run_start".to_string());
    }

    fn on_event(&self, _ctx: &Context, event: &Event) {
        self.log.lock().unwrap().push(format!("event:{}", event.kind()));
    }

    fn on_run_end(&self, _ctx: &Context, final_event: Option<&Event>, error: Option<&WorkflowError>) {
        self.log.lock().unwrap().push(format!(
            "run_end:{}:{}",
            final_event.map_or("none", |e| e.kind().as_str()),
            error.is_some()
        ));
    }
}

#[tokio::test]
async fn test_registration_order_and_emission_order() {
    let mut workflow = Workflow::new("ordering");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok(vec![Event::new("a", ()), Event::new("b", ())])
        })
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok(vec![Event::new("c", ())])
        })
        .add_step("a", |_ctx, _event| async move { Ok(Vec::new()) })
        .add_step("b", |_ctx, _event| async move { Ok(Vec::new()) })
        .add_step("c", |_ctx, _event| async move { Ok(stop(json!("done"))) });

    let hook = Arc::new(RecordingHook::default());
    workflow.add_hook(hook.clone());

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert!(result.is_success());
    assert_eq!(
        hook.entries(),
        vec![
            "run_start",
            "event:start",
            "event:a",
            "event:b",
            "event:c",
            "event:stop",
            "run_end:stop:false",
        ]
    );
}

#[tokio::test]
async fn test_multi_worker_step_runs_concurrently() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (active_c, peak_c) = (Arc::clone(&active), Arc::clone(&peak));

    let mut workflow = Workflow::new("parallel");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok((0..4).map(|value| PROCESS.with(Process { value })).collect::<Vec<_>>())
        })
        .add_step_with_config(
            PROCESS.kind(),
            move |ctx, _event| {
                let active = Arc::clone(&active_c);
                let peak = Arc::clone(&peak_c);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);

                    let finished = ctx.state().update("finished", |v| {
                        json!(v.and_then(serde_json::Value::as_i64).unwrap_or(0) + 1)
                    });
                    if finished == json!(4) {
                        Ok(stop(finished))
                    } else {
                        Ok(Vec::new())
                    }
                }
            },
            StepConfig::new("worker").with_workers(4),
        );

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(result.result::<i64>(), Some(4));
    assert!(peak.load(Ordering::SeqCst) >= 2);
    assert!(peak.load(Ordering::SeqCst) <= 4);
}

#[tokio::test]
async fn test_single_worker_step_is_serialized() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (active_c, peak_c) = (Arc::clone(&active), Arc::clone(&peak));

    let mut workflow = Workflow::new("serial");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok((0..3).map(|value| PROCESS.with(Process { value })).collect::<Vec<_>>())
        })
        .add_step(PROCESS.kind(), move |_ctx, _event| {
            let active = Arc::clone(&active_c);
            let peak = Arc::clone(&peak_c);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        });

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert!(result.error.is_none());
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unrecovered_panic_is_fatal() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let mut workflow = Workflow::new("panicky");
    workflow.add_step_with_config(
        EventKind::START,
        move |_ctx, _event| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if true {
                    panic!("unexpected state");
                }
                Ok(Vec::new())
            }
        },
        StepConfig::new("panicky").with_retry(RetryPolicy::new(3).with_initial_delay(Duration::from_millis(1))),
    );

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        result.error.unwrap().root_cause(),
        &WorkflowError::panic("unexpected state")
    );
}

#[tokio::test]
async fn test_recovered_panic_is_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let flaky = handler_fn(move |_ctx, _event| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt == 1 {
                panic!("first call panics");
            }
            Ok(stop(json!(attempt)))
        }
    });

    let mut workflow = Workflow::new("recovered");
    workflow.add_handler(
        [EventKind::START],
        apply_middleware(flaky, &[logging(), recovery()]),
        StepConfig::new("flaky").with_retry(RetryPolicy::new(2).with_initial_delay(Duration::from_millis(1))),
    );

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(result.result::<u32>(), Some(2));
}

#[tokio::test]
async fn test_saturated_queue_drops_events() {
    let handled = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&handled);

    let config = WorkflowConfig::new("saturated")
        .with_queue_capacity(2)
        .with_idle_grace(Duration::from_millis(20));
    let mut workflow = Workflow::with_config(config);
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok((0..5).map(|value| PROCESS.with(Process { value })).collect::<Vec<_>>())
        })
        .add_step(PROCESS.kind(), move |_ctx, _event| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Vec::new()) }
        });

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert!(result.error.is_none());
    assert_eq!(handled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_context_introspection() {
    let mut workflow = Workflow::new("introspect");
    workflow
        .add_step_with_config(
            EventKind::START,
            |ctx, _event| async move {
                let names: Vec<String> = ctx.step_names().into_iter().map(String::from).collect();
                let has_process = ctx.has_handler(PROCESS.kind());
                let has_stop = ctx.has_handler(&EventKind::STOP);
                Ok(stop(json!({
                    "names": names,
                    "process": has_process,
                    "stop": has_stop,
                    "workflow": ctx.workflow_name(),
                })))
            },
            StepConfig::new("inspect"),
        )
        .add_step_with_config(
            PROCESS.kind(),
            |_ctx, _event| async move { Ok(Vec::new()) },
            StepConfig::new("process"),
        );

    let result = workflow.run(StartEvent::new(json!(null))).await;

    assert_eq!(
        result.stop_event().unwrap().result,
        json!({
            "names": ["inspect", "process"],
            "process": true,
            "stop": false,
            "workflow": "introspect",
        })
    );
}

#[tokio::test]
async fn test_human_in_the_loop_events() {
    let mut workflow = Workflow::new("approval");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok(vec![INPUT_REQUIRED.with(InputRequiredEvent::new("Approve deployment?"))])
        })
        .add_step(INPUT_REQUIRED.kind(), |_ctx, event| async move {
            let prompt = INPUT_REQUIRED.extract(&event).map(|e| e.prompt).unwrap_or_default();
            Ok(vec![HUMAN_RESPONSE.with(HumanResponseEvent::new(format!("yes: {prompt}")))])
        })
        .add_step(HUMAN_RESPONSE.kind(), |_ctx, event| async move {
            let response = HUMAN_RESPONSE.extract(&event).map(|e| e.response).unwrap_or_default();
            Ok(vec![STOP.with(StopEvent::new(json!(response)).with_reason("approved"))])
        });

    let result = workflow.run(StartEvent::new(json!(null))).await;

    let stop_event = result.stop_event().unwrap();
    assert_eq!(stop_event.result, json!("yes: Approve deployment?"));
    assert_eq!(stop_event.reason.as_deref(), Some("approved"));
}

#[tokio::test]
async fn test_workflow_can_run_repeatedly() {
    let mut workflow = Workflow::new("reusable");
    workflow.add_step(EventKind::START, |_ctx, event| async move {
        Ok(stop(json!(start_input(&event) + 1)))
    });

    let (first, second) = tokio::join!(
        workflow.run(StartEvent::new(json!(1))),
        workflow.run(StartEvent::new(json!(10)))
    );

    assert_eq!(first.result::<i64>(), Some(2));
    assert_eq!(second.result::<i64>(), Some(11));
    assert_ne!(first.run_id, second.run_id);
}
