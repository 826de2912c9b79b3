//! Integration tests for streamed workflow runs.

use cheungfun_workflow::prelude::*;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

#[derive(Debug, Clone)]
struct Complete {
    result: i64,
}

const COMPLETE: EventFactory<Complete> = EventFactory::from_static("complete");
const TICK: EventFactory<u32> = EventFactory::from_static("tick");
const AFTER: EventFactory<()> = EventFactory::from_static("after");

fn kinds(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.kind().to_string()).collect()
}

#[tokio::test]
async fn test_stream_until_custom_kind() {
    let mut workflow = Workflow::new("until");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok(vec![COMPLETE.with(Complete { result: 42 })])
        })
        .add_step(COMPLETE.kind(), |ctx, _event| async move {
            ctx.state().set("complete_handled", json!(true));
            Ok(vec![AFTER.with(())])
        })
        .add_step(AFTER.kind(), |ctx, _event| async move {
            ctx.state().set("after_handled", json!(true));
            Ok(vec![STOP.with(StopEvent::new(json!("unreachable")))])
        });

    let mut stream = workflow
        .run_stream(StartEvent::new(json!(null)))
        .until([COMPLETE.kind()]);
    let events = stream.collect_events().await;
    stream.done().await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(kinds(&events), vec!["start", "complete"]);
    assert_eq!(COMPLETE.extract(&events[1]).map(|c| c.result), Some(42));
    assert!(stream.terminated_early());
    assert!(stream.error().is_none());
    assert!(stream.context().is_done());

    let final_event = stream.final_event().unwrap();
    assert!(final_event.is(COMPLETE.kind()));
    assert!(!final_event.is_stop());
    assert!(!stream.context().state().contains_key("complete_handled"));
    assert!(!stream.context().state().contains_key("after_handled"));
}

#[tokio::test]
async fn test_stream_until_start_dispatches_nothing() {
    let invocations = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&invocations);

    let mut workflow = Workflow::new("until-start");
    workflow.add_step(EventKind::START, move |_ctx, _event| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(vec![TICK.with(1)]) }
    });

    let mut stream = workflow
        .run_stream(StartEvent::new(json!(null)))
        .until([EventKind::START]);
    let events = stream.collect_events().await;
    stream.done().await;

    assert_eq!(kinds(&events), vec!["start"]);
    assert!(stream.terminated_early());
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_slow_consumer_receives_every_event() {
    let config = WorkflowConfig::new("small-buffer").with_queue_capacity(2);
    let mut workflow = Workflow::with_config(config);
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move { Ok(vec![TICK.with(1)]) })
        .add_step(TICK.kind(), |_ctx, event| async move {
            let n = TICK.extract(&event).unwrap_or_default();
            if n >= 8 {
                Ok(vec![STOP.with(StopEvent::new(json!(n)))])
            } else {
                Ok(vec![TICK.with(n + 1)])
            }
        });

    let mut stream = workflow.run_stream(StartEvent::new(json!(null)));
    let mut ticks = Vec::new();
    while let Some(event) = stream.next_event().await {
        if let Some(n) = TICK.extract(&event) {
            ticks.push(n);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    stream.done().await;

    assert_eq!(ticks, (1..=8).collect::<Vec<u32>>());
    assert!(stream.error().is_none());
    assert!(stream.final_event().unwrap().is_stop());
}

#[tokio::test]
async fn test_stream_yields_every_event_until_stop() {
    let mut workflow = Workflow::new("ticks");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move { Ok(vec![TICK.with(1)]) })
        .add_step(TICK.kind(), |_ctx, event| async move {
            let n = TICK.extract(&event).unwrap_or_default();
            if n >= 3 {
                Ok(vec![STOP.with(StopEvent::new(json!(n)))])
            } else {
                Ok(vec![TICK.with(n + 1)])
            }
        });

    let mut stream = workflow.run_stream(StartEvent::new(json!(null)));
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    stream.done().await;

    assert_eq!(kinds(&events), vec!["start", "tick", "tick", "tick", "stop"]);
    assert!(stream.is_done());
    assert!(stream.error().is_none());
    assert!(stream.final_event().unwrap().is_stop());
}

#[tokio::test]
async fn test_stream_records_run_error() {
    let mut workflow = Workflow::new("failing-stream");
    workflow.add_step_with_config(
        EventKind::START,
        |_ctx, _event| async move { Err::<Vec<Event>, _>(WorkflowError::handler("broken pipe")) },
        StepConfig::new("reader"),
    );

    let mut stream = workflow.run_stream(StartEvent::new(json!(null)));
    let events = stream.collect_events().await;

    assert_eq!(kinds(&events), vec!["start", "error"]);
    assert_eq!(
        stream.error(),
        Some(WorkflowError::step("reader", WorkflowError::handler("broken pipe")))
    );
}

#[tokio::test]
async fn test_early_termination_stops_retries() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let mut workflow = Workflow::new("early");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move {
            Ok(vec![COMPLETE.with(Complete { result: 1 })])
        })
        .add_step_with_config(
            COMPLETE.kind(),
            move |_ctx, _event| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err::<Vec<Event>, _>(WorkflowError::handler("still failing")) }
            },
            StepConfig::new("slow-retry")
                .with_retry(RetryPolicy::new(10).with_initial_delay(Duration::from_millis(20))),
        );

    let mut stream = workflow
        .run_stream(StartEvent::new(json!(null)))
        .until([COMPLETE.kind()]);
    let events = stream.collect_events().await;
    stream.done().await;

    assert_eq!(kinds(&events), vec!["start", "complete"]);
    assert!(stream.error().is_none());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_close_cancels_run() {
    let mut workflow = Workflow::new("closable");
    workflow
        .add_step(EventKind::START, |_ctx, _event| async move { Ok(vec![TICK.with(0)]) })
        .add_step(TICK.kind(), |ctx, event| async move {
            ctx.run_cancellable(tokio::time::sleep(Duration::from_millis(5))).await?;
            Ok(vec![TICK.with(TICK.extract(&event).unwrap_or_default() + 1)])
        });

    let mut stream = workflow.run_stream(StartEvent::new(json!(null)));
    assert!(stream.next_event().await.unwrap().is(&EventKind::START));
    stream.close();
    assert!(stream.next_event().await.is_none());

    stream.done().await;
    assert_eq!(stream.error(), Some(WorkflowError::Cancelled));
}
