//! Streamed runs.

use futures::{Stream, future::BoxFuture};
use std::{
    collections::HashSet,
    pin::Pin,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::{
    context::Context,
    error::WorkflowError,
    event::{Event, EventKind},
};

/// Progress of the run behind a [`WorkflowStream`]
#[derive(Debug, Clone)]
pub enum StreamStatus {
    /// The dispatcher is still running
    Running,
    /// The run terminated
    Finished {
        /// The stop or error event that terminated the run
        final_event: Option<Event>,
        /// The run error, if any
        error: Option<WorkflowError>,
    },
}

impl StreamStatus {
    /// Whether the run terminated
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Spawns the run task once the `until` kinds are known
pub(crate) type Launch = Box<dyn FnOnce(HashSet<EventKind>) -> BoxFuture<'static, ()> + Send>;

/// Handle of a run executing in the background.
///
/// Yields every event the dispatcher pops, start event included, and ends
/// when the run terminates. The run task is spawned on the first poll, or on
/// [`WorkflowStream::done`] or [`WorkflowStream::close`]; the run's clock
/// starts when the stream is created.
///
/// With [`WorkflowStream::until`] the dispatcher stops right after it pops
/// the first event of a chosen kind: that event is yielded, it is never
/// handed to a step, and the stream ends.
///
/// Events are buffered up to the workflow's queue capacity. When the buffer
/// is full the dispatcher waits for the consumer, so a stream that is not
/// polled eventually stalls its run until the timeout fires.
pub struct WorkflowStream {
    ctx: Arc<Context>,
    launch: Option<Launch>,
    events: mpsc::Receiver<Event>,
    status: watch::Receiver<StreamStatus>,
    until: HashSet<EventKind>,
    closed: bool,
    terminated_early: bool,
}

impl WorkflowStream {
    pub(crate) fn new(
        ctx: Arc<Context>,
        launch: Launch,
        events: mpsc::Receiver<Event>,
        status: watch::Receiver<StreamStatus>,
    ) -> Self {
        Self {
            ctx,
            launch: Some(launch),
            events,
            status,
            until: HashSet::new(),
            closed: false,
            terminated_early: false,
        }
    }

    /// Terminate the run at the first event of any of `kinds`.
    ///
    /// Stop and error events keep their usual meaning when listed here.
    #[must_use]
    pub fn until<I, K>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EventKind>,
    {
        self.until.extend(kinds.into_iter().map(Into::into));
        self
    }

    /// The run's context
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Next event, or `None` once the stream is closed
    pub async fn next_event(&mut self) -> Option<Event> {
        futures::future::poll_fn(|cx| self.poll_event(cx)).await
    }

    /// Drain the remaining events
    pub async fn collect_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    /// The run error.
    ///
    /// `None` while the run is still going and after an early termination
    /// requested through [`WorkflowStream::until`].
    pub fn error(&self) -> Option<WorkflowError> {
        if self.terminated_early {
            return None;
        }
        match &*self.status.borrow() {
            StreamStatus::Finished { error, .. } => error.clone(),
            StreamStatus::Running => None,
        }
    }

    /// The event that terminated the run, once it finished.
    ///
    /// After an early termination this is the `until` event.
    pub fn final_event(&self) -> Option<Event> {
        match &*self.status.borrow() {
            StreamStatus::Finished { final_event, .. } => final_event.clone(),
            StreamStatus::Running => None,
        }
    }

    /// Whether the stream ended because of an `until` kind
    pub fn terminated_early(&self) -> bool {
        self.terminated_early
    }

    /// Whether the run terminated
    pub fn is_done(&self) -> bool {
        self.status.borrow().is_finished()
    }

    /// Wait until the run terminated
    pub async fn done(&mut self) {
        self.launch();
        let mut status = self.status.clone();
        // A dropped sender means the run task is gone as well.
        let _ = status.wait_for(StreamStatus::is_finished).await;
    }

    /// Stop consuming and cancel the run
    pub fn close(&mut self) {
        if !self.closed {
            // The task observes the cancelled token and publishes its outcome.
            self.launch();
            self.closed = true;
            self.events.close();
            self.ctx.cancel();
        }
    }

    fn launch(&mut self) {
        if let Some(launch) = self.launch.take() {
            tokio::spawn(launch(self.until.clone()));
        }
    }

    fn poll_event(&mut self, cx: &mut TaskContext<'_>) -> Poll<Option<Event>> {
        if self.closed {
            return Poll::Ready(None);
        }
        self.launch();
        match self.events.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if self.until.contains(event.kind()) && !event.is_stop() && !event.is_error() {
                    // The dispatcher already finished the run on this event.
                    debug!("Stream reached '{}' for run {}", event.kind(), self.ctx.run_id());
                    self.terminated_early = true;
                    self.closed = true;
                    self.events.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.closed = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Stream for WorkflowStream {
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Event>> {
        self.get_mut().poll_event(cx)
    }
}

impl Drop for WorkflowStream {
    fn drop(&mut self) {
        if self.launch.is_some() || !self.is_done() {
            self.ctx.cancel();
        }
    }
}

impl std::fmt::Debug for WorkflowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStream")
            .field("run_id", &self.ctx.run_id())
            .field("until", &self.until)
            .field("launched", &self.launch.is_none())
            .field("closed", &self.closed)
            .field("terminated_early", &self.terminated_early)
            .finish_non_exhaustive()
    }
}
