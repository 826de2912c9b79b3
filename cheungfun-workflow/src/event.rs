//! Typed events carried through a workflow.
//!
//! An [`Event`] is an immutable `(kind, payload)` pair. The runtime only looks
//! at the kind; payloads are opaque and are recovered with an
//! [`EventFactory`], which closes over the payload type so that creating,
//! recognizing and extracting events stays type safe at the API surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    any::{Any, type_name},
    borrow::Cow,
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::Arc,
};
use uuid::Uuid;

use crate::error::WorkflowError;

/// Identifying tag of an event. Kinds compare by string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(Cow<'static, str>);

impl EventKind {
    /// Kind of the event that seeds every run
    pub const START: Self = Self::from_static("start");
    /// Kind of the event that terminates a run with a result
    pub const STOP: Self = Self::from_static("stop");
    /// Kind of the event that terminates a run with an error
    pub const ERROR: Self = Self::from_static("error");
    /// Kind of the event asking a human for input
    pub const INPUT_REQUIRED: Self = Self::from_static("input_required");
    /// Kind of the event carrying a human answer
    pub const HUMAN_RESPONSE: Self = Self::from_static("human_response");

    /// Create a kind from a static string, usable in `const` items
    #[must_use]
    pub const fn from_static(kind: &'static str) -> Self {
        Self(Cow::Borrowed(kind))
    }

    /// Create a kind from any string
    pub fn new(kind: impl Into<String>) -> Self {
        Self(Cow::Owned(kind.into()))
    }

    /// The kind as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for EventKind {
    fn from(kind: &'static str) -> Self {
        Self::from_static(kind)
    }
}

impl From<String> for EventKind {
    fn from(kind: String) -> Self {
        Self::new(kind)
    }
}

impl From<&EventKind> for EventKind {
    fn from(kind: &EventKind) -> Self {
        kind.clone()
    }
}

/// An immutable event flowing through the workflow.
///
/// Cloning an event is cheap; the payload is shared.
#[derive(Clone)]
pub struct Event {
    id: Uuid,
    kind: EventKind,
    payload: Arc<dyn Any + Send + Sync>,
    payload_type: &'static str,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event of the given kind carrying `payload`
    pub fn new<T: Any + Send + Sync>(kind: impl Into<EventKind>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload: Arc::new(payload),
            payload_type: type_name::<T>(),
            timestamp: Utc::now(),
        }
    }

    /// Create a start event
    #[must_use]
    pub fn start(input: serde_json::Value) -> Self {
        START.with(StartEvent::new(input))
    }

    /// Create a stop event
    #[must_use]
    pub fn stop(result: serde_json::Value) -> Self {
        STOP.with(StopEvent::new(result))
    }

    /// Unique identifier of this event
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Kind of this event
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Creation time of this event
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Type name of the payload, for diagnostics
    #[must_use]
    pub fn payload_type(&self) -> &'static str {
        self.payload_type
    }

    /// Whether this event has the given kind
    #[must_use]
    pub fn is(&self, kind: &EventKind) -> bool {
        &self.kind == kind
    }

    /// Whether this is a stop event
    #[must_use]
    pub fn is_stop(&self) -> bool {
        self.is(&EventKind::STOP)
    }

    /// Whether this is an error event
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.is(&EventKind::ERROR)
    }

    /// Borrow the payload if it has type `T`, regardless of kind
    #[must_use]
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("payload_type", &self.payload_type)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Typed constructor and extractor for events of one kind.
///
/// # Examples
///
/// ```rust
/// use cheungfun_workflow::{Event, EventFactory};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Process {
///     value: i64,
/// }
///
/// const PROCESS: EventFactory<Process> = EventFactory::from_static("process");
///
/// let event = PROCESS.with(Process { value: 42 });
/// assert!(PROCESS.includes(&event));
/// assert_eq!(PROCESS.extract(&event), Some(Process { value: 42 }));
/// ```
pub struct EventFactory<T> {
    kind: EventKind,
    _payload: PhantomData<fn() -> T>,
}

impl<T> EventFactory<T> {
    /// Create a factory for a static kind, usable in `const` items
    #[must_use]
    pub const fn from_static(kind: &'static str) -> Self {
        Self {
            kind: EventKind::from_static(kind),
            _payload: PhantomData,
        }
    }

    /// Create a factory for any kind
    pub fn new(kind: impl Into<EventKind>) -> Self {
        Self {
            kind: kind.into(),
            _payload: PhantomData,
        }
    }

    /// Kind produced and recognized by this factory
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Whether the event has this factory's kind
    #[must_use]
    pub fn includes(&self, event: &Event) -> bool {
        event.is(&self.kind)
    }
}

impl<T: Any + Send + Sync> EventFactory<T> {
    /// Create an event of this factory's kind
    pub fn with(&self, payload: T) -> Event {
        Event::new(self.kind.clone(), payload)
    }
}

impl<T: Any + Send + Sync + Clone> EventFactory<T> {
    /// Extract the payload.
    ///
    /// Returns `None` when the kind differs or the payload has another type.
    pub fn extract(&self, event: &Event) -> Option<T> {
        if !self.includes(event) {
            return None;
        }
        event.payload::<T>().cloned()
    }
}

impl<T> Clone for EventFactory<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> fmt::Debug for EventFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFactory")
            .field("kind", &self.kind)
            .field("payload", &type_name::<T>())
            .finish()
    }
}

/// Payload of the start event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartEvent {
    /// Caller input
    pub input: serde_json::Value,
    /// Caller metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StartEvent {
    /// Create a start payload
    #[must_use]
    pub fn new(input: serde_json::Value) -> Self {
        Self {
            input,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the start payload
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Payload of the stop event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    /// Run result
    pub result: serde_json::Value,
    /// Optional textual reason
    pub reason: Option<String>,
}

impl StopEvent {
    /// Create a stop payload
    #[must_use]
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            reason: None,
        }
    }

    /// Attach a reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Payload of the error event
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// The failure that terminates the run
    pub error: WorkflowError,
    /// Name of the step that failed
    pub step_name: String,
    /// Event that triggered the failing step, if known
    pub trigger: Option<Box<Event>>,
}

impl ErrorEvent {
    /// Create an error payload
    pub fn new(error: WorkflowError, step_name: impl Into<String>) -> Self {
        Self {
            error,
            step_name: step_name.into(),
            trigger: None,
        }
    }

    /// Record the triggering event
    #[must_use]
    pub fn with_trigger(mut self, trigger: Event) -> Self {
        self.trigger = Some(Box::new(trigger));
        self
    }
}

/// Payload of the input-required event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequiredEvent {
    /// Prompt shown to the human
    pub prompt: String,
    /// Additional metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InputRequiredEvent {
    /// Create an input-required payload
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Payload of the human-response event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanResponseEvent {
    /// The human answer
    pub response: String,
    /// Additional metadata
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HumanResponseEvent {
    /// Create a human-response payload
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            metadata: HashMap::new(),
        }
    }
}

/// Factory for start events
pub const START: EventFactory<StartEvent> = EventFactory::from_static("start");
/// Factory for stop events
pub const STOP: EventFactory<StopEvent> = EventFactory::from_static("stop");
/// Factory for error events
pub const ERROR: EventFactory<ErrorEvent> = EventFactory::from_static("error");
/// Factory for input-required events
pub const INPUT_REQUIRED: EventFactory<InputRequiredEvent> =
    EventFactory::from_static("input_required");
/// Factory for human-response events
pub const HUMAN_RESPONSE: EventFactory<HumanResponseEvent> =
    EventFactory::from_static("human_response");
