//! Dynamic values exchanged between task bodies, effects and channels.
//!
//! Effects are resolved with heterogeneous results: a `take` yields an
//! [`Action`], a `fork` yields a [`Task`], a `race` yields a keyed map, and so
//! on. [`Value`] is the closed sum of everything the interpreter can hand back
//! to a task body.
//!
//! # End of stream
//!
//! The end-of-stream marker is an ordinary action whose type is
//! [`END_TYPE`]. Dispatching it through the bridge closes every event channel
//! subscribed to the action source.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::channel::ChannelRef;
use crate::deferred::Promise;
use crate::error::SagaError;
use crate::interpreter::Task;

/// The action type of the end-of-stream marker.
pub const END_TYPE: &str = "@@redux-saga/CHANNEL_END";

// =============================================================================
// Action
// =============================================================================

/// An action flowing through the host dispatch pipeline.
///
/// Two actions are equal when their type and payload are equal; whether an
/// action was issued by the interpreter is not part of its identity.
///
/// # Examples
///
/// ```rust
/// use sagaflow::value::Action;
/// use serde_json::json;
///
/// let action = Action::new("FETCH_USER").with_payload(json!({ "id": 7 }));
/// assert_eq!(action.action_type(), "FETCH_USER");
/// assert_eq!(action.payload()["id"], 7);
/// assert!(!action.is_end());
/// ```
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Action {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    action_type: String,
    #[cfg_attr(feature = "serde", serde(default))]
    payload: serde_json::Value,
    #[cfg_attr(feature = "serde", serde(skip))]
    internal: bool,
}

impl Action {
    /// Creates an action with the given type and a `null` payload.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: serde_json::Value::Null,
            internal: false,
        }
    }

    /// Returns the end-of-stream marker.
    pub fn end() -> Self {
        Self::new(END_TYPE)
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// The action type tag.
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    /// The payload.
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Returns `true` for the end-of-stream marker.
    pub fn is_end(&self) -> bool {
        self.action_type == END_TYPE
    }

    /// Returns `true` if the action was dispatched by a running task.
    pub const fn is_internal(&self) -> bool {
        self.internal
    }

    pub(crate) fn into_internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.action_type == other.action_type && self.payload == other.payload
    }
}

impl Debug for Action {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let mut debug = formatter.debug_struct("Action");
        debug.field("type", &self.action_type);
        if !self.payload.is_null() {
            debug.field("payload", &self.payload);
        }
        if self.internal {
            debug.field("internal", &true);
        }
        debug.finish()
    }
}

// =============================================================================
// Value
// =============================================================================

/// A value produced by an effect or carried by a channel.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value. Effects with nothing to report resolve with it, and
    /// channels refuse to carry it.
    #[default]
    Undefined,
    /// Plain data.
    Data(serde_json::Value),
    /// An action.
    Action(Action),
    /// An error carried as a value; a `take` receiving it resumes the taker
    /// with the error.
    Error(SagaError),
    /// A task handle, as produced by `fork`.
    Task(Task),
    /// A channel handle, as produced by `action_channel`.
    Channel(ChannelRef),
    /// An awaitable; `put_resolve` and `call` wait for it to settle.
    Promise(Promise),
    /// An ordered list, as produced by `all` and `flush`.
    List(Vec<Value>),
    /// A keyed map, as produced by `race`.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the end-of-stream marker as a value.
    pub fn end() -> Self {
        Self::Action(Action::end())
    }

    /// Returns `true` for [`Value::Undefined`].
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns `true` if the value is the end-of-stream marker.
    pub fn is_end(&self) -> bool {
        matches!(self, Self::Action(action) if action.is_end())
    }

    /// Returns the contained action, if any.
    pub const fn as_action(&self) -> Option<&Action> {
        match self {
            Self::Action(action) => Some(action),
            _ => None,
        }
    }

    /// Returns the contained data, if any.
    pub const fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the contained boolean, if the value is boolean data.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Data(serde_json::Value::Bool(flag)) => Some(*flag),
            _ => None,
        }
    }

    /// Returns the contained integer, if the value is integral data.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(serde_json::Value::as_i64)
    }

    /// Returns the contained task handle, if any.
    pub const fn as_task(&self) -> Option<&Task> {
        match self {
            Self::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Returns the contained channel handle, if any.
    pub const fn as_channel(&self) -> Option<&ChannelRef> {
        match self {
            Self::Channel(channel) => Some(channel),
            _ => None,
        }
    }

    /// Returns the contained list, if any.
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the contained map, if any.
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) => true,
            (Self::Data(left), Self::Data(right)) => left == right,
            (Self::Action(left), Self::Action(right)) => left == right,
            (Self::Error(left), Self::Error(right)) => left == right,
            (Self::Task(left), Self::Task(right)) => left == right,
            (Self::Channel(left), Self::Channel(right)) => {
                std::ptr::addr_eq(Rc::as_ptr(left), Rc::as_ptr(right))
            }
            (Self::Promise(left), Self::Promise(right)) => left.same_as(right),
            (Self::List(left), Self::List(right)) => left == right,
            (Self::Map(left), Self::Map(right)) => left == right,
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => formatter.write_str("Undefined"),
            Self::Data(data) => write!(formatter, "Data({data})"),
            Self::Action(action) => action.fmt(formatter),
            Self::Error(error) => formatter.debug_tuple("Error").field(error).finish(),
            Self::Task(task) => task.fmt(formatter),
            Self::Channel(_) => formatter.write_str("Channel"),
            Self::Promise(promise) => promise.fmt(formatter),
            Self::List(values) => formatter.debug_list().entries(values).finish(),
            Self::Map(entries) => formatter.debug_map().entries(entries).finish(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(data: serde_json::Value) -> Self {
        Self::Data(data)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Data(serde_json::Value::Bool(flag))
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Self::Data(serde_json::Value::from(number))
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Self::Data(serde_json::Value::from(number))
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Data(serde_json::Value::from(text))
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Data(serde_json::Value::from(text))
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

impl From<Task> for Value {
    fn from(task: Task) -> Self {
        Self::Task(task)
    }
}

impl From<SagaError> for Value {
    fn from(error: SagaError) -> Self {
        Self::Error(error)
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        Self::Promise(promise)
    }
}

impl From<Vec<Self>> for Value {
    fn from(values: Vec<Self>) -> Self {
        Self::List(values)
    }
}
