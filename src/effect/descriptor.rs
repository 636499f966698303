//! Effect descriptors and their constructors.

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::buffer::Buffer;
use crate::channel::ChannelRef;
use crate::deferred::Promise;
use crate::error::SagaError;
use crate::interpreter::{CpsCallback, Task};
use crate::pattern::Pattern;
use crate::value::{Action, Value};

use super::Saga;

/// A deferred function call performed by `call` and `fork`.
pub type Invocation = Box<dyn FnOnce() -> Result<Called, SagaError>>;

/// A callback-style function performed by `cps`.
///
/// The function receives the [`CpsCallback`] it must eventually invoke.
pub type CpsInvocation = Box<dyn FnOnce(CpsCallback) -> Result<(), SagaError>>;

/// A projection of the host state performed by `select`.
pub type Selector = Box<dyn FnOnce(&Value) -> Result<Value, SagaError>>;

/// What a `call` or `fork` target produced.
pub enum Called {
    /// A plain value. A [`Value::Promise`] is awaited.
    Value(Value),
    /// A task body, run to completion as a subtask.
    Saga(Box<dyn Saga>),
}

impl Called {
    /// Wraps a task body.
    pub fn saga(body: impl Saga + 'static) -> Self {
        Self::Saga(Box::new(body))
    }
}

impl From<Value> for Called {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Promise> for Called {
    fn from(promise: Promise) -> Self {
        Self::Value(Value::Promise(promise))
    }
}

impl From<Box<dyn Saga>> for Called {
    fn from(body: Box<dyn Saga>) -> Self {
        Self::Saga(body)
    }
}

impl Debug for Called {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => formatter.debug_tuple("Value").field(value).finish(),
            Self::Saga(body) => formatter.debug_tuple("Saga").field(&body.name()).finish(),
        }
    }
}

/// The task a `cancel` effect targets.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelTarget {
    /// A specific task.
    Task(Task),
    /// The task performing the effect.
    Current,
}

/// A description of work for the interpreter to perform.
///
/// Task bodies yield effects; the interpreter runs them and resumes the body
/// with the outcome. Use the free constructor functions of this module rather
/// than building variants by hand.
pub enum Effect {
    /// Waits for the next value accepted by `pattern`.
    Take {
        /// The channel to read; `None` reads the task's action stream.
        channel: Option<ChannelRef>,
        /// Which values are accepted.
        pattern: Pattern,
        /// When set, the end-of-stream marker is delivered as a value
        /// instead of ending the task.
        maybe: bool,
    },
    /// Emits a value.
    Put {
        /// The channel to write; `None` dispatches through the host.
        channel: Option<ChannelRef>,
        /// The value to emit. Host dispatches expect a [`Value::Action`].
        value: Value,
        /// Awaits an awaitable dispatch result and propagates dispatch
        /// failures.
        resolve: bool,
    },
    /// Invokes a function and awaits its result.
    Call(Invocation),
    /// Invokes a callback-style function.
    Cps(CpsInvocation),
    /// Starts a child task.
    Fork {
        /// Produces the child's body.
        invocation: Invocation,
        /// Detached children are not attached to the parent's fork tree.
        detached: bool,
    },
    /// Waits for a task to settle.
    Join(Task),
    /// Cancels a task.
    Cancel(CancelTarget),
    /// Projects the host state.
    Select(Selector),
    /// Creates a channel buffering host actions accepted by `pattern`.
    ActionChannel {
        /// Which actions are buffered.
        pattern: Pattern,
        /// Defaults to a fixed buffer of ten entries.
        buffer: Option<Box<dyn Buffer>>,
    },
    /// Drains a channel's buffer.
    Flush(ChannelRef),
    /// Reports whether the current task has been cancelled.
    Cancelled,
    /// Runs keyed effects and resolves with the first value produced.
    Race(Vec<(String, Effect)>),
    /// Runs effects concurrently and resolves with every value, in order.
    All(Vec<Effect>),
    /// Awaits an awaitable.
    Promise(Promise),
    /// Runs a task body to completion as a subtask.
    Saga(Box<dyn Saga>),
    /// Resolves immediately with a value.
    Value(Value),
}

impl Effect {
    /// A short name of the effect kind, used by monitors and logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Take { .. } => "take",
            Self::Put { .. } => "put",
            Self::Call(_) => "call",
            Self::Cps(_) => "cps",
            Self::Fork { .. } => "fork",
            Self::Join(_) => "join",
            Self::Cancel(_) => "cancel",
            Self::Select(_) => "select",
            Self::ActionChannel { .. } => "actionChannel",
            Self::Flush(_) => "flush",
            Self::Cancelled => "cancelled",
            Self::Race(_) => "race",
            Self::All(_) => "all",
            Self::Promise(_) => "promise",
            Self::Saga(_) => "iterator",
            Self::Value(_) => "value",
        }
    }
}

impl From<Value> for Effect {
    fn from(value: Value) -> Self {
        match value {
            Value::Promise(promise) => Self::Promise(promise),
            value => Self::Value(value),
        }
    }
}

impl From<Promise> for Effect {
    fn from(promise: Promise) -> Self {
        Self::Promise(promise)
    }
}

impl Debug for Effect {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Take {
                channel,
                pattern,
                maybe,
            } => formatter
                .debug_struct("Take")
                .field("channel", &channel.is_some())
                .field("pattern", pattern)
                .field("maybe", maybe)
                .finish(),
            Self::Put {
                channel,
                value,
                resolve,
            } => formatter
                .debug_struct("Put")
                .field("channel", &channel.is_some())
                .field("value", value)
                .field("resolve", resolve)
                .finish(),
            Self::Fork { detached, .. } => formatter
                .debug_struct("Fork")
                .field("detached", detached)
                .finish_non_exhaustive(),
            Self::Join(task) => formatter.debug_tuple("Join").field(task).finish(),
            Self::Cancel(target) => formatter.debug_tuple("Cancel").field(target).finish(),
            Self::ActionChannel { pattern, .. } => formatter
                .debug_struct("ActionChannel")
                .field("pattern", pattern)
                .finish_non_exhaustive(),
            Self::Race(entries) => formatter
                .debug_map()
                .entries(entries.iter().map(|(key, effect)| (key, effect)))
                .finish(),
            Self::All(effects) => formatter.debug_list().entries(effects).finish(),
            Self::Saga(body) => formatter.debug_tuple("Saga").field(&body.name()).finish(),
            Self::Value(value) => formatter.debug_tuple("Value").field(value).finish(),
            other => formatter.write_str(other.kind()),
        }
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// Waits for the next action matching `pattern` on the task's action stream.
///
/// A closed stream ends the task.
pub fn take(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take {
        channel: None,
        pattern: pattern.into(),
        maybe: false,
    }
}

/// Like [`take`], but a closed stream resolves with the END marker.
pub fn take_maybe(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take {
        channel: None,
        pattern: pattern.into(),
        maybe: true,
    }
}

/// Waits for the next value of `channel`.
pub fn take_from(channel: &ChannelRef) -> Effect {
    Effect::Take {
        channel: Some(Rc::clone(channel)),
        pattern: Pattern::Wildcard,
        maybe: false,
    }
}

/// Like [`take_from`], but a closed channel resolves with the END marker.
pub fn take_maybe_from(channel: &ChannelRef) -> Effect {
    Effect::Take {
        channel: Some(Rc::clone(channel)),
        pattern: Pattern::Wildcard,
        maybe: true,
    }
}

/// Dispatches `action` through the host.
///
/// A dispatch failure is logged and the task continues.
pub fn put(action: Action) -> Effect {
    Effect::Put {
        channel: None,
        value: Value::Action(action),
        resolve: false,
    }
}

/// Dispatches `action` and awaits the dispatch result.
///
/// A dispatch failure is delivered to the task.
pub fn put_resolve(action: Action) -> Effect {
    Effect::Put {
        channel: None,
        value: Value::Action(action),
        resolve: true,
    }
}

/// Puts `value` into `channel`.
pub fn put_to(channel: &ChannelRef, value: impl Into<Value>) -> Effect {
    Effect::Put {
        channel: Some(Rc::clone(channel)),
        value: value.into(),
        resolve: false,
    }
}

/// Calls `function` and resolves with its result.
///
/// A returned [`Value::Promise`] is awaited.
pub fn call<F>(function: F) -> Effect
where
    F: FnOnce() -> Result<Value, SagaError> + 'static,
{
    Effect::Call(Box::new(move || function().map(Called::Value)))
}

/// Runs `body` as a subtask and resolves with its result.
pub fn call_saga(body: impl Saga + 'static) -> Effect {
    Effect::Saga(Box::new(body))
}

/// Calls a callback-style function.
pub fn cps<F>(function: F) -> Effect
where
    F: FnOnce(CpsCallback) -> Result<(), SagaError> + 'static,
{
    Effect::Cps(Box::new(function))
}

/// Starts `body` as an attached child task.
pub fn fork(body: impl Saga + 'static) -> Effect {
    fork_with(move || Ok(Called::saga(body)))
}

/// Starts the result of `invocation` as an attached child task.
///
/// A failing invocation produces an aborted child.
pub fn fork_with<F>(invocation: F) -> Effect
where
    F: FnOnce() -> Result<Called, SagaError> + 'static,
{
    Effect::Fork {
        invocation: Box::new(invocation),
        detached: false,
    }
}

/// Starts `body` as a detached task.
pub fn spawn(body: impl Saga + 'static) -> Effect {
    spawn_with(move || Ok(Called::saga(body)))
}

/// Starts the result of `invocation` as a detached task.
pub fn spawn_with<F>(invocation: F) -> Effect
where
    F: FnOnce() -> Result<Called, SagaError> + 'static,
{
    Effect::Fork {
        invocation: Box::new(invocation),
        detached: true,
    }
}

/// Waits for `task` to settle and resolves with its result.
pub fn join(task: &Task) -> Effect {
    Effect::Join(task.clone())
}

/// Cancels `task`.
pub fn cancel(task: &Task) -> Effect {
    Effect::Cancel(CancelTarget::Task(task.clone()))
}

/// Cancels the current task.
pub const fn cancel_self() -> Effect {
    Effect::Cancel(CancelTarget::Current)
}

/// Projects the host state with `selector`.
pub fn select<F>(selector: F) -> Effect
where
    F: FnOnce(&Value) -> Result<Value, SagaError> + 'static,
{
    Effect::Select(Box::new(selector))
}

/// Creates a channel buffering host actions matching `pattern`.
pub fn action_channel(pattern: impl Into<Pattern>) -> Effect {
    Effect::ActionChannel {
        pattern: pattern.into(),
        buffer: None,
    }
}

/// Like [`action_channel`] with an explicit buffer.
pub fn action_channel_with(pattern: impl Into<Pattern>, buffer: Box<dyn Buffer>) -> Effect {
    Effect::ActionChannel {
        pattern: pattern.into(),
        buffer: Some(buffer),
    }
}

/// Drains the buffer of `channel`.
pub fn flush(channel: &ChannelRef) -> Effect {
    Effect::Flush(Rc::clone(channel))
}

/// Reports whether the current task has been cancelled.
pub const fn cancelled() -> Effect {
    Effect::Cancelled
}

/// Runs keyed effects concurrently and resolves with the first value.
pub fn race<K, I>(entries: I) -> Effect
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Effect)>,
{
    Effect::Race(
        entries
            .into_iter()
            .map(|(key, effect)| (key.into(), effect))
            .collect(),
    )
}

/// Runs effects concurrently and resolves with every value.
pub fn all(effects: impl IntoIterator<Item = Effect>) -> Effect {
    Effect::All(effects.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(take("A"), "take")]
    #[case(put(Action::new("A")), "put")]
    #[case(cancelled(), "cancelled")]
    #[case(cancel_self(), "cancel")]
    #[case(all([]), "all")]
    #[case(race([("a", cancelled())]), "race")]
    #[case(call(|| Ok(Value::Undefined)), "call")]
    fn effect_kind(#[case] effect: Effect, #[case] expected: &str) {
        assert_eq!(effect.kind(), expected);
    }

    #[rstest]
    fn promise_values_become_promise_effects() {
        let promise = Promise::new();
        assert!(matches!(
            Effect::from(Value::Promise(promise)),
            Effect::Promise(_)
        ));
        assert!(matches!(Effect::from(Value::from(1)), Effect::Value(_)));
    }

    #[rstest]
    fn put_defaults_to_host_dispatch() {
        let effect = put(Action::new("SAVE"));
        assert!(matches!(
            effect,
            Effect::Put {
                channel: None,
                resolve: false,
                ..
            }
        ));
    }

    #[rstest]
    fn race_debug_lists_keys() {
        let rendered = format!("{:?}", race([("timeout", cancelled()), ("done", take("DONE"))]));
        assert!(rendered.contains("timeout"));
        assert!(rendered.contains("done"));
    }
}
