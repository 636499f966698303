//! Error types for the saga runtime.
//!
//! Errors are values in this crate: a failure raised by one task body can be
//! delivered to every joiner of that task, stored as the task's result, and
//! carried through channels. For that reason every error type here is
//! `Clone + PartialEq`.
//!
//! # Taxonomy
//!
//! - [`SagaError`]: the error a task body observes or settles with.
//! - [`ChannelError`]: recoverable failures of channel operations.
//! - [`BufferError`]: admission failures reported by a [`Buffer`](crate::buffer::Buffer).
//! - [`Interrupt`]: why an awaited effect did not produce a value inside an
//!   async task body.
//!
//! Internal invariant violations (a closed channel with pending takers, or
//! pending takers next to a non-empty buffer) are not represented here: they
//! indicate a bug and panic immediately.

use thiserror::Error;

/// Errors reported by a buffer when it refuses a value.
///
/// # Examples
///
/// ```rust
/// use sagaflow::error::BufferError;
///
/// let error = BufferError::Overflow { limit: 10 };
/// assert_eq!(format!("{error}"), "channel's buffer overflow (limit 10)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A fixed-capacity buffer was full.
    #[error("channel's buffer overflow (limit {limit})")]
    Overflow {
        /// The capacity of the buffer.
        limit: usize,
    },
}

/// Errors that can occur when operating on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// `put` was called with [`Value::Undefined`](crate::value::Value::Undefined).
    #[error("a saga was provided with an undefined input")]
    UndefinedInput,

    /// The channel only supports `take`, `flush` and `close`.
    #[error("this channel does not accept puts")]
    PutUnsupported,

    /// The buffer backing the channel refused the value.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// The error type observed by task bodies and stored on aborted tasks.
///
/// # Examples
///
/// ```rust
/// use sagaflow::error::SagaError;
///
/// let error = SagaError::failure("user not found");
/// assert_eq!(format!("{error}"), "user not found");
/// assert_eq!(error, SagaError::Failure("user not found".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// An application-level failure raised by a task body, a called
    /// function, an awaitable or a callback-style function.
    #[error("{0}")]
    Failure(String),

    /// A channel operation failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// `run` was invoked on a bridge that is not attached to a store.
    #[error("before running a saga, the middleware must be attached to a store")]
    NotAttached,

    /// An async task body awaited a future that the interpreter does not drive.
    #[error("saga `{name}` awaited a future that is not an effect")]
    Stalled {
        /// The name of the stalled task.
        name: String,
    },

    /// An effect was given an input it cannot work with.
    #[error("unsupported effect input: {0}")]
    Unsupported(String),
}

impl SagaError {
    /// Creates an application-level failure from any displayable message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }
}

impl From<BufferError> for SagaError {
    fn from(error: BufferError) -> Self {
        Self::Channel(ChannelError::Buffer(error))
    }
}

/// Why an effect awaited by an async task body produced no value.
///
/// Task bodies written with [`routine`](crate::effect::routine) propagate it
/// with `?`. A body that returns [`Interrupt::Cancelled`] or
/// [`Interrupt::End`] finishes normally; [`Interrupt::Error`] fails the task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Interrupt {
    /// The effect failed.
    #[error(transparent)]
    Error(#[from] SagaError),

    /// The task was cancelled while suspended.
    #[error("the task was cancelled")]
    Cancelled,

    /// A `take` observed a closed channel.
    #[error("the channel was closed")]
    End,
}

impl From<ChannelError> for Interrupt {
    fn from(error: ChannelError) -> Self {
        Self::Error(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn buffer_error_converts_through_channel_error() {
        let error: SagaError = BufferError::Overflow { limit: 2 }.into();
        assert_eq!(
            error,
            SagaError::Channel(ChannelError::Buffer(BufferError::Overflow { limit: 2 }))
        );
        assert_eq!(format!("{error}"), "channel's buffer overflow (limit 2)");
    }

    #[rstest]
    #[case(ChannelError::UndefinedInput, "a saga was provided with an undefined input")]
    #[case(ChannelError::PutUnsupported, "this channel does not accept puts")]
    fn channel_error_display(#[case] error: ChannelError, #[case] expected: &str) {
        assert_eq!(format!("{error}"), expected);
    }

    #[rstest]
    fn interrupt_wraps_saga_errors_transparently() {
        let interrupt: Interrupt = ChannelError::PutUnsupported.into();
        assert_eq!(format!("{interrupt}"), "this channel does not accept puts");
        assert_eq!(
            interrupt,
            Interrupt::Error(SagaError::Channel(ChannelError::PutUnsupported))
        );
    }

    #[rstest]
    fn stalled_error_names_the_task() {
        let error = SagaError::Stalled {
            name: "watcher".to_string(),
        };
        assert_eq!(
            format!("{error}"),
            "saga `watcher` awaited a future that is not an effect"
        );
    }
}
