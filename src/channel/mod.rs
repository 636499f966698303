//! Channels connecting producers to consumers.
//!
//! A channel is a queue with a terminal *closed* state. Producers `put`
//! values; consumers `take` them by registering a one-shot callback. A value
//! put while a matching taker is waiting goes straight to that taker; a value
//! put while nobody is waiting goes to the channel's [`Buffer`].
//!
//! # Channel kinds
//!
//! - [`BufferedChannel`]: the plain channel, fed by explicit `put` calls.
//! - [`EventChannel`]: fed by an [`ActionSource`]; closes on the END marker.
//! - [`StdChannel`]: the per-task channel behind `take(pattern)`. Actions
//!   dispatched by tasks reach it synchronously, actions dispatched from
//!   outside are deferred through the [`Scheduler`].
//!
//! # Invariants
//!
//! - A channel never holds pending takers next to a non-empty buffer.
//! - A closed channel never holds pending takers.
//!
//! Both are checked before every operation; a violation is a bug in the
//! channel or in a [`Buffer`] implementation and panics.
//!
//! [`Buffer`]: crate::buffer::Buffer
//! [`Scheduler`]: crate::scheduler::Scheduler

mod buffered;
mod emitter;
mod event;
mod standard;

use std::rc::Rc;

pub use buffered::BufferedChannel;
pub use emitter::{ActionSource, Emitter, Listener, Subscription};
pub use event::EventChannel;
pub use standard::StdChannel;

use crate::error::ChannelError;
use crate::pattern::Pattern;
use crate::value::Value;

/// The one-shot callback a taker registers.
pub type TakeCallback = Box<dyn FnOnce(Value)>;

/// A shared, type-erased channel handle.
pub type ChannelRef = Rc<dyn Channel>;

/// Operations every channel supports.
pub trait Channel {
    /// Delivers the oldest buffered value to `callback`, or END if the
    /// channel is closed and drained, or registers `callback` to receive the
    /// next put value accepted by `matcher`.
    ///
    /// Returns a [`Registration`] only when the callback was registered.
    fn take(&self, callback: TakeCallback, matcher: Option<Pattern>) -> Option<Registration>;

    /// Delivers `value` to the first waiting taker that accepts it, or hands
    /// it to the buffer when nobody is waiting. Does nothing once closed.
    ///
    /// # Errors
    ///
    /// Returns an error for [`Value::Undefined`], when the buffer refuses the
    /// value, or when the channel does not accept puts.
    fn put(&self, value: Value) -> Result<(), ChannelError>;

    /// Drains the buffer into a [`Value::List`], or returns END if the
    /// channel is closed and drained.
    fn flush(&self) -> Value;

    /// Closes the channel, handing END to every pending taker.
    fn close(&self);

    /// Returns `true` once the channel is closed.
    fn is_closed(&self) -> bool;
}

/// A pending taker registration.
///
/// Dropping the registration leaves the taker registered; call
/// [`cancel`](Self::cancel) to withdraw it.
#[must_use = "dropping a registration does not withdraw the taker"]
pub struct Registration {
    cancel: Box<dyn FnOnce()>,
}

impl Registration {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    /// Withdraws the taker. Does nothing if it was already served.
    pub fn cancel(self) {
        (self.cancel)();
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("Registration")
    }
}
