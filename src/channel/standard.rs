//! The per-task standard channel.

use std::rc::Rc;

use super::{ActionSource, Channel, EventChannel, Registration, TakeCallback};
use crate::buffer;
use crate::error::ChannelError;
use crate::pattern::Pattern;
use crate::scheduler::Scheduler;
use crate::value::{Action, Value};

/// The channel behind `take(pattern)` effects.
///
/// Each interpreter instance owns one, subscribed to the runtime's action
/// source. Actions dispatched by running tasks are delivered synchronously,
/// since they already execute inside a scheduler turn. Actions arriving from
/// outside are routed through [`Scheduler::asap`], so they never interleave
/// with a delivery in progress.
///
/// The channel is unbuffered: an action nobody is waiting for is discarded.
pub struct StdChannel {
    channel: EventChannel,
}

impl StdChannel {
    /// Subscribes a new standard channel to `source`.
    pub fn new(source: &dyn ActionSource, scheduler: &Scheduler) -> Self {
        let scheduler = scheduler.clone();
        let channel = EventChannel::from_subscribe(buffer::none(), None, |deliver| {
            source.subscribe(Rc::new(move |action: &Action| {
                if action.is_internal() {
                    deliver(action);
                    return;
                }
                let deliver = Rc::clone(&deliver);
                let action = action.clone();
                scheduler.asap(move || deliver(&action));
            }))
        });
        Self { channel }
    }
}

impl Channel for StdChannel {
    fn take(&self, callback: TakeCallback, matcher: Option<Pattern>) -> Option<Registration> {
        self.channel.take(callback, matcher)
    }

    fn put(&self, _value: Value) -> Result<(), ChannelError> {
        Err(ChannelError::PutUnsupported)
    }

    fn flush(&self) -> Value {
        self.channel.flush()
    }

    fn close(&self) {
        self.channel.close();
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}
