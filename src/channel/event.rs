//! Channels fed by an action source.

use std::cell::RefCell;
use std::rc::Rc;

use super::{ActionSource, BufferedChannel, Channel, Listener, Registration, Subscription, TakeCallback};
use crate::buffer::Buffer;
use crate::error::ChannelError;
use crate::pattern::Pattern;
use crate::value::{Action, Value};

type SubscriptionSlot = Rc<RefCell<Option<Subscription>>>;

/// A channel subscribed to an [`ActionSource`].
///
/// Every action emitted by the source and accepted by the channel's matcher
/// is put into the channel. The END marker closes it. Closing the channel
/// unsubscribes from the source exactly once.
///
/// Event channels are read-only: [`put`](Channel::put) fails with
/// [`ChannelError::PutUnsupported`].
pub struct EventChannel {
    channel: BufferedChannel,
    subscription: SubscriptionSlot,
}

impl EventChannel {
    /// Subscribes a new channel to `source`.
    pub fn new(source: &dyn ActionSource, buffer: Box<dyn Buffer>, matcher: Option<Pattern>) -> Self {
        Self::from_subscribe(buffer, matcher, |listener| source.subscribe(listener))
    }

    /// Builds the channel around an arbitrary subscribe function, which
    /// receives the listener feeding the channel.
    pub(crate) fn from_subscribe(
        buffer: Box<dyn Buffer>,
        matcher: Option<Pattern>,
        subscribe: impl FnOnce(Listener) -> Subscription,
    ) -> Self {
        let channel = BufferedChannel::new(buffer);
        let slot: SubscriptionSlot = Rc::default();
        let feed = {
            let channel = channel.clone();
            let slot = Rc::downgrade(&slot);
            move |action: &Action| {
                if action.is_end() {
                    channel.close();
                    if let Some(slot) = slot.upgrade() {
                        let subscription = slot.borrow_mut().take();
                        if let Some(subscription) = subscription {
                            subscription.unsubscribe();
                        }
                    }
                    return;
                }
                let input = Value::Action(action.clone());
                if matcher.as_ref().is_some_and(|matcher| !matcher.matches(&input)) {
                    return;
                }
                if let Err(error) = channel.put(input) {
                    tracing::error!(action = action.action_type(), %error, "event channel dropped an action");
                }
            }
        };
        let subscription = subscribe(Rc::new(feed));
        *slot.borrow_mut() = Some(subscription);
        Self {
            channel,
            subscription: slot,
        }
    }
}

impl Channel for EventChannel {
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
        if self.channel.is_closed() {
            return;
        }
        self.channel.close();
        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer;
    use crate::channel::Emitter;
    use rstest::rstest;

    #[rstest]
    fn buffers_only_matching_actions() {
        let emitter = Emitter::new();
        let channel = EventChannel::new(&emitter, buffer::expanding(4), Some(Pattern::from("KEEP")));

        emitter.emit(&Action::new("KEEP"));
        emitter.emit(&Action::new("SKIP"));
        emitter.emit(&Action::new("KEEP"));

        assert_eq!(
            channel.flush(),
            Value::List(vec![
                Value::from(Action::new("KEEP")),
                Value::from(Action::new("KEEP"))
            ])
        );
    }

    #[rstest]
    fn end_marker_closes_and_unsubscribes() {
        let emitter = Emitter::new();
        let channel = EventChannel::new(&emitter, buffer::fixed(2), None);
        assert_eq!(emitter.subscriber_count(), 1);

        emitter.emit(&Action::end());

        assert!(channel.is_closed());
        assert_eq!(emitter.subscriber_count(), 0);
        assert_eq!(channel.flush(), Value::end());
    }

    #[rstest]
    fn close_unsubscribes_exactly_once() {
        let emitter = Emitter::new();
        let channel = EventChannel::new(&emitter, buffer::fixed(2), None);
        channel.close();
        channel.close();
        assert_eq!(emitter.subscriber_count(), 0);
        assert_eq!(channel.put(Value::from(1)), Err(ChannelError::PutUnsupported));
    }
}
