//! The plain buffered channel.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::{Channel, ChannelRef, Registration, TakeCallback};
use crate::buffer::{self, Buffer, DEFAULT_LIMIT};
use crate::error::ChannelError;
use crate::pattern::Pattern;
use crate::value::Value;

const INLINE_TAKERS: usize = 4;

struct Taker {
    id: u64,
    matcher: Option<Pattern>,
    callback: TakeCallback,
}

impl Taker {
    fn accepts(&self, input: &Value) -> bool {
        self.matcher
            .as_ref()
            .is_none_or(|matcher| matcher.matches(input))
    }
}

struct ChannelState {
    closed: bool,
    takers: SmallVec<[Taker; INLINE_TAKERS]>,
    buffer: Box<dyn Buffer>,
    next_taker: u64,
}

impl ChannelState {
    fn check_forbidden_states(&self) {
        assert!(
            !(self.closed && !self.takers.is_empty()),
            "internal error: cannot have a closed channel with pending takers"
        );
        assert!(
            self.takers.is_empty() || self.buffer.is_empty(),
            "internal error: cannot have pending takers with non empty buffer"
        );
    }
}

/// A channel fed by explicit `put` calls.
///
/// Clones share the same queue.
///
/// # Examples
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use sagaflow::channel::{BufferedChannel, Channel};
/// use sagaflow::value::Value;
///
/// let channel = BufferedChannel::default();
/// channel.put(Value::from(1)).unwrap();
///
/// let received = Rc::new(RefCell::new(None));
/// let slot = Rc::clone(&received);
/// let registration = channel.take(Box::new(move |value| *slot.borrow_mut() = Some(value)), None);
///
/// assert!(registration.is_none());
/// assert_eq!(*received.borrow(), Some(Value::from(1)));
/// ```
#[derive(Clone)]
pub struct BufferedChannel {
    state: Rc<RefCell<ChannelState>>,
}

impl BufferedChannel {
    /// Creates an open channel backed by `buffer`.
    pub fn new(buffer: Box<dyn Buffer>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ChannelState {
                closed: false,
                takers: SmallVec::new(),
                buffer,
                next_taker: 0,
            })),
        }
    }

    /// Wraps the channel into a shared handle.
    pub fn into_ref(self) -> ChannelRef {
        Rc::new(self)
    }

    /// Returns the number of pending takers.
    pub fn pending_takers(&self) -> usize {
        self.state.borrow().takers.len()
    }

    /// Returns `true` if the buffer holds no value.
    pub fn is_buffer_empty(&self) -> bool {
        self.state.borrow().buffer.is_empty()
    }

    fn withdraw(state: &Weak<RefCell<ChannelState>>, id: u64) {
        if let Some(state) = state.upgrade() {
            state.borrow_mut().takers.retain(|taker| taker.id != id);
        }
    }
}

impl Default for BufferedChannel {
    fn default() -> Self {
        Self::new(buffer::fixed(DEFAULT_LIMIT))
    }
}

impl Channel for BufferedChannel {
    fn take(&self, callback: TakeCallback, matcher: Option<Pattern>) -> Option<Registration> {
        let immediate = {
            let mut state = self.state.borrow_mut();
            state.check_forbidden_states();
            if state.closed && state.buffer.is_empty() {
                Value::end()
            } else if let Some(value) = state.buffer.take() {
                value
            } else {
                let id = state.next_taker;
                state.next_taker += 1;
                state.takers.push(Taker {
                    id,
                    matcher,
                    callback,
                });
                let weak = Rc::downgrade(&self.state);
                return Some(Registration::new(move || Self::withdraw(&weak, id)));
            }
        };
        callback(immediate);
        None
    }

    fn put(&self, value: Value) -> Result<(), ChannelError> {
        let taker = {
            let mut state = self.state.borrow_mut();
            state.check_forbidden_states();
            if value.is_undefined() {
                return Err(ChannelError::UndefinedInput);
            }
            if state.closed {
                return Ok(());
            }
            if state.takers.is_empty() {
                return state.buffer.put(value).map_err(ChannelError::from);
            }
            match state.takers.iter().position(|taker| taker.accepts(&value)) {
                Some(index) => state.takers.remove(index),
                None => return Ok(()),
            }
        };
        (taker.callback)(value);
        Ok(())
    }

    fn flush(&self) -> Value {
        let mut state = self.state.borrow_mut();
        state.check_forbidden_states();
        if state.closed && state.buffer.is_empty() {
            return Value::end();
        }
        Value::List(state.buffer.flush())
    }

    fn close(&self) {
        let takers = {
            let mut state = self.state.borrow_mut();
            state.check_forbidden_states();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.takers)
        };
        for taker in takers {
            (taker.callback)(Value::end());
        }
    }

    fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Action;
    use rstest::rstest;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<(&'static str, Value)>>>;

    fn taker(log: &Log, tag: &'static str) -> TakeCallback {
        let log = Rc::clone(log);
        Box::new(move |value| log.borrow_mut().push((tag, value)))
    }

    #[rstest]
    fn put_goes_to_first_matching_taker() {
        let channel = BufferedChannel::default();
        let log: Log = Rc::default();
        let _first = channel.take(taker(&log, "a"), Some(Pattern::from("A")));
        let _second = channel.take(taker(&log, "b"), None);

        channel.put(Value::from(Action::new("B"))).unwrap();

        assert_eq!(*log.borrow(), vec![("b", Value::from(Action::new("B")))]);
        assert_eq!(channel.pending_takers(), 1);
    }

    #[rstest]
    fn unmatched_put_is_dropped_while_takers_wait() {
        let channel = BufferedChannel::default();
        let log: Log = Rc::default();
        let _pending = channel.take(taker(&log, "a"), Some(Pattern::from("A")));

        channel.put(Value::from(Action::new("B"))).unwrap();

        assert!(log.borrow().is_empty());
        assert!(channel.is_buffer_empty());
        assert_eq!(channel.pending_takers(), 1);
    }

    #[rstest]
    fn cancelled_registration_is_withdrawn() {
        let channel = BufferedChannel::default();
        let log: Log = Rc::default();
        let registration = channel.take(taker(&log, "a"), None).unwrap();
        registration.cancel();
        channel.put(Value::from(1)).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(channel.flush(), Value::List(vec![Value::from(1)]));
    }

    #[rstest]
    fn undefined_input_is_refused() {
        let channel = BufferedChannel::default();
        assert_eq!(
            channel.put(Value::Undefined),
            Err(ChannelError::UndefinedInput)
        );
    }

    #[rstest]
    fn taker_may_reenter_the_channel() {
        let channel = BufferedChannel::default();
        let log: Log = Rc::default();
        let inner_channel = channel.clone();
        let inner_log = Rc::clone(&log);
        let _registration = channel.take(
            Box::new(move |value| {
                inner_log.borrow_mut().push(("outer", value));
                inner_channel.put(Value::from(2)).unwrap();
            }),
            None,
        );
        channel.put(Value::from(1)).unwrap();
        assert_eq!(*log.borrow(), vec![("outer", Value::from(1))]);
        assert_eq!(channel.flush(), Value::List(vec![Value::from(2)]));
    }
}
