//! Integration tests for buffers and channels.
//!
//! Tests cover:
//! - FIFO delivery through every buffer policy
//! - Overflow behaviour of fixed, sliding, dropping and expanding buffers
//! - Taker registration, matching and withdrawal
//! - Closing semantics and the END marker
//! - Event channels fed by an emitter

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use rstest::rstest;
use sagaflow::buffer::{self, Buffer};
use sagaflow::channel::{ActionSource, BufferedChannel, Channel, Emitter, EventChannel};
use sagaflow::error::{BufferError, ChannelError};
use sagaflow::pattern::Pattern;
use sagaflow::value::{Action, Value};

type Received = Rc<RefCell<Vec<Value>>>;

fn collector(received: &Received) -> Box<dyn FnOnce(Value)> {
    let received = Rc::clone(received);
    Box::new(move |value| received.borrow_mut().push(value))
}

fn drain(channel: &dyn Channel) -> Vec<Value> {
    match channel.flush() {
        Value::List(values) => values,
        other => panic!("expected a list, got {other:?}"),
    }
}

fn numbers(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::from).collect()
}

// =============================================================================
// Buffer Policies
// =============================================================================

#[rstest]
fn fixed_buffer_rejects_overflow() {
    let channel = BufferedChannel::new(buffer::fixed(2));
    channel.put(Value::from(1)).unwrap();
    channel.put(Value::from(2)).unwrap();

    assert_eq!(
        channel.put(Value::from(3)),
        Err(ChannelError::Buffer(BufferError::Overflow { limit: 2 }))
    );
    assert_eq!(drain(&channel), numbers(&[1, 2]));
}

#[rstest]
fn none_buffer_discards_unclaimed_values() {
    let channel = BufferedChannel::new(buffer::none());
    channel.put(Value::from(1)).unwrap();
    assert_eq!(drain(&channel), Vec::<Value>::new());
}

#[rstest]
#[case(buffer::sliding(2), &[2, 3])]
#[case(buffer::dropping(2), &[0, 1])]
#[case(buffer::expanding(1), &[0, 1, 2, 3])]
fn overflow_policies(#[case] buffer: Box<dyn Buffer>, #[case] expected: &[i64]) {
    let channel = BufferedChannel::new(buffer);
    for number in 0..4 {
        channel.put(Value::from(number)).unwrap();
    }
    assert_eq!(drain(&channel), numbers(expected));
}

proptest! {
    #[test]
    fn prop_expanding_buffer_preserves_fifo(values in prop::collection::vec(any::<i64>(), 0..64)) {
        let channel = BufferedChannel::new(buffer::expanding(1));
        for value in &values {
            channel.put(Value::from(*value)).unwrap();
        }
        let received: Received = Rc::default();
        for _ in &values {
            let _ = channel.take(collector(&received), None);
        }
        prop_assert_eq!(received.borrow().clone(), numbers(&values));
    }

    #[test]
    fn prop_sliding_buffer_keeps_newest(values in prop::collection::vec(any::<i64>(), 0..32), limit in 1usize..8) {
        let channel = BufferedChannel::new(buffer::sliding(limit));
        for value in &values {
            channel.put(Value::from(*value)).unwrap();
        }
        let kept = &values[values.len().saturating_sub(limit)..];
        prop_assert_eq!(drain(&channel), numbers(kept));
    }

    #[test]
    fn prop_dropping_buffer_keeps_oldest(values in prop::collection::vec(any::<i64>(), 0..32), limit in 1usize..8) {
        let channel = BufferedChannel::new(buffer::dropping(limit));
        for value in &values {
            channel.put(Value::from(*value)).unwrap();
        }
        let kept = &values[..values.len().min(limit)];
        prop_assert_eq!(drain(&channel), numbers(kept));
    }

    #[test]
    fn prop_takers_are_served_in_registration_order(count in 1usize..16) {
        let channel = BufferedChannel::new(buffer::none());
        let received: Rc<RefCell<Vec<(usize, Value)>>> = Rc::default();
        let mut registrations = Vec::new();
        for index in 0..count {
            let received = Rc::clone(&received);
            registrations.push(channel.take(
                Box::new(move |value| received.borrow_mut().push((index, value))),
                None,
            ));
        }
        for value in 0..count {
            channel.put(Value::from(value as i64)).unwrap();
        }
        let expected: Vec<(usize, Value)> =
            (0..count).map(|index| (index, Value::from(index as i64))).collect();
        prop_assert_eq!(received.borrow().clone(), expected);
        prop_assert!(registrations.iter().all(Option::is_some));
    }

    #[test]
    fn prop_buffer_and_takers_never_coexist(operations in prop::collection::vec(operation(), 1..64)) {
        let channel = BufferedChannel::new(buffer::expanding(2));
        let received: Received = Rc::default();
        let mut registrations = Vec::new();
        for operation in operations {
            match operation {
                Operation::Put(number) => channel.put(Value::from(number)).unwrap(),
                Operation::Take => registrations.extend(channel.take(collector(&received), None)),
                Operation::Withdraw(index) => {
                    if !registrations.is_empty() {
                        let index = index % registrations.len();
                        registrations.swap_remove(index).cancel();
                    }
                }
                Operation::Flush => {
                    let _ = channel.flush();
                }
                Operation::Close => channel.close(),
            }
            prop_assert!(channel.pending_takers() == 0 || channel.is_buffer_empty());
            prop_assert!(!(channel.is_closed() && channel.pending_takers() > 0));
        }
    }
}

#[derive(Clone, Debug)]
enum Operation {
    Put(i64),
    Take,
    Withdraw(usize),
    Flush,
    Close,
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => any::<i64>().prop_map(Operation::Put),
        4 => Just(Operation::Take),
        2 => any::<usize>().prop_map(Operation::Withdraw),
        1 => Just(Operation::Flush),
        1 => Just(Operation::Close),
    ]
}

// =============================================================================
// Takers and Closing
// =============================================================================

#[rstest]
fn buffered_value_is_taken_immediately() {
    let channel = BufferedChannel::default();
    channel.put(Value::from("queued")).unwrap();
    let received: Received = Rc::default();

    let registration = channel.take(collector(&received), None);

    assert!(registration.is_none());
    assert_eq!(*received.borrow(), vec![Value::from("queued")]);
}

#[rstest]
fn close_delivers_end_to_every_pending_taker_once() {
    let channel = BufferedChannel::default();
    let received: Received = Rc::default();
    let _first = channel.take(collector(&received), None);
    let _second = channel.take(collector(&received), None);

    channel.close();
    channel.close();

    assert_eq!(*received.borrow(), vec![Value::end(), Value::end()]);
}

#[rstest]
fn closed_channel_keeps_buffer_until_drained() {
    let channel = BufferedChannel::default();
    channel.put(Value::from(1)).unwrap();
    channel.close();
    channel.put(Value::from(2)).unwrap();

    let received: Received = Rc::default();
    let _ = channel.take(collector(&received), None);
    let _ = channel.take(collector(&received), None);

    assert_eq!(*received.borrow(), vec![Value::from(1), Value::end()]);
    assert_eq!(channel.flush(), Value::end());
}

#[rstest]
fn matcher_routes_to_accepting_taker() {
    let channel = BufferedChannel::new(buffer::none());
    let received: Received = Rc::default();
    let _evens = channel.take(
        collector(&received),
        Some(Pattern::predicate(|value| value.as_i64().is_some_and(|n| n % 2 == 0))),
    );

    channel.put(Value::from(3)).unwrap();
    channel.put(Value::from(4)).unwrap();

    assert_eq!(*received.borrow(), vec![Value::from(4)]);
}

// =============================================================================
// Event Channels
// =============================================================================

#[rstest]
fn event_channel_buffers_until_taken() {
    let emitter = Emitter::new();
    let channel = EventChannel::new(&emitter, buffer::expanding(2), Some(Pattern::from(["A", "B"])));

    emitter.emit(&Action::new("A"));
    emitter.emit(&Action::new("C"));
    emitter.emit(&Action::new("B"));

    let received: Received = Rc::default();
    let _ = channel.take(collector(&received), None);
    let _ = channel.take(collector(&received), None);
    let pending = channel.take(collector(&received), None);

    assert_eq!(
        *received.borrow(),
        vec![Value::from(Action::new("A")), Value::from(Action::new("B"))]
    );

    emitter.emit(&Action::end());
    assert!(pending.is_some());
    assert_eq!(received.borrow().last(), Some(&Value::end()));
    assert_eq!(emitter.subscriber_count(), 0);
}

#[rstest]
fn custom_action_sources_are_supported() {
    struct Once(RefCell<Option<sagaflow::channel::Listener>>);

    impl ActionSource for Once {
        fn subscribe(&self, listener: sagaflow::channel::Listener) -> sagaflow::channel::Subscription {
            *self.0.borrow_mut() = Some(listener);
            sagaflow::channel::Subscription::noop()
        }
    }

    let source = Once(RefCell::new(None));
    let channel = EventChannel::new(&source, buffer::fixed(1), None);
    let listener = source.0.borrow_mut().take().unwrap();
    listener(&Action::new("PUSHED"));

    assert_eq!(drain(&channel), vec![Value::from(Action::new("PUSHED"))]);
}
