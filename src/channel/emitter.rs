//! Action sources and the publish/subscribe bus.

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::value::Action;

/// A subscriber callback.
pub type Listener = Rc<dyn Fn(&Action)>;

/// A push-based source of actions.
pub trait ActionSource {
    /// Registers `listener` for every subsequently emitted action.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

/// Handle returned by [`ActionSource::subscribe`].
///
/// The listener stays registered until [`unsubscribe`](Self::unsubscribe)
/// is called.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    unsubscribe: Box<dyn FnOnce()>,
}

impl Subscription {
    /// Creates a subscription running `unsubscribe` when released.
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Box::new(unsubscribe),
        }
    }

    /// A subscription that has nothing to release.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Removes the listener from its source.
    pub fn unsubscribe(self) {
        (self.unsubscribe)();
    }
}

impl Debug for Subscription {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("Subscription")
    }
}

#[derive(Default)]
struct EmitterInner {
    subscribers: Vec<(u64, Listener)>,
    next_id: u64,
}

/// A synchronous publish/subscribe bus.
///
/// `emit` notifies a snapshot of the subscribers taken when it starts, so
/// listeners may subscribe or unsubscribe while being notified.
///
/// # Examples
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use sagaflow::channel::{ActionSource, Emitter};
/// use sagaflow::value::Action;
///
/// let emitter = Emitter::new();
/// let count = Rc::new(Cell::new(0));
/// let observer = Rc::clone(&count);
/// let subscription = emitter.subscribe(Rc::new(move |_: &Action| observer.set(observer.get() + 1)));
///
/// emitter.emit(&Action::new("PING"));
/// subscription.unsubscribe();
/// emitter.emit(&Action::new("PING"));
///
/// assert_eq!(count.get(), 1);
/// ```
#[derive(Clone, Default)]
pub struct Emitter {
    inner: Rc<RefCell<EmitterInner>>,
}

impl Emitter {
    /// Creates a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifies every current subscriber of `action`.
    pub fn emit(&self, action: &Action) {
        let snapshot: Vec<Listener> = self
            .inner
            .borrow()
            .subscribers
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(action);
        }
    }

    /// Returns the number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Drops every registered listener.
    pub fn clear(&self) {
        let subscribers = std::mem::take(&mut self.inner.borrow_mut().subscribers);
        drop(subscribers);
    }
}

impl ActionSource for Emitter {
    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, listener));
            id
        };
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed: Vec<(u64, Listener)> = {
                    let mut inner = inner.borrow_mut();
                    let (removed, kept) = std::mem::take(&mut inner.subscribers)
                        .into_iter()
                        .partition(|(subscriber, _)| *subscriber == id);
                    inner.subscribers = kept;
                    removed
                };
                drop(removed);
            }
        })
    }
}

impl Debug for Emitter {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Emitter")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
