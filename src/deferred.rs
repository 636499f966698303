//! Settle-once awaitable cells.
//!
//! [`Deferred<T>`] is the callback-driven awaitable the interpreter waits on:
//! effects that cannot settle synchronously hand one back, and every task
//! exposes one through [`Task::done`](crate::interpreter::Task::done).
//!
//! A `Deferred` settles at most once. Listeners registered with
//! [`then`](Deferred::then) before settlement run when it settles; listeners
//! registered afterwards run immediately. It also implements
//! [`Future`], so a host can `.await` it from any single-threaded executor.
//!
//! # Cancellation
//!
//! A producer may attach a cancel hook with [`on_cancel`](Deferred::on_cancel).
//! When the interpreter abandons an effect waiting on the deferred (because
//! the task was cancelled or a race was lost) the hook runs once. Cancelling a
//! settled deferred does nothing.
//!
//! # Examples
//!
//! ```rust
//! use sagaflow::deferred::Promise;
//! use sagaflow::value::Value;
//!
//! let promise = Promise::new();
//! assert!(promise.peek().is_none());
//!
//! promise.resolve(Value::from(7));
//! assert_eq!(promise.peek(), Some(Ok(Value::from(7))));
//!
//! // A second settlement is ignored
//! assert!(!promise.resolve(Value::from(8)));
//! ```

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::SagaError;
use crate::value::Value;

type Listener<T> = Box<dyn FnOnce(T)>;

enum DeferredState<T> {
    Pending {
        listeners: Vec<Listener<T>>,
        wakers: Vec<Waker>,
    },
    Settled(T),
}

struct DeferredInner<T> {
    state: RefCell<DeferredState<T>>,
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// A settle-once awaitable value.
pub struct Deferred<T> {
    inner: Rc<DeferredInner<T>>,
}

/// The awaitable flavour effects work with: settles with a value or an error.
pub type Promise = Deferred<Result<Value, SagaError>>;

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Creates a pending deferred.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DeferredInner {
                state: RefCell::new(DeferredState::Pending {
                    listeners: Vec::new(),
                    wakers: Vec::new(),
                }),
                cancel: RefCell::new(None),
            }),
        }
    }

    /// Creates a deferred that is already settled with `value`.
    pub fn settled(value: T) -> Self {
        let deferred = Self::new();
        deferred.settle(value);
        deferred
    }

    /// Settles the deferred, notifying every listener and waker.
    ///
    /// Returns `false` if it had already settled; the new value is then
    /// dropped.
    pub fn settle(&self, value: T) -> bool {
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            if matches!(*state, DeferredState::Settled(_)) {
                return false;
            }
            std::mem::replace(&mut *state, DeferredState::Settled(value.clone()))
        };
        self.inner.cancel.borrow_mut().take();
        if let DeferredState::Pending { listeners, wakers } = previous {
            for listener in listeners {
                listener(value.clone());
            }
            for waker in wakers {
                waker.wake();
            }
        }
        true
    }

    /// Registers a listener for the settled value.
    ///
    /// Runs the listener immediately when the deferred has already settled.
    pub fn then(&self, listener: impl FnOnce(T) + 'static) {
        let settled = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                DeferredState::Pending { listeners, .. } => {
                    listeners.push(Box::new(listener));
                    return;
                }
                DeferredState::Settled(value) => value.clone(),
            }
        };
        listener(settled);
    }

    /// Returns the settled value, if any.
    pub fn peek(&self) -> Option<T> {
        match &*self.inner.state.borrow() {
            DeferredState::Settled(value) => Some(value.clone()),
            DeferredState::Pending { .. } => None,
        }
    }

    /// Returns `true` once the deferred has settled.
    pub fn is_settled(&self) -> bool {
        matches!(*self.inner.state.borrow(), DeferredState::Settled(_))
    }

    /// Attaches the hook run when a waiting effect is cancelled.
    ///
    /// Ignored once the deferred has settled.
    pub fn on_cancel(&self, hook: impl FnOnce() + 'static) {
        if !self.is_settled() {
            *self.inner.cancel.borrow_mut() = Some(Box::new(hook));
        }
    }

    /// Builder form of [`on_cancel`](Self::on_cancel).
    #[must_use]
    pub fn with_cancel(self, hook: impl FnOnce() + 'static) -> Self {
        self.on_cancel(hook);
        self
    }

    /// Returns `true` if a cancel hook is attached.
    pub fn is_cancellable(&self) -> bool {
        self.inner.cancel.borrow().is_some()
    }

    /// Runs the cancel hook, at most once and only while pending.
    pub fn cancel(&self) {
        if self.is_settled() {
            return;
        }
        let hook = self.inner.cancel.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred<Result<Value, SagaError>> {
    /// Settles the promise successfully.
    pub fn resolve(&self, value: impl Into<Value>) -> bool {
        self.settle(Ok(value.into()))
    }

    /// Settles the promise with an error.
    pub fn reject(&self, error: SagaError) -> bool {
        self.settle(Err(error))
    }

    /// Creates an already resolved promise.
    pub fn resolved(value: impl Into<Value>) -> Self {
        Self::settled(Ok(value.into()))
    }

    /// Creates an already rejected promise.
    pub fn rejected(error: SagaError) -> Self {
        Self::settled(Err(error))
    }
}

impl<T: Clone + 'static> Future for Deferred<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<T> {
        let mut state = self.inner.state.borrow_mut();
        match &mut *state {
            DeferredState::Settled(value) => Poll::Ready(value.clone()),
            DeferredState::Pending { wakers, .. } => {
                if !wakers.iter().any(|waker| waker.will_wake(context.waker())) {
                    wakers.push(context.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T> Debug for Deferred<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let settled = matches!(*self.inner.state.borrow(), DeferredState::Settled(_));
        formatter
            .debug_struct("Deferred")
            .field("settled", &settled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use rstest::rstest;
    use std::cell::Cell;

    #[rstest]
    fn listeners_run_on_settlement_in_registration_order() {
        let deferred = Deferred::<i32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in 0..3 {
            let seen = Rc::clone(&seen);
            deferred.then(move |value| seen.borrow_mut().push((tag, value)));
        }
        assert!(seen.borrow().is_empty());
        deferred.settle(5);
        assert_eq!(*seen.borrow(), vec![(0, 5), (1, 5), (2, 5)]);
    }

    #[rstest]
    fn late_listener_runs_immediately() {
        let deferred = Deferred::settled(3);
        let seen = Rc::new(Cell::new(0));
        let observer = Rc::clone(&seen);
        deferred.then(move |value| observer.set(value));
        assert_eq!(seen.get(), 3);
    }

    #[rstest]
    fn cancel_hook_runs_once_and_never_after_settlement() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let promise = Promise::new().with_cancel(move || counter.set(counter.get() + 1));
        promise.cancel();
        promise.cancel();
        assert_eq!(calls.get(), 1);

        let counter = Rc::clone(&calls);
        let settled = Promise::new().with_cancel(move || counter.set(counter.get() + 1));
        settled.resolve(1);
        settled.cancel();
        assert_eq!(calls.get(), 1);
    }

    #[rstest]
    fn settled_deferred_can_be_awaited() {
        let promise = Promise::rejected(SagaError::failure("boom"));
        assert_eq!(block_on(promise), Err(SagaError::failure("boom")));
    }
}
