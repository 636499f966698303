//! Settle-once continuations.

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::effect::Resume;
use crate::error::SagaError;
use crate::value::Value;

type SettleFn = Box<dyn FnOnce(Resume)>;
type CancelFn = Box<dyn FnOnce()>;

struct Slots {
    on_settle: RefCell<Option<SettleFn>>,
    on_cancel: RefCell<Option<CancelFn>>,
}

/// The continuation of one running effect.
///
/// A callback is either settled or cancelled, at most once, and never both.
/// Its cancel hook is replaceable until then; the hook of a settled callback
/// is dropped without running.
#[derive(Clone)]
pub(crate) struct Callback {
    slots: Rc<Slots>,
}

impl Callback {
    pub(crate) fn new(on_settle: impl FnOnce(Resume) + 'static) -> Self {
        Self {
            slots: Rc::new(Slots {
                on_settle: RefCell::new(Some(Box::new(on_settle))),
                on_cancel: RefCell::new(None),
            }),
        }
    }

    /// Delivers `resume`, unless the callback already settled or was
    /// cancelled.
    pub(crate) fn settle(&self, resume: Resume) {
        let on_settle = self.slots.on_settle.borrow_mut().take();
        if let Some(on_settle) = on_settle {
            let hook = self.slots.on_cancel.borrow_mut().take();
            drop(hook);
            on_settle(resume);
        }
    }

    /// Runs the cancel hook, unless the callback already settled or was
    /// cancelled.
    pub(crate) fn cancel(&self) {
        let on_settle = self.slots.on_settle.borrow_mut().take();
        if on_settle.is_none() {
            return;
        }
        drop(on_settle);
        let hook = self.slots.on_cancel.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Replaces the cancel hook.
    pub(crate) fn set_cancel(&self, hook: impl FnOnce() + 'static) {
        if self.is_done() {
            return;
        }
        let previous = self.slots.on_cancel.borrow_mut().replace(Box::new(hook));
        drop(previous);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.slots.on_settle.borrow().is_none()
    }
}

impl Debug for Callback {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Callback")
            .field("done", &self.is_done())
            .finish()
    }
}

/// The handle a callback-style function reports through.
///
/// # Examples
///
/// ```rust
/// use sagaflow::effect::{cps, CpsCallback};
/// use sagaflow::value::Value;
///
/// let effect = cps(|callback: CpsCallback| {
///     callback.on_cancel(|| println!("request aborted"));
///     callback.call(Ok(Value::from(42)));
///     Ok(())
/// });
/// # let _ = effect;
/// ```
#[derive(Clone)]
pub struct CpsCallback {
    callback: Callback,
    hook: Rc<RefCell<Option<CancelFn>>>,
}

impl CpsCallback {
    pub(crate) fn new(callback: Callback) -> Self {
        Self {
            callback,
            hook: Rc::default(),
        }
    }

    /// Reports the outcome. Only the first report is delivered.
    pub fn call(&self, result: Result<Value, SagaError>) {
        self.callback.settle(Resume::from(result));
    }

    /// Registers a function run if the effect is cancelled before a result
    /// is reported.
    pub fn on_cancel(&self, hook: impl FnOnce() + 'static) {
        *self.hook.borrow_mut() = Some(Box::new(hook));
    }

    pub(crate) fn take_cancel_hook(&self) -> Option<CancelFn> {
        self.hook.borrow_mut().take()
    }
}

impl Debug for CpsCallback {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CpsCallback")
            .field("done", &self.callback.is_done())
            .finish_non_exhaustive()
    }
}
