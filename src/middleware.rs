//! Integration with a host dispatch pipeline.
//!
//! The host owns a [`Store`]: something that dispatches actions through a
//! chain of middleware stages and exposes its state. [`SagaMiddleware`] is
//! one such stage. Every action passing through it is forwarded to the next
//! stage and then emitted to the running tasks.
//!
//! # Examples
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use sagaflow::effect::routine;
//! use sagaflow::error::SagaError;
//! use sagaflow::middleware::{SagaMiddleware, Store};
//! use sagaflow::options::SagaOptions;
//! use sagaflow::value::{Action, Value};
//!
//! struct Log {
//!     middleware: SagaMiddleware,
//!     seen: RefCell<Vec<String>>,
//! }
//!
//! impl Store for Log {
//!     fn dispatch(&self, action: Action) -> Result<Value, SagaError> {
//!         self.middleware.process(action, |action| {
//!             self.seen.borrow_mut().push(action.action_type().to_string());
//!             Ok(Value::Undefined)
//!         })
//!     }
//!
//!     fn state(&self) -> Value {
//!         Value::from(self.seen.borrow().len() as i64)
//!     }
//! }
//!
//! let store = Rc::new(Log {
//!     middleware: SagaMiddleware::new(SagaOptions::default()),
//!     seen: RefCell::default(),
//! });
//! store.middleware.attach(&store);
//! store
//!     .middleware
//!     .run(routine(|cx| async move {
//!         cx.take("PING").await?;
//!         cx.put(Action::new("PONG")).await
//!     }))
//!     .unwrap();
//!
//! store.dispatch(Action::new("PING")).unwrap();
//! assert_eq!(*store.seen.borrow(), ["PING", "PONG"]);
//! ```

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::channel::Emitter;
use crate::effect::Saga;
use crate::error::SagaError;
use crate::interpreter::{Runtime, Task};
use crate::monitor::SagaMonitor;
use crate::options::SagaOptions;
use crate::value::{Action, Value};

/// The host pipeline the bridge is attached to.
pub trait Store {
    /// Sends `action` through the whole pipeline, this bridge included.
    ///
    /// # Errors
    ///
    /// Returns whatever error a stage or the reducer raised.
    fn dispatch(&self, action: Action) -> Result<Value, SagaError>;

    /// The current host state.
    fn state(&self) -> Value;
}

struct Mounted {
    emitter: Emitter,
    runtime: Runtime,
    roots: Vec<Task>,
}

struct BridgeInner {
    options: SagaOptions,
    monitor: Rc<dyn SagaMonitor>,
    mounted: RefCell<Option<Mounted>>,
}

/// The dispatch-pipeline stage running tasks.
///
/// Clones share the same bridge.
#[derive(Clone)]
pub struct SagaMiddleware {
    inner: Rc<BridgeInner>,
}

impl SagaMiddleware {
    /// Creates a detached bridge.
    pub fn new(options: SagaOptions) -> Self {
        Self {
            inner: Rc::new(BridgeInner {
                monitor: options.monitor(),
                options,
                mounted: RefCell::new(None),
            }),
        }
    }

    /// Attaches the bridge to `store`, replacing any previous attachment.
    ///
    /// Tasks dispatch through the store and read its state. The bridge keeps
    /// only a weak reference to the store.
    pub fn attach<S: Store + 'static>(&self, store: &Rc<S>) {
        self.detach();
        let emitter = Emitter::new();
        let dispatch_target = Rc::downgrade(store);
        let state_source = Rc::downgrade(store);
        let runtime = Runtime::builder()
            .source(Rc::new(emitter.clone()))
            .dispatch(move |action: Action| match dispatch_target.upgrade() {
                Some(store) => store.dispatch(action.into_internal()),
                None => Err(SagaError::NotAttached),
            })
            .state(move || {
                state_source
                    .upgrade()
                    .map_or(Value::Undefined, |store| store.state())
            })
            .options(self.inner.options.clone())
            .build();
        tracing::debug!("saga middleware attached");
        *self.inner.mounted.borrow_mut() = Some(Mounted {
            emitter,
            runtime,
            roots: Vec::new(),
        });
    }

    /// Returns `true` between [`attach`](Self::attach) and
    /// [`detach`](Self::detach).
    pub fn is_attached(&self) -> bool {
        self.inner.mounted.borrow().is_some()
    }

    /// The pipeline stage: notifies the monitor, forwards `action` to
    /// `next`, then emits it to the running tasks.
    ///
    /// # Errors
    ///
    /// Returns the error raised by `next`; the action is not emitted then.
    pub fn process(
        &self,
        action: Action,
        next: impl FnOnce(Action) -> Result<Value, SagaError>,
    ) -> Result<Value, SagaError> {
        self.inner.monitor.action_dispatched(&action);
        let result = next(action.clone())?;
        let emitter = self
            .inner
            .mounted
            .borrow()
            .as_ref()
            .map(|mounted| mounted.emitter.clone());
        if let Some(emitter) = emitter {
            match self.inner.options.emitter() {
                Some(wrapper) => wrapper(&action, &|emitted: &Action| emitter.emit(emitted)),
                None => emitter.emit(&action),
            }
        }
        Ok(result)
    }

    /// Starts `body` as a root task.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::NotAttached`] before [`attach`](Self::attach).
    pub fn run(&self, body: impl Saga + 'static) -> Result<Task, SagaError> {
        let runtime = self
            .inner
            .mounted
            .borrow()
            .as_ref()
            .map(|mounted| mounted.runtime.clone())
            .ok_or(SagaError::NotAttached)?;
        let task = runtime.run(body);
        if let Some(mounted) = self.inner.mounted.borrow_mut().as_mut() {
            mounted.roots.retain(Task::is_running);
            if task.is_running() {
                mounted.roots.push(task.clone());
            }
        }
        Ok(task)
    }

    /// The root tasks still running.
    pub fn running_tasks(&self) -> Vec<Task> {
        self.inner
            .mounted
            .borrow()
            .as_ref()
            .map(|mounted| {
                mounted
                    .roots
                    .iter()
                    .filter(|task| task.is_running())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cancels the running root tasks and tears the bus down.
    pub fn detach(&self) {
        let Some(mounted) = self.inner.mounted.borrow_mut().take() else {
            return;
        };
        for task in &mounted.roots {
            task.cancel();
        }
        mounted.emitter.clear();
        tracing::debug!(cancelled = mounted.roots.len(), "saga middleware detached");
    }
}

impl Debug for SagaMiddleware {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SagaMiddleware")
            .field("attached", &self.is_attached())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::routine;
    use rstest::rstest;

    struct NullStore;

    impl Store for NullStore {
        fn dispatch(&self, _action: Action) -> Result<Value, SagaError> {
            Ok(Value::Undefined)
        }

        fn state(&self) -> Value {
            Value::from(1)
        }
    }

    #[rstest]
    fn run_before_attach_fails() {
        let bridge = SagaMiddleware::new(SagaOptions::default());
        let result = bridge.run(routine(|_cx| async move { Ok(Value::Undefined) }));
        assert_eq!(result.err(), Some(SagaError::NotAttached));
    }

    #[rstest]
    fn failing_next_stage_skips_emission() {
        let bridge = SagaMiddleware::new(SagaOptions::default());
        bridge.attach(&Rc::new(NullStore));
        let task = bridge
            .run(routine(|cx| async move { cx.take("*").await }))
            .unwrap();

        let result = bridge.process(Action::new("A"), |_| Err(SagaError::failure("reducer")));

        assert_eq!(result.err(), Some(SagaError::failure("reducer")));
        assert!(task.is_running());
    }

    #[rstest]
    fn detach_cancels_running_roots() {
        let bridge = SagaMiddleware::new(SagaOptions::default());
        bridge.attach(&Rc::new(NullStore));
        let task = bridge
            .run(routine(|cx| async move { cx.take("NEVER").await }))
            .unwrap();
        assert_eq!(bridge.running_tasks(), vec![task.clone()]);

        bridge.detach();

        assert!(task.is_cancelled());
        assert!(!bridge.is_attached());
        assert!(bridge.running_tasks().is_empty());
    }

    #[rstest]
    fn finished_roots_are_not_tracked() {
        let bridge = SagaMiddleware::new(SagaOptions::default());
        bridge.attach(&Rc::new(NullStore));
        let task = bridge
            .run(routine(|cx| async move { cx.select(|state| Ok(state.clone())).await }))
            .unwrap();
        assert_eq!(task.result(), Some(Value::from(1)));
        assert!(bridge.running_tasks().is_empty());
    }
}
