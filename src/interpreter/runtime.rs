//! The environment shared by the tasks of one runtime.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::EffectId;
use super::proc::Proc;
use super::task::Task;
use crate::channel::{ActionSource, Emitter};
use crate::effect::{Resume, Saga};
use crate::error::SagaError;
use crate::monitor::SagaMonitor;
use crate::options::{ErrorHook, SagaOptions};
use crate::scheduler::Scheduler;
use crate::value::{Action, Value};

/// Sends an action down the host pipeline.
pub type Dispatch = Rc<dyn Fn(Action) -> Result<Value, SagaError>>;

/// Reads the host state.
pub type StateAccessor = Rc<dyn Fn() -> Value>;

pub(crate) struct RuntimeInner {
    pub(crate) source: Rc<dyn ActionSource>,
    pub(crate) dispatch: Dispatch,
    pub(crate) state: StateAccessor,
    pub(crate) scheduler: Scheduler,
    pub(crate) monitor: Rc<dyn SagaMonitor>,
    pub(crate) on_error: Option<ErrorHook>,
    next_effect_id: Cell<EffectId>,
    procs: RefCell<FxHashMap<EffectId, Rc<Proc>>>,
}

impl RuntimeInner {
    pub(crate) fn next_effect_id(&self) -> EffectId {
        let id = self.next_effect_id.get();
        self.next_effect_id.set(id + 1);
        id
    }

    pub(crate) fn proc(&self, id: EffectId) -> Option<Rc<Proc>> {
        self.procs.borrow().get(&id).cloned()
    }

    pub(crate) fn register(&self, id: EffectId, proc: Rc<Proc>) {
        let previous = self.procs.borrow_mut().insert(id, proc);
        drop(previous);
    }

    pub(crate) fn unregister(&self, id: EffectId) {
        let removed = self.procs.borrow_mut().remove(&id);
        drop(removed);
    }

    /// Running procs in spawn order, so parents precede their forks.
    fn running(&self) -> Vec<Rc<Proc>> {
        let mut procs: Vec<(EffectId, Rc<Proc>)> = self
            .procs
            .borrow()
            .iter()
            .map(|(id, proc)| (*id, Rc::clone(proc)))
            .collect();
        procs.sort_unstable_by_key(|(id, _)| *id);
        procs.into_iter().map(|(_, proc)| proc).collect()
    }
}

/// Runs root tasks against an action source, a dispatch sink and a state
/// accessor.
///
/// Clones share the same environment. The bridge builds one when attached
/// to a store; hosts without a store build one directly.
///
/// # Dropping
///
/// A running task keeps its runtime alive, so dropping every `Runtime`
/// handle while tasks are blocked does not free them. Call
/// [`Runtime::cancel_all`] before letting go of a runtime whose tasks should
/// not outlive it.
///
/// # Examples
///
/// ```rust
/// use std::rc::Rc;
/// use sagaflow::channel::Emitter;
/// use sagaflow::effect::routine;
/// use sagaflow::interpreter::Runtime;
/// use sagaflow::value::{Action, Value};
///
/// let emitter = Emitter::new();
/// let runtime = Runtime::builder().source(Rc::new(emitter.clone())).build();
///
/// let task = runtime.run(routine(|cx| async move { cx.take("PING").await }));
/// assert!(task.is_running());
///
/// emitter.emit(&Action::new("PING"));
/// assert_eq!(task.result(), Some(Value::from(Action::new("PING"))));
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Starts building a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Starts `body` as a root task.
    pub fn run(&self, body: impl Saga + 'static) -> Task {
        let effect_id = self.inner.next_effect_id();
        self.inner.monitor.root_saga_started(effect_id, body.name());
        let task = Proc::spawn(&self.inner, Box::new(body), effect_id, None);
        self.inner
            .monitor
            .effect_resolved(effect_id, &Resume::Value(Value::Task(task.clone())));
        task
    }

    /// The scheduler serializing deliveries of this runtime.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Cancels every running task, detached ones included.
    ///
    /// Parents are cancelled before their forks, so each task observes
    /// cancellation exactly once.
    pub fn cancel_all(&self) {
        let running = self.inner.running();
        tracing::info!(tasks = running.len(), "cancelling every running task");
        for proc in running {
            proc.cancel();
        }
    }

    /// The number of tasks still running, roots and forks alike.
    pub fn running_task_count(&self) -> usize {
        self.inner.procs.borrow().len()
    }
}

impl Debug for Runtime {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Runtime")
            .field("running_tasks", &self.running_task_count())
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Runtime`].
///
/// Every part is optional: without a source the tasks never observe an
/// action, without a dispatch sink `put` resolves with nothing, and without
/// a state accessor `select` sees [`Value::Undefined`].
#[derive(Default)]
pub struct RuntimeBuilder {
    source: Option<Rc<dyn ActionSource>>,
    dispatch: Option<Dispatch>,
    state: Option<StateAccessor>,
    scheduler: Option<Scheduler>,
    options: SagaOptions,
}

impl RuntimeBuilder {
    /// Sets the action source feeding `take` effects.
    #[must_use]
    pub fn source(mut self, source: Rc<dyn ActionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the sink of `put` effects without a channel.
    #[must_use]
    pub fn dispatch(mut self, dispatch: impl Fn(Action) -> Result<Value, SagaError> + 'static) -> Self {
        self.dispatch = Some(Rc::new(dispatch));
        self
    }

    /// Sets the state accessor used by `select` effects.
    #[must_use]
    pub fn state(mut self, state: impl Fn() -> Value + 'static) -> Self {
        self.state = Some(Rc::new(state));
        self
    }

    /// Shares an existing scheduler instead of creating one.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the monitor, error hook and id seed.
    #[must_use]
    pub fn options(mut self, options: SagaOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> Runtime {
        Runtime {
            inner: Rc::new(RuntimeInner {
                source: self
                    .source
                    .unwrap_or_else(|| Rc::new(Emitter::new())),
                dispatch: self.dispatch.unwrap_or_else(|| Rc::new(|_| Ok(Value::Undefined))),
                state: self.state.unwrap_or_else(|| Rc::new(|| Value::Undefined)),
                scheduler: self.scheduler.unwrap_or_default(),
                monitor: self.options.monitor(),
                on_error: self.options.on_error(),
                next_effect_id: Cell::new(self.options.first_effect_id()),
                procs: RefCell::default(),
            }),
        }
    }
}

impl Debug for RuntimeBuilder {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RuntimeBuilder")
            .field("source", &self.source.is_some())
            .field("dispatch", &self.dispatch.is_some())
            .field("state", &self.state.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
