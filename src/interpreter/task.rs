//! Task handles.

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::EffectId;
use super::callback::Callback;
use super::runtime::RuntimeInner;
use crate::deferred::Deferred;
use crate::effect::Resume;
use crate::error::SagaError;
use crate::value::Value;

/// How a task settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The task and all its attached forks completed; carries the body's
    /// return value.
    Completed(Value),
    /// The task was cancelled.
    Cancelled,
    /// The body or one of its attached forks failed.
    Aborted(SagaError),
}

impl Outcome {
    /// The resume delivered to whoever waits on the task.
    pub fn to_resume(&self) -> Resume {
        match self {
            Self::Completed(value) => Resume::Value(value.clone()),
            Self::Cancelled => Resume::Cancel,
            Self::Aborted(error) => Resume::Error(error.clone()),
        }
    }
}

/// Where a settled task reports its outcome.
#[derive(Debug)]
pub(crate) enum Continuation {
    /// Nowhere.
    Silent,
    /// The fork queue of the owning task.
    Queue(EffectId),
    /// The effect that started the task, for subtasks run by `call`.
    Effect(Callback),
}

/// What the settling code must notify.
pub(crate) struct Settlement {
    pub(crate) continuation: Option<Continuation>,
    pub(crate) joiners: Vec<Callback>,
}

struct TaskState {
    outcome: Option<Outcome>,
    cancelled: bool,
    continuation: Option<Continuation>,
    joiners: SmallVec<[(u64, Callback); 2]>,
    next_joiner: u64,
}

struct TaskInner {
    id: EffectId,
    name: String,
    runtime: Weak<RuntimeInner>,
    state: RefCell<TaskState>,
    done: Deferred<Outcome>,
}

/// A handle on a running or settled task.
///
/// Handles are cheap to clone and compare by identity. A handle does not
/// keep the task running; it only observes and controls it.
#[derive(Clone)]
pub struct Task {
    inner: Rc<TaskInner>,
}

#[derive(Clone)]
pub(crate) struct WeakTask {
    inner: Weak<TaskInner>,
}

impl WeakTask {
    pub(crate) fn upgrade(&self) -> Option<Task> {
        self.inner.upgrade().map(|inner| Task { inner })
    }
}

impl Task {
    pub(crate) fn new(
        id: EffectId,
        name: String,
        runtime: Weak<RuntimeInner>,
        continuation: Option<Continuation>,
    ) -> Self {
        Self {
            inner: Rc::new(TaskInner {
                id,
                name,
                runtime,
                state: RefCell::new(TaskState {
                    outcome: None,
                    cancelled: false,
                    continuation,
                    joiners: SmallVec::new(),
                    next_joiner: 0,
                }),
                done: Deferred::new(),
            }),
        }
    }

    /// The id of the effect that started the task.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// The name of the task body.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` until the task settles.
    pub fn is_running(&self) -> bool {
        self.inner.state.borrow().outcome.is_none()
    }

    /// Returns `true` once cancellation was requested or the task settled
    /// as cancelled.
    pub fn is_cancelled(&self) -> bool {
        let state = self.inner.state.borrow();
        state.cancelled || matches!(state.outcome, Some(Outcome::Cancelled))
    }

    /// Returns `true` if the task settled with an error.
    pub fn is_aborted(&self) -> bool {
        matches!(self.inner.state.borrow().outcome, Some(Outcome::Aborted(_)))
    }

    /// The return value of a completed task.
    pub fn result(&self) -> Option<Value> {
        match &self.inner.state.borrow().outcome {
            Some(Outcome::Completed(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// The error of an aborted task.
    pub fn error(&self) -> Option<SagaError> {
        match &self.inner.state.borrow().outcome {
            Some(Outcome::Aborted(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// How the task settled, if it has.
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.state.borrow().outcome.clone()
    }

    /// An awaitable settling with the task's outcome.
    pub fn done(&self) -> Deferred<Outcome> {
        self.inner.done.clone()
    }

    /// Cancels the task, its running effect and all its attached forks.
    ///
    /// Has no effect on a settled task, or on a task already being
    /// cancelled.
    pub fn cancel(&self) {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return;
        };
        if let Some(proc) = runtime.proc(self.inner.id) {
            proc.cancel();
        }
    }

    pub(crate) fn downgrade(&self) -> WeakTask {
        WeakTask {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Flags the task as cancelled. Returns `false` if it already settled
    /// or was flagged before.
    pub(crate) fn mark_cancelled(&self) -> bool {
        let mut state = self.inner.state.borrow_mut();
        if state.outcome.is_some() || state.cancelled {
            return false;
        }
        state.cancelled = true;
        true
    }

    pub(crate) fn set_continuation(&self, continuation: Continuation) {
        let previous = self
            .inner
            .state
            .borrow_mut()
            .continuation
            .replace(continuation);
        drop(previous);
    }

    /// The callback of the effect awaiting the task, if it runs as a
    /// subtask of `call`.
    pub(crate) fn awaiting_effect(&self) -> Option<Callback> {
        match &self.inner.state.borrow().continuation {
            Some(Continuation::Effect(callback)) => Some(callback.clone()),
            _ => None,
        }
    }

    /// Registers a joiner. Returns `None` if the task already settled.
    pub(crate) fn add_joiner(&self, callback: Callback) -> Option<u64> {
        let mut state = self.inner.state.borrow_mut();
        if state.outcome.is_some() {
            return None;
        }
        let id = state.next_joiner;
        state.next_joiner += 1;
        state.joiners.push((id, callback));
        Some(id)
    }

    pub(crate) fn remove_joiner(&self, id: u64) {
        let removed: SmallVec<[(u64, Callback); 2]> = {
            let mut state = self.inner.state.borrow_mut();
            let (removed, kept) = std::mem::take(&mut state.joiners)
                .into_iter()
                .partition(|(joiner, _)| *joiner == id);
            state.joiners = kept;
            removed
        };
        drop(removed);
    }

    /// Stores the outcome and hands back everyone to notify. Returns `None`
    /// if the task already settled.
    pub(crate) fn settle(&self, outcome: Outcome) -> Option<Settlement> {
        let settlement = {
            let mut state = self.inner.state.borrow_mut();
            if state.outcome.is_some() {
                return None;
            }
            state.outcome = Some(outcome.clone());
            Settlement {
                continuation: state.continuation.take(),
                joiners: std::mem::take(&mut state.joiners)
                    .into_iter()
                    .map(|(_, callback)| callback)
                    .collect(),
            }
        };
        self.inner.done.settle(outcome);
        Some(settlement)
    }

    fn status(&self) -> &'static str {
        match &self.inner.state.borrow().outcome {
            None if self.inner.state.borrow().cancelled => "cancelling",
            None => "running",
            Some(Outcome::Completed(_)) => "done",
            Some(Outcome::Cancelled) => "cancelled",
            Some(Outcome::Aborted(_)) => "aborted",
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for Task {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn detached(name: &str) -> Task {
        Task::new(7, name.to_string(), Weak::new(), None)
    }

    #[rstest]
    fn settles_once_and_reports_outcome() {
        let task = detached("worker");
        assert!(task.is_running());

        assert!(task.settle(Outcome::Completed(Value::from(1))).is_some());
        assert!(task.settle(Outcome::Cancelled).is_none());

        assert!(!task.is_running());
        assert_eq!(task.result(), Some(Value::from(1)));
        assert_eq!(task.done().peek(), Some(Outcome::Completed(Value::from(1))));
    }

    #[rstest]
    #[case(Outcome::Cancelled, true, false)]
    #[case(Outcome::Aborted(SagaError::failure("x")), false, true)]
    #[case(Outcome::Completed(Value::Undefined), false, false)]
    fn status_flags(#[case] outcome: Outcome, #[case] cancelled: bool, #[case] aborted: bool) {
        let task = detached("worker");
        let _ = task.settle(outcome);
        assert_eq!(task.is_cancelled(), cancelled);
        assert_eq!(task.is_aborted(), aborted);
    }

    #[rstest]
    fn settlement_hands_back_joiners_and_continuation() {
        let task = Task::new(1, "child".to_string(), Weak::new(), Some(Continuation::Queue(9)));
        let joiner = Callback::new(|_| {});
        let removed = Callback::new(|_| {});
        let _ = task.add_joiner(joiner);
        let removed_id = task.add_joiner(removed).unwrap();
        task.remove_joiner(removed_id);

        let settlement = task.settle(Outcome::Cancelled).unwrap();

        assert!(matches!(settlement.continuation, Some(Continuation::Queue(9))));
        assert_eq!(settlement.joiners.len(), 1);
        assert!(task.add_joiner(Callback::new(|_| {})).is_none());
    }

    #[rstest]
    fn mark_cancelled_only_once() {
        let task = detached("worker");
        assert!(task.mark_cancelled());
        assert!(!task.mark_cancelled());
        assert!(task.is_cancelled());
        assert!(task.is_running());
    }

    #[rstest]
    fn cancel_without_runtime_is_a_no_op() {
        let task = detached("orphan");
        task.cancel();
        assert!(task.is_running());
    }

    #[rstest]
    fn handles_compare_by_identity() {
        let first = detached("same");
        let second = detached("same");
        assert_eq!(first, first.clone());
        assert_ne!(first, second);
        assert_eq!(first.downgrade().upgrade(), Some(first));
    }

    #[rstest]
    fn outcome_converts_to_resume() {
        assert_eq!(Outcome::Cancelled.to_resume(), Resume::Cancel);
        assert_eq!(
            Outcome::Completed(Value::from(2)).to_resume(),
            Resume::Value(Value::from(2))
        );
    }
}
