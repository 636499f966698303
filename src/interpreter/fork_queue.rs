//! Bookkeeping of a task's main body and attached forks.

use smallvec::SmallVec;

use super::EffectId;
use super::task::{Outcome, Task};
use crate::error::SagaError;
use crate::value::Value;

/// A member of a fork queue.
#[derive(Debug, Clone)]
pub(crate) enum Member {
    Main,
    Fork(Task),
}

impl Member {
    fn key(&self) -> MemberKey {
        match self {
            Self::Main => MemberKey::Main,
            Self::Fork(task) => MemberKey::Fork(task.id()),
        }
    }
}

/// Identifies a member reporting its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberKey {
    Main,
    Fork(EffectId),
}

/// What the owning task must do after a member settled.
#[derive(Debug, PartialEq)]
pub(crate) enum QueueEvent {
    /// Other members are still running.
    Pending,
    /// Every member settled; the task settles with this outcome.
    Completed(Outcome),
    /// A member failed; the rest must be cancelled and the task aborted.
    Abort(SagaError),
    /// The queue already completed or was cancelled.
    Ignored,
}

/// Tracks the main body and attached forks of one task.
///
/// The task completes once every member settled. The main body's outcome
/// becomes the task's outcome; the first failure of any member aborts it.
#[derive(Debug)]
pub(crate) struct ForkQueue {
    members: SmallVec<[Member; 4]>,
    result: Option<Outcome>,
    completed: bool,
}

impl ForkQueue {
    pub(crate) fn new() -> Self {
        let mut members = SmallVec::new();
        members.push(Member::Main);
        Self {
            members,
            result: None,
            completed: false,
        }
    }

    pub(crate) fn add(&mut self, task: Task) {
        self.members.push(Member::Fork(task));
    }

    pub(crate) fn settle(&mut self, key: MemberKey, outcome: Outcome) -> QueueEvent {
        if self.completed {
            return QueueEvent::Ignored;
        }
        let Some(index) = self.members.iter().position(|member| member.key() == key) else {
            return QueueEvent::Ignored;
        };
        self.members.remove(index);
        if let Outcome::Aborted(error) = outcome {
            return QueueEvent::Abort(error);
        }
        if key == MemberKey::Main {
            self.result = Some(outcome);
        }
        if self.members.is_empty() {
            self.completed = true;
            return QueueEvent::Completed(
                self.result
                    .take()
                    .unwrap_or(Outcome::Completed(Value::Undefined)),
            );
        }
        QueueEvent::Pending
    }

    /// Closes the queue and hands back the members to cancel, or `None` if it
    /// already completed.
    pub(crate) fn drain(&mut self) -> Option<SmallVec<[Member; 4]>> {
        if self.completed {
            return None;
        }
        self.completed = true;
        Some(std::mem::take(&mut self.members))
    }

    /// Names of the members still running, `main` standing for the body.
    pub(crate) fn task_names(&self, main: &str) -> Vec<String> {
        self.members
            .iter()
            .map(|member| match member {
                Member::Main => main.to_string(),
                Member::Fork(task) => task.name().to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::rc::Weak;

    fn fork(id: EffectId) -> Task {
        Task::new(id, format!("fork-{id}"), Weak::new(), None)
    }

    #[rstest]
    fn completes_with_main_result_after_last_fork() {
        let mut queue = ForkQueue::new();
        queue.add(fork(2));

        assert_eq!(
            queue.settle(MemberKey::Main, Outcome::Completed(Value::from(1))),
            QueueEvent::Pending
        );
        assert_eq!(
            queue.settle(MemberKey::Fork(2), Outcome::Completed(Value::from(9))),
            QueueEvent::Completed(Outcome::Completed(Value::from(1)))
        );
        assert_eq!(
            queue.settle(MemberKey::Main, Outcome::Cancelled),
            QueueEvent::Ignored
        );
    }

    #[rstest]
    fn any_failure_aborts() {
        let mut queue = ForkQueue::new();
        queue.add(fork(2));
        queue.add(fork(3));
        assert_eq!(queue.task_names("root"), ["root", "fork-2", "fork-3"]);

        assert_eq!(
            queue.settle(MemberKey::Fork(3), Outcome::Aborted(SagaError::failure("x"))),
            QueueEvent::Abort(SagaError::failure("x"))
        );
        let remaining = queue.drain().unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(queue.drain().is_none());
    }

    #[rstest]
    fn cancelled_fork_does_not_affect_result() {
        let mut queue = ForkQueue::new();
        queue.add(fork(2));
        assert_eq!(
            queue.settle(MemberKey::Fork(2), Outcome::Cancelled),
            QueueEvent::Pending
        );
        assert_eq!(queue.task_names("root"), vec!["root".to_string()]);
        assert_eq!(
            queue.settle(MemberKey::Main, Outcome::Completed(Value::from(5))),
            QueueEvent::Completed(Outcome::Completed(Value::from(5)))
        );
    }
}
