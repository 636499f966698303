//! The interpreter driving one task body.
//!
//! # Resume Loop
//!
//! A body is resumed by [`Proc::next`]. Effects frequently settle
//! synchronously (a `take` on a non-empty buffer, a `select`, a `fork` that
//! completes immediately), which would resume the body from inside the
//! previous resume. Instead, a resume arriving while the loop is already
//! active is queued and picked up by the active loop, so arbitrarily long
//! chains of synchronous effects run in constant stack depth.
//!
//! # Settlement
//!
//! A task settles when its fork queue completes or aborts, or when it is
//! cancelled. Settling closes the task's standard channel, records the
//! outcome, settles the done awaitable, notifies the continuation and then
//! every joiner exactly once.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use super::EffectId;
use super::callback::Callback;
use super::fork_queue::{ForkQueue, Member, MemberKey, QueueEvent};
use super::runtime::RuntimeInner;
use super::task::{Continuation, Outcome, Settlement, Task};
use crate::channel::{ChannelRef, StdChannel};
use crate::effect::{Resume, Saga, Step};
use crate::error::SagaError;
use crate::value::Value;

#[derive(Default)]
struct MainTask {
    running: bool,
    cancelled: bool,
    current: Option<Callback>,
}

#[derive(Default)]
struct Trampoline {
    driving: bool,
    pending: VecDeque<Resume>,
}

/// One interpreter invocation.
pub(crate) struct Proc {
    pub(super) runtime: Rc<RuntimeInner>,
    pub(super) task: Task,
    body: RefCell<Box<dyn Saga>>,
    pub(super) std_channel: ChannelRef,
    main: RefCell<MainTask>,
    queue: RefCell<ForkQueue>,
    trampoline: RefCell<Trampoline>,
}

impl Proc {
    /// Starts `body` and returns its task.
    ///
    /// The task is registered in the runtime before its body first runs, so
    /// children it forks synchronously can reach it.
    pub(crate) fn spawn(
        runtime: &Rc<RuntimeInner>,
        body: Box<dyn Saga>,
        parent_effect_id: EffectId,
        continuation: Option<Continuation>,
    ) -> Task {
        let name = body.name().to_string();
        let task = Task::new(
            parent_effect_id,
            name,
            Rc::downgrade(runtime),
            continuation,
        );
        let std_channel: ChannelRef =
            Rc::new(StdChannel::new(runtime.source.as_ref(), &runtime.scheduler));
        let proc = Rc::new(Self {
            runtime: Rc::clone(runtime),
            task: task.clone(),
            body: RefCell::new(body),
            std_channel,
            main: RefCell::new(MainTask {
                running: true,
                ..MainTask::default()
            }),
            queue: RefCell::new(ForkQueue::new()),
            trampoline: RefCell::default(),
        });
        runtime.register(parent_effect_id, Rc::clone(&proc));

        if let Some(awaiting) = task.awaiting_effect() {
            let handle = task.downgrade();
            awaiting.set_cancel(move || {
                if let Some(task) = handle.upgrade() {
                    task.cancel();
                }
            });
        }

        tracing::debug!(task = task.name(), effect_id = parent_effect_id, "saga started");
        proc.next(Resume::Value(Value::Undefined));
        task
    }

    pub(super) fn name(&self) -> &str {
        self.task.name()
    }

    /// A callback resuming this body.
    fn resume_callback(self: &Rc<Self>) -> Callback {
        let proc = Rc::clone(self);
        Callback::new(move |resume| proc.next(resume))
    }

    /// Resumes the body, or queues the resume if the loop is active.
    pub(crate) fn next(self: &Rc<Self>, input: Resume) {
        {
            let mut trampoline = self.trampoline.borrow_mut();
            trampoline.pending.push_back(input);
            if trampoline.driving {
                return;
            }
            trampoline.driving = true;
        }
        loop {
            let input = {
                let mut trampoline = self.trampoline.borrow_mut();
                match trampoline.pending.pop_front() {
                    Some(input) => input,
                    None => {
                        trampoline.driving = false;
                        return;
                    }
                }
            };
            self.step(input);
        }
    }

    fn step(self: &Rc<Self>, input: Resume) {
        if !self.main.borrow().running {
            tracing::warn!(task = self.name(), ?input, "resume of a finished saga ignored");
            return;
        }
        if matches!(input, Resume::Cancel) {
            self.main.borrow_mut().cancelled = true;
            self.cancel_current_effect();
        }
        let resumed = self.body.borrow_mut().resume(input);
        match resumed {
            Ok(Step::Yield(effect)) => {
                let callback = self.resume_callback();
                self.main.borrow_mut().current = Some(callback.clone());
                self.run_effect(effect, self.task.id(), String::new(), callback);
            }
            Ok(Step::Return(value)) => {
                let outcome = if self.main.borrow().cancelled {
                    Outcome::Cancelled
                } else {
                    Outcome::Completed(value)
                };
                self.finish_main(outcome);
            }
            Err(error) => {
                if self.main.borrow().cancelled {
                    tracing::error!(task = self.name(), %error, "saga failed while cancelled");
                }
                self.finish_main(Outcome::Aborted(error));
            }
        }
    }

    fn finish_main(self: &Rc<Self>, outcome: Outcome) {
        {
            let mut main = self.main.borrow_mut();
            main.running = false;
            main.current = None;
        }
        self.member_settled(MemberKey::Main, outcome);
    }

    fn cancel_current_effect(&self) {
        let current = self.main.borrow_mut().current.take();
        if let Some(callback) = current {
            callback.cancel();
        }
    }

    /// Whether the main body has been cancelled.
    pub(super) fn is_main_cancelled(&self) -> bool {
        self.main.borrow().cancelled
    }

    fn cancel_main(self: &Rc<Self>) {
        let cancel = {
            let mut main = self.main.borrow_mut();
            if main.running && !main.cancelled {
                main.cancelled = true;
                true
            } else {
                false
            }
        };
        if cancel {
            self.cancel_current_effect();
            self.next(Resume::Cancel);
        }
    }

    /// Attaches a running child to this task's fork queue.
    pub(super) fn add_fork(&self, child: &Task) {
        self.queue.borrow_mut().add(child.clone());
        child.set_continuation(Continuation::Queue(self.task.id()));
    }

    /// Handles the settlement of the main body or of an attached fork.
    pub(crate) fn member_settled(self: &Rc<Self>, key: MemberKey, outcome: Outcome) {
        let event = self.queue.borrow_mut().settle(key, outcome);
        match event {
            QueueEvent::Pending | QueueEvent::Ignored => {}
            QueueEvent::Completed(outcome) => self.end(outcome),
            QueueEvent::Abort(error) => self.abort(error),
        }
    }

    /// Cancels every remaining member and settles the task with `error`.
    pub(super) fn abort(self: &Rc<Self>, error: SagaError) {
        let running = self.queue.borrow().task_names(self.name());
        tracing::debug!(task = self.name(), %error, ?running, "aborting saga");
        self.cancel_members();
        self.end(Outcome::Aborted(error));
    }

    /// Cancels the task, its running effect and all attached forks.
    pub(crate) fn cancel(self: &Rc<Self>) {
        if !self.task.mark_cancelled() {
            return;
        }
        self.cancel_members();
        self.end(Outcome::Cancelled);
    }

    fn cancel_members(self: &Rc<Self>) {
        let members = self.queue.borrow_mut().drain();
        for member in members.into_iter().flatten() {
            match member {
                Member::Main => self.cancel_main(),
                Member::Fork(child) => {
                    child.set_continuation(Continuation::Silent);
                    child.cancel();
                }
            }
        }
    }

    fn end(self: &Rc<Self>, outcome: Outcome) {
        if !self.task.is_running() {
            return;
        }
        self.std_channel.close();
        let Some(settlement) = self.task.settle(outcome.clone()) else {
            return;
        };
        self.runtime.unregister(self.task.id());

        match &outcome {
            Outcome::Cancelled => tracing::info!(task = self.name(), "saga has been cancelled"),
            Outcome::Aborted(error) if settlement.continuation.is_none() => {
                match &self.runtime.on_error {
                    Some(hook) => hook(error),
                    None => tracing::error!(task = self.name(), %error, "uncaught error in saga"),
                }
            }
            Outcome::Aborted(error) => tracing::debug!(task = self.name(), %error, "saga aborted"),
            Outcome::Completed(_) => tracing::debug!(task = self.name(), "saga completed"),
        }

        self.notify(settlement, &outcome);
    }

    fn notify(&self, settlement: Settlement, outcome: &Outcome) {
        match settlement.continuation {
            Some(Continuation::Effect(callback)) => callback.settle(outcome.to_resume()),
            Some(Continuation::Queue(owner)) => {
                if let Some(parent) = self.runtime.proc(owner) {
                    parent.member_settled(MemberKey::Fork(self.task.id()), outcome.clone());
                }
            }
            Some(Continuation::Silent) | None => {}
        }
        for joiner in settlement.joiners {
            joiner.settle(outcome.to_resume());
        }
    }
}

impl Debug for Proc {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Proc")
            .field("task", &self.task)
            .field("members", &self.queue.borrow().task_names(self.name()))
            .finish_non_exhaustive()
    }
}
