//! Effect runners.
//!
//! Every runner receives the callback of the effect it runs. The callback
//! is settled at most once; cancellable runners install their cancel hook
//! before the effect can settle.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use super::EffectId;
use super::callback::{Callback, CpsCallback};
use super::proc::Proc;
use super::task::{Continuation, Task};
use crate::buffer::{self, Buffer, DEFAULT_LIMIT};
use crate::channel::{ChannelRef, EventChannel};
use crate::deferred::Promise;
use crate::effect::{
    CancelTarget, Called, CpsInvocation, Effect, FailedSaga, Invocation, OnceSaga, Resume, Saga,
    Selector,
};
use crate::error::SagaError;
use crate::pattern::Pattern;
use crate::value::Value;

impl Proc {
    /// Runs `effect` on behalf of `callback`, reporting to the monitor.
    pub(super) fn run_effect(
        self: &Rc<Self>,
        effect: Effect,
        parent_effect_id: EffectId,
        label: String,
        callback: Callback,
    ) {
        let effect_id = self.runtime.next_effect_id();
        let monitor = Rc::clone(&self.runtime.monitor);
        monitor.effect_triggered(effect_id, parent_effect_id, &label, &effect);

        let current = {
            let monitor = Rc::clone(&monitor);
            let callback = callback.clone();
            Callback::new(move |resume: Resume| {
                match &resume {
                    Resume::Error(error) => monitor.effect_rejected(effect_id, error),
                    other => monitor.effect_resolved(effect_id, other),
                }
                callback.settle(resume);
            })
        };
        {
            let current = current.clone();
            callback.set_cancel(move || {
                current.cancel();
                monitor.effect_cancelled(effect_id);
            });
        }

        match effect {
            Effect::Take {
                channel,
                pattern,
                maybe,
            } => self.run_take(channel, pattern, maybe, &current),
            Effect::Put {
                channel,
                value,
                resolve,
            } => self.run_put(channel, value, resolve, current),
            Effect::Call(invocation) => self.run_call(invocation, effect_id, &current),
            Effect::Cps(invocation) => run_cps(invocation, &current),
            Effect::Fork {
                invocation,
                detached,
            } => self.run_fork(invocation, detached, effect_id, &current),
            Effect::Join(task) => run_join(&task, &current),
            Effect::Cancel(target) => self.run_cancel(target, &current),
            Effect::Select(selector) => self.run_select(selector, &current),
            Effect::ActionChannel { pattern, buffer } => {
                self.run_action_channel(pattern, buffer, &current);
            }
            Effect::Flush(channel) => current.settle(Resume::Value(channel.flush())),
            Effect::Cancelled => {
                current.settle(Resume::Value(Value::from(self.is_main_cancelled())));
            }
            Effect::Race(entries) => self.run_race(entries, effect_id, &current),
            Effect::All(effects) => self.run_all(effects, effect_id, &current),
            Effect::Promise(promise) | Effect::Value(Value::Promise(promise)) => {
                resolve_promise(&promise, &current);
            }
            Effect::Saga(body) => self.run_subtask(body, effect_id, current),
            Effect::Value(value) => current.settle(Resume::Value(value)),
        }
    }

    fn run_take(
        &self,
        channel: Option<ChannelRef>,
        pattern: Pattern,
        maybe: bool,
        callback: &Callback,
    ) {
        let channel = channel.unwrap_or_else(|| Rc::clone(&self.std_channel));
        let taker = {
            let callback = callback.clone();
            move |input: Value| {
                let resume = match input {
                    Value::Error(error) => Resume::Error(error),
                    input if input.is_end() && !maybe => Resume::End,
                    input => Resume::Value(input),
                };
                callback.settle(resume);
            }
        };
        if let Some(registration) = channel.take(Box::new(taker), Some(pattern)) {
            callback.set_cancel(move || registration.cancel());
        }
    }

    fn run_put(&self, channel: Option<ChannelRef>, value: Value, resolve: bool, callback: Callback) {
        let dispatch = Rc::clone(&self.runtime.dispatch);
        let name = self.name().to_string();
        self.runtime.scheduler.asap(move || {
            let propagate = resolve || channel.is_some();
            let result = match channel {
                Some(channel) => channel
                    .put(value)
                    .map(|()| Value::Undefined)
                    .map_err(SagaError::from),
                None => match value {
                    Value::Action(action) => dispatch(action),
                    other => Err(SagaError::Unsupported(format!(
                        "put expects an action, got {other:?}"
                    ))),
                },
            };
            match result {
                Ok(Value::Promise(promise)) if resolve => resolve_promise(&promise, &callback),
                Ok(value) => callback.settle(Resume::Value(value)),
                Err(error) if propagate => callback.settle(Resume::Error(error)),
                Err(error) => {
                    tracing::error!(task = %name, %error, "uncaught error in put");
                    callback.settle(Resume::Value(Value::Undefined));
                }
            }
        });
    }

    fn run_call(self: &Rc<Self>, invocation: Invocation, effect_id: EffectId, callback: &Callback) {
        match invocation() {
            Err(error) => callback.settle(Resume::Error(error)),
            Ok(Called::Value(Value::Promise(promise))) => resolve_promise(&promise, callback),
            Ok(Called::Value(value)) => callback.settle(Resume::Value(value)),
            Ok(Called::Saga(body)) => self.run_subtask(body, effect_id, callback.clone()),
        }
    }

    /// Runs `body` to completion as a subtask settling `callback`.
    fn run_subtask(self: &Rc<Self>, body: Box<dyn Saga>, effect_id: EffectId, callback: Callback) {
        Proc::spawn(
            &self.runtime,
            body,
            effect_id,
            Some(Continuation::Effect(callback)),
        );
    }

    fn run_fork(
        self: &Rc<Self>,
        invocation: Invocation,
        detached: bool,
        effect_id: EffectId,
        callback: &Callback,
    ) {
        let body: Box<dyn Saga> = match invocation() {
            Ok(Called::Saga(body)) => body,
            Ok(Called::Value(value)) => Box::new(OnceSaga::new(Effect::from(value))),
            Err(error) => Box::new(FailedSaga::new(error)),
        };
        let scheduler = self.runtime.scheduler.clone();
        scheduler.suspend();
        let continuation = if detached {
            None
        } else {
            Some(Continuation::Silent)
        };
        let child = Proc::spawn(&self.runtime, body, effect_id, continuation);
        if detached {
            callback.settle(Resume::Value(Value::Task(child)));
        } else if child.is_running() {
            self.add_fork(&child);
            callback.settle(Resume::Value(Value::Task(child)));
        } else if let Some(error) = child.error() {
            self.abort(error);
        } else {
            callback.settle(Resume::Value(Value::Task(child)));
        }
        scheduler.flush();
    }

    fn run_cancel(&self, target: CancelTarget, callback: &Callback) {
        let task = match target {
            CancelTarget::Task(task) => task,
            CancelTarget::Current => self.task.clone(),
        };
        if task.is_running() {
            task.cancel();
        }
        callback.settle(Resume::Value(Value::Undefined));
    }

    fn run_select(&self, selector: Selector, callback: &Callback) {
        let state = (self.runtime.state)();
        callback.settle(Resume::from(selector(&state)));
    }

    fn run_action_channel(
        &self,
        pattern: Pattern,
        buffer: Option<Box<dyn Buffer>>,
        callback: &Callback,
    ) {
        let buffer = buffer.unwrap_or_else(|| buffer::fixed(DEFAULT_LIMIT));
        let channel: ChannelRef = Rc::new(EventChannel::new(
            self.runtime.source.as_ref(),
            buffer,
            Some(pattern),
        ));
        callback.settle(Resume::Value(Value::Channel(channel)));
    }

    fn run_race(
        self: &Rc<Self>,
        entries: Vec<(String, Effect)>,
        effect_id: EffectId,
        callback: &Callback,
    ) {
        let state = Rc::new(Combinator::default());
        let children: Vec<Callback> = entries
            .iter()
            .map(|(key, _)| race_child(key.clone(), Rc::downgrade(&state), callback.clone()))
            .collect();
        state.arm(&children, callback);
        for ((key, effect), child) in entries.into_iter().zip(children) {
            if state.completed.get() {
                break;
            }
            self.run_effect(effect, effect_id, key, child);
        }
    }

    fn run_all(self: &Rc<Self>, effects: Vec<Effect>, effect_id: EffectId, callback: &Callback) {
        if effects.is_empty() {
            callback.settle(Resume::Value(Value::List(Vec::new())));
            return;
        }
        let state = Rc::new(Combinator {
            remaining: Cell::new(effects.len()),
            results: RefCell::new(vec![Value::Undefined; effects.len()]),
            ..Combinator::default()
        });
        let children: Vec<Callback> = (0..effects.len())
            .map(|index| all_child(index, Rc::downgrade(&state), callback.clone()))
            .collect();
        state.arm(&children, callback);
        for (index, (effect, child)) in effects.into_iter().zip(children).enumerate() {
            if state.completed.get() {
                break;
            }
            self.run_effect(effect, effect_id, index.to_string(), child);
        }
    }
}

fn run_cps(invocation: CpsInvocation, callback: &Callback) {
    let handle = CpsCallback::new(callback.clone());
    match invocation(handle.clone()) {
        Err(error) => callback.settle(Resume::Error(error)),
        Ok(()) => {
            if let Some(hook) = handle.take_cancel_hook() {
                callback.set_cancel(hook);
            }
        }
    }
}

fn run_join(target: &Task, callback: &Callback) {
    match target.add_joiner(callback.clone()) {
        Some(joiner) => {
            let target = target.downgrade();
            callback.set_cancel(move || {
                if let Some(target) = target.upgrade() {
                    target.remove_joiner(joiner);
                }
            });
        }
        None => {
            let Some(outcome) = target.outcome() else {
                tracing::warn!(task = target.id(), "joined task refused the joiner but has no outcome");
                return;
            };
            callback.settle(outcome.to_resume());
        }
    }
}

fn resolve_promise(promise: &Promise, callback: &Callback) {
    {
        let promise = promise.clone();
        callback.set_cancel(move || promise.cancel());
    }
    let callback = callback.clone();
    promise.then(move |result| callback.settle(Resume::from(result)));
}

// =============================================================================
// Combinators
// =============================================================================

/// Shared state of a running `race` or `all`.
#[derive(Default)]
struct Combinator {
    completed: Cell<bool>,
    remaining: Cell<usize>,
    results: RefCell<Vec<Value>>,
    children: RefCell<Vec<Callback>>,
}

impl Combinator {
    /// Records the children and makes cancelling `parent` cancel them.
    fn arm(self: &Rc<Self>, children: &[Callback], parent: &Callback) {
        *self.children.borrow_mut() = children.to_vec();
        let state = Rc::clone(self);
        parent.set_cancel(move || state.cancel_children());
    }

    fn cancel_children(&self) {
        if self.completed.replace(true) {
            return;
        }
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            child.cancel();
        }
    }

    fn finish(&self) {
        self.completed.set(true);
        let children = std::mem::take(&mut *self.children.borrow_mut());
        drop(children);
    }
}

fn race_child(key: String, state: Weak<Combinator>, parent: Callback) -> Callback {
    Callback::new(move |resume| {
        let Some(state) = state.upgrade() else {
            return;
        };
        if state.completed.get() {
            return;
        }
        match resume {
            Resume::Error(error) => {
                state.cancel_children();
                parent.settle(Resume::Error(error));
            }
            Resume::Value(value) if !value.is_end() => {
                state.cancel_children();
                parent.settle(Resume::Value(Value::Map(BTreeMap::from([(key, value)]))));
            }
            Resume::Value(_) | Resume::Cancel | Resume::End => {}
        }
    })
}

fn all_child(index: usize, state: Weak<Combinator>, parent: Callback) -> Callback {
    Callback::new(move |resume| {
        let Some(state) = state.upgrade() else {
            return;
        };
        if state.completed.get() {
            return;
        }
        match resume {
            Resume::Value(value) if !value.is_end() => {
                state.results.borrow_mut()[index] = value;
                let remaining = state.remaining.get() - 1;
                state.remaining.set(remaining);
                if remaining == 0 {
                    state.finish();
                    let results = std::mem::take(&mut *state.results.borrow_mut());
                    parent.settle(Resume::Value(Value::List(results)));
                }
            }
            other => {
                state.cancel_children();
                parent.settle(other);
            }
        }
    })
}
