//! Task bodies written as `async` blocks.
//!
//! A [`Routine`] turns an `async` block into a [`Saga`]. Every effect the
//! block awaits through its [`Cx`] suspends the block; the interpreter runs
//! the effect and polls the block again with the outcome. No executor is
//! involved: the block is polled with a no-op waker and only ever waits on
//! effects.
//!
//! # Examples
//!
//! ```rust
//! use sagaflow::effect::routine;
//! use sagaflow::value::{Action, Value};
//!
//! let worker = routine(|cx| async move {
//!     let action = cx.take("INCREMENT").await?;
//!     cx.put(Action::new("INCREMENTED")).await?;
//!     Ok(action)
//! })
//! .named("worker");
//! # let _ = worker;
//! ```

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;

use super::descriptor::{self, Effect};
use super::{Called, Resume, Saga, Step};
use crate::buffer::Buffer;
use crate::channel::ChannelRef;
use crate::error::{Interrupt, SagaError};
use crate::interpreter::{CpsCallback, Task};
use crate::pattern::Pattern;
use crate::value::{Action, Value};

type Body = Pin<Box<dyn Future<Output = Result<Value, Interrupt>>>>;

#[derive(Default)]
struct Exchange {
    outgoing: RefCell<Option<Effect>>,
    incoming: RefCell<Option<Resume>>,
}

/// The effect handle passed to an async task body.
#[derive(Clone)]
pub struct Cx {
    exchange: Rc<Exchange>,
}

/// A future resolving with the outcome of one effect.
#[must_use = "effects do nothing unless awaited"]
pub struct Perform {
    exchange: Rc<Exchange>,
    effect: Option<Effect>,
}

impl Future for Perform {
    type Output = Result<Value, Interrupt>;

    fn poll(mut self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(effect) = self.effect.take() {
            let mut outgoing = self.exchange.outgoing.borrow_mut();
            if outgoing.is_some() {
                return Poll::Ready(Err(Interrupt::Error(SagaError::Unsupported(
                    "several effects awaited at once; combine them with all or race".to_string(),
                ))));
            }
            *outgoing = Some(effect);
            return Poll::Pending;
        }
        match self.exchange.incoming.borrow_mut().take() {
            Some(resume) => Poll::Ready(resume.into_result()),
            None => Poll::Pending,
        }
    }
}

fn expect_task(value: Value) -> Result<Task, Interrupt> {
    match value {
        Value::Task(task) => Ok(task),
        other => Err(Interrupt::Error(SagaError::Unsupported(format!(
            "expected a task, got {other:?}"
        )))),
    }
}

impl Cx {
    /// Awaits an arbitrary effect.
    pub fn perform(&self, effect: Effect) -> Perform {
        Perform {
            exchange: Rc::clone(&self.exchange),
            effect: Some(effect),
        }
    }

    /// See [`descriptor::take`].
    pub fn take(&self, pattern: impl Into<Pattern>) -> Perform {
        self.perform(descriptor::take(pattern))
    }

    /// See [`descriptor::take_maybe`].
    pub fn take_maybe(&self, pattern: impl Into<Pattern>) -> Perform {
        self.perform(descriptor::take_maybe(pattern))
    }

    /// See [`descriptor::take_from`].
    pub fn take_from(&self, channel: &ChannelRef) -> Perform {
        self.perform(descriptor::take_from(channel))
    }

    /// See [`descriptor::put`].
    pub fn put(&self, action: Action) -> Perform {
        self.perform(descriptor::put(action))
    }

    /// See [`descriptor::put_resolve`].
    pub fn put_resolve(&self, action: Action) -> Perform {
        self.perform(descriptor::put_resolve(action))
    }

    /// See [`descriptor::put_to`].
    pub fn put_to(&self, channel: &ChannelRef, value: impl Into<Value>) -> Perform {
        self.perform(descriptor::put_to(channel, value))
    }

    /// See [`descriptor::call`].
    pub fn call<F>(&self, function: F) -> Perform
    where
        F: FnOnce() -> Result<Value, SagaError> + 'static,
    {
        self.perform(descriptor::call(function))
    }

    /// See [`descriptor::call_saga`].
    pub fn call_saga(&self, body: impl Saga + 'static) -> Perform {
        self.perform(descriptor::call_saga(body))
    }

    /// See [`descriptor::cps`].
    pub fn cps<F>(&self, function: F) -> Perform
    where
        F: FnOnce(CpsCallback) -> Result<(), SagaError> + 'static,
    {
        self.perform(descriptor::cps(function))
    }

    /// Starts an attached child task.
    ///
    /// # Errors
    ///
    /// Fails when the child aborted synchronously, or when the current task
    /// was cancelled meanwhile.
    pub async fn fork(&self, body: impl Saga + 'static) -> Result<Task, Interrupt> {
        expect_task(self.perform(descriptor::fork(body)).await?)
    }

    /// Starts an attached child task from a fallible factory.
    ///
    /// # Errors
    ///
    /// See [`fork`](Self::fork).
    pub async fn fork_with<F>(&self, invocation: F) -> Result<Task, Interrupt>
    where
        F: FnOnce() -> Result<Called, SagaError> + 'static,
    {
        expect_task(self.perform(descriptor::fork_with(invocation)).await?)
    }

    /// Starts a detached task.
    ///
    /// # Errors
    ///
    /// Fails only when the current task was cancelled meanwhile.
    pub async fn spawn(&self, body: impl Saga + 'static) -> Result<Task, Interrupt> {
        expect_task(self.perform(descriptor::spawn(body)).await?)
    }

    /// See [`descriptor::join`].
    pub fn join(&self, task: &Task) -> Perform {
        self.perform(descriptor::join(task))
    }

    /// See [`descriptor::cancel`].
    pub fn cancel(&self, task: &Task) -> Perform {
        self.perform(descriptor::cancel(task))
    }

    /// See [`descriptor::cancel_self`].
    pub fn cancel_self(&self) -> Perform {
        self.perform(descriptor::cancel_self())
    }

    /// See [`descriptor::select`].
    pub fn select<F>(&self, selector: F) -> Perform
    where
        F: FnOnce(&Value) -> Result<Value, SagaError> + 'static,
    {
        self.perform(descriptor::select(selector))
    }

    /// Creates a channel buffering host actions matching `pattern`.
    ///
    /// # Errors
    ///
    /// Fails only when the current task was cancelled meanwhile.
    pub async fn action_channel(
        &self,
        pattern: impl Into<Pattern>,
        buffer: Option<Box<dyn Buffer>>,
    ) -> Result<ChannelRef, Interrupt> {
        let effect = Effect::ActionChannel {
            pattern: pattern.into(),
            buffer,
        };
        match self.perform(effect).await? {
            Value::Channel(channel) => Ok(channel),
            other => Err(Interrupt::Error(SagaError::Unsupported(format!(
                "expected a channel, got {other:?}"
            )))),
        }
    }

    /// See [`descriptor::flush`].
    pub fn flush(&self, channel: &ChannelRef) -> Perform {
        self.perform(descriptor::flush(channel))
    }

    /// Reports whether the current task has been cancelled.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other effects.
    pub async fn cancelled(&self) -> Result<bool, Interrupt> {
        Ok(self
            .perform(descriptor::cancelled())
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    /// See [`descriptor::race`].
    pub fn race<K, I>(&self, entries: I) -> Perform
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Effect)>,
    {
        self.perform(descriptor::race(entries))
    }

    /// See [`descriptor::all`].
    pub fn all(&self, effects: impl IntoIterator<Item = Effect>) -> Perform {
        self.perform(descriptor::all(effects))
    }
}

impl Debug for Cx {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("Cx")
    }
}

/// A task body backed by an `async` block.
pub struct Routine {
    name: String,
    exchange: Rc<Exchange>,
    body: Option<Body>,
    started: bool,
}

/// Creates a task body from an `async` block.
///
/// The block returns `Ok(value)` to complete the task. Propagating an
/// [`Interrupt::Cancelled`] or [`Interrupt::End`] with `?` finishes the task
/// normally; [`Interrupt::Error`] fails it.
pub fn routine<F, Fut>(body: F) -> Routine
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Result<Value, Interrupt>> + 'static,
{
    let exchange = Rc::new(Exchange::default());
    let cx = Cx {
        exchange: Rc::clone(&exchange),
    };
    Routine {
        name: "anonymous".to_string(),
        exchange,
        body: Some(Box::pin(body(cx))),
        started: false,
    }
}

impl Routine {
    /// Sets the task name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Saga for Routine {
    fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
        let Some(body) = self.body.as_mut() else {
            return Ok(Step::Return(Value::Undefined));
        };
        if self.started {
            *self.exchange.incoming.borrow_mut() = Some(input);
        } else {
            self.started = true;
        }
        let mut context = Context::from_waker(noop_waker_ref());
        let polled = body.as_mut().poll(&mut context);
        match polled {
            Poll::Ready(result) => {
                self.body = None;
                match result {
                    Ok(value) => Ok(Step::Return(value)),
                    Err(Interrupt::Error(error)) => Err(error),
                    Err(Interrupt::Cancelled | Interrupt::End) => Ok(Step::Return(Value::Undefined)),
                }
            }
            Poll::Pending => {
                let outgoing = self.exchange.outgoing.borrow_mut().take();
                outgoing.map(Step::Yield).ok_or_else(|| {
                    self.body = None;
                    SagaError::Stalled {
                        name: self.name.clone(),
                    }
                })
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Debug for Routine {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Routine")
            .field("name", &self.name)
            .field("finished", &self.body.is_none())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn start() -> Resume {
        Resume::Value(Value::Undefined)
    }

    #[rstest]
    fn yields_each_awaited_effect_in_order() {
        let mut body = routine(|cx| async move {
            let first = cx.take("A").await?;
            let second = cx.take("B").await?;
            Ok(Value::List(vec![first, second]))
        });

        assert!(matches!(body.resume(start()), Ok(Step::Yield(Effect::Take { .. }))));
        assert!(matches!(
            body.resume(Resume::Value(Value::from(1))),
            Ok(Step::Yield(Effect::Take { .. }))
        ));
        assert!(matches!(
            body.resume(Resume::Value(Value::from(2))),
            Ok(Step::Return(Value::List(values))) if values == vec![Value::from(1), Value::from(2)]
        ));
    }

    #[rstest]
    fn errors_are_catchable_inside_the_body() {
        let mut body = routine(|cx| async move {
            match cx.call(|| Err(SagaError::failure("boom"))).await {
                Err(Interrupt::Error(error)) => Ok(Value::from(error.to_string())),
                other => other,
            }
        });

        assert!(matches!(body.resume(start()), Ok(Step::Yield(Effect::Call(_)))));
        assert!(matches!(
            body.resume(Resume::Error(SagaError::failure("boom"))),
            Ok(Step::Return(value)) if value == Value::from("boom")
        ));
    }

    #[rstest]
    fn uncaught_errors_fail_the_body() {
        let mut body = routine(|cx| async move { cx.take("A").await });
        let _ = body.resume(start());
        assert_eq!(
            body.resume(Resume::Error(SagaError::failure("lost"))).err(),
            Some(SagaError::failure("lost"))
        );
    }

    #[rstest]
    #[case(Resume::Cancel)]
    #[case(Resume::End)]
    fn interrupts_finish_the_body_normally(#[case] input: Resume) {
        let mut body = routine(|cx| async move { cx.take("A").await });
        let _ = body.resume(start());
        assert!(matches!(body.resume(input), Ok(Step::Return(Value::Undefined))));
    }

    #[rstest]
    fn cleanup_may_yield_after_cancellation() {
        let mut body = routine(|cx| async move {
            if let Err(Interrupt::Cancelled) = cx.take("A").await {
                cx.put(Action::new("CLEANUP")).await?;
            }
            Ok(Value::Undefined)
        });
        let _ = body.resume(start());
        assert!(matches!(
            body.resume(Resume::Cancel),
            Ok(Step::Yield(Effect::Put { .. }))
        ));
    }

    #[rstest]
    fn foreign_futures_stall_the_body() {
        let mut body = routine(|_cx| async move {
            futures::future::pending::<()>().await;
            Ok(Value::Undefined)
        })
        .named("stuck");
        assert_eq!(
            body.resume(start()).err(),
            Some(SagaError::Stalled {
                name: "stuck".to_string()
            })
        );
    }

    #[rstest]
    fn concurrent_awaits_are_refused() {
        let mut body = routine(|cx| async move {
            let (first, second) = futures::join!(cx.take("A"), cx.take("B"));
            first?;
            second
        });
        assert!(matches!(body.resume(start()), Ok(Step::Yield(_))));
        assert!(matches!(
            body.resume(Resume::Value(Value::from(1))),
            Err(SagaError::Unsupported(_))
        ));
    }
}
