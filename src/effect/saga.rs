//! The resumable computation contract.

use crate::error::{Interrupt, SagaError};
use crate::value::Value;

use super::Effect;

/// What a task body is resumed with.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// The result of the last yielded effect (or `Undefined` on the first
    /// resume).
    Value(Value),
    /// The last yielded effect failed.
    Error(SagaError),
    /// The task was cancelled. The body should run its cleanup path and
    /// return; whatever it returns, the task settles as cancelled.
    Cancel,
    /// A `take` hit a closed channel. The body should run its return path;
    /// the task completes normally.
    End,
}

impl Resume {
    /// Converts the resume into the result an awaiting body observes.
    ///
    /// # Errors
    ///
    /// Returns an [`Interrupt`] for everything but [`Resume::Value`].
    pub fn into_result(self) -> Result<Value, Interrupt> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(error) => Err(Interrupt::Error(error)),
            Self::Cancel => Err(Interrupt::Cancelled),
            Self::End => Err(Interrupt::End),
        }
    }
}

impl From<Result<Value, SagaError>> for Resume {
    fn from(result: Result<Value, SagaError>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(error) => Self::Error(error),
        }
    }
}

/// One step of a task body.
pub enum Step {
    /// The body suspends on an effect.
    Yield(Effect),
    /// The body finished with a value.
    Return(Value),
}

impl std::fmt::Debug for Step {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yield(effect) => formatter.debug_tuple("Yield").field(effect).finish(),
            Self::Return(value) => formatter.debug_tuple("Return").field(value).finish(),
        }
    }
}

/// A resumable computation driven by the interpreter.
///
/// The interpreter calls [`resume`](Self::resume) with
/// `Resume::Value(Value::Undefined)` to start the body, then once per
/// settled effect. Returning `Err` settles the body as failed.
///
/// Most bodies are written with [`routine`](super::routine); implement this
/// trait directly for explicit state machines.
pub trait Saga {
    /// Advances the body.
    ///
    /// # Errors
    ///
    /// Returns the error the body failed with.
    fn resume(&mut self, input: Resume) -> Result<Step, SagaError>;

    /// The human-readable task name.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<S: Saga + ?Sized> Saga for Box<S> {
    fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
        (**self).resume(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// =============================================================================
// Closure-backed Bodies
// =============================================================================

/// A task body backed by a step function.
///
/// # Examples
///
/// ```rust
/// use sagaflow::effect::{self, from_fn, Resume, Saga, Step};
/// use sagaflow::value::Value;
///
/// let mut turns = 0;
/// let mut body = from_fn(move |input| {
///     turns += 1;
///     match (turns, input) {
///         (1, _) => Ok(Step::Yield(effect::cancelled())),
///         (_, Resume::Value(value)) => Ok(Step::Return(value)),
///         (_, _) => Ok(Step::Return(Value::Undefined)),
///     }
/// })
/// .named("probe");
///
/// assert_eq!(body.name(), "probe");
/// assert!(matches!(body.resume(Resume::Value(Value::Undefined)), Ok(Step::Yield(_))));
/// ```
pub struct FnSaga<F> {
    name: String,
    step: F,
}

/// Creates a task body from a step function.
pub fn from_fn<F>(step: F) -> FnSaga<F>
where
    F: FnMut(Resume) -> Result<Step, SagaError>,
{
    FnSaga {
        name: "anonymous".to_string(),
        step,
    }
}

impl<F> FnSaga<F> {
    /// Sets the task name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Saga for FnSaga<F>
where
    F: FnMut(Resume) -> Result<Step, SagaError>,
{
    fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
        (self.step)(input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Yields one effect, then returns whatever it resolved with.
///
/// Wraps fork targets that returned a plain value or an awaitable instead of
/// a body.
pub(crate) struct OnceSaga {
    effect: Option<Effect>,
}

impl OnceSaga {
    pub(crate) const fn new(effect: Effect) -> Self {
        Self {
            effect: Some(effect),
        }
    }
}

impl Saga for OnceSaga {
    fn resume(&mut self, input: Resume) -> Result<Step, SagaError> {
        if let Some(effect) = self.effect.take() {
            return Ok(Step::Yield(effect));
        }
        match input {
            Resume::Value(value) => Ok(Step::Return(value)),
            Resume::Error(error) => Err(error),
            Resume::Cancel | Resume::End => Ok(Step::Return(Value::Undefined)),
        }
    }
}

/// Fails on its first resume.
///
/// Represents a fork whose target failed synchronously, so the failure is
/// observed as an aborted task rather than at the spawn site.
pub(crate) struct FailedSaga {
    error: Option<SagaError>,
}

impl FailedSaga {
    pub(crate) const fn new(error: SagaError) -> Self {
        Self { error: Some(error) }
    }
}

impl Saga for FailedSaga {
    fn resume(&mut self, _input: Resume) -> Result<Step, SagaError> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(Step::Return(Value::Undefined)),
        }
    }
}
