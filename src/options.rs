//! Runtime configuration.

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use crate::error::SagaError;
use crate::interpreter::EffectId;
use crate::monitor::{NoopMonitor, SagaMonitor};
use crate::value::Action;

/// Receives errors that reached a root task without anyone to handle them.
pub type ErrorHook = Rc<dyn Fn(&SagaError)>;

/// Wraps the bridge's emission of actions to the bus.
///
/// The wrapper receives the action and the function emitting to the bus; it
/// may forward the action, transform it, hold it back or emit several.
pub type EmitWrapper = Rc<dyn Fn(&Action, &dyn Fn(&Action))>;

/// Configuration shared by [`Runtime`](crate::interpreter::Runtime) and the
/// bridge.
///
/// # Examples
///
/// ```rust
/// use std::rc::Rc;
/// use sagaflow::monitor::TracingMonitor;
/// use sagaflow::options::SagaOptions;
///
/// let options = SagaOptions::new()
///     .with_monitor(Rc::new(TracingMonitor))
///     .with_on_error(Rc::new(|error| eprintln!("uncaught: {error}")))
///     .with_first_effect_id(100);
///
/// assert_eq!(options.first_effect_id(), 100);
/// ```
#[derive(Clone)]
pub struct SagaOptions {
    monitor: Rc<dyn SagaMonitor>,
    on_error: Option<ErrorHook>,
    emitter: Option<EmitWrapper>,
    first_effect_id: EffectId,
}

impl SagaOptions {
    /// The default options: no monitor, no error hook, ids starting at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the monitor.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Rc<dyn SagaMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Sets the hook receiving uncaught errors instead of the log.
    #[must_use]
    pub fn with_on_error(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    /// Sets the wrapper around the bridge's emission to the bus.
    #[must_use]
    pub fn with_emitter(mut self, wrapper: EmitWrapper) -> Self {
        self.emitter = Some(wrapper);
        self
    }

    /// Sets the first effect id handed out.
    #[must_use]
    pub const fn with_first_effect_id(mut self, id: EffectId) -> Self {
        self.first_effect_id = id;
        self
    }

    /// The configured monitor.
    pub fn monitor(&self) -> Rc<dyn SagaMonitor> {
        Rc::clone(&self.monitor)
    }

    /// The configured error hook.
    pub fn on_error(&self) -> Option<ErrorHook> {
        self.on_error.clone()
    }

    /// The configured emit wrapper.
    pub fn emitter(&self) -> Option<EmitWrapper> {
        self.emitter.clone()
    }

    /// The first effect id handed out.
    pub const fn first_effect_id(&self) -> EffectId {
        self.first_effect_id
    }
}

impl Default for SagaOptions {
    fn default() -> Self {
        Self {
            monitor: Rc::new(NoopMonitor),
            on_error: None,
            emitter: None,
            first_effect_id: 1,
        }
    }
}

impl Debug for SagaOptions {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SagaOptions")
            .field("on_error", &self.on_error.is_some())
            .field("emitter", &self.emitter.is_some())
            .field("first_effect_id", &self.first_effect_id)
            .finish_non_exhaustive()
    }
}
