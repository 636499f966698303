//! Observation hooks for the interpreter.
//!
//! A [`SagaMonitor`] is notified of every effect the interpreter starts and
//! of how it settles. Every method has an empty default, so an implementation
//! only overrides what it cares about.

use crate::effect::{Effect, Resume};
use crate::error::SagaError;
use crate::interpreter::EffectId;
use crate::value::Action;

/// Receives interpreter lifecycle events.
pub trait SagaMonitor {
    /// A root task was started through `run`.
    fn root_saga_started(&self, _effect_id: EffectId, _name: &str) {}

    /// An effect was yielded and is about to run.
    ///
    /// `label` is the race key or the `all` index for effects nested in a
    /// combinator, and empty otherwise.
    fn effect_triggered(
        &self,
        _effect_id: EffectId,
        _parent_effect_id: EffectId,
        _label: &str,
        _effect: &Effect,
    ) {
    }

    /// An effect settled with anything but an error.
    fn effect_resolved(&self, _effect_id: EffectId, _result: &Resume) {}

    /// An effect failed.
    fn effect_rejected(&self, _effect_id: EffectId, _error: &SagaError) {}

    /// An effect was cancelled before it settled.
    fn effect_cancelled(&self, _effect_id: EffectId) {}

    /// An action entered the bridge.
    fn action_dispatched(&self, _action: &Action) {}
}

/// A monitor ignoring every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl SagaMonitor for NoopMonitor {}

/// A monitor reporting every event as a `trace`-level [`tracing`] event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl SagaMonitor for TracingMonitor {
    fn root_saga_started(&self, effect_id: EffectId, name: &str) {
        tracing::trace!(effect_id, name, "root saga started");
    }

    fn effect_triggered(
        &self,
        effect_id: EffectId,
        parent_effect_id: EffectId,
        label: &str,
        effect: &Effect,
    ) {
        tracing::trace!(
            effect_id,
            parent_effect_id,
            label,
            kind = effect.kind(),
            "effect triggered"
        );
    }

    fn effect_resolved(&self, effect_id: EffectId, result: &Resume) {
        tracing::trace!(effect_id, ?result, "effect resolved");
    }

    fn effect_rejected(&self, effect_id: EffectId, error: &SagaError) {
        tracing::trace!(effect_id, %error, "effect rejected");
    }

    fn effect_cancelled(&self, effect_id: EffectId) {
        tracing::trace!(effect_id, "effect cancelled");
    }

    fn action_dispatched(&self, action: &Action) {
        tracing::trace!(action = action.action_type(), "action dispatched");
    }
}
