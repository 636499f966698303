//! The effect interpreter.
//!
//! A [`Runtime`] runs task bodies. Each running body is driven by its own
//! interpreter, which executes the effects the body yields and resumes it
//! with their outcome. Bodies may fork children; a task settles only once
//! its body and all its attached children settled, fails as soon as any of
//! them fails, and cancels all of them when cancelled.
//!
//! Running interpreters live in an identity-indexed table owned by the
//! runtime. A [`Task`] handle refers to its interpreter by id and does not
//! keep it alive.

mod callback;
mod fork_queue;
mod proc;
mod runners;
mod runtime;
mod task;

pub use callback::CpsCallback;
pub use runtime::{Dispatch, Runtime, RuntimeBuilder, StateAccessor};
pub use task::{Outcome, Task};

/// Identifies one effect run by a runtime. Tasks are identified by the id
/// of the effect that started them.
pub type EffectId = u64;
