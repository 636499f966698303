//! # sagaflow
//!
//! A cooperative effect interpreter: task bodies describe side effects as
//! plain [`Effect`](effect::Effect) values, and an interpreter executes them,
//! manages concurrency between them and propagates cancellation and errors
//! through the tree of tasks they fork.
//!
//! ## Overview
//!
//! - **Buffers and channels**: queues connecting producers to consumers,
//!   with pluggable overflow policies.
//! - **Scheduler**: a micro-batching queue serializing deliveries of actions.
//! - **Interpreter**: drives task bodies, runs effects, maintains fork trees.
//! - **Bridge**: a stage for a host dispatch pipeline feeding actions to the
//!   running tasks.
//!
//! Everything is single-threaded: handles are `!Send` and `!Sync`, and state
//! is shared through `Rc`.
//!
//! ## Feature Flags
//!
//! - `middleware`: the dispatch-pipeline bridge (enabled by default)
//! - `serde`: serialization of [`Action`](value::Action)
//! - `full`: enable all features
//!
//! ## Example
//!
//! ```rust
//! use sagaflow::prelude::*;
//! use std::rc::Rc;
//!
//! let emitter = Emitter::new();
//! let runtime = Runtime::builder().source(Rc::new(emitter.clone())).build();
//!
//! let task = runtime.run(routine(|cx| async move {
//!     let mut seen = Vec::new();
//!     loop {
//!         match cx.take_maybe("TICK").await? {
//!             tick if tick.is_end() => break,
//!             tick => seen.push(tick),
//!         }
//!     }
//!     Ok(Value::List(seen))
//! }));
//!
//! emitter.emit(&Action::new("TICK"));
//! emitter.emit(&Action::new("TICK"));
//! emitter.emit(&Action::end());
//!
//! assert_eq!(task.result().and_then(|seen| seen.as_list().map(<[Value]>::len)), Some(2));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use sagaflow::prelude::*;
/// ```
pub mod prelude {
    pub use crate::buffer::{self, Buffer};
    pub use crate::channel::{ActionSource, BufferedChannel, Channel, ChannelRef, Emitter};
    pub use crate::deferred::{Deferred, Promise};
    pub use crate::effect::{self, Cx, Effect, Resume, Saga, Step, routine};
    pub use crate::error::{ChannelError, Interrupt, SagaError};
    pub use crate::interpreter::{Outcome, Runtime, Task};
    pub use crate::monitor::SagaMonitor;
    pub use crate::options::SagaOptions;
    pub use crate::pattern::Pattern;
    pub use crate::scheduler::Scheduler;
    pub use crate::value::{Action, Value};

    #[cfg(feature = "middleware")]
    pub use crate::middleware::{SagaMiddleware, Store};
}

pub mod buffer;
pub mod channel;
pub mod deferred;
pub mod effect;
pub mod error;
pub mod interpreter;
pub mod monitor;
pub mod options;
pub mod pattern;
pub mod scheduler;
pub mod value;

#[cfg(feature = "middleware")]
pub mod middleware;

static_assertions::assert_not_impl_any!(interpreter::Task: Send, Sync);
static_assertions::assert_not_impl_any!(interpreter::Runtime: Send, Sync);
static_assertions::assert_not_impl_any!(channel::Emitter: Send, Sync);
static_assertions::assert_not_impl_any!(scheduler::Scheduler: Send, Sync);
