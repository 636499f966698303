//! Effects and the task bodies that yield them.
//!
//! A task body is anything implementing [`Saga`]: a resumable computation
//! that yields [`Effect`] descriptors and is resumed with their outcome.
//! Bodies are usually written as `async` blocks through [`routine`]:
//!
//! ```rust
//! use sagaflow::effect::routine;
//! use sagaflow::value::{Action, Value};
//!
//! let watcher = routine(|cx| async move {
//!     loop {
//!         let request = cx.take("FETCH").await?;
//!         let task = cx.fork(routine(move |cx| async move {
//!             cx.put(Action::new("FETCHED")).await?;
//!             Ok(request)
//!         })).await?;
//!         cx.join(&task).await?;
//!     }
//!     #[allow(unreachable_code)]
//!     Ok(Value::Undefined)
//! });
//! # let _ = watcher;
//! ```
//!
//! # Effect Kinds
//!
//! | Constructor | Resolves with |
//! |-------------|---------------|
//! | [`take`], [`take_from`] | the next accepted value |
//! | [`put`], [`put_to`] | the dispatch result, or nothing |
//! | [`call`], [`call_saga`], [`cps`] | the call result |
//! | [`fork`], [`spawn`] | the started [`Task`](crate::interpreter::Task) |
//! | [`join`] | the joined task's result |
//! | [`cancel`], [`cancel_self`] | nothing |
//! | [`select`] | a projection of the host state |
//! | [`action_channel`] | a new [`ChannelRef`](crate::channel::ChannelRef) |
//! | [`flush`] | the drained buffer |
//! | [`cancelled`] | whether the current task is cancelled |
//! | [`race`] | a one-entry map from the winning key |
//! | [`all`] | every result, in order |

mod descriptor;
mod routine;
mod saga;

pub use crate::interpreter::CpsCallback;
pub use descriptor::{
    CancelTarget, Called, CpsInvocation, Effect, Invocation, Selector, action_channel,
    action_channel_with, all, call, call_saga, cancel, cancel_self, cancelled, cps, flush, fork,
    fork_with, join, put, put_resolve, put_to, race, select, spawn, spawn_with, take, take_from,
    take_maybe, take_maybe_from,
};
pub use routine::{Cx, Perform, Routine, routine};
pub use saga::{FnSaga, Resume, Saga, Step, from_fn};

pub(crate) use saga::{FailedSaga, OnceSaga};
