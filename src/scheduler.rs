//! Micro-batching scheduler enforcing non-reentrant, FIFO execution.
//!
//! Every `put` performed by a task runs through [`Scheduler::asap`]. When no
//! other scheduled work is executing, the work runs immediately; when a `put`
//! is issued while another one is still being delivered (a taker resumed by
//! the first `put` dispatches again synchronously), the nested work is queued
//! and runs once the outer work returns. This keeps delivery order intact and
//! bounds recursion depth.
//!
//! [`suspend`](Scheduler::suspend) / [`flush`](Scheduler::flush) let a caller
//! hold the queue closed over a region, which the interpreter does while a
//! forked task starts.
//!
//! # Examples
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use sagaflow::scheduler::Scheduler;
//!
//! let scheduler = Scheduler::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let (outer_scheduler, outer_log) = (scheduler.clone(), Rc::clone(&log));
//! scheduler.asap(move || {
//!     outer_log.borrow_mut().push("outer start");
//!     let inner_log = Rc::clone(&outer_log);
//!     outer_scheduler.asap(move || inner_log.borrow_mut().push("inner"));
//!     outer_log.borrow_mut().push("outer end");
//! });
//!
//! assert_eq!(*log.borrow(), vec!["outer start", "outer end", "inner"]);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

type Work = Box<dyn FnOnce()>;

#[derive(Default)]
struct SchedulerInner {
    queue: RefCell<VecDeque<Work>>,
    semaphore: Cell<usize>,
}

/// A shared handle to a FIFO work queue with a suspension counter.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

/// Releases one level of suspension when dropped.
struct SuspendGuard<'a> {
    scheduler: &'a Scheduler,
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.release();
    }
}

impl Scheduler {
    /// Creates an idle scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` now if the scheduler is idle, otherwise after the work
    /// currently executing (and everything queued before it) returns.
    pub fn asap(&self, work: impl FnOnce() + 'static) {
        self.inner.queue.borrow_mut().push_back(Box::new(work));
        if self.inner.semaphore.get() == 0 {
            self.suspend();
            self.flush();
        }
    }

    /// Holds the queue: work scheduled from now on waits for the matching
    /// [`flush`](Self::flush).
    pub fn suspend(&self) {
        self.inner.semaphore.set(self.inner.semaphore.get() + 1);
    }

    /// Releases one level of suspension and, once fully released, drains
    /// the queue.
    pub fn flush(&self) {
        self.release();
        while self.inner.semaphore.get() == 0 {
            let Some(work) = self.inner.queue.borrow_mut().pop_front() else {
                break;
            };
            self.exec(work);
        }
    }

    /// Returns the number of queued work items.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Returns `true` when no work is executing and none is queued.
    pub fn is_idle(&self) -> bool {
        self.inner.semaphore.get() == 0 && self.pending() == 0
    }

    fn exec(&self, work: Work) {
        self.suspend();
        let _guard = SuspendGuard { scheduler: self };
        work();
    }

    fn release(&self) {
        let depth = self.inner.semaphore.get();
        debug_assert!(depth > 0, "scheduler released more often than suspended");
        self.inner.semaphore.set(depth.saturating_sub(1));
    }
}

impl Debug for Scheduler {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Scheduler")
            .field("depth", &self.inner.semaphore.get())
            .field("pending", &self.pending())
            .finish()
    }
}
