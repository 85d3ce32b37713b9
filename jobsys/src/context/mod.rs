//! Thread-local state of the job system.
//!
//! A worker thread owns its [`WorkerContext`]: the local deque it pops from and
//! a handle to the scheduler it belongs to. Any thread, worker or not, can
//! also have an executor *installed* for the duration of a closure, which is
//! what [`JobSystem::install`](crate::JobSystem::install) and the test macros
//! rely on to route free-function dispatches to a specific system.

use crate::runtime::Executor;
use crate::runtime::stealing::{self, Worker};
use crate::utils::ScopeGuard;
use std::cell::{OnceCell, RefCell};

// Exports
pub(crate) mod scratch;

pub(crate) struct WorkerContext {
    pub(crate) worker: Worker,
    pub(crate) scheduler: stealing::Handle,
}

thread_local! {
    static WORKER: OnceCell<WorkerContext> = const { OnceCell::new() };

    static INSTALLED: RefCell<Option<Executor>> = const { RefCell::new(None) };
}

#[track_caller]
pub(crate) fn init_worker_context(worker: Worker, scheduler: stealing::Handle) {
    WORKER.with(|cell| {
        if cell.set(WorkerContext { worker, scheduler }).is_err() {
            panic!("worker context already initialized on this thread");
        }
    });
}

/// Calls `f` with the worker context of the current thread, if it is a
/// worker. Nested calls are allowed, jobs run from inside the worker's event
/// loop call this again to submit into the local deque.
#[inline]
pub(crate) fn with_worker<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&WorkerContext) -> R,
{
    WORKER
        .try_with(|cell| cell.get().map(f))
        .ok()
        .flatten()
}

#[track_caller]
pub(crate) fn expect_worker<F, R>(f: F) -> R
where
    F: FnOnce(&WorkerContext) -> R,
{
    match with_worker(f) {
        Some(r) => r,
        None => panic!("current thread is not a jobsys worker"),
    }
}

pub(crate) fn installed() -> Option<Executor> {
    INSTALLED
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten()
}

/// Installs `executor` on the current thread while `f` runs. The previously
/// installed executor is restored afterwards, also on unwind.
pub(crate) fn with_installed<F, R>(executor: Executor, f: F) -> R
where
    F: FnOnce() -> R,
{
    let previous = INSTALLED.with(|slot| slot.replace(Some(executor)));
    let _restore = ScopeGuard::new(move || {
        let _ = INSTALLED.try_with(|slot| slot.replace(previous));
    });

    f()
}
