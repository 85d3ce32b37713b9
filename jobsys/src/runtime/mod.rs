use crate::context;
use crate::job::Job;
use std::time::Duration;

// Public API
pub mod builder;
pub use builder::Builder;

pub mod system;
pub use system::{JobSystem, initialize, shutdown, thread_count};

// Exports
pub(crate) use builder::RuntimeConfig;

pub(crate) mod inline;

pub(crate) mod stealing;

mod ticker;
use ticker::{Ticker, TickerData, TickerEvents};

/// The interface the dispatcher needs from a worker substrate.
pub(crate) trait Schedule {
    /// Hands a job over for asynchronous execution. The job runs exactly once,
    /// eventually, on some thread.
    fn schedule(&self, job: Job);

    /// Runs at most one ready job on the calling thread. Returns false if no
    /// job was found. This is what makes `wait` safe to call from a worker:
    /// the waiter keeps the substrate moving instead of blocking a slot.
    fn run_pending(&self) -> bool;

    /// How long a waiter that found nothing to run sleeps before retrying.
    fn park_timeout(&self) -> Duration;
}

// Enum dispatch over the two substrates, the set is closed and this keeps
// `Schedule` free of dyn-compatibility constraints.
#[derive(Debug, Clone)]
pub(crate) enum Executor {
    Inline(inline::Handle),
    Stealing(stealing::Handle),
}

impl Schedule for Executor {
    #[inline]
    fn schedule(&self, job: Job) {
        match self {
            Executor::Inline(handle) => handle.schedule(job),
            Executor::Stealing(handle) => handle.schedule(job),
        }
    }

    #[inline]
    fn run_pending(&self) -> bool {
        match self {
            Executor::Inline(handle) => handle.run_pending(),
            Executor::Stealing(handle) => handle.run_pending(),
        }
    }

    fn park_timeout(&self) -> Duration {
        match self {
            Executor::Inline(handle) => handle.park_timeout(),
            Executor::Stealing(handle) => handle.park_timeout(),
        }
    }
}

/// Resolves the substrate used by the free functions (`dispatch`, `wait`,
/// ...) on the current thread, in order:
///
/// 1. the pool owning the current worker thread,
/// 2. the system installed on this thread with `JobSystem::install`,
/// 3. the process-wide system set up by `initialize`,
/// 4. inline execution on the calling thread.
pub(crate) fn current() -> Executor {
    if let Some(handle) = context::with_worker(|ctx| ctx.scheduler.clone()) {
        return Executor::Stealing(handle);
    }

    context::installed()
        .or_else(system::global_executor)
        .unwrap_or_else(|| Executor::Inline(inline::Handle::default()))
}
