use crate::context;
use crate::job::dispatch::dispatch_on;
use crate::job::{Context, JobArgs, dispatch_group_count};
use crate::runtime::builder::available_cores;
use crate::runtime::{Builder, Executor};
use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::error;

/// A running job system: a pool of worker threads, or the inline substrate.
///
/// Dropping the system (or calling [`shutdown`](JobSystem::shutdown)) stops
/// the workers after they drained the jobs already queued.
#[derive(Debug)]
pub struct JobSystem {
    executor: Executor,
}

impl JobSystem {
    pub(super) fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Number of worker threads, 0 for the inline substrate.
    pub fn thread_count(&self) -> usize {
        match &self.executor {
            Executor::Inline(_) => 0,
            Executor::Stealing(handle) => handle.thread_count(),
        }
    }

    /// Runs `f` on the current thread with this system as the target of the
    /// free functions ([`dispatch`](crate::dispatch), [`wait`](crate::wait),
    /// ...). Worker threads of a pool always use their own pool.
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        context::with_installed(self.executor.clone(), f)
    }

    /// [`execute`](crate::execute) on this system.
    pub fn execute<F>(&self, ctx: &Context, task: F)
    where
        F: Fn(JobArgs<'_>) + Send + Sync + 'static,
    {
        self.dispatch(ctx, 1, 1, 0, task);
    }

    /// [`dispatch`](crate::dispatch) on this system.
    pub fn dispatch<F>(
        &self,
        ctx: &Context,
        job_count: u32,
        group_size: u32,
        shared_memory_size: u32,
        task: F,
    ) where
        F: Fn(JobArgs<'_>) + Send + Sync + 'static,
    {
        if dispatch_group_count(job_count, group_size) == 0 {
            return;
        }

        dispatch_on(
            &self.executor,
            ctx,
            job_count,
            group_size,
            shared_memory_size,
            Arc::new(task),
        );
    }

    /// Stops and joins the worker threads. Jobs queued before the call still
    /// run.
    pub fn shutdown(self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&self) {
        if let Executor::Stealing(handle) = &self.executor
            && let Err(e) = handle.shutdown()
        {
            error!(error = ?e, "error during jobsys shutdown");
        }
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

// Test-only helpers
#[cfg(test)]
impl JobSystem {
    pub(crate) fn stealing_handle(&self) -> Option<crate::runtime::stealing::Handle> {
        match &self.executor {
            Executor::Stealing(handle) => Some(handle.clone()),
            Executor::Inline(_) => None,
        }
    }
}

static GLOBAL: RwLock<Option<JobSystem>> = parking_lot::const_rwlock(None);

/// Starts the process-wide job system with
/// `min(max_thread_count, available_parallelism)` workers, at least one.
///
/// Calling it again while the system runs does nothing.
///
/// ```
/// jobsys::initialize(4)?;
/// assert!(jobsys::thread_count() >= 1);
///
/// let ctx = jobsys::Context::new();
/// jobsys::execute(&ctx, |args| assert_eq!(args.job_index, 0));
/// jobsys::wait(&ctx);
///
/// jobsys::shutdown();
/// assert_eq!(jobsys::thread_count(), 0);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn initialize(max_thread_count: usize) -> Result<()> {
    let mut global = GLOBAL.write();
    if global.is_some() {
        return Ok(());
    }

    let worker_threads = max_thread_count.clamp(1, available_cores());
    *global = Some(
        Builder::new_stealing()
            .worker_threads(worker_threads)
            .try_build()?,
    );

    Ok(())
}

/// Stops the process-wide job system, if any. Jobs queued before the call
/// still run.
pub fn shutdown() {
    // Joins outside of the lock.
    let system = GLOBAL.write().take();
    drop(system);
}

/// Number of workers of the process-wide job system, 0 when it is not
/// running.
pub fn thread_count() -> usize {
    GLOBAL.read().as_ref().map_or(0, JobSystem::thread_count)
}

pub(crate) fn global_executor() -> Option<Executor> {
    GLOBAL.read().as_ref().map(|system| system.executor().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{execute, wait};
    use std::sync::atomic::{AtomicBool, Ordering};

    // The only test touching the process-wide system.
    #[test]
    fn test_global_facade_lifecycle() -> Result<()> {
        // Harmless before `initialize`.
        shutdown();
        assert_eq!(thread_count(), 0);
        assert!(global_executor().is_none());

        initialize(2)?;
        let workers = thread_count();
        assert_eq!(workers, 2.min(available_cores()));

        // Idempotent: the running system is kept.
        initialize(64)?;
        assert_eq!(thread_count(), workers);

        let ran = Arc::new(AtomicBool::new(false));
        let ctx = Context::new();
        execute(&ctx, {
            let ran = Arc::clone(&ran);
            move |_| ran.store(true, Ordering::Release)
        });
        wait(&ctx);
        assert!(ran.load(Ordering::Acquire));

        shutdown();
        assert_eq!(thread_count(), 0);
        shutdown();

        // Zero is clamped to one worker.
        initialize(0)?;
        assert_eq!(thread_count(), 1);
        shutdown();

        Ok(())
    }

    #[test]
    fn test_inline_system_has_no_threads() -> Result<()> {
        let system = Builder::new_inline().try_build()?;
        assert_eq!(system.thread_count(), 0);
        assert!(matches!(system.executor(), Executor::Inline(_)));

        let ran = Arc::new(AtomicBool::new(false));
        let ctx = Context::new();
        system.execute(&ctx, {
            let ran = Arc::clone(&ran);
            move |_| ran.store(true, Ordering::Release)
        });

        // Ran before `execute` returned.
        assert!(!ctx.is_busy());
        assert!(ran.load(Ordering::Acquire));
        Ok(())
    }

    #[test]
    fn test_install_restores_previous_system() -> Result<()> {
        let outer = Builder::new_inline().try_build()?;
        let inner = Builder::new_stealing().worker_threads(1).try_build()?;

        outer.install(|| {
            inner.install(|| {
                assert!(matches!(context::installed(), Some(Executor::Stealing(_))));
            });
            assert!(matches!(context::installed(), Some(Executor::Inline(_))));
        });

        assert!(context::installed().is_none());
        Ok(())
    }
}
