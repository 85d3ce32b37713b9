use crate::context;
use crate::job::Job;
use crate::runtime::stealing::pool::ThreadPool;
use crate::runtime::stealing::{Shared, Worker};
use crate::runtime::{RuntimeConfig, Schedule};
use anyhow::Result;
use crossbeam_deque::{Injector, Stealer, Worker as CbWorker};
use std::iter;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) struct Scheduler {
    /// Runtime configuration, cloned into every worker.
    pub(crate) cfg: RuntimeConfig,

    /// The global injector queue for jobs submitted from outside the pool.
    pub(crate) injector: Injector<Job>,

    /// Every worker's deque, used by threads that are not workers of this
    /// pool but help while waiting.
    stealers: Vec<Stealer<Job>>,

    /// Shared state between workers.
    pub(crate) shared: Shared,

    /// Set once all threads are running.
    pool: OnceLock<ThreadPool>,
}

impl Scheduler {
    /// True if any queue of the pool holds a job.
    pub(crate) fn has_work(&self) -> bool {
        !self.injector.is_empty() || self.stealers.iter().any(|s| !s.is_empty())
    }

    /// Steals one job on behalf of a thread that does not own a deque of this
    /// pool: injector first, then the workers' deques.
    fn steal(&self) -> Option<Job> {
        iter::repeat_with(|| {
            self.injector
                .steal()
                .or_else(|| self.stealers.iter().map(Stealer::steal).collect())
        })
        .take(self.cfg.max_steal_retries)
        .find(|s| !s.is_retry())
        .and_then(|s| s.success())
    }

    /// Runs everything left in the injector on the calling thread.
    fn drain_injector(&self) -> usize {
        let mut drained = 0;

        while let Some(job) = iter::repeat_with(|| self.injector.steal())
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
        {
            job.run();
            drained += 1;
        }

        drained
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Handle(Arc<Scheduler>);

impl Handle {
    /// Creates the scheduler and spawns its worker threads.
    pub(crate) fn try_spawn(cfg: RuntimeConfig) -> Result<Self> {
        let num_workers = cfg.worker_threads;

        let mut local_queues = Vec::with_capacity(num_workers);
        let mut stealers = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let w = CbWorker::new_lifo();
            stealers.push(w.stealer());
            local_queues.push(w);
        }

        let workers = local_queues
            .into_iter()
            .enumerate()
            .map(|(i, local_queue)| {
                // Give each worker a list of all *other* workers' stealers.
                // Stealers are cheap to clone, the inner value is behind an Arc.
                let other_stealers = stealers
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, s)| s.clone())
                    .collect::<Vec<_>>();

                Worker::new(i, &cfg, local_queue, other_stealers)
            })
            .collect::<Vec<_>>();

        let handle = Handle(Arc::new(Scheduler {
            shared: Shared::new(num_workers),
            cfg,
            injector: Injector::new(),
            stealers,
            pool: OnceLock::new(),
        }));

        let pool = ThreadPool::try_spawn(&handle, workers)?;
        // Only this function ever sets the pool.
        let _ = handle.pool.set(pool);

        Ok(handle)
    }

    #[inline]
    pub(crate) fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.cfg.worker_threads
    }

    /// Calls `f` with the current worker if the current thread belongs to
    /// this pool.
    fn with_own_worker<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&Worker) -> R,
    {
        context::with_worker(|ctx| ctx.scheduler.ptr_eq(self).then(|| f(&ctx.worker))).flatten()
    }

    /// Stops the pool. Workers finish the jobs already queued before they
    /// exit, then the injector is drained on the calling thread. Calling it
    /// again is a no-op.
    pub(crate) fn shutdown(&self) -> Result<()> {
        if !self.shared.begin_shutdown() {
            return Ok(());
        }

        let unparked = self.shared.unpark_all_threads();
        debug!(unparked, "jobsys shutting down");

        // A worker cannot join itself, let the other threads exit on their own.
        let res = if self.with_own_worker(|_| ()).is_some() {
            warn!("jobsys pool shut down from one of its own workers, threads are detached");
            Ok(())
        } else {
            self.pool.get().map_or(Ok(()), ThreadPool::join_all)
        };

        let drained = self.drain_injector();
        debug!(drained, "jobsys shut down");

        res
    }
}

impl Schedule for Handle {
    fn schedule(&self, job: Job) {
        // Nobody is left to pick the job up.
        if self.shared.is_shutdown() {
            job.run();
            return;
        }

        // Jobs submitted by a worker go to its LIFO deque, where the worker
        // finds them first and the others can steal them.
        let mut job = Some(job);
        self.with_own_worker(|worker| {
            if let Some(job) = job.take() {
                worker.push_local(job);
            }
        });

        if let Some(job) = job {
            self.injector.push(job);

            // Shutdown may have drained the injector between our check and
            // the push.
            if self.shared.is_shutdown() {
                self.drain_injector();
                return;
            }
        }

        self.shared.unpark_one_thread();
    }

    fn run_pending(&self) -> bool {
        let job = self
            .with_own_worker(|worker| worker.find_task(self))
            .unwrap_or_else(|| self.steal());

        match job {
            Some(job) => {
                job.run();
                true
            }
            None => false,
        }
    }

    fn park_timeout(&self) -> Duration {
        self.cfg.wait_park_timeout
    }
}

impl Deref for Handle {
    type Target = Arc<Scheduler>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Scheduler: Send, Sync);
    assert_impl_all!(Handle: Send, Sync, Clone);
}
