use crate::context;
use crate::runtime::stealing::{self, Worker};
use anyhow::{Context as _, Result, anyhow};
use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Owns the worker threads of a stealing scheduler.
#[derive(Debug)]
pub(super) struct ThreadPool {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawns one thread per worker and returns once every thread has
    /// installed its worker context.
    ///
    /// If a thread fails to spawn, the ones already running are shut down and
    /// joined before the error is returned.
    pub(super) fn try_spawn(scheduler: &stealing::Handle, workers: Vec<Worker>) -> Result<Self> {
        let num_workers = workers.len();
        let started = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(num_workers);

        for worker in workers {
            let index = worker.index();

            match spawn_worker_thread(scheduler.clone(), worker, Arc::clone(&started)) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    Self::abort(scheduler, handles);
                    return Err(e.context(format!("failed to spawn jobsys worker {index}")));
                }
            }
        }

        // Spawning threads is async, wait for all threads to be started...
        let backoff = Backoff::new();
        while started.load(Ordering::Acquire) < num_workers {
            if handles.iter().any(JoinHandle::is_finished) {
                Self::abort(scheduler, handles);
                return Err(anyhow!("jobsys worker exited during start-up"));
            }
            backoff.snooze();
        }

        debug!(workers = num_workers, "jobsys thread pool started");

        Ok(Self {
            handles: Mutex::new(handles),
        })
    }

    fn abort(scheduler: &stealing::Handle, handles: Vec<JoinHandle<()>>) {
        let pool = Self {
            handles: Mutex::new(handles),
        };

        scheduler.shared.begin_shutdown();
        scheduler.shared.unpark_all_threads();
        if let Err(e) = pool.join_all() {
            error!(error = %e, "jobsys failed to join workers after start-up error");
        }
    }

    /// Joins every worker that has not been joined yet.
    pub(super) fn join_all(&self) -> Result<()> {
        let mut handles = self.handles.lock();

        let errors = handles
            .drain(..)
            .filter_map(|handle| {
                let name = handle.thread().name().map(str::to_owned);
                handle.join().err().map(|_| name)
            })
            .collect::<Vec<_>>();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} thread(s) panicked: {:?}", errors.len(), errors))
        }
    }
}

fn spawn_worker_thread(
    scheduler: stealing::Handle,
    worker: Worker,
    started: Arc<AtomicUsize>,
) -> Result<JoinHandle<()>> {
    let mut builder = thread::Builder::new().name((scheduler.cfg.thread_name.0)());

    if let Some(stack_size) = scheduler.cfg.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }

    builder
        .spawn(move || {
            context::init_worker_context(worker, scheduler);
            started.fetch_add(1, Ordering::Release);

            context::expect_worker(|ctx| ctx.worker.event_loop(&ctx.scheduler));
        })
        .context("thread::Builder::spawn")
}
