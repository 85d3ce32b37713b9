use crate::diagnostics::{self, Diagnostic, DiagnosticsSink, SharedSink};
use crate::runtime::{Executor, JobSystem, inline, stealing};
use anyhow::{Result, anyhow};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Global queue interval default value.
const GLOBAL_QUEUE_INTERVAL: u32 = 31;

/// Maximum number of stealing attempts.
const MAX_STEAL_RETRIES: usize = 3;

/// How long a waiter with nothing to help with sleeps before looking for
/// runnable jobs again.
pub(crate) const WAIT_PARK_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Inline,
    Stealing,
}

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let worker_count = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = worker_count.fetch_add(1, Ordering::Relaxed);
        format!("jobsys-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// Builds a [`JobSystem`].
///
/// ```
/// let system = jobsys::Builder::new_stealing()
///     .worker_threads(2)
///     .thread_name("physics")
///     .try_build()?;
///
/// assert_eq!(system.thread_count(), 2);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Builder {
    kind: Kind,

    /// Number of worker threads. Defaults to 1 per logical core.
    worker_threads: Option<usize>,

    /// Name fn used for threads spawned by the pool.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the pool.
    thread_stack_size: Option<usize>,

    /// How many ticks before a worker prefers the global injector queue over
    /// its local deque.
    global_queue_interval: u32,

    /// How many times a thread loops over the global injector queue and the
    /// other workers' deques when one of them asks to retry.
    max_steal_retries: usize,

    /// Sleep duration of a waiter that found nothing to run.
    wait_park_timeout: Duration,

    /// Receives the start-up line.
    diagnostics: SharedSink,
}

impl Builder {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            global_queue_interval: GLOBAL_QUEUE_INTERVAL,
            max_steal_retries: MAX_STEAL_RETRIES,
            wait_park_timeout: WAIT_PARK_TIMEOUT,
            diagnostics: diagnostics::default_sink(),
        }
    }

    /// A pool of worker threads sharing work through work-stealing deques.
    pub fn new_stealing() -> Builder {
        Builder::new(Kind::Stealing)
    }

    /// No worker threads: every group runs on the dispatching thread, in
    /// group order, before `dispatch` returns. Mostly useful for debugging and
    /// deterministic tests.
    pub fn new_inline() -> Builder {
        Builder::new(Kind::Inline)
    }

    /// The number of worker threads. Only relevant for the stealing pool.
    ///
    /// Defaults to 1 worker per logical core. Threads blocked in
    /// [`wait`](crate::wait) also run jobs, they do not count towards this
    /// number.
    #[track_caller]
    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "worker_threads must be greater than 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets name of threads spawned by the pool.
    ///
    /// The default name is "jobsys-{id}", where id is monotonically
    /// increasing.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned by the
    /// pool.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    ///
    /// Tasks that dispatch and wait recursively run nested groups on the same
    /// stack, deep recursion needs a larger stack.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(val > 0, "thread_stack_size must be greater than 0");
        self.thread_stack_size = Some(val);
        self
    }

    /// Sets the number of scheduler ticks after which a worker takes work from
    /// the global queue before looking at its own deque.
    ///
    /// Jobs submitted from outside the pool land in the global queue, jobs
    /// submitted by a worker land in its LIFO deque. A smaller interval gets
    /// external batches started sooner, a larger one favours finishing nested
    /// work with a hot cache.
    #[track_caller]
    pub fn global_queue_interval(mut self, val: u32) -> Self {
        assert!(val > 0, "global_queue_interval must be greater than 0");
        self.global_queue_interval = val;
        self
    }

    #[track_caller]
    pub fn max_steal_retries(mut self, val: usize) -> Self {
        assert!(val > 0, "max_steal_retries must be greater than 0");
        self.max_steal_retries = val;
        self
    }

    #[track_caller]
    pub fn wait_park_timeout(mut self, val: Duration) -> Self {
        assert!(!val.is_zero(), "wait_park_timeout must be greater than 0");
        self.wait_park_timeout = val;
        self
    }

    /// Sink receiving the start-up line. Defaults to `tracing`.
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Creates the configured `JobSystem`. Worker threads are running when
    /// this returns.
    pub fn try_build(self) -> Result<JobSystem> {
        let started = Instant::now();
        let cfg = RuntimeConfig::try_from(self)?;

        let executor = match cfg.kind {
            Kind::Inline => Executor::Inline(inline::Handle::new(&cfg)),
            Kind::Stealing => Executor::Stealing(stealing::Handle::try_spawn(cfg.clone())?),
        };

        if cfg.kind == Kind::Stealing {
            cfg.diagnostics.report(Diagnostic::info(format!(
                "jobsys initialized with [{} cores] [{} max concurrency] ({} ms)",
                cfg.num_cores,
                cfg.worker_threads,
                started.elapsed().as_millis()
            )));
        }

        Ok(JobSystem::new(executor))
    }
}

// Builder exported as a config object, consumed by the scheduler and its
// workers.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) kind: Kind,
    pub(crate) num_cores: usize,
    pub(crate) worker_threads: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) global_queue_interval: u32,
    pub(crate) max_steal_retries: usize,
    pub(crate) wait_park_timeout: Duration,
    pub(crate) diagnostics: SharedSink,
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.kind == Kind::Stealing && self.worker_threads == 0 {
            return Err(anyhow!("stealing pool needs at least one worker thread"));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let num_cores = available_cores();

        let cfg = RuntimeConfig {
            kind: builder.kind,
            num_cores,
            worker_threads: builder.worker_threads.unwrap_or(num_cores),
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            global_queue_interval: builder.global_queue_interval,
            max_steal_retries: builder.max_steal_retries,
            wait_park_timeout: builder.wait_park_timeout,
            diagnostics: builder.diagnostics,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

/// Logical cores available to the process, at least 1.
pub(crate) fn available_cores() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}
