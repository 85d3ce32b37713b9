use crate::diagnostics::{self, Diagnostic, DiagnosticsSink, SharedSink};
use crate::runtime::{self, Schedule};
use crossbeam_utils::{Backoff, CachePadded};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Completion state shared between a [`Context`] and its in-flight jobs.
///
/// Jobs only ever hold an `Arc<Latch>`, never the `Context` itself, so the
/// owner can move or drop its context without leaving jobs with a dangling
/// reference.
pub(crate) struct Latch {
    /// Number of dispatched groups that have not finished yet.
    outstanding: CachePadded<AtomicUsize>,

    /// Only used to put a waiter to sleep when there is nothing left to help
    /// with. The counter itself is never protected by this lock.
    lock: Mutex<()>,
    idle: Condvar,

    /// First panic raised by a job of this context, handed to the next waiter.
    panic: Mutex<Option<PanicPayload>>,

    sink: SharedSink,
}

impl Latch {
    fn new(sink: SharedSink) -> Arc<Self> {
        Arc::new(Self {
            outstanding: CachePadded::new(AtomicUsize::new(0)),
            lock: Mutex::new(()),
            idle: Condvar::new(),
            panic: Mutex::new(None),
            sink,
        })
    }

    /// Must be called before any job accounted by `n` is submitted.
    #[inline]
    pub(crate) fn increment(&self, n: usize) {
        self.outstanding.fetch_add(n, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn complete_one(&self) {
        let prev = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "context counter underflow");

        if prev == 1 {
            // Taking the lock orders this notification after any waiter that
            // checked the counter and is about to sleep.
            let _guard = self.lock.lock();
            self.idle.notify_all();
        }
    }

    #[inline]
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_busy(&self) -> bool {
        self.outstanding() > 0
    }

    pub(crate) fn record_panic(&self, group_id: u32, payload: PanicPayload) {
        self.sink.report(Diagnostic::error(format!(
            "jobsys job in group {group_id} panicked: {}",
            panic_message(&payload)
        )));

        let mut slot = self.panic.lock();
        if slot.is_none() {
            *slot = Some(payload);
        }
    }

    pub(crate) fn take_panic(&self) -> Option<PanicPayload> {
        self.panic.lock().take()
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        self.sink.report(diagnostic);
    }

    /// Blocks until the counter reaches zero.
    ///
    /// The calling thread keeps executing ready jobs from the current
    /// substrate while it waits, so a worker waiting on a nested dispatch
    /// drains its own children instead of holding its slot idle. Only when
    /// nothing is runnable does it back off and finally sleep, with a timeout
    /// so that it notices jobs submitted after it went to sleep.
    pub(crate) fn wait(&self) {
        if !self.is_busy() {
            return;
        }

        let executor = runtime::current();
        let backoff = Backoff::new();

        while self.is_busy() {
            if executor.run_pending() {
                backoff.reset();
                continue;
            }

            if backoff.is_completed() {
                let mut guard = self.lock.lock();
                if self.is_busy() {
                    self.idle.wait_for(&mut guard, executor.park_timeout());
                }
            } else {
                backoff.snooze();
            }
        }
    }
}

impl fmt::Debug for Latch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Latch")
            .field("outstanding", &self.outstanding())
            .field("panicked", &self.panic.lock().is_some())
            .finish()
    }
}

fn panic_message(payload: &PanicPayload) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// A caller-owned handle tracking one logical batch of dispatched work.
///
/// Every group handed out by [`dispatch`](crate::dispatch) or
/// [`execute`](crate::execute) counts as one outstanding unit until the group
/// finishes. A context can be reused for any number of sequential or
/// overlapping dispatches.
///
/// Dropping a context that is still busy is a bug in the caller: a
/// [`LogLevel::Fatal`](crate::LogLevel::Fatal) diagnostic is reported and the
/// drop then waits for the outstanding work.
///
/// ```
/// let ctx = jobsys::Context::new();
/// jobsys::dispatch(&ctx, 10, 3, 0, |args| {
///     assert!(args.job_index < 10);
/// });
/// jobsys::wait(&ctx);
/// assert!(!jobsys::is_busy(&ctx));
/// ```
#[derive(Debug)]
pub struct Context {
    latch: Arc<Latch>,
}

impl Context {
    /// Creates an idle context reporting through the default `tracing` sink.
    pub fn new() -> Self {
        Self::with_sink(diagnostics::default_sink())
    }

    /// Creates an idle context reporting its diagnostics to `sink`.
    pub fn with_sink(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            latch: Latch::new(sink),
        }
    }

    /// Returns true while any group dispatched on this context is unfinished.
    pub fn is_busy(&self) -> bool {
        self.latch.is_busy()
    }

    /// Number of unfinished groups.
    pub fn outstanding(&self) -> usize {
        self.latch.outstanding()
    }

    /// Blocks until every group dispatched on this context has finished,
    /// running other ready jobs on the calling thread in the meantime.
    ///
    /// # Panics
    ///
    /// If a task of this context panicked, the first panic is resumed here
    /// once the context is idle.
    pub fn wait(&self) {
        self.latch.wait();

        if let Some(payload) = self.latch.take_panic() {
            panic::resume_unwind(payload);
        }
    }

    pub(crate) fn latch(&self) -> &Arc<Latch> {
        &self.latch
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.latch.is_busy() {
            self.latch
                .report(Diagnostic::fatal("jobsys::Context destruction of busy context"));
        }

        // Job panics are not resumed here, we may already be unwinding.
        self.latch.wait();
    }
}

/// Returns true while any group dispatched on `ctx` is unfinished.
pub fn is_busy(ctx: &Context) -> bool {
    ctx.is_busy()
}

/// Blocks until `ctx` is idle. See [`Context::wait`].
pub fn wait(ctx: &Context) {
    ctx.wait()
}
