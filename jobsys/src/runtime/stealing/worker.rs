use crate::job::Job;
use crate::runtime::stealing::{self, Scheduler, Shared};
use crate::runtime::{RuntimeConfig, Ticker, TickerData, TickerEvents};
use crossbeam_deque::{Stealer, Worker as CbWorker};
use std::cell::{Cell, RefCell};
use std::iter;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, trace};

#[derive(Debug)]
pub(crate) struct Worker {
    index: usize,

    /// Determines how we run the event loop.
    cfg: RefCell<EventLoopConfig>,

    /// Event loop ticker.
    ticker: RefCell<Ticker>,

    /// Whether we should try to find our next job in the global queue.
    pop_global_queue: Cell<bool>,

    /// Jobs submitted by jobs running on this worker. LIFO, so a task that
    /// dispatches and waits finds its own children first.
    local: CbWorker<Job>,

    /// Handle to all of the other workers' deques. If there are N workers we
    /// have N-1 deques to steal from.
    stealers: Vec<Stealer<Job>>,

    /// Set by whoever unparks this worker.
    notified: Arc<AtomicBool>,
}

impl Worker {
    pub(super) fn new(
        index: usize,
        cfg: &RuntimeConfig,
        local: CbWorker<Job>,
        mut stealers: Vec<Stealer<Job>>,
    ) -> Self {
        // Shuffle the stealers so that each worker's search order when trying to
        // steal work is different, to reduce contention.
        fastrand::shuffle(&mut stealers);

        Self {
            index,
            cfg: RefCell::new(cfg.into()),
            ticker: RefCell::new(Ticker::new()),
            pop_global_queue: Cell::new(false),
            local,
            stealers,
            notified: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub(super) fn push_local(&self, job: Job) {
        self.local.push(job);
    }

    fn tick<T: TickerData>(&self, ctx: &T::Context, data: &mut T) -> TickerEvents {
        self.ticker.borrow_mut().tick(ctx, data)
    }

    pub(super) fn find_task(&self, scheduler: &Scheduler) -> Option<Job> {
        // Jobs dispatched from outside the pool only ever land in the injector,
        // check it every `global_queue_interval` ticks so they are not starved
        // by deep nested work.
        if self.pop_global_queue.replace(false)
            && let Some(job) = scheduler.injector.steal_batch_and_pop(&self.local).success()
        {
            return Some(job);
        }

        // 1. Local deque, hot cache and our own children.
        self.local.pop().or_else(|| {
            // 2. No local work, repeatedly try the global injector and other
            //    workers' deques.
            iter::repeat_with(|| {
                scheduler.injector.steal_batch_and_pop(&self.local).or_else(||
                    // Collect returns the first Success(T), so we are not
                    // stealing from every worker each time.
                    self.stealers.iter().map(Stealer::steal).collect())
            })
            .take(self.cfg.borrow().max_steal_retries)
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
        })
    }

    pub(super) fn event_loop(&self, scheduler: &stealing::Handle) {
        debug!(worker = self.index, "jobsys worker started");

        loop {
            if let Some(job) = self.find_task(scheduler) {
                job.run();
            } else {
                // Park the thread until new jobs are scheduled or the pool
                // shuts down.
                scheduler
                    .shared
                    .park_current_thread(&self.notified, || scheduler.has_work());
            }

            let events = self.tick(&scheduler.shared, &mut *self.cfg.borrow_mut());
            if let ControlFlow::Break(_) = self.process_ticker_events(events) {
                break;
            }
        }

        let drained = self.drain(scheduler);
        debug!(worker = self.index, drained, "jobsys worker stopped");
    }

    #[inline(always)]
    fn process_ticker_events(&self, events: TickerEvents) -> ControlFlow<()> {
        if events.contains(TickerEvents::SHUTDOWN) {
            return ControlFlow::Break(());
        }

        // Enforce fairness for jobs submitted from outside the pool.
        if events.contains(TickerEvents::POP_GLOBAL_QUEUE) {
            self.pop_global_queue.set(true);
        }

        ControlFlow::Continue(())
    }

    /// Runs whatever is still queued locally or in the injector. A job
    /// submitted before shutdown must still run exactly once.
    fn drain(&self, scheduler: &Scheduler) -> usize {
        let mut drained = 0;

        while let Some(job) = self.local.pop().or_else(|| {
            iter::repeat_with(|| scheduler.injector.steal())
                .find(|s| !s.is_retry())
                .and_then(|s| s.success())
        }) {
            trace!(worker = self.index, ?job, "draining job on shutdown");
            job.run();
            drained += 1;
        }

        drained
    }
}

#[derive(Debug, Clone)]
struct EventLoopConfig {
    // Policies
    global_queue_interval: u32,

    max_steal_retries: usize,
}

impl EventLoopConfig {
    #[inline(always)]
    fn should_pop_global_queue(&self, tick: u32) -> bool {
        tick.is_multiple_of(self.global_queue_interval)
    }
}

impl From<&RuntimeConfig> for EventLoopConfig {
    fn from(cfg: &RuntimeConfig) -> EventLoopConfig {
        EventLoopConfig {
            global_queue_interval: cfg.global_queue_interval,
            max_steal_retries: cfg.max_steal_retries,
        }
    }
}

impl TickerData for EventLoopConfig {
    type Context = Shared;

    #[inline(always)]
    fn update_and_check(&mut self, shared: &Self::Context, tick: u32) -> TickerEvents {
        // Fast-path to enforce shutdown.
        if shared.is_shutdown() {
            return TickerEvents::SHUTDOWN;
        }

        let mut events = TickerEvents::empty();

        if self.should_pop_global_queue(tick) {
            events.insert(TickerEvents::POP_GLOBAL_QUEUE);
        }

        events
    }
}
