use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, Thread};

/// State shared by every worker of a pool: the shutdown flag and the list of
/// parked workers.
#[derive(Debug)]
pub(crate) struct Shared {
    shutdown: AtomicBool,

    /// Fast path for `unpark_one_thread`, lets schedulers skip the lock when
    /// nobody sleeps.
    num_parked: AtomicUsize,

    /// LIFO collection of parked threads. We unpark the thread that parked
    /// last, its cache is the hottest.
    parked_threads: Mutex<Vec<Parked>>,
}

#[derive(Debug)]
struct Parked {
    thread: Thread,
    notified: Arc<AtomicBool>,
}

impl Shared {
    pub(crate) fn new(worker_threads: usize) -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            num_parked: AtomicUsize::new(0),
            parked_threads: Mutex::new(Vec::with_capacity(worker_threads)),
        }
    }

    #[inline]
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Raises the shutdown flag. Returns false if it was already raised.
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::SeqCst)
    }

    /// Parks the current thread until a scheduler hands out new work or the
    /// pool shuts down.
    ///
    /// `has_work` is checked while holding the lock and after publishing this
    /// thread as parked: a job pushed concurrently is either seen here or its
    /// pusher sees us in the parked list.
    pub(crate) fn park_current_thread<F>(&self, notified: &Arc<AtomicBool>, has_work: F)
    where
        F: FnOnce() -> bool,
    {
        {
            let mut parked_threads = self.parked_threads.lock();

            self.num_parked.fetch_add(1, Ordering::SeqCst);
            atomic::fence(Ordering::SeqCst);

            if has_work() || self.is_shutdown() {
                self.num_parked.fetch_sub(1, Ordering::SeqCst);
                return;
            }

            notified.store(false, Ordering::Release);
            parked_threads.push(Parked {
                thread: thread::current(),
                notified: Arc::clone(notified),
            });
        }

        // Loop to account for spurious wakeups.
        while !notified.load(Ordering::Acquire) {
            thread::park();
        }
    }

    pub(crate) fn unpark_one_thread(&self) -> bool {
        atomic::fence(Ordering::SeqCst);
        if self.num_parked.load(Ordering::SeqCst) == 0 {
            return false;
        }

        match self.parked_threads.lock().pop() {
            Some(parked) => {
                self.num_parked.fetch_sub(1, Ordering::SeqCst);
                parked.wake();
                true
            }
            None => false,
        }
    }

    pub(crate) fn unpark_all_threads(&self) -> usize {
        let mut parked_threads = self.parked_threads.lock();
        let num_unparked = parked_threads.len();

        for parked in parked_threads.drain(..) {
            self.num_parked.fetch_sub(1, Ordering::SeqCst);
            parked.wake();
        }

        num_unparked
    }

    #[cfg(test)]
    pub(crate) fn num_parked(&self) -> usize {
        self.num_parked.load(Ordering::SeqCst)
    }
}

impl Parked {
    fn wake(self) {
        self.notified.store(true, Ordering::Release);
        self.thread.unpark();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_utils::Backoff;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Shared: Send, Sync);

    fn wait_until_parked(shared: &Shared, n: usize) {
        let backoff = Backoff::new();
        while shared.num_parked() < n {
            backoff.snooze();
        }
    }

    #[test]
    fn test_park_returns_when_work_is_visible() {
        let shared = Shared::new(1);
        let notified = Arc::new(AtomicBool::new(false));

        shared.park_current_thread(&notified, || true);
        assert_eq!(shared.num_parked(), 0);
        assert!(!shared.unpark_one_thread());
    }

    #[test]
    fn test_unpark_one_wakes_parked_thread() {
        let shared = Arc::new(Shared::new(1));

        let handle = thread::spawn({
            let shared = Arc::clone(&shared);
            move || {
                let notified = Arc::new(AtomicBool::new(false));
                shared.park_current_thread(&notified, || false);
            }
        });

        wait_until_parked(&shared, 1);
        assert!(shared.unpark_one_thread());
        handle.join().unwrap();
        assert_eq!(shared.num_parked(), 0);
    }

    #[test]
    fn test_shutdown_wakes_everyone() {
        let shared = Arc::new(Shared::new(3));

        let handles = (0..3)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let notified = Arc::new(AtomicBool::new(false));
                    shared.park_current_thread(&notified, || false);
                })
            })
            .collect::<Vec<_>>();

        wait_until_parked(&shared, 3);
        assert!(shared.begin_shutdown());
        assert!(!shared.begin_shutdown());
        assert_eq!(shared.unpark_all_threads(), 3);

        for handle in handles {
            handle.join().unwrap();
        }

        // Parking after shutdown returns immediately.
        shared.park_current_thread(&Arc::new(AtomicBool::new(false)), || false);
    }
}
