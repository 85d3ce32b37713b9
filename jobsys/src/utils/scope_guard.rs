/// Runs a closure when dropped, on normal exit and on unwind alike.
///
/// Used wherever a counter or a thread-local slot must be restored no matter
/// how the enclosing scope is left, e.g. releasing a job's slot on its
/// context after the task panicked.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    // `Option` so the closure can be moved out of `&mut self` in `drop`.
    on_exit: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(on_exit: F) -> Self {
        Self {
            on_exit: Some(on_exit),
        }
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn test_runs_on_normal_exit() {
        let hits = Cell::new(0);
        {
            let _guard = ScopeGuard::new(|| hits.set(hits.get() + 1));
            assert_eq!(hits.get(), 0);
        }
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_runs_on_unwind() {
        let hits = Cell::new(0);
        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = ScopeGuard::new(|| hits.set(hits.get() + 1));
            panic!("boom");
        }));

        assert!(res.is_err());
        assert_eq!(hits.get(), 1);
    }
}
