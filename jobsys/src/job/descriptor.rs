use crate::context::scratch;
use crate::job::args::{GroupRange, JobArgs};
use crate::job::context::Latch;
use crate::utils::ScopeGuard;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Type-erased task shared by every group of one dispatch.
pub(crate) type TaskFn = Arc<dyn Fn(JobArgs<'_>) + Send + Sync + 'static>;

/// One group of one dispatch, the unit handed to a substrate.
pub(crate) struct Job {
    task: TaskFn,
    latch: Arc<Latch>,
    group: GroupRange,
    shared_memory_size: u32,
}

impl Job {
    /// The latch must already account for this job.
    pub(crate) fn new(
        task: TaskFn,
        latch: Arc<Latch>,
        group: GroupRange,
        shared_memory_size: u32,
    ) -> Self {
        debug_assert!(latch.is_busy(), "job submitted before the increment");
        debug_assert!(!group.is_empty());

        Self {
            task,
            latch,
            group,
            shared_memory_size,
        }
    }

    /// Runs every index of the group in order on the calling thread, then
    /// signals the latch. Never unwinds: a task panic is recorded on the
    /// latch and the rest of the group is skipped.
    pub(crate) fn run(self) {
        let Job {
            task,
            latch,
            group,
            shared_memory_size,
        } = self;

        // Runs last, after the task handle is gone.
        let _complete = ScopeGuard::new({
            let latch = Arc::clone(&latch);
            move || latch.complete_one()
        });

        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            scratch::with_scratch(shared_memory_size as usize, |mut shared_memory| {
                for job_index in group.indices() {
                    task(JobArgs::new(job_index, &group, shared_memory.as_deref_mut()));
                }
            })
        }));

        drop(task);

        if let Err(payload) = res {
            latch.record_panic(group.group_id, payload);
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("group", &self.group)
            .field("shared_memory_size", &self.shared_memory_size)
            .field("latch", &self.latch)
            .finish_non_exhaustive()
    }
}
