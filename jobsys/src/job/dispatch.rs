use crate::job::args::{GroupRange, JobArgs};
use crate::job::context::Context;
use crate::job::descriptor::{Job, TaskFn};
use crate::runtime::{self, Executor, Schedule};
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::trace;

/// Number of groups `dispatch` splits `job_count` indices into. Zero when
/// either argument is zero.
///
/// ```
/// assert_eq!(jobsys::dispatch_group_count(10, 3), 4);
/// assert_eq!(jobsys::dispatch_group_count(9, 3), 3);
/// assert_eq!(jobsys::dispatch_group_count(0, 3), 0);
/// ```
#[inline]
pub const fn dispatch_group_count(job_count: u32, group_size: u32) -> u32 {
    if job_count == 0 || group_size == 0 {
        0
    } else {
        job_count.div_ceil(group_size)
    }
}

/// The group ranges `dispatch` emits for `job_count` indices in groups of
/// `group_size`, in group order.
///
/// ```
/// let ranges = jobsys::partition(10, 3)
///     .map(|g| (g.offset, g.end))
///     .collect::<Vec<_>>();
///
/// assert_eq!(ranges, [(0, 3), (3, 6), (6, 9), (9, 10)]);
/// ```
pub fn partition(job_count: u32, group_size: u32) -> Partition {
    Partition {
        job_count,
        group_size,
        next: 0,
        group_count: dispatch_group_count(job_count, group_size),
    }
}

/// Iterator returned by [`partition`].
#[derive(Debug, Clone)]
pub struct Partition {
    job_count: u32,
    group_size: u32,
    next: u32,
    group_count: u32,
}

impl Iterator for Partition {
    type Item = GroupRange;

    fn next(&mut self) -> Option<GroupRange> {
        if self.next == self.group_count {
            return None;
        }

        let group_id = self.next;
        self.next += 1;

        // Below `job_count` for every valid group, no overflow.
        let offset = group_id * self.group_size;
        let end = offset + self.group_size.min(self.job_count - offset);

        Some(GroupRange {
            group_id,
            offset,
            end,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.group_count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Partition {}

impl FusedIterator for Partition {}

/// Runs `task` once, asynchronously, on the current job system.
///
/// Same as `dispatch(ctx, 1, 1, 0, task)`: the task sees index 0 of group 0,
/// both group flags set and no scratch memory.
pub fn execute<F>(ctx: &Context, task: F)
where
    F: Fn(JobArgs<'_>) + Send + Sync + 'static,
{
    dispatch(ctx, 1, 1, 0, task);
}

/// Runs `task` once for every index in `[0, job_count)` on the current job
/// system, in groups of `group_size` consecutive indices.
///
/// Every group is an independent unit of work: indices of one group run in
/// increasing order on one thread, groups run concurrently in no particular
/// order. With `shared_memory_size > 0` each group gets that many bytes of
/// thread-local scratch memory through [`JobArgs::shared_memory`].
///
/// Returns as soon as every group is submitted. Use [`wait`](crate::wait) to
/// block until they are done. Does nothing if `job_count` or `group_size` is
/// zero.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// let ctx = jobsys::Context::new();
/// let sum = Arc::new(AtomicU64::new(0));
///
/// jobsys::dispatch(&ctx, 100, 8, 0, {
///     let sum = Arc::clone(&sum);
///     move |args| {
///         sum.fetch_add(args.job_index as u64, Ordering::Relaxed);
///     }
/// });
///
/// jobsys::wait(&ctx);
/// assert_eq!(sum.load(Ordering::Relaxed), 4950);
/// ```
pub fn dispatch<F>(ctx: &Context, job_count: u32, group_size: u32, shared_memory_size: u32, task: F)
where
    F: Fn(JobArgs<'_>) + Send + Sync + 'static,
{
    if dispatch_group_count(job_count, group_size) == 0 {
        return;
    }

    dispatch_on(
        &runtime::current(),
        ctx,
        job_count,
        group_size,
        shared_memory_size,
        Arc::new(task),
    );
}

pub(crate) fn dispatch_on(
    executor: &Executor,
    ctx: &Context,
    job_count: u32,
    group_size: u32,
    shared_memory_size: u32,
    task: TaskFn,
) {
    let groups = partition(job_count, group_size);
    if groups.len() == 0 {
        return;
    }

    trace!(job_count, group_size, groups = groups.len(), "dispatch");

    // Every job must be accounted for before the first one can complete.
    let latch = ctx.latch();
    latch.increment(groups.len());

    for group in groups {
        executor.schedule(Job::new(
            Arc::clone(&task),
            Arc::clone(latch),
            group,
            shared_memory_size,
        ));
    }
}
