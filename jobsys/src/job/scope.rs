use crate::job::args::JobArgs;
use crate::job::context::Context;
use crate::job::descriptor::TaskFn;
use crate::job::dispatch::{dispatch_group_count, dispatch_on};
use crate::runtime;
use std::marker::PhantomData;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

type ScopedTaskFn<'env> = Arc<dyn Fn(JobArgs<'_>) + Send + Sync + 'env>;

/// A context whose tasks may borrow from the stack of the caller of
/// [`scope`].
#[derive(Debug)]
pub struct Scope<'env> {
    ctx: Context,

    // Invariant over 'env, like `std::thread::Scope`.
    _env: PhantomData<&'env mut &'env ()>,
}

impl<'env> Scope<'env> {
    /// Like [`execute`](crate::execute), the task only has to outlive the
    /// scope.
    pub fn execute<F>(&self, task: F)
    where
        F: Fn(JobArgs<'_>) + Send + Sync + 'env,
    {
        self.dispatch(1, 1, 0, task);
    }

    /// Like [`dispatch`](crate::dispatch), the task only has to outlive the
    /// scope.
    pub fn dispatch<F>(&self, job_count: u32, group_size: u32, shared_memory_size: u32, task: F)
    where
        F: Fn(JobArgs<'_>) + Send + Sync + 'env,
    {
        if dispatch_group_count(job_count, group_size) == 0 {
            return;
        }

        let task: ScopedTaskFn<'env> = Arc::new(task);

        // SAFETY: `scope` does not return before `self.ctx` is idle, and a job
        // drops its handle on the task before it signals the context. No
        // clone of `task` outlives 'env.
        let task: TaskFn = unsafe { mem::transmute::<ScopedTaskFn<'env>, TaskFn>(task) };

        dispatch_on(
            &runtime::current(),
            &self.ctx,
            job_count,
            group_size,
            shared_memory_size,
            task,
        );
    }

    /// Number of unfinished groups dispatched through this scope.
    pub fn outstanding(&self) -> usize {
        self.ctx.outstanding()
    }
}

/// Creates a scope whose jobs may borrow local data, runs `f` with it and
/// waits for every job dispatched through the scope before returning.
///
/// ```
/// let mut squares = vec![0u64; 64];
/// let chunks = squares
///     .chunks_mut(16)
///     .map(parking_lot::Mutex::new)
///     .collect::<Vec<_>>();
///
/// jobsys::scope(|s| {
///     s.dispatch(64, 16, 0, |args| {
///         let mut chunk = chunks[args.group_id as usize].lock();
///         chunk[args.group_index as usize] = u64::from(args.job_index).pow(2);
///     });
/// });
///
/// drop(chunks);
/// assert_eq!(squares[63], 63 * 63);
/// ```
///
/// # Panics
///
/// If `f` or any job of the scope panics, the scope still waits for all of
/// its jobs, then resumes the panic of `f` if there was one, otherwise the
/// first job panic.
pub fn scope<'env, F, R>(f: F) -> R
where
    F: for<'scope> FnOnce(&'scope Scope<'env>) -> R,
{
    let scope = Scope {
        ctx: Context::new(),
        _env: PhantomData,
    };

    let res = panic::catch_unwind(AssertUnwindSafe(|| f(&scope)));

    let latch = scope.ctx.latch();
    latch.wait();
    let job_panic = latch.take_panic();

    match (res, job_panic) {
        (Err(payload), _) | (Ok(_), Some(payload)) => panic::resume_unwind(payload),
        (Ok(r), None) => r,
    }
}
