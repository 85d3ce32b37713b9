//! A fork-join job system.
//!
//! Work is expressed as a batch of `job_count` indices processed by one
//! task. The batch is split into groups of consecutive indices, every group is
//! handed to a pool of worker threads, and the caller waits on a [`Context`]
//! until all groups are done. Waiting threads help: they run ready jobs
//! instead of blocking, so tasks can dispatch and wait recursively.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! let system = jobsys::Builder::new_stealing().worker_threads(2).try_build()?;
//! let sum = Arc::new(AtomicU64::new(0));
//!
//! system.install(|| {
//!     let ctx = jobsys::Context::new();
//!     jobsys::dispatch(&ctx, 1_000, 100, 0, {
//!         let sum = Arc::clone(&sum);
//!         move |args| {
//!             sum.fetch_add(u64::from(args.job_index), Ordering::Relaxed);
//!         }
//!     });
//!     jobsys::wait(&ctx);
//! });
//!
//! assert_eq!(sum.load(Ordering::Relaxed), 999 * 1_000 / 2);
//! # Ok::<(), anyhow::Error>(())
//! ```

#[doc(inline)]
pub use jobsys_macros::main;

#[doc(inline)]
pub use jobsys_macros::test;

mod context;

pub mod diagnostics;
pub use diagnostics::{Diagnostic, DiagnosticsSink, LogLevel, TracingSink};

pub mod job;
pub use job::{
    Context, GroupRange, JobArgs, Partition, Scope, dispatch, dispatch_group_count, execute,
    is_busy, partition, scope, wait,
};

pub mod runtime;
pub use runtime::{Builder, JobSystem, initialize, shutdown, thread_count};

mod utils;

#[cfg(test)]
mod test_utils;
