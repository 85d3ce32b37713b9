//! The dispatcher: contexts, group partitioning, job descriptors and the
//! arguments handed to tasks.

// Public API
pub mod args;
pub use args::{GroupRange, JobArgs};

pub mod context;
pub use context::{Context, is_busy, wait};

pub mod dispatch;
pub use dispatch::{Partition, dispatch, dispatch_group_count, execute, partition};

pub mod scope;
pub use scope::{Scope, scope};

// Exports
mod descriptor;
pub(crate) use descriptor::{Job, TaskFn};

#[cfg(test)]
mod tests;
