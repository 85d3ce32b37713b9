//! Implementation of a work stealing scheduler.

pub(crate) mod scheduler;
pub(crate) use scheduler::{Handle, Scheduler};

mod pool;

mod shared;
pub(crate) use shared::Shared;

pub(crate) mod worker;
pub(crate) use worker::Worker;
