//! Substrate without threads: a scheduled job runs immediately on the
//! scheduling thread. Used by `Builder::new_inline` and as the fallback when
//! no pool is running.

use crate::job::Job;
use crate::runtime::builder::WAIT_PARK_TIMEOUT;
use crate::runtime::{RuntimeConfig, Schedule};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct Handle {
    park_timeout: Duration,
}

impl Handle {
    pub(crate) fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            park_timeout: cfg.wait_park_timeout,
        }
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self {
            park_timeout: WAIT_PARK_TIMEOUT,
        }
    }
}

impl Schedule for Handle {
    fn schedule(&self, job: Job) {
        job.run();
    }

    // Nothing is ever queued.
    fn run_pending(&self) -> bool {
        false
    }

    fn park_timeout(&self) -> Duration {
        self.park_timeout
    }
}
