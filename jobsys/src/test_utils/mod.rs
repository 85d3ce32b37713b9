use crate::runtime::{Builder, JobSystem, stealing};
use anyhow::{Result, anyhow};

// Exports
mod spy;
pub(crate) use spy::RecordingSink;

#[must_use = "dropping the system shuts the pool down"]
pub(crate) fn init_stealing_system(worker_threads: usize) -> Result<(JobSystem, stealing::Handle)> {
    let system = Builder::new_stealing()
        .worker_threads(worker_threads)
        .try_build()?;

    let handle = system
        .stealing_handle()
        .ok_or_else(|| anyhow!("expected a stealing system"))?;

    Ok((system, handle))
}

/// Sum of `[0, n)`.
pub(crate) fn triangular(n: u64) -> u64 {
    n * n.saturating_sub(1) / 2
}

/// Routes `tracing` output to the test harness. `RUST_LOG` selects the level,
/// warnings by default.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
