//! Human-readable diagnostics emitted by the job system.
//!
//! The job system reports a handful of events that have no machine-readable
//! contract: the pool start-up line, a job that panicked, and the misuse of
//! dropping a [`Context`](crate::Context) that still has work in flight. They
//! are delivered as [`Diagnostic`] values to a [`DiagnosticsSink`], so that the
//! policy of what to do with them (log, count, abort) is left to the
//! application. The default sink forwards to `tracing` and never terminates
//! the process.

use std::fmt;
use std::sync::{Arc, LazyLock};

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Informational output, e.g. the pool start-up line.
    Default,
    Warning,
    Error,
    /// A misuse the job system recovers from, but that indicates a bug in the
    /// caller.
    Fatal,
}

/// A single event reported through a [`DiagnosticsSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: LogLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Default, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Fatal, message)
    }

    pub fn is_fatal(&self) -> bool {
        self.level == LogLevel::Fatal
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.level, self.message)
    }
}

/// Receives diagnostics. Implementations must be cheap and must not block on
/// the job system, they can be called from worker threads and from `Drop`.
pub trait DiagnosticsSink: fmt::Debug + Send + Sync + 'static {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `tracing` subscriber of the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        let Diagnostic { level, message } = diagnostic;
        match level {
            LogLevel::Default => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Fatal => tracing::error!(fatal = true, "{message}"),
        }
    }
}

pub(crate) type SharedSink = Arc<dyn DiagnosticsSink>;

static DEFAULT_SINK: LazyLock<SharedSink> = LazyLock::new(|| Arc::new(TracingSink));

pub(crate) fn default_sink() -> SharedSink {
    Arc::clone(&DEFAULT_SINK)
}
