use crate::diagnostics::{Diagnostic, DiagnosticsSink, LogLevel};
use parking_lot::Mutex;
use std::sync::Arc;

/// Diagnostics sink recording every report, for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    reports: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn reports(&self) -> Vec<Diagnostic> {
        self.reports.lock().clone()
    }

    pub(crate) fn messages(&self, level: LogLevel) -> Vec<String> {
        self.reports
            .lock()
            .iter()
            .filter(|d| d.level == level)
            .map(|d| d.message.clone())
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.messages(LogLevel::Error)
    }

    pub(crate) fn num_fatal(&self) -> usize {
        self.messages(LogLevel::Fatal).len()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.reports.lock().push(diagnostic);
    }
}
