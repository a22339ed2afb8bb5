//! Per-run human-readable logs.
//!
//! Lines are kept in push order for the caller's result and echoed to the
//! logging facade at the matching level.

use serde::Serialize;

use crate::error::{ReconcileError, Severity};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunLog {
    pub success: Vec<String>,
    pub warning: Vec<String>,
    pub error: Vec<String>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{line}");
        self.success.push(line);
    }

    pub fn warning(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::warn!("{line}");
        self.warning.push(line);
    }

    pub fn error(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::error!("{line}");
        self.error.push(line);
    }

    /// File `err` under the list its severity belongs to.
    pub fn record(&mut self, err: &ReconcileError) {
        match err.severity() {
            Severity::Warning | Severity::Degraded => self.warning(err.to_string()),
            Severity::Fatal | Severity::Retryable => self.error(err.to_string()),
        }
    }

    /// Append `other`'s lines without echoing them again.
    pub fn extend(&mut self, other: RunLog) {
        self.success.extend(other.success);
        self.warning.extend(other.warning);
        self.error.extend(other.error);
    }
}
