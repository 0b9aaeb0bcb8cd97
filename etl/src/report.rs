use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Info,
    Success,
    Warning,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub status: LogStatus,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            LogStatus::Info => write!(f, "{}", self.message),
            LogStatus::Success => write!(f, "✅ {}", self.message),
            LogStatus::Warning => write!(f, "⚠️ {}", self.message),
            LogStatus::Failure => write!(f, "❌ {}", self.message),
        }
    }
}

/// Ordered, human-readable account of one ETL run. Every entry is also
/// emitted as a tracing event.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(LogStatus::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.push(LogStatus::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.push(LogStatus::Warning, message);
    }

    pub fn failure(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.push(LogStatus::Failure, message);
    }

    fn push(&mut self, status: LogStatus, message: String) {
        self.entries.push(LogEntry { status, message });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    pub fn count(&self, status: LogStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }
}

/// Per-step tally of statements and rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StepSummary {
    pub fn record<T, E>(&mut self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_order_and_tags() {
        let mut log = RunLog::new();
        log.info("Loading BranchDim...");
        log.failure("Table 'BranchDim' doesn't exist");
        log.success("ETL COMPLETE!");

        let lines: Vec<String> = log.entries().iter().map(|e| e.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "Loading BranchDim...",
                "❌ Table 'BranchDim' doesn't exist",
                "✅ ETL COMPLETE!",
            ]
        );
        assert_eq!(log.count(LogStatus::Failure), 1);
    }

    #[test]
    fn test_summary_record() {
        let mut summary = StepSummary::default();
        summary.record::<(), ()>(&Ok(()));
        summary.record::<(), ()>(&Err(()));
        summary.record::<(), ()>(&Ok(()));
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }
}
