use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use leadflow_core::SourcePayload;

/// One recorded retry: which task, which attempt, how long it waited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEvent {
    pub task: String,
    pub attempt: u32,
    pub delay_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-task outcome counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskBreakdown {
    pub success: u32,
    pub error: u32,
    pub timeout: u32,
    pub skipped: u32,
}

/// Aggregate counters for one `execute` run. Built fresh per run; never
/// carried across batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_tasks: usize,
    pub successful: u32,
    pub failed: u32,
    pub retried: u32,
    pub timed_out: u32,
    pub skipped: u32,
    pub by_task: HashMap<String, TaskBreakdown>,
    pub total_time_secs: f64,
    pub retry_events: Vec<RetryEvent>,
}

impl ExecutionStats {
    pub(crate) fn record(&mut self, task: &str, outcome: TaskOutcome) {
        let breakdown = self.by_task.entry(task.to_string()).or_default();
        match outcome {
            TaskOutcome::Success => breakdown.success += 1,
            TaskOutcome::Error => breakdown.error += 1,
            TaskOutcome::Timeout => breakdown.timeout += 1,
            TaskOutcome::Skipped => breakdown.skipped += 1,
        }
    }

    /// Retry count reported for one task: the number of failed attempts
    /// that were followed by another try.
    pub fn retries_for(&self, task: &str) -> u32 {
        self.retry_events.iter().filter(|e| e.task == task).count() as u32
    }

    pub fn log_summary(&self) {
        tracing::info!("{}", "=".repeat(50));
        tracing::info!("execution statistics:");
        tracing::info!("  total tasks: {}", self.total_tasks);
        tracing::info!("  successful: {}", self.successful);
        tracing::info!("  failed: {}", self.failed);
        tracing::info!("  retried: {}", self.retried);
        tracing::info!("  timed out: {}", self.timed_out);
        tracing::info!("  skipped: {}", self.skipped);
        tracing::info!("  total time: {:.2}s", self.total_time_secs);

        for (task, breakdown) in &self.by_task {
            tracing::info!(
                "  {}: success={} error={} timeout={} skipped={}",
                task,
                breakdown.success,
                breakdown.error,
                breakdown.timeout,
                breakdown.skipped
            );
        }
        tracing::info!("{}", "=".repeat(50));
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TaskOutcome {
    Success,
    Error,
    Timeout,
    Skipped,
}

/// Consolidated outcome of one orchestrator run. `results` and `errors`
/// are disjoint by task name; skipped tasks appear in neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub results: HashMap<String, SourcePayload>,
    pub errors: HashMap<String, String>,
    pub stats: ExecutionStats,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Merges every successful payload into one record, in no particular
    /// order. Callers wanting per-source precedence should merge
    /// themselves.
    pub fn merged(&self) -> SourcePayload {
        let mut merged = SourcePayload::new();
        for payload in self.results.values() {
            merged.merge(payload);
        }
        merged
    }
}
