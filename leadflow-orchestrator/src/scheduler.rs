//! Priority scheduler with bounded concurrency, per-task timeouts and
//! automatic retries.
//!
//! Task-level failures never surface as `Err` from [`Orchestrator::execute`];
//! they land in the report's `errors` map. Only contract violations
//! (duplicate task names, bad configuration) raise.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, timeout, Instant};

use leadflow_core::{CoreError, Result, SourceOperation, SourcePayload};

use crate::backoff::BackoffStrategy;
use crate::stats::{ExecutionReport, ExecutionStats, RetryEvent, TaskOutcome};
use crate::task::EnrichmentTask;

/// Default task names eligible for the critical final pass.
pub const DEFAULT_CRITICAL_TASKS: [&str; 3] = ["google_places", "instagram", "website"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Concurrency bound per batch.
    pub max_concurrent: usize,
    /// Advisory overall budget. Not propagated into per-task cancellation;
    /// callers wanting a hard deadline wrap `execute` in their own timeout.
    pub global_timeout: Duration,
    pub backoff: BackoffStrategy,
    /// Tasks that get one extra attempt after normal scheduling if they
    /// failed without producing a result.
    pub critical_tasks: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            global_timeout: Duration::from_secs(300),
            backoff: BackoffStrategy::default(),
            critical_tasks: DEFAULT_CRITICAL_TASKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Run-scoped shared state. `results` and `errors` are written by
/// concurrently running task bodies, so they live in lock-free maps; the
/// stats accumulator sits behind a mutex.
struct RunState {
    results: DashMap<String, SourcePayload>,
    errors: DashMap<String, String>,
    stats: Mutex<ExecutionStats>,
}

impl RunState {
    fn new(total_tasks: usize) -> Self {
        Self {
            results: DashMap::new(),
            errors: DashMap::new(),
            stats: Mutex::new(ExecutionStats {
                total_tasks,
                ..ExecutionStats::default()
            }),
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    fallbacks: HashMap<String, Arc<dyn SourceOperation>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        if config.max_concurrent == 0 {
            return Err(CoreError::Validation(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            config,
            fallbacks: HashMap::new(),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            fallbacks: HashMap::new(),
        }
    }

    /// Registers the operation the critical final pass runs for `task`.
    /// Without a registered fallback the pass re-invokes the task's
    /// original operation.
    pub fn with_fallback(
        mut self,
        task: impl Into<String>,
        operation: Arc<dyn SourceOperation>,
    ) -> Self {
        self.fallbacks.insert(task.into(), operation);
        self
    }

    /// Runs `tasks` to completion: priority-sorted submission, bounded
    /// concurrency, per-attempt timeout, retry with backoff, dependency
    /// ordering, then the critical final pass.
    pub async fn execute(&self, tasks: Vec<EnrichmentTask>) -> Result<ExecutionReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let mut seen = std::collections::HashSet::new();
        for task in &tasks {
            if !seen.insert(task.name.clone()) {
                return Err(CoreError::Validation(format!(
                    "duplicate task name: {}",
                    task.name
                )));
            }
        }

        let operations: HashMap<String, Arc<dyn SourceOperation>> = tasks
            .iter()
            .map(|t| (t.name.clone(), Arc::clone(&t.operation)))
            .collect();

        // Priority first; among equals, tasks with the larger retry budget
        // go first.
        let mut sorted = tasks;
        sorted.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.max_retries.cmp(&a.max_retries))
        });

        let state = Arc::new(RunState::new(sorted.len()));

        let (independent, dependent): (Vec<_>, Vec<_>) =
            sorted.into_iter().partition(|t| t.dependencies.is_empty());

        tracing::info!("executing {} independent tasks", independent.len());
        self.execute_batch(independent, &state).await;

        if !dependent.is_empty() {
            tracing::info!("executing {} dependent tasks", dependent.len());
            self.execute_dependent(dependent, &state).await;
        }

        self.retry_critical_failures(&operations, &state).await;

        let mut stats = state.stats.lock().await.clone();
        stats.total_time_secs = start.elapsed().as_secs_f64();
        stats.log_summary();

        Ok(ExecutionReport {
            run_id: uuid::Uuid::new_v4(),
            results: state
                .results
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            errors: state
                .errors
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            stats,
            started_at,
            completed_at: Utc::now(),
        })
    }

    /// Fans one batch out under the concurrency bound and waits for all of
    /// it. Individual failures are recorded, never propagated.
    async fn execute_batch(&self, tasks: Vec<EnrichmentTask>, state: &Arc<RunState>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let semaphore = Arc::clone(&semaphore);
            let state = Arc::clone(state);
            let backoff = self.config.backoff;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                execute_single(task, backoff, &state).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("task body panicked: {}", e);
            }
        }
    }

    /// Iterative fixed-point resolution: run every task whose dependencies
    /// are all in `results`, repeat until nothing moves. Tasks left over
    /// are skipped, not failed.
    async fn execute_dependent(&self, tasks: Vec<EnrichmentTask>, state: &Arc<RunState>) {
        let max_iterations = tasks.len() * 2;
        let mut remaining = tasks;
        let mut iteration = 0;

        while !remaining.is_empty() && iteration < max_iterations {
            iteration += 1;

            let (executable, rest): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|t| {
                t.dependencies
                    .iter()
                    .all(|dep| state.results.contains_key(dep))
            });
            remaining = rest;

            if executable.is_empty() {
                break;
            }
            self.execute_batch(executable, state).await;
        }

        if !remaining.is_empty() {
            tracing::warn!(
                "{} tasks skipped: dependencies never satisfied",
                remaining.len()
            );
            let mut stats = state.stats.lock().await;
            for task in &remaining {
                stats.skipped += 1;
                stats.record(&task.name, TaskOutcome::Skipped);
            }
        }
    }

    /// One extra attempt for each configured critical task that ended in
    /// `errors` without a result. Uses the injected fallback when present,
    /// otherwise re-invokes the original operation.
    async fn retry_critical_failures(
        &self,
        operations: &HashMap<String, Arc<dyn SourceOperation>>,
        state: &Arc<RunState>,
    ) {
        for name in &self.config.critical_tasks {
            if !state.errors.contains_key(name) || state.results.contains_key(name) {
                continue;
            }
            let operation = match self.fallbacks.get(name).or_else(|| operations.get(name)) {
                Some(op) => Arc::clone(op),
                None => continue,
            };

            tracing::info!("final retry for critical task: {}", name);
            match timeout(Duration::from_secs(60), operation.invoke()).await {
                Ok(Ok(payload)) if payload.has_content() => {
                    state.results.insert(name.clone(), payload);
                    state.errors.remove(name);
                    let mut stats = state.stats.lock().await;
                    stats.successful += 1;
                    stats.record(name, TaskOutcome::Success);
                    tracing::info!("critical task {} recovered on final retry", name);
                }
                Ok(Ok(_)) => {
                    let mut stats = state.stats.lock().await;
                    stats.record(name, TaskOutcome::Error);
                    tracing::warn!("final retry for {} returned an empty result", name);
                }
                Ok(Err(e)) => {
                    let mut stats = state.stats.lock().await;
                    stats.record(name, TaskOutcome::Error);
                    tracing::warn!("final retry for {} failed: {}", name, e);
                }
                Err(_) => {
                    let mut stats = state.stats.lock().await;
                    stats.timed_out += 1;
                    stats.record(name, TaskOutcome::Timeout);
                    tracing::warn!("final retry for {} timed out", name);
                }
            }
        }
    }
}

/// Runs one task to success or retry exhaustion. A task with
/// `max_retries = N` is attempted at most `N + 1` times; timeouts, raised
/// errors and empty payloads all take the same retry path.
async fn execute_single(task: EnrichmentTask, backoff: BackoffStrategy, state: &RunState) {
    let name = task.name.clone();
    let mut retry_count: u32 = 0;

    loop {
        if retry_count > 0 {
            tracing::info!(
                "executing {} (attempt {}/{})",
                name,
                retry_count + 1,
                task.max_retries + 1
            );
        } else {
            tracing::info!("executing {}", name);
        }

        match timeout(task.timeout, task.operation.invoke()).await {
            Ok(Ok(payload)) if payload.has_content() => {
                state.results.insert(name.clone(), payload);
                state.errors.remove(&name);
                let mut stats = state.stats.lock().await;
                stats.successful += 1;
                stats.record(&name, TaskOutcome::Success);
                tracing::info!("{} completed successfully", name);
                return;
            }
            Ok(Ok(_)) => {
                state
                    .errors
                    .insert(name.clone(), format!("empty result from {}", name));
                let mut stats = state.stats.lock().await;
                stats.record(&name, TaskOutcome::Error);
                tracing::warn!("{} returned an empty result", name);
            }
            Ok(Err(e)) => {
                state.errors.insert(name.clone(), e.to_string());
                let mut stats = state.stats.lock().await;
                stats.record(&name, TaskOutcome::Error);
                tracing::error!("{} failed: {}", name, e);
            }
            Err(_) => {
                state.errors.insert(
                    name.clone(),
                    format!("timed out after {:.1}s", task.timeout.as_secs_f64()),
                );
                let mut stats = state.stats.lock().await;
                stats.timed_out += 1;
                stats.record(&name, TaskOutcome::Timeout);
                tracing::warn!(
                    "{} timed out after {:.1}s",
                    name,
                    task.timeout.as_secs_f64()
                );
            }
        }

        if retry_count < task.max_retries {
            let delay = backoff.delay(retry_count);
            tracing::info!("retrying {} in {:.1}s", name, delay.as_secs_f64());
            {
                let mut stats = state.stats.lock().await;
                stats.retried += 1;
                stats.retry_events.push(RetryEvent {
                    task: name.clone(),
                    attempt: retry_count + 1,
                    delay_secs: delay.as_secs_f64(),
                    timestamp: Utc::now(),
                });
            }
            sleep(delay).await;
            retry_count += 1;
        } else {
            let mut stats = state.stats.lock().await;
            stats.failed += 1;
            tracing::error!("{} failed after {} attempts", name, task.max_retries + 1);
            return;
        }
    }
}
