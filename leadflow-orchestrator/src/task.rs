use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use leadflow_core::SourceOperation;

/// Scheduling priority; lower ordinal runs first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Foundational data (Google Places when the lead has no place id).
    Critical = 1,
    /// Instagram, website.
    High = 2,
    /// Facebook, Linktree.
    Medium = 3,
    /// Google Search, alternatives.
    Low = 4,
    /// LinkedIn, YouTube.
    Optional = 5,
}

/// One named, retryable, prioritized unit of work for the scheduler.
///
/// Identity is the name alone: two tasks with the same name are the same
/// task for hashing and deduplication. The scheduler relies on this to
/// avoid double scheduling.
#[derive(Clone)]
pub struct EnrichmentTask {
    pub name: String,
    pub operation: Arc<dyn SourceOperation>,
    pub priority: TaskPriority,
    pub max_retries: u32,
    pub timeout: Duration,
    /// Informational flag; does not gate control flow.
    pub required: bool,
    /// Names of tasks that must have succeeded before this one runs.
    pub dependencies: Vec<String>,
}

impl EnrichmentTask {
    pub fn new(name: impl Into<String>, operation: Arc<dyn SourceOperation>) -> Self {
        Self {
            name: name.into(),
            operation,
            priority: TaskPriority::Medium,
            max_retries: 3,
            timeout: Duration::from_secs(30),
            required: false,
            dependencies: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

impl PartialEq for EnrichmentTask {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EnrichmentTask {}

impl Hash for EnrichmentTask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Debug for EnrichmentTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentTask")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .field("required", &self.required)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}
