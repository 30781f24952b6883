//! Builds the prioritized task list for one lead.
//!
//! Priorities follow what the lead already carries: sources we have a URL
//! for are worth more scheduling budget, and Google Places becomes
//! critical when the lead has no place id to anchor the rest of the
//! enrichment on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use leadflow_core::{fields, DataSource, LeadRecord, SourceOperation};

use crate::task::{EnrichmentTask, TaskPriority};

/// Plans scheduler tasks from a registry of pre-bound operations. The
/// registry entries already capture whatever lead context their adapter
/// needs; the planner decides which sources run and with what budget.
pub struct TaskPlanner {
    registry: HashMap<DataSource, Arc<dyn SourceOperation>>,
}

impl TaskPlanner {
    pub fn new(registry: HashMap<DataSource, Arc<dyn SourceOperation>>) -> Self {
        Self { registry }
    }

    /// Prioritized tasks for `lead`, skipping sources in `cached` (already
    /// satisfied from a previous run) and sources with no registered
    /// operation.
    pub fn plan(&self, lead: &LeadRecord, cached: &HashSet<DataSource>) -> Vec<EnrichmentTask> {
        let mut tasks = Vec::new();

        if let Some(op) = self.available(DataSource::GooglePlaces, cached) {
            let priority = if lead.has_field(fields::GOOGLE_PLACE_ID) {
                TaskPriority::Low
            } else {
                TaskPriority::Critical
            };
            tasks.push(
                EnrichmentTask::new(DataSource::GooglePlaces.as_str(), op)
                    .with_priority(priority)
                    .with_max_retries(2)
                    .with_timeout(Duration::from_secs(30))
                    .required(priority == TaskPriority::Critical),
            );
        }

        if let Some(op) = self.available(DataSource::Instagram, cached) {
            if lead.has_field(fields::INSTAGRAM_URL) {
                tasks.push(
                    EnrichmentTask::new(DataSource::Instagram.as_str(), op)
                        .with_priority(TaskPriority::High)
                        .with_max_retries(3)
                        .with_timeout(Duration::from_secs(45))
                        .required(true),
                );
            }
        }

        if let Some(op) = self.available(DataSource::Facebook, cached) {
            // A lead without a Facebook URL still gets a lookup attempt
            // against a URL synthesized from its name, at lower priority.
            let priority = if lead.has_field(fields::FACEBOOK_URL) {
                TaskPriority::Medium
            } else {
                TaskPriority::Low
            };
            tasks.push(
                EnrichmentTask::new(DataSource::Facebook.as_str(), op)
                    .with_priority(priority)
                    .with_max_retries(3)
                    .with_timeout(Duration::from_secs(60)),
            );
        }

        if let Some(op) = self.available(DataSource::Website, cached) {
            if lead.has_field(fields::WEBSITE_URL) {
                tasks.push(
                    EnrichmentTask::new(DataSource::Website.as_str(), op)
                        .with_priority(TaskPriority::High)
                        .with_max_retries(2)
                        .with_timeout(Duration::from_secs(30)),
                );
            }
        }

        if let Some(op) = self.available(DataSource::GoogleSearch, cached) {
            tasks.push(
                EnrichmentTask::new(DataSource::GoogleSearch.as_str(), op)
                    .with_priority(TaskPriority::Medium)
                    .with_max_retries(2)
                    .with_timeout(Duration::from_secs(20)),
            );
        }

        tasks
    }

    /// Facebook page URL guessed from the lead name when none was
    /// collected.
    pub fn synthesize_facebook_url(lead: &LeadRecord) -> String {
        let slug: String = lead
            .name
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        format!("https://www.facebook.com/{}", slug)
    }

    fn available(
        &self,
        source: DataSource,
        cached: &HashSet<DataSource>,
    ) -> Option<Arc<dyn SourceOperation>> {
        if cached.contains(&source) {
            return None;
        }
        self.registry.get(&source).cloned()
    }
}
