//! Multi-level snowball collection: each level's results seed the next,
//! bounded by depth and fan-out, with a visited set, a TTL result cache
//! and normalized-URL cycle detection.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use leadflow_core::{fields, DataSource, LeadRecord, Result, SeedScraper, SourcePayload};

static LINKTREE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)linktr\.ee/(\w+)").expect("valid linktree pattern"));

/// A discovered URL or handle queued for the next collection level.
///
/// `priority` is a score: higher runs first. This is the opposite of the
/// scheduler's `TaskPriority` ordinal and both conventions are kept as
/// each component defines them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTask {
    pub url: String,
    pub source: DataSource,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub priority: i32,
}

impl SeedTask {
    pub fn new(url: impl Into<String>, source: DataSource, depth: u32, priority: i32) -> Self {
        Self {
            url: url.into(),
            source,
            depth,
            parent_url: None,
            priority,
        }
    }

    pub fn with_parent(mut self, parent_url: impl Into<String>) -> Self {
        self.parent_url = Some(parent_url.into());
        self
    }

    /// Identity key: (url, source).
    pub fn seed_id(&self) -> String {
        format!("{}_{}", self.url, self.source.as_str())
    }
}

impl PartialEq for SeedTask {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.source == other.source
    }
}

impl Eq for SeedTask {}

impl std::hash::Hash for SeedTask {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.source.hash(state);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowballConfig {
    pub max_depth: u32,
    pub max_seeds_per_level: usize,
    pub cache_ttl_hours: i64,
}

impl Default for SnowballConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_seeds_per_level: 10,
            cache_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnowballStats {
    pub total_scraped: u32,
    pub cache_hits: u32,
    pub loops_detected: u32,
    pub errors: u32,
    pub by_level: HashMap<u32, u32>,
    pub by_source: HashMap<String, u32>,
}

/// Stats snapshot extended with the manager's current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowballStatistics {
    pub counters: SnowballStats,
    pub cache_size: usize,
    pub visited_urls: usize,
    pub chain_length: usize,
    pub cache_hit_rate: f64,
}

/// Frontier state for one lead's traversal: visited set, result cache,
/// cycle-detection chain and counters.
pub struct SnowballManager {
    config: SnowballConfig,
    visited: HashSet<String>,
    cache: HashMap<String, (SourcePayload, DateTime<Utc>)>,
    scraping_chain: Vec<String>,
    stats: SnowballStats,
}

impl SnowballManager {
    pub fn new(config: SnowballConfig) -> Self {
        Self {
            config,
            visited: HashSet::new(),
            cache: HashMap::new(),
            scraping_chain: Vec::new(),
            stats: SnowballStats::default(),
        }
    }

    pub fn config(&self) -> &SnowballConfig {
        &self.config
    }

    pub fn cache_key(url: &str, source: DataSource) -> String {
        let digest = Sha256::digest(format!("{}_{}", url, source.as_str()).as_bytes());
        hex::encode(digest)
    }

    fn cache_ttl(&self) -> ChronoDuration {
        ChronoDuration::hours(self.config.cache_ttl_hours)
    }

    fn fresh_entry(&self, url: &str, source: DataSource) -> Option<&SourcePayload> {
        let key = Self::cache_key(url, source);
        self.cache.get(&key).and_then(|(payload, stored_at)| {
            (Utc::now() - *stored_at < self.cache_ttl()).then_some(payload)
        })
    }

    /// Whether a fresh cache entry exists. Counts a cache hit when true.
    pub fn is_cached(&mut self, url: &str, source: DataSource) -> bool {
        if self.fresh_entry(url, source).is_some() {
            self.stats.cache_hits += 1;
            tracing::debug!("cache hit for {} ({})", url, source);
            true
        } else {
            false
        }
    }

    pub fn get_cached(&mut self, url: &str, source: DataSource) -> Option<SourcePayload> {
        if self.is_cached(url, source) {
            self.fresh_entry(url, source).cloned()
        } else {
            None
        }
    }

    pub fn add_to_cache(&mut self, url: &str, source: DataSource, payload: SourcePayload) {
        let key = Self::cache_key(url, source);
        self.cache.insert(key, (payload, Utc::now()));
        tracing::debug!("cached {} ({})", url, source);
    }

    /// Drops expired cache entries.
    pub fn cleanup_cache(&mut self) {
        let ttl = self.cache_ttl();
        let now = Utc::now();
        let before = self.cache.len();
        self.cache.retain(|_, (_, stored_at)| now - *stored_at <= ttl);
        let removed = before - self.cache.len();
        if removed > 0 {
            tracing::info!("removed {} expired cache entries", removed);
        }
    }

    /// Gate for scheduling one seed. Checks run in order: depth budget,
    /// visited set, cache freshness, cycle chain; the first failing check
    /// decides.
    pub fn should_scrape(&mut self, url: &str, source: DataSource, depth: u32) -> bool {
        if depth > self.config.max_depth {
            tracing::debug!("max depth reached for {}", url);
            return false;
        }
        if self.visited.contains(&format!("{}_{}", url, source.as_str())) {
            tracing::debug!("already visited: {}", url);
            return false;
        }
        if self.is_cached(url, source) {
            tracing::debug!("using cache for {}", url);
            return false;
        }
        if self.detect_cycle(url) {
            tracing::warn!("cycle detected for {}", url);
            return false;
        }
        true
    }

    /// Membership of the normalized URL in the current traversal chain.
    /// A hit counts toward the loop statistic.
    pub fn detect_cycle(&mut self, url: &str) -> bool {
        let normalized = Self::normalize_url(url);
        if self.scraping_chain.contains(&normalized) {
            self.stats.loops_detected += 1;
            true
        } else {
            false
        }
    }

    /// Strips scheme, leading `www.` and trailing slashes, lowercases.
    pub fn normalize_url(url: &str) -> String {
        let stripped = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);
        let stripped = stripped.strip_prefix("www.").unwrap_or(stripped);
        stripped.trim_end_matches('/').to_lowercase()
    }

    pub fn mark_visited(&mut self, url: &str, source: DataSource) {
        self.visited.insert(format!("{}_{}", url, source.as_str()));

        let normalized = Self::normalize_url(url);
        if !self.scraping_chain.contains(&normalized) {
            self.scraping_chain.push(normalized);
        }
    }

    /// Pulls next-level seeds out of one payload: known enrichment fields
    /// plus link-aggregator handles found in bio text. Deduplicated
    /// against the batch and the visited set, sorted by descending
    /// priority, truncated to the per-level fan-out bound.
    pub fn extract_seeds(&self, data: &SourcePayload, current_depth: u32) -> Vec<SeedTask> {
        let next_depth = current_depth + 1;
        if next_depth > self.config.max_depth {
            return Vec::new();
        }

        let mut seeds = Vec::new();

        if let Some(username) = data.text(fields::INSTAGRAM_USERNAME) {
            seeds.push(SeedTask::new(
                format!("@{}", username),
                DataSource::Instagram,
                next_depth,
                8,
            ));
        }

        if let Some(url) = data.text(fields::FACEBOOK_URL) {
            seeds.push(SeedTask::new(url, DataSource::Facebook, next_depth, 7));
        }

        if let Some(url) = data.text(fields::WEBSITE_URL) {
            seeds.push(SeedTask::new(url, DataSource::Website, next_depth, 9));
        }

        if let Some(bio) = data.text(fields::INSTAGRAM_BIO) {
            if let Some(captures) = LINKTREE_RE.captures(bio) {
                seeds.push(SeedTask::new(
                    captures[1].to_string(),
                    DataSource::Linktree,
                    next_depth,
                    6,
                ));
            }
        }

        if let Some(url) = data.text(fields::LINKEDIN_URL) {
            seeds.push(SeedTask::new(url, DataSource::LinkedIn, next_depth, 5));
        }

        if let Some(url) = data.text(fields::YOUTUBE_URL) {
            seeds.push(SeedTask::new(url, DataSource::YouTube, next_depth, 4));
        }

        if let Some(discovered) = data.text(fields::DISCOVERED_URL) {
            let (source, priority) = classify_discovered_url(discovered);
            seeds.push(SeedTask::new(discovered, source, next_depth, priority));
        }

        let mut seen = HashSet::new();
        let mut unique: Vec<SeedTask> = seeds
            .into_iter()
            .filter(|seed| {
                let id = seed.seed_id();
                !self.visited.contains(&id) && seen.insert(id)
            })
            .collect();

        unique.sort_by(|a, b| b.priority.cmp(&a.priority));
        unique.truncate(self.config.max_seeds_per_level);
        unique
    }

    /// Clears the per-lead traversal state (cycle chain and visited set).
    /// Must be called once per new lead; stale state would surface
    /// false-positive cycles across unrelated leads. The result cache is
    /// deliberately kept: it is the cross-lead dedup layer, bounded by TTL.
    pub fn reset_chain(&mut self) {
        self.scraping_chain.clear();
        self.visited.clear();
    }

    pub fn stats(&self) -> &SnowballStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SnowballStats {
        &mut self.stats
    }

    pub fn get_statistics(&self) -> SnowballStatistics {
        let hit_rate = if self.stats.total_scraped > 0 {
            self.stats.cache_hits as f64 / self.stats.total_scraped as f64 * 100.0
        } else {
            0.0
        };
        SnowballStatistics {
            counters: self.stats.clone(),
            cache_size: self.cache.len(),
            visited_urls: self.visited.len(),
            chain_length: self.scraping_chain.len(),
            cache_hit_rate: hit_rate,
        }
    }

    #[cfg(test)]
    fn backdate_cache_entry(&mut self, url: &str, source: DataSource, age: ChronoDuration) {
        let key = Self::cache_key(url, source);
        if let Some((_, stored_at)) = self.cache.get_mut(&key) {
            *stored_at = Utc::now() - age;
        }
    }
}

impl Default for SnowballManager {
    fn default() -> Self {
        Self::new(SnowballConfig::default())
    }
}

/// Search-engine URLs carry no source tag; classify by host.
fn classify_discovered_url(discovered: &str) -> (DataSource, i32) {
    let host = url::Url::parse(discovered)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| discovered.to_string());

    if host.contains("instagram.com") {
        (DataSource::Instagram, 8)
    } else if host.contains("facebook.com") {
        (DataSource::Facebook, 7)
    } else {
        (DataSource::Website, 6)
    }
}

/// The enriched record plus the traversal statistics for one lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowballOutcome {
    pub record: LeadRecord,
    pub stats: SnowballStatistics,
}

/// Runs the level-by-level collection for one lead at a time: level N is
/// one concurrent fan-out, its merged output seeds level N + 1.
pub struct SnowballOrchestrator {
    scrapers: HashMap<DataSource, Arc<dyn SeedScraper>>,
    manager: SnowballManager,
}

impl SnowballOrchestrator {
    pub fn new(
        scrapers: HashMap<DataSource, Arc<dyn SeedScraper>>,
        config: SnowballConfig,
    ) -> Self {
        Self {
            scrapers,
            manager: SnowballManager::new(config),
        }
    }

    pub fn manager(&self) -> &SnowballManager {
        &self.manager
    }

    /// Full snowball pass for one lead. Per-seed scrape failures are
    /// counted and logged, never fatal; the record accumulates whatever
    /// the levels produced.
    pub async fn collect_snowball(&mut self, lead: LeadRecord) -> Result<SnowballOutcome> {
        self.manager.reset_chain();

        tracing::info!("starting snowball collection for {}", lead.name);

        let mut record = lead;
        let mut frontier: Vec<SeedTask> = prioritize_sources(&record)
            .into_iter()
            .filter_map(|source| {
                url_for_source(&record, source).map(|url| SeedTask::new(url, source, 1, 0))
            })
            .collect();

        for depth in 1..=self.manager.config.max_depth {
            if frontier.is_empty() {
                break;
            }

            let payloads = self.execute_level(&frontier, &record, depth).await;

            let mut next: Vec<SeedTask> = Vec::new();
            for payload in &payloads {
                record.merge_payload(payload);
                next.extend(self.manager.extract_seeds(payload, depth));
            }

            let mut seen = HashSet::new();
            next.retain(|seed| seen.insert(seed.seed_id()));
            next.sort_by(|a, b| b.priority.cmp(&a.priority));
            next.truncate(self.manager.config.max_seeds_per_level);
            frontier = next;
        }

        let stats = self.manager.get_statistics();
        tracing::info!(
            "snowball collection finished: {} scrapers executed",
            stats.counters.total_scraped
        );

        Ok(SnowballOutcome { record, stats })
    }

    /// Runs one level: cache hits are served without scraping, the rest of
    /// the frontier is filtered through `should_scrape`, marked visited and
    /// fanned out concurrently.
    async fn execute_level(
        &mut self,
        frontier: &[SeedTask],
        context: &LeadRecord,
        depth: u32,
    ) -> Vec<SourcePayload> {
        tracing::info!("executing {} tasks at level {}", frontier.len(), depth);

        let mut served = Vec::new();
        let mut runnable = Vec::new();

        for seed in frontier {
            if let Some(cached) = self.manager.get_cached(&seed.url, seed.source) {
                served.push(cached);
                continue;
            }
            if !self.manager.should_scrape(&seed.url, seed.source, seed.depth) {
                continue;
            }
            let Some(scraper) = self.scrapers.get(&seed.source) else {
                tracing::warn!("no scraper registered for {}", seed.source);
                continue;
            };

            self.manager.mark_visited(&seed.url, seed.source);
            let stats = self.manager.stats_mut();
            stats.total_scraped += 1;
            *stats.by_level.entry(seed.depth).or_insert(0) += 1;
            *stats
                .by_source
                .entry(seed.source.as_str().to_string())
                .or_insert(0) += 1;

            runnable.push((seed.clone(), Arc::clone(scraper)));
        }

        let outcomes = futures::future::join_all(runnable.into_iter().map(|(seed, scraper)| {
            async move {
                let outcome = scraper.scrape(&seed.url, seed.depth, context).await;
                (seed, outcome)
            }
        }))
        .await;

        for (seed, outcome) in outcomes {
            match outcome {
                Ok(payload) if payload.has_content() => {
                    self.manager.add_to_cache(&seed.url, seed.source, payload.clone());
                    served.push(payload);
                }
                Ok(_) => {
                    tracing::debug!("{} yielded nothing for {}", seed.source, seed.url);
                }
                Err(e) => {
                    tracing::error!("scraper {} failed for {}: {}", seed.source, seed.url, e);
                    self.manager.stats_mut().errors += 1;
                }
            }
        }

        served
    }
}

/// Level-1 source selection: anchor on Google Places when the lead has no
/// place id, follow the URLs the lead already carries, always include the
/// search engine, and chase Linktree only when Instagram is in play.
pub fn prioritize_sources(lead: &LeadRecord) -> Vec<DataSource> {
    let mut sources = Vec::new();

    if !lead.has_field(fields::GOOGLE_PLACE_ID) {
        sources.push(DataSource::GooglePlaces);
    }
    if lead.has_field(fields::INSTAGRAM_URL) {
        sources.push(DataSource::Instagram);
    }
    if lead.has_field(fields::FACEBOOK_URL) {
        sources.push(DataSource::Facebook);
    }
    if lead.has_field(fields::WEBSITE_URL) {
        sources.push(DataSource::Website);
    }
    sources.push(DataSource::GoogleSearch);
    if sources.contains(&DataSource::Instagram) {
        sources.push(DataSource::Linktree);
    }

    sources
}

fn url_for_source(lead: &LeadRecord, source: DataSource) -> Option<String> {
    let url = match source {
        DataSource::Instagram => lead.field(fields::INSTAGRAM_URL)?.to_string(),
        DataSource::Facebook => lead.field(fields::FACEBOOK_URL)?.to_string(),
        DataSource::Website => lead.field(fields::WEBSITE_URL)?.to_string(),
        // Search-style sources key on the lead name.
        DataSource::GoogleSearch | DataSource::GooglePlaces => lead.name.clone(),
        // No URL exists yet for the rest at level 1.
        _ => return None,
    };
    (!url.is_empty()).then_some(url)
}
