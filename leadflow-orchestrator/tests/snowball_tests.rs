use async_trait::async_trait;
use tokio_test::assert_ok;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use leadflow_core::{
    fields, CoreError, DataSource, LeadRecord, Result, SeedScraper, SourcePayload,
};
use leadflow_orchestrator::{SnowballConfig, SnowballOrchestrator};

/// Maps seed URL → canned payload; counts invocations.
struct CannedScraper {
    responses: HashMap<String, SourcePayload>,
    calls: Arc<AtomicUsize>,
}

impl CannedScraper {
    fn new(responses: Vec<(&str, SourcePayload)>) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let scraper = Arc::new(Self {
            responses: responses
                .into_iter()
                .map(|(url, payload)| (url.to_string(), payload))
                .collect(),
            calls: Arc::clone(&calls),
        });
        (scraper, calls)
    }
}

#[async_trait]
impl SeedScraper for CannedScraper {
    async fn scrape(&self, url: &str, _depth: u32, _context: &LeadRecord) -> Result<SourcePayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses.get(url).cloned().unwrap_or_default())
    }
}

struct FailingScraper;

#[async_trait]
impl SeedScraper for FailingScraper {
    async fn scrape(
        &self,
        _url: &str,
        _depth: u32,
        _context: &LeadRecord,
    ) -> Result<SourcePayload> {
        Err(CoreError::Source("blocked by upstream".to_string()))
    }
}

fn lead_with_instagram() -> LeadRecord {
    let mut lead = LeadRecord::new("Padaria Central").with_location("Campinas", "SP");
    lead.enriched.insert(fields::GOOGLE_PLACE_ID, "ChIJ123");
    lead.enriched
        .insert(fields::INSTAGRAM_URL, "https://instagram.com/padaria");
    lead
}

#[tokio::test]
async fn test_two_level_expansion() {
    // Level 1 scrapes the profile and learns the username; level 2 follows
    // the @handle and learns the email.
    let (instagram, calls) = CannedScraper::new(vec![
        (
            "https://instagram.com/padaria",
            SourcePayload::new().with(fields::INSTAGRAM_USERNAME, "padaria"),
        ),
        (
            "@padaria",
            SourcePayload::new().with(fields::EMAIL, "oi@padaria.com.br"),
        ),
    ]);

    let mut scrapers: HashMap<DataSource, Arc<dyn SeedScraper>> = HashMap::new();
    scrapers.insert(DataSource::Instagram, instagram);

    let mut orchestrator = SnowballOrchestrator::new(scrapers, SnowballConfig::default());
    let outcome = orchestrator
        .collect_snowball(lead_with_instagram())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        outcome.record.field(fields::INSTAGRAM_USERNAME),
        Some("padaria")
    );
    assert_eq!(outcome.record.field(fields::EMAIL), Some("oi@padaria.com.br"));

    assert_eq!(outcome.stats.counters.total_scraped, 2);
    assert_eq!(outcome.stats.counters.by_level.get(&1), Some(&1));
    assert_eq!(outcome.stats.counters.by_level.get(&2), Some(&1));
    assert_eq!(outcome.stats.counters.by_source.get("instagram"), Some(&2));
}

#[tokio::test]
async fn test_depth_bound_stops_expansion() {
    // Every scrape discovers a new website, but depth caps the chase.
    let (instagram, _) = CannedScraper::new(vec![(
        "https://instagram.com/padaria",
        SourcePayload::new().with(fields::WEBSITE_URL, "https://a.com"),
    )]);

    struct ChainingScraper;

    #[async_trait]
    impl SeedScraper for ChainingScraper {
        async fn scrape(
            &self,
            url: &str,
            _depth: u32,
            _context: &LeadRecord,
        ) -> Result<SourcePayload> {
            // Each site links to another site.
            Ok(SourcePayload::new().with(fields::WEBSITE_URL, format!("{}/next", url)))
        }
    }

    let mut scrapers: HashMap<DataSource, Arc<dyn SeedScraper>> = HashMap::new();
    scrapers.insert(DataSource::Instagram, instagram);
    scrapers.insert(DataSource::Website, Arc::new(ChainingScraper));

    let config = SnowballConfig {
        max_depth: 2,
        ..SnowballConfig::default()
    };
    let mut orchestrator = SnowballOrchestrator::new(scrapers, config);
    let outcome = orchestrator
        .collect_snowball(lead_with_instagram())
        .await
        .unwrap();

    // Level 1: instagram. Level 2: https://a.com. The site discovered at
    // level 2 would be level 3 — past the bound, never scraped.
    assert_eq!(outcome.stats.counters.total_scraped, 2);
    assert!(outcome.stats.counters.by_level.get(&3).is_none());
}

#[tokio::test]
async fn test_cache_hit_skips_scraper_on_second_lead() {
    let (instagram, calls) = CannedScraper::new(vec![
        (
            "https://instagram.com/padaria",
            SourcePayload::new().with(fields::INSTAGRAM_USERNAME, "padaria"),
        ),
        (
            "@padaria",
            SourcePayload::new().with(fields::EMAIL, "oi@padaria.com.br"),
        ),
    ]);

    let mut scrapers: HashMap<DataSource, Arc<dyn SeedScraper>> = HashMap::new();
    scrapers.insert(DataSource::Instagram, instagram);

    let mut orchestrator = SnowballOrchestrator::new(scrapers, SnowballConfig::default());

    let first = orchestrator
        .collect_snowball(lead_with_instagram())
        .await
        .unwrap();
    let calls_after_first = calls.load(Ordering::SeqCst);
    assert_eq!(
        first.record.field(fields::INSTAGRAM_USERNAME),
        Some("padaria")
    );

    // Same profile URL on a fresh lead: served from cache, scraper not
    // invoked again, and the payload still lands in the record.
    let second = orchestrator
        .collect_snowball(lead_with_instagram())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), calls_after_first);
    assert_eq!(
        second.record.field(fields::INSTAGRAM_USERNAME),
        Some("padaria")
    );
    assert!(second.stats.counters.cache_hits >= 1);
}

#[tokio::test]
async fn test_scraper_failure_is_counted_not_fatal() {
    let mut scrapers: HashMap<DataSource, Arc<dyn SeedScraper>> = HashMap::new();
    scrapers.insert(DataSource::Instagram, Arc::new(FailingScraper));

    let mut orchestrator = SnowballOrchestrator::new(scrapers, SnowballConfig::default());
    // A failing scraper must not fail the collection itself.
    let outcome = tokio_test::assert_ok!(orchestrator.collect_snowball(lead_with_instagram()).await);

    assert_eq!(outcome.stats.counters.errors, 1);
    assert!(outcome.record.field(fields::INSTAGRAM_USERNAME).is_none());
    // The original lead fields survive.
    assert_eq!(outcome.record.name, "Padaria Central");
}

#[tokio::test]
async fn test_unregistered_sources_are_skipped() {
    // The lead wants google_search (always) and instagram, but only
    // instagram has a scraper; the rest is skipped without error.
    let (instagram, _) = CannedScraper::new(vec![(
        "https://instagram.com/padaria",
        SourcePayload::new().with(fields::INSTAGRAM_USERNAME, "padaria"),
    )]);

    let mut scrapers: HashMap<DataSource, Arc<dyn SeedScraper>> = HashMap::new();
    scrapers.insert(DataSource::Instagram, instagram);

    let mut orchestrator = SnowballOrchestrator::new(scrapers, SnowballConfig::default());
    let outcome = orchestrator
        .collect_snowball(lead_with_instagram())
        .await
        .unwrap();

    assert_eq!(outcome.stats.counters.errors, 0);
    assert_eq!(outcome.stats.counters.by_source.get("google_search"), None);
}

#[tokio::test]
async fn test_visited_urls_not_rescraped_within_lead() {
    // The website discovered at level 1 links back to itself; the repeat
    // visit is suppressed by the visited set and level 3 never happens.
    let (instagram, instagram_calls) = CannedScraper::new(vec![(
        "https://instagram.com/padaria",
        SourcePayload::new().with(fields::WEBSITE_URL, "https://padaria.com.br"),
    )]);
    let (website, website_calls) = CannedScraper::new(vec![(
        "https://padaria.com.br",
        SourcePayload::new().with(fields::WEBSITE_URL, "https://padaria.com.br"),
    )]);

    let mut scrapers: HashMap<DataSource, Arc<dyn SeedScraper>> = HashMap::new();
    scrapers.insert(DataSource::Instagram, instagram);
    scrapers.insert(DataSource::Website, website);

    let mut orchestrator = SnowballOrchestrator::new(scrapers, SnowballConfig::default());
    let outcome = orchestrator
        .collect_snowball(lead_with_instagram())
        .await
        .unwrap();

    assert_eq!(instagram_calls.load(Ordering::SeqCst), 1);
    assert_eq!(website_calls.load(Ordering::SeqCst), 1);
    assert!(outcome.stats.counters.by_level.get(&3).is_none());
}
