use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::domain::{LeadRecord, SourcePayload};
use crate::error::Result;

/// One opaque unit of asynchronous work: a scraper call, an LLM request,
/// anything that yields a payload. Implementations must return `Err` on
/// hard failure (network error, non-2xx, parse failure) rather than an
/// empty payload; the scheduler relies on that to drive retries.
#[async_trait]
pub trait SourceOperation: Send + Sync {
    async fn invoke(&self) -> Result<SourcePayload>;
}

/// Closure adapter so callers and tests can build operations without
/// defining new types.
pub struct FnOperation<F>
where
    F: Fn() -> BoxFuture<'static, Result<SourcePayload>> + Send + Sync,
{
    f: F,
}

impl<F> FnOperation<F>
where
    F: Fn() -> BoxFuture<'static, Result<SourcePayload>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F> SourceOperation for FnOperation<F>
where
    F: Fn() -> BoxFuture<'static, Result<SourcePayload>> + Send + Sync,
{
    async fn invoke(&self) -> Result<SourcePayload> {
        (self.f)().await
    }
}

/// Snowball-side collaborator: scrapes one discovered seed at a given
/// depth, with the lead accumulated so far as context (some sources search
/// by company name and location rather than by URL).
#[async_trait]
pub trait SeedScraper: Send + Sync {
    async fn scrape(&self, url: &str, depth: u32, context: &LeadRecord) -> Result<SourcePayload>;
}
