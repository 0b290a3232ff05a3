use crate::models::ScrapedLocation;
use anyhow::Result;
use async_trait::async_trait;

/// Common trait for all site scrapers
#[async_trait]
pub trait ScraperTrait: Send + Sync {
    /// Scrape availability for every location the site covers
    async fn scrape(&self) -> Result<Vec<ScrapedLocation>>;

    /// Get the name of the scraped site
    fn source_name(&self) -> &'static str;
}
