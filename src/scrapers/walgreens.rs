use crate::models::ScrapedLocation;
use crate::scrapers::browser::BrowserSession;
use crate::scrapers::traits::ScraperTrait;
use crate::scrapers::types::{SiteConfig, SiteLocation};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

pub const WEBSITE: &str = "https://www.walgreens.com/findcare/vaccination/covid-19/";

const ZIP_INPUT_SELECTOR: &str = "#inputLocation";
const SEARCH_BUTTON_SELECTOR: &str = "#wag-body-main-container button.btn";
const AVAILABLE_SELECTOR: &str = "#wag-body-main-container .alert__green";
const UNAVAILABLE_SELECTOR: &str = "#wag-body-main-container .alert__red";

pub fn site() -> SiteConfig {
    SiteConfig {
        name: "Walgreens",
        website: WEBSITE,
        locations: vec![
            SiteLocation::new("372 POSSUM PARK RD", "Newark", "19711"),
            SiteLocation::new("124 E MAIN ST", "Newark", "19711"),
        ],
        wait: Duration::from_secs(20),
    }
}

/// Outcome banner shown after a zip code search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub available: bool,
    pub message: String,
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("Invalid selector {}: {:?}", s, e))
}

/// Read the availability banner out of the rendered results page
pub fn parse_search_result(html: &str) -> Result<SearchResult> {
    let document = Html::parse_document(html);

    for (css, available) in [(AVAILABLE_SELECTOR, true), (UNAVAILABLE_SELECTOR, false)] {
        if let Some(banner) = document.select(&selector(css)?).next() {
            let message = banner
                .text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            return Ok(SearchResult { available, message });
        }
    }

    Err(anyhow!("No availability banner in Walgreens results page"))
}

/// Output for one configured store
pub fn to_scraped(
    site: &SiteConfig,
    store: &SiteLocation,
    result: SearchResult,
    timestamp: DateTime<Utc>,
) -> ScrapedLocation {
    ScrapedLocation {
        name: format!("{} ({})", site.name, store.city),
        street: store.street.clone(),
        city: store.city.clone(),
        zip: store.zip.clone(),
        availability: BTreeMap::new(),
        has_availability: result.available,
        total_availability: None,
        extra_data: Some(json!({ "message": result.message })),
        timestamp,
        latitude: None,
        longitude: None,
        sign_up_link: Some(site.website.to_string()),
    }
}

/// Walgreens scraper: searches the scheduler by zip code for each store
pub struct WalgreensScraper {
    session: BrowserSession,
    site: SiteConfig,
}

impl WalgreensScraper {
    pub fn new(session: BrowserSession) -> Self {
        Self {
            session,
            site: site(),
        }
    }
}

#[async_trait]
impl ScraperTrait for WalgreensScraper {
    async fn scrape(&self) -> Result<Vec<ScrapedLocation>> {
        info!("{} starting.", self.site.name);
        let banners = format!("{}, {}", AVAILABLE_SELECTOR, UNAVAILABLE_SELECTOR);

        let mut locations = Vec::with_capacity(self.site.locations.len());
        for store in &self.site.locations {
            let html = self
                .session
                .search_and_read_html(
                    self.site.website,
                    ZIP_INPUT_SELECTOR,
                    &store.zip,
                    SEARCH_BUTTON_SELECTOR,
                    &banners,
                    self.site.wait,
                )
                .await
                .with_context(|| format!("Walgreens search for {} failed", store.zip))?;

            let result = parse_search_result(&html)?;
            debug!("{}: {}", store.street, result.message);
            locations.push(to_scraped(&self.site, store, result, Utc::now()));
        }

        info!("{} done, {} locations.", self.site.name, locations.len());
        Ok(locations)
    }

    fn source_name(&self) -> &'static str {
        self.site.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(banner: &str) -> String {
        format!(
            r#"<html><body><div id="wag-body-main-container">
                <form><input id="inputLocation"/><button class="btn">Search</button></form>
                {}
            </div></body></html>"#,
            banner
        )
    }

    #[test]
    fn test_available_banner() {
        let html = page(r#"<div class="alert alert__green"><p>Appointments available!</p><p>Please enter your information.</p></div>"#);
        let result = parse_search_result(&html).unwrap();
        assert!(result.available);
        assert_eq!(result.message, "Appointments available! Please enter your information.");
    }

    #[test]
    fn test_unavailable_banner() {
        let html = page(r#"<div class="alert alert__red"><p>Appointments unavailable</p></div>"#);
        let result = parse_search_result(&html).unwrap();
        assert!(!result.available);
        assert_eq!(result.message, "Appointments unavailable");
    }

    #[test]
    fn test_missing_banner_is_an_error() {
        assert!(parse_search_result(&page("")).is_err());
    }

    #[test]
    fn test_maps_configured_store() {
        let site = site();
        let store = &site.locations[0];
        let timestamp: DateTime<Utc> = "2021-03-16T13:15:27.318Z".parse().unwrap();
        let scraped = to_scraped(
            &site,
            store,
            SearchResult {
                available: true,
                message: "Appointments available!".into(),
            },
            timestamp,
        );

        assert_eq!(scraped.name, "Walgreens (Newark)");
        assert_eq!(scraped.street, "372 POSSUM PARK RD");
        assert_eq!(scraped.zip, "19711");
        assert!(scraped.has_availability);
        assert_eq!(scraped.bookable_dates().count(), 0);
        assert_eq!(scraped.sign_up_link.as_deref(), Some(WEBSITE));
    }
}
