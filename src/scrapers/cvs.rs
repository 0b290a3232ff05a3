use crate::models::ScrapedLocation;
use crate::scrapers::browser::BrowserSession;
use crate::scrapers::traits::ScraperTrait;
use crate::scrapers::types::{leading_count, title_case, SiteConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as TimeDelta, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

pub const WEBSITE: &str = "https://www.cvs.com/immunizations/covid-19-vaccine";

/// Status feed the Massachusetts link loads
pub const MASS_JSON: &str =
    "https://www.cvs.com/immunizations/covid-19-vaccine.vaccine-status.MA.json?vaccineinfo";

const MASS_LINK_SELECTOR: &str = "a[data-modal='vaccineinfo-MA']";
const STATE: &str = "MA";

/// The feed's `currentTime` has no offset and runs seven hours behind UTC
const FEED_CLOCK_OFFSET_HOURS: i64 = 7;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusFeed {
    response_payload_data: StatusPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    current_time: String,
    #[serde(default)]
    data: BTreeMap<String, Vec<StoreStatus>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreStatus {
    city: String,
    #[serde(default)]
    total_available: Value,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

pub fn site() -> SiteConfig {
    SiteConfig {
        name: "CVS",
        website: WEBSITE,
        locations: Vec::new(),
        wait: Duration::from_secs(30),
    }
}

/// CVS scraper: clicks the Massachusetts link and reads the status feed it loads
pub struct CvsScraper {
    session: BrowserSession,
    site: SiteConfig,
}

impl CvsScraper {
    pub fn new(session: BrowserSession) -> Self {
        Self {
            session,
            site: site(),
        }
    }
}

#[async_trait]
impl ScraperTrait for CvsScraper {
    async fn scrape(&self) -> Result<Vec<ScrapedLocation>> {
        info!("{} starting.", self.site.name);

        let body = self
            .session
            .capture_response(self.site.website, MASS_LINK_SELECTOR, MASS_JSON, self.site.wait)
            .await
            .context("Failed to capture CVS status feed")?;

        let locations = parse_status_feed(&body, &self.site)?;
        info!("{} done, {} locations.", self.site.name, locations.len());
        Ok(locations)
    }

    fn source_name(&self) -> &'static str {
        self.site.name
    }
}

fn count(value: &Value) -> u32 {
    match value {
        Value::String(s) => leading_count(s),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        _ => 0,
    }
}

/// Feed time in UTC. Timestamps with an offset are taken as-is.
pub fn parse_feed_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("Unrecognized feed time {:?}", s))?;
    Ok(Utc.from_utc_datetime(&naive) + TimeDelta::hours(FEED_CLOCK_OFFSET_HOURS))
}

/// Map the Massachusetts status feed onto one output per city
pub fn parse_status_feed(body: &str, site: &SiteConfig) -> Result<Vec<ScrapedLocation>> {
    let feed: StatusFeed = serde_json::from_str(body).context("Unexpected CVS feed shape")?;
    let payload = feed.response_payload_data;
    let timestamp = parse_feed_time(&payload.current_time)?;

    let stores = payload
        .data
        .into_iter()
        .find(|(state, _)| state == STATE)
        .map(|(_, stores)| stores)
        .with_context(|| format!("CVS feed has no {} entries", STATE))?;

    let locations = stores
        .into_iter()
        .map(|store| {
            let total = count(&store.total_available);
            let city = title_case(&store.city);
            debug!("{} ({}): {} available", site.name, city, total);

            ScrapedLocation {
                name: format!("{} ({})", site.name, city),
                street: String::new(),
                city,
                zip: String::new(),
                availability: BTreeMap::new(),
                has_availability: total > 0,
                total_availability: Some(total),
                extra_data: (!store.rest.is_empty()).then(|| Value::Object(store.rest)),
                timestamp,
                latitude: None,
                longitude: None,
                sign_up_link: Some(site.website.to_string()),
            }
        })
        .collect();

    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed() -> String {
        json!({
            "responsePayloadData": {
                "currentTime": "2021-03-16T06:15:27.318",
                "data": {
                    "MA": [
                        { "totalAvailable": "0", "city": "WEST BARNSTABLE", "state": "MA", "pctAvailable": "0.00%", "status": "Fully Booked" },
                        { "totalAvailable": "12", "city": "BOSTON", "state": "MA", "pctAvailable": "4.00%", "status": "Available" }
                    ]
                }
            },
            "responseMetaData": { "statusCode": "0000" }
        })
        .to_string()
    }

    #[test]
    fn test_parses_massachusetts_feed() {
        let locations = parse_status_feed(&feed(), &site()).unwrap();
        assert_eq!(locations.len(), 2);

        let barnstable = &locations[0];
        assert_eq!(barnstable.name, "CVS (West Barnstable)");
        assert_eq!(barnstable.city, "West Barnstable");
        assert!(!barnstable.has_availability);
        assert_eq!(barnstable.total_availability, Some(0));

        let boston = &locations[1];
        assert!(boston.has_availability);
        assert_eq!(boston.total_availability, Some(12));
        assert!(boston.availability.is_empty());
        assert_eq!(boston.sign_up_link.as_deref(), Some(WEBSITE));
        assert_eq!(boston.extra_data.as_ref().unwrap()["status"], "Available");
        assert!(boston.extra_data.as_ref().unwrap().get("city").is_none());
    }

    #[test]
    fn test_feed_time_is_shifted_to_utc() {
        let locations = parse_status_feed(&feed(), &site()).unwrap();
        let expected: DateTime<Utc> = "2021-03-16T13:15:27.318Z".parse().unwrap();
        assert_eq!(locations[0].timestamp, expected);
    }

    #[test]
    fn test_feed_time_with_offset_is_kept() {
        let expected: DateTime<Utc> = "2021-03-16T13:15:27Z".parse().unwrap();
        assert_eq!(parse_feed_time("2021-03-16T13:15:27Z").unwrap(), expected);
        assert!(parse_feed_time("yesterday").is_err());
    }

    #[test]
    fn test_numeric_totals_are_accepted() {
        assert_eq!(count(&json!(5)), 5);
        assert_eq!(count(&json!("3 left")), 3);
        assert_eq!(count(&Value::Null), 0);
    }

    #[test]
    fn test_missing_state_is_an_error() {
        let body = json!({
            "responsePayloadData": { "currentTime": "2021-03-16T06:15:27.318", "data": { "RI": [] } }
        })
        .to_string();
        assert!(parse_status_feed(&body, &site()).is_err());
    }
}
