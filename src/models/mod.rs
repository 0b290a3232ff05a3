pub mod reference;
pub mod scrape;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use reference::{Collection, Index, Ref, RefId};
pub use scrape::{DateAvailability, ScrapedLocation};

/// A record type stored in one of the collections
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;
}

/// Street address of a vaccination site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub zip: String,
}

/// A physical vaccination site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub name: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_up_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Record for Location {
    const COLLECTION: Collection = Collection::Locations;
}

/// One timestamped scrape attempt against a location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScraperRun {
    pub location_ref: Ref,
    #[serde(with = "store_time")]
    pub timestamp: DateTime<Utc>,
}

impl Record for ScraperRun {
    const COLLECTION: Collection = Collection::ScraperRuns;
}

/// Times are stored as the store's native time value, `{"@ts": "<rfc3339>"}`.
/// Plain RFC 3339 strings are still read.
mod store_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Tagged {
        #[serde(rename = "@ts")]
        ts: DateTime<Utc>,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Tagged(Tagged),
        Plain(DateTime<Utc>),
    }

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        Tagged { ts: *time }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(match Stored::deserialize(deserializer)? {
            Stored::Tagged(t) => t.ts,
            Stored::Plain(ts) => ts,
        })
    }
}

/// One dated availability record produced by a scraper run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub scraper_run_ref: Ref,
    pub date: String,
    pub number_available: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_up_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<Value>,
}

impl Record for Appointment {
    const COLLECTION: Collection = Collection::Appointments;
}

/// A stored document as returned by the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document<T> {
    #[serde(rename = "ref")]
    pub reference: Ref,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    pub data: T,
}

impl<T> Document<T> {
    pub fn id(&self) -> RefId {
        self.reference.id
    }
}
