use super::{Address, Location};
use crate::ids::{Keyed, LocationKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Availability reported for a single date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DateAvailability {
    pub has_availability: bool,
    pub number_available_appointments: u32,
    #[serde(default)]
    pub sign_up_link: Option<String>,
}

/// Normalized output of a site scraper for one location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedLocation {
    pub name: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip: String,
    /// Keyed by the date string as the site reports it
    #[serde(default)]
    pub availability: BTreeMap<String, DateAvailability>,
    pub has_availability: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_availability: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_up_link: Option<String>,
}

impl ScrapedLocation {
    /// The location record this output describes
    pub fn to_location(&self) -> Location {
        Location {
            name: self.name.clone(),
            address: Address {
                street: self.street.clone(),
                city: self.city.clone(),
                zip: self.zip.clone(),
            },
            sign_up_link: self.sign_up_link.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Dates that should produce an appointment row, in date-key order
    pub fn bookable_dates(&self) -> impl Iterator<Item = (&String, &DateAvailability)> {
        let enabled = self.has_availability;
        self.availability
            .iter()
            .filter(move |(_, day)| {
                enabled && day.has_availability && day.number_available_appointments > 0
            })
    }
}

impl Keyed for ScrapedLocation {
    fn key(&self) -> LocationKey<'_> {
        LocationKey {
            name: &self.name,
            street: &self.street,
            city: &self.city,
            zip: &self.zip,
        }
    }
}
