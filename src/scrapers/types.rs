use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A store address a site is searched for
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteLocation {
    pub street: String,
    pub city: String,
    pub zip: String,
}

impl SiteLocation {
    pub fn new(street: &str, city: &str, zip: &str) -> Self {
        Self {
            street: street.to_string(),
            city: city.to_string(),
            zip: zip.to_string(),
        }
    }
}

/// Fixed facts about a scraped site
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: &'static str,
    pub website: &'static str,
    /// Stores to search for, when the site is searched per store
    pub locations: Vec<SiteLocation>,
    /// How long to wait for the page to answer
    pub wait: Duration,
}

/// "WEST BARNSTABLE" -> "West Barnstable"
pub fn title_case(s: &str) -> String {
    s.to_lowercase()
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Leading integer of a string, as sites report counts like "12" or "12 left".
/// Missing, malformed or negative values count as zero.
pub fn leading_count(s: &str) -> u32 {
    let s = s.trim_start();
    let digits: String = s
        .strip_prefix('+')
        .unwrap_or(s)
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}
