//! Persisting scraper output: locations, scraper runs and appointments.
//!
//! Writes are sequential and are not rolled back; a failure part way through
//! leaves the earlier rows in place and is returned to the caller.

use crate::db::{Database, DocumentStore};
use crate::error::Result;
use crate::ids::{generate_location_id, generate_location_ids, Keyed};
use crate::models::{
    Appointment, Document, Location, Ref, RefId, ScrapedLocation, ScraperRun,
};
use serde::Serialize;
use tracing::{debug, info};

/// What one location's write produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub location_id: RefId,
    /// Whether this write created the location row
    pub location_created: bool,
    pub scraper_run_id: RefId,
    pub appointment_ids: Vec<RefId>,
}

/// A location with its most recent run and that run's appointments
#[derive(Debug, Clone, Serialize)]
pub struct LocationAvailability {
    pub location: Document<Location>,
    pub latest_run: Option<Document<ScraperRun>>,
    pub appointments: Vec<Document<Appointment>>,
}

/// Write one scraper output: the location if absent, a new scraper run, and
/// one appointment per date with availability.
pub async fn write_scraped_data<S: DocumentStore>(
    db: &Database<S>,
    scraped: &ScrapedLocation,
) -> Result<WriteSummary> {
    write_with_existence(db, scraped, generate_location_id(scraped.key()), None).await
}

/// Write several scraper outputs in input order.
///
/// Existence of every location is checked in one request up front; the
/// answer is threaded into each per-location write so known locations are
/// not re-inserted.
pub async fn write_scraped_data_batch<S: DocumentStore>(
    db: &Database<S>,
    scraped: &[ScrapedLocation],
) -> Result<Vec<WriteSummary>> {
    let location_ids = generate_location_ids(scraped);
    let existing = db.exists_many::<Location>(&location_ids).await?;
    debug!(
        "{} of {} locations already stored",
        existing.iter().filter(|e| **e).count(),
        existing.len()
    );

    let mut summaries = Vec::with_capacity(scraped.len());
    for ((output, id), exists) in scraped.iter().zip(location_ids).zip(existing) {
        summaries.push(write_with_existence(db, output, id, Some(exists)).await?);
    }
    Ok(summaries)
}

async fn write_with_existence<S: DocumentStore>(
    db: &Database<S>,
    scraped: &ScrapedLocation,
    location_id: RefId,
    known_to_exist: Option<bool>,
) -> Result<WriteSummary> {
    let location_created = match known_to_exist {
        Some(true) => false,
        // create-if-absent also covers a concurrent writer getting there first
        _ => {
            db.insert_location_if_absent(location_id, &scraped.to_location())
                .await?
        }
    };
    debug!("location {} created: {}", location_id, location_created);

    let scraper_run_id = db.new_id().await?;
    db.write_scraper_run(scraper_run_id, location_id, scraped.timestamp)
        .await?;

    let mut appointment_ids = Vec::new();
    for (date, day) in scraped.bookable_dates() {
        let appointment = Appointment {
            scraper_run_ref: Ref::scraper_run(scraper_run_id),
            date: date.clone(),
            number_available: day.number_available_appointments,
            sign_up_link: day
                .sign_up_link
                .clone()
                .or_else(|| scraped.sign_up_link.clone()),
            extra_data: scraped.extra_data.clone(),
        };
        let id = db.new_id().await?;
        db.write_appointment(id, &appointment).await?;
        appointment_ids.push(id);
    }

    info!(
        "{}: run {} with {} appointment dates",
        scraped.name,
        scraper_run_id,
        appointment_ids.len()
    );

    Ok(WriteSummary {
        location_id,
        location_created,
        scraper_run_id,
        appointment_ids,
    })
}

/// For every stored location, its most recent scraper run by timestamp and
/// the appointments that run found
pub async fn latest_availability<S: DocumentStore>(
    db: &Database<S>,
) -> Result<Vec<LocationAvailability>> {
    let locations = db.list_all::<Location>().await?;
    let mut result = Vec::with_capacity(locations.len());

    for location in locations {
        let latest_run = db
            .all_scraper_runs_by_location(location.id())
            .await?
            .into_iter()
            .max_by_key(|run| run.data.timestamp);

        let appointments = match &latest_run {
            Some(run) => db.all_appointments_by_scraper_run(run.id()).await?,
            None => Vec::new(),
        };

        result.push(LocationAvailability {
            location,
            latest_run,
            appointments,
        });
    }
    Ok(result)
}

/// Delete a location with all its scraper runs and their appointments.
/// Returns the number of documents removed.
pub async fn cleanup_location<S: DocumentStore>(
    db: &Database<S>,
    location_id: RefId,
) -> Result<usize> {
    let runs = db.all_scraper_runs_by_location(location_id).await?;
    let mut removed = 0;

    for run in &runs {
        let appointment_ids: Vec<RefId> = db
            .all_appointments_by_scraper_run(run.id())
            .await?
            .iter()
            .map(Document::id)
            .collect();
        db.delete_many::<Appointment>(&appointment_ids).await?;
        removed += appointment_ids.len();
    }

    let run_ids: Vec<RefId> = runs.iter().map(Document::id).collect();
    db.delete_many::<ScraperRun>(&run_ids).await?;
    removed += run_ids.len();

    db.delete::<Location>(location_id).await?;
    info!("removed location {} and {} dependent documents", location_id, removed);
    Ok(removed + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use crate::db::{Expr, MemoryStore, PAGE_SIZE};
    use crate::error::DbError;
    use crate::models::{Collection, DateAvailability};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn db() -> Database<MemoryStore> {
        Database::new(MemoryStore::new(), LogConfig::default())
    }

    /// Memory store whose `fail_at`-th query (counting from zero) fails
    struct FlakyStore {
        inner: MemoryStore,
        fail_at: usize,
        calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new(fail_at: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_at,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn query(&self, expr: Expr) -> Result<Value> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err(DbError::Query {
                    code: "unavailable".to_string(),
                    description: format!("{} refused", expr.label()),
                });
            }
            self.inner.query(expr).await
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    fn day(n: u32, link: Option<&str>) -> DateAvailability {
        DateAvailability {
            has_availability: n > 0,
            number_available_appointments: n,
            sign_up_link: link.map(String::from),
        }
    }

    fn scraped(timestamp: &str) -> ScrapedLocation {
        let mut availability = BTreeMap::new();
        availability.insert("03/16/2021".to_string(), day(2, Some("fake-signup-link-2")));
        availability.insert("03/17/2021".to_string(), day(1, None));
        availability.insert("03/18/2021".to_string(), day(0, None));

        ScrapedLocation {
            name: "RandomName-abc".to_string(),
            street: "2240 Iyannough Road".to_string(),
            city: "West Barnstable".to_string(),
            zip: "02668".to_string(),
            availability,
            has_availability: true,
            total_availability: None,
            extra_data: Some(json!({
                "Vaccinations offered": "Pfizer-BioNTech COVID-19 Vaccine",
                "Clinic Hours": "10:00 am - 03:00 pm"
            })),
            timestamp: timestamp.parse().unwrap(),
            latitude: Some(41.6909399),
            longitude: Some(-70.3373802),
            sign_up_link: Some("fake-signup-link".to_string()),
        }
    }

    #[tokio::test]
    async fn test_writes_location_run_and_positive_dates() {
        let db = db();
        let output = scraped("2021-03-16T13:15:27.318Z");
        let summary = write_scraped_data(&db, &output).await.unwrap();

        assert!(summary.location_created);
        assert_eq!(summary.appointment_ids.len(), 2);

        let location = db.get::<Location>(summary.location_id).await.unwrap();
        assert_eq!(location.data, output.to_location());

        let runs = db.scraper_runs_by_location(summary.location_id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id(), summary.scraper_run_id);
        assert_eq!(runs[0].data.location_ref, Ref::location(summary.location_id));

        let appointments = db
            .appointments_by_scraper_run(summary.scraper_run_id)
            .await
            .unwrap();
        let mut rows: Vec<(String, u32, Option<String>)> = appointments
            .iter()
            .map(|a| (a.data.date.clone(), a.data.number_available, a.data.sign_up_link.clone()))
            .collect();
        rows.sort();
        assert_eq!(
            rows,
            vec![
                ("03/16/2021".to_string(), 2, Some("fake-signup-link-2".to_string())),
                ("03/17/2021".to_string(), 1, Some("fake-signup-link".to_string())),
            ]
        );
        assert!(appointments.iter().all(|a| a.data.extra_data == output.extra_data));
    }

    #[tokio::test]
    async fn test_second_scrape_reuses_location() {
        let db = db();
        let first = write_scraped_data(&db, &scraped("2021-03-16T13:15:27.318Z")).await.unwrap();
        let second = write_scraped_data(&db, &scraped("2021-03-16T14:15:27.318Z")).await.unwrap();

        assert_eq!(first.location_id, second.location_id);
        assert!(!second.location_created);
        assert_ne!(first.scraper_run_id, second.scraper_run_id);
        assert_eq!(db.store().count(Collection::Locations).await, 1);
        assert_eq!(db.store().count(Collection::ScraperRuns).await, 2);
        assert_eq!(db.store().count(Collection::Appointments).await, 4);
    }

    #[tokio::test]
    async fn test_no_availability_still_records_run() {
        let db = db();
        let mut output = scraped("2021-03-16T13:15:27.318Z");
        output.has_availability = false;

        let summary = write_scraped_data(&db, &output).await.unwrap();
        assert!(summary.appointment_ids.is_empty());
        assert_eq!(db.store().count(Collection::ScraperRuns).await, 1);
        assert_eq!(db.store().count(Collection::Appointments).await, 0);
    }

    #[tokio::test]
    async fn test_batch_threads_existence_through() {
        let db = db();
        let existing = scraped("2021-03-16T13:15:27.318Z");
        write_scraped_data(&db, &existing).await.unwrap();

        let mut fresh = scraped("2021-03-16T16:16:16.318Z");
        fresh.name = "RandomName-def".to_string();
        fresh.street = "409 W Broadway".to_string();

        let summaries = write_scraped_data_batch(&db, &[existing.clone(), fresh.clone()])
            .await
            .unwrap();

        assert_eq!(summaries.len(), 2);
        assert!(!summaries[0].location_created);
        assert!(summaries[1].location_created);
        assert_eq!(summaries[1].location_id, generate_location_id(fresh.key()));
        assert_eq!(db.store().count(Collection::Locations).await, 2);
        assert_eq!(db.store().count(Collection::ScraperRuns).await, 3);
    }

    #[tokio::test]
    async fn test_batch_with_duplicate_locations_creates_once() {
        let db = db();
        let output = scraped("2021-03-16T13:15:27.318Z");
        let summaries = write_scraped_data_batch(&db, &[output.clone(), output])
            .await
            .unwrap();

        assert!(summaries[0].location_created);
        assert!(!summaries[1].location_created);
        assert_eq!(db.store().count(Collection::Locations).await, 1);
    }

    #[tokio::test]
    async fn test_latest_availability_picks_newest_run() {
        let db = db();
        write_scraped_data(&db, &scraped("2021-03-16T14:00:00Z")).await.unwrap();
        let mut older = scraped("2021-03-16T09:00:00Z");
        older.has_availability = false;
        write_scraped_data(&db, &older).await.unwrap();

        let all = latest_availability(&db).await.unwrap();
        assert_eq!(all.len(), 1);

        let latest = all[0].latest_run.as_ref().unwrap();
        let expected: DateTime<Utc> = "2021-03-16T14:00:00Z".parse().unwrap();
        assert_eq!(latest.data.timestamp, expected);
        assert_eq!(all[0].appointments.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_history() {
        let db = db();
        let summary = write_scraped_data(&db, &scraped("2021-03-16T13:15:27.318Z")).await.unwrap();

        let removed = cleanup_location(&db, summary.location_id).await.unwrap();
        assert_eq!(removed, 4);
        for collection in Collection::ALL {
            assert_eq!(db.store().count(collection).await, 0);
        }

        let err = cleanup_location(&db, summary.location_id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    // Query order per location: insert-if-absent, run id, run, then an id
    // and a create per appointment
    #[tokio::test]
    async fn test_failed_run_write_keeps_location() {
        let db = Database::new(FlakyStore::new(2), LogConfig::default());
        let output = scraped("2021-03-16T13:15:27.318Z");

        let err = write_scraped_data(&db, &output).await.unwrap_err();
        assert!(matches!(err, DbError::Query { ref code, .. } if code == "unavailable"));

        let store = &db.store().inner;
        assert_eq!(store.count(Collection::Locations).await, 1);
        assert_eq!(store.count(Collection::ScraperRuns).await, 0);
        assert!(db.exists::<Location>(generate_location_id(output.key())).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_appointment_write_keeps_earlier_rows() {
        let db = Database::new(FlakyStore::new(6), LogConfig::default());

        let err = write_scraped_data(&db, &scraped("2021-03-16T13:15:27.318Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Query { .. }));

        let store = &db.store().inner;
        assert_eq!(store.count(Collection::Locations).await, 1);
        assert_eq!(store.count(Collection::ScraperRuns).await, 1);
        assert_eq!(store.count(Collection::Appointments).await, 1);
    }

    #[tokio::test]
    async fn test_latest_availability_sees_runs_past_first_page() {
        let db = db();
        let start: DateTime<Utc> = "2021-03-16T00:00:00Z".parse().unwrap();
        let total = PAGE_SIZE + 6;

        for hour in 0..total {
            let mut output = scraped("2021-03-16T00:00:00Z");
            output.timestamp = start + Duration::hours(hour as i64);
            // only the newest run has availability
            output.has_availability = hour == total - 1;
            write_scraped_data(&db, &output).await.unwrap();
        }

        let all = latest_availability(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        let latest = all[0].latest_run.as_ref().unwrap();
        assert_eq!(latest.data.timestamp, start + Duration::hours(total as i64 - 1));
        assert_eq!(all[0].appointments.len(), 2);
    }

    #[tokio::test]
    async fn test_latest_availability_covers_every_location() {
        let db = db();
        let total = PAGE_SIZE + 3;
        for n in 0..total {
            let mut output = scraped("2021-03-16T13:15:27.318Z");
            output.name = format!("Site {n}");
            output.has_availability = false;
            write_scraped_data(&db, &output).await.unwrap();
        }

        let all = latest_availability(&db).await.unwrap();
        assert_eq!(all.len(), total);
        assert!(all.iter().all(|l| l.latest_run.is_some()));
    }
}
