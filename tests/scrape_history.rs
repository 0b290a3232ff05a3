use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use vaccine_scout::config::LogConfig;
use vaccine_scout::db::{Database, MemoryStore};
use vaccine_scout::ids::{generate_location_id, Keyed};
use vaccine_scout::models::{Collection, DateAvailability, Location, RefId, ScrapedLocation};
use vaccine_scout::writer::{latest_availability, write_scraped_data, write_scraped_data_batch};

fn newton(timestamp: &str, slots: &[(&str, u32)]) -> ScrapedLocation {
    let availability: BTreeMap<String, DateAvailability> = slots
        .iter()
        .map(|(date, n)| {
            (
                date.to_string(),
                DateAvailability {
                    has_availability: *n > 0,
                    number_available_appointments: *n,
                    sign_up_link: None,
                },
            )
        })
        .collect();

    ScrapedLocation {
        name: "X".to_string(),
        street: "1 Main St".to_string(),
        city: "Newton".to_string(),
        zip: "02458".to_string(),
        has_availability: availability.values().any(|d| d.has_availability),
        availability,
        total_availability: None,
        extra_data: None,
        timestamp: timestamp.parse().unwrap(),
        latitude: None,
        longitude: None,
        sign_up_link: Some("https://example.com/signup".to_string()),
    }
}

#[tokio::test]
async fn test_same_location_scraped_twice_keeps_one_location_row() {
    let db = Database::new(MemoryStore::new(), LogConfig::default());

    let first = newton("2021-03-16T13:00:00Z", &[("03/16/2021", 2), ("03/17/2021", 0)]);
    let second = newton("2021-03-16T14:00:00Z", &[]);

    let a = write_scraped_data(&db, &first).await.unwrap();
    let b = write_scraped_data(&db, &second).await.unwrap();

    let location_id = generate_location_id(first.key());
    assert_eq!(a.location_id, location_id);
    assert_eq!(b.location_id, location_id);
    assert_eq!(db.store().count(Collection::Locations).await, 1);

    let runs = db.scraper_runs_by_location(location_id).await.unwrap();
    let run_ids: Vec<RefId> = runs.iter().map(|r| r.id()).collect();
    assert_eq!(run_ids, vec![a.scraper_run_id, b.scraper_run_id]);

    let location = db.get::<Location>(location_id).await.unwrap();
    assert_eq!(location.data.address.city, "Newton");
}

#[tokio::test]
async fn test_batch_write_and_latest_availability() {
    let db = Database::new(MemoryStore::new(), LogConfig::default());

    let mut other = newton("2021-03-16T13:00:00Z", &[("03/20/2021", 30)]);
    other.name = "Y".to_string();
    other.street = "409 W Broadway".to_string();
    other.city = "South Boston".to_string();
    other.zip = "02127".to_string();

    let outputs = vec![
        newton("2021-03-16T13:00:00Z", &[("03/16/2021", 2), ("03/17/2021", 1), ("03/18/2021", 0)]),
        other,
    ];
    let summaries = write_scraped_data_batch(&db, &outputs).await.unwrap();
    assert!(summaries.iter().all(|s| s.location_created));
    assert_eq!(summaries[0].appointment_ids.len(), 2);
    assert_eq!(summaries[1].appointment_ids.len(), 1);

    let later = newton("2021-03-16T15:00:00Z", &[("03/19/2021", 5)]);
    write_scraped_data(&db, &later).await.unwrap();

    let latest = latest_availability(&db).await.unwrap();
    assert_eq!(latest.len(), 2);

    let newton_latest = latest
        .iter()
        .find(|l| l.location.data.name == "X")
        .unwrap();
    let expected: DateTime<Utc> = "2021-03-16T15:00:00Z".parse().unwrap();
    assert_eq!(newton_latest.latest_run.as_ref().unwrap().data.timestamp, expected);
    assert_eq!(newton_latest.appointments.len(), 1);
    assert_eq!(newton_latest.appointments[0].data.date, "03/19/2021");
    assert_eq!(
        newton_latest.appointments[0].data.sign_up_link.as_deref(),
        Some("https://example.com/signup")
    );
}
