use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use vaccine_scout::config::{Command, Config, DbConfig, LogConfig, Site};
use vaccine_scout::db::{Database, DocumentStore, FaunaStore, MemoryStore};
use vaccine_scout::models::RefId;
use vaccine_scout::scrapers::{self, BrowserSession};
use vaccine_scout::writer::{cleanup_location, latest_availability, write_scraped_data_batch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let log = config.log();
    log.init_subscriber();

    info!("💉 Vaccine Scout");

    match config.command {
        Command::Scrape {
            sites,
            dry_run,
            headful,
            save_json,
        } => {
            let sites = if sites.is_empty() {
                Site::ALL.to_vec()
            } else {
                sites
            };
            let session = BrowserSession::launch(!headful, log)?;

            if dry_run {
                info!("Dry run: writing to an in-memory store");
                let db = Database::new(MemoryStore::new(), log);
                scrape(&db, &sites, session, save_json).await
            } else {
                let db = remote(&config.db, log)?;
                scrape(&db, &sites, session, save_json).await
            }
        }
        Command::Availability => {
            let db = remote(&config.db, log)?;
            let all = latest_availability(&db).await?;
            println!("{}", serde_json::to_string_pretty(&all)?);
            Ok(())
        }
        Command::Cleanup { location_id } => {
            let db = remote(&config.db, log)?;
            let removed = cleanup_location(&db, RefId(location_id)).await?;
            info!("🧹 Removed {} documents", removed);
            Ok(())
        }
    }
}

fn remote(config: &DbConfig, log: LogConfig) -> anyhow::Result<Database<FaunaStore>> {
    let store = FaunaStore::from_config(config).context("Failed to set up database client")?;
    Ok(Database::new(store, log))
}

/// Scrape each site and write its output. A failing site aborts its own
/// sequence; the remaining sites still run.
async fn scrape<S: DocumentStore>(
    db: &Database<S>,
    sites: &[Site],
    session: BrowserSession,
    save_json: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut scraped_all = Vec::new();
    let mut failures = 0;

    for site in sites {
        let scraper = scrapers::build(*site, session.clone());
        let name = scraper.source_name();

        let outcome = async {
            let scraped = scraper.scrape().await?;
            let summaries = write_scraped_data_batch(db, &scraped).await?;
            anyhow::Ok((scraped, summaries))
        }
        .await;

        match outcome {
            Ok((scraped, summaries)) => {
                let created = summaries.iter().filter(|s| s.location_created).count();
                let appointments: usize = summaries.iter().map(|s| s.appointment_ids.len()).sum();
                info!(
                    "✅ {}: {} locations ({} new), {} appointment dates",
                    name,
                    summaries.len(),
                    created,
                    appointments
                );
                scraped_all.extend(scraped);
            }
            Err(e) => {
                error!("❌ {} failed: {:#}", name, e);
                failures += 1;
            }
        }
    }

    if let Some(path) = save_json {
        let json = serde_json::to_string_pretty(&scraped_all)?;
        tokio::fs::write(&path, json).await?;
        info!("💾 Saved scraped output to {}", path.display());
    }

    if failures > 0 {
        bail!("{} of {} sites failed", failures, sites.len());
    }
    Ok(())
}
