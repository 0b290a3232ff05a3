//! Runtime configuration, read from the command line with environment fallbacks

use crate::error::{self, DbError};
use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_FAUNA_ENDPOINT: &str = "https://db.fauna.com/";

/// Logging switches handed to each component at construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Log every query with its result, and lower the default level to debug
    pub debug: bool,
}

impl LogConfig {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub fn level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    /// Install the global subscriber. `RUST_LOG` overrides the default level.
    pub fn init_subscriber(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str().to_lowercase()));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Credentials and endpoint for the hosted document store
#[derive(Debug, Clone, Args)]
pub struct DbConfig {
    /// Use the development database instead of production. Any value other
    /// than a falsey one (`0`, `false`, `no`, `off`, empty) turns it on.
    #[arg(long, env = "DEVELOPMENT", global = true, value_parser = FalseyValueParser::new())]
    pub development: bool,

    /// Secret for the development database
    #[arg(long, env = "FAUNA_DB_DEV", hide_env_values = true, global = true)]
    pub fauna_db_dev: Option<String>,

    /// Secret for the production database
    #[arg(long, env = "FAUNA_DB_PROD", hide_env_values = true, global = true)]
    pub fauna_db_prod: Option<String>,

    /// Database endpoint
    #[arg(long, env = "FAUNA_ENDPOINT", default_value = DEFAULT_FAUNA_ENDPOINT, global = true)]
    pub fauna_endpoint: String,
}

impl DbConfig {
    /// Secret for the selected environment
    pub fn secret(&self) -> error::Result<&str> {
        let (secret, var) = if self.development {
            (&self.fauna_db_dev, "FAUNA_DB_DEV")
        } else {
            (&self.fauna_db_prod, "FAUNA_DB_PROD")
        };
        secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DbError::Config(format!("{} is not set", var)))
    }
}

/// Sites with a scraper
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Site {
    Cvs,
    Walgreens,
}

impl Site {
    pub const ALL: [Site; 2] = [Site::Cvs, Site::Walgreens];
}

#[derive(Debug, Parser)]
#[command(name = "vaccine-scout")]
#[command(version, about = "Scrape vaccine appointment availability into a document store")]
pub struct Config {
    /// Verbose logging, including every database query
    #[arg(long, env = "DEBUG", global = true, value_parser = FalseyValueParser::new())]
    pub debug: bool,

    #[command(flatten)]
    pub db: DbConfig,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    pub fn log(&self) -> LogConfig {
        LogConfig::new(self.debug)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run scrapers and write their output to the database
    Scrape {
        /// Sites to scrape (default: all)
        #[arg(long = "site", value_enum)]
        sites: Vec<Site>,

        /// Write to an in-memory store instead of the remote database
        #[arg(long)]
        dry_run: bool,

        /// Show the browser window
        #[arg(long)]
        headful: bool,

        /// Also save the scraped output as JSON
        #[arg(long)]
        save_json: Option<PathBuf>,
    },

    /// Print each location's most recent scraper run and its appointments
    Availability,

    /// Delete a location together with its scraper runs and appointments
    Cleanup {
        #[arg(long)]
        location_id: u64,
    },
}
