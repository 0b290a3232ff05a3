//! Scrapes vaccine appointment availability from pharmacy sites and records
//! locations, scraper runs and appointments in a document store.

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod models;
pub mod scrapers;
pub mod writer;
