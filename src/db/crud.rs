//! Typed CRUD and index wrappers over [`Database::query`]

use super::{Database, DocumentStore, Expr};
use crate::error::{DbError, Result};
use crate::models::{
    Appointment, Document, Index, Location, Record, Ref, RefId, ScraperRun,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Deserialize)]
struct Page<T> {
    data: Vec<T>,
    /// Cursor for the next page, absent on the last one
    #[serde(default)]
    after: Option<Value>,
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

fn to_data<T: Record>(record: &T) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

fn refs<T: Record>(ids: &[RefId]) -> impl Iterator<Item = Ref> + '_ {
    ids.iter().map(|id| Ref::new(T::COLLECTION, *id))
}

impl<S: DocumentStore> Database<S> {
    /// A fresh store-issued id for runs and appointments
    pub async fn new_id(&self) -> Result<RefId> {
        match self.query(Expr::NewId).await? {
            Value::String(s) => s
                .parse()
                .map_err(|_| DbError::UnexpectedResponse(format!("new id {:?} is not numeric", s))),
            Value::Number(n) => n
                .as_u64()
                .map(RefId)
                .ok_or_else(|| DbError::UnexpectedResponse(format!("new id {} is not a u64", n))),
            other => Err(DbError::UnexpectedResponse(format!("new id: {}", other))),
        }
    }

    /// Fetch one document. Fails with [`DbError::NotFound`] if it is missing.
    pub async fn get<T: Record>(&self, id: RefId) -> Result<Document<T>> {
        let value = self.query(Expr::Get(Ref::new(T::COLLECTION, id))).await?;
        debug!("retrieved {}/{}", T::COLLECTION, id);
        decode(value)
    }

    /// Fetch several documents in one request, in the order given.
    /// Fails as a whole if any id is missing.
    pub async fn get_many<T: Record>(&self, ids: &[RefId]) -> Result<Vec<Document<T>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let batch = refs::<T>(ids).map(Expr::Get).collect();
        decode(self.query(Expr::Batch(batch)).await?)
    }

    pub async fn exists<T: Record>(&self, id: RefId) -> Result<bool> {
        decode(self.query(Expr::Exists(Ref::new(T::COLLECTION, id))).await?)
    }

    pub async fn exists_many<T: Record>(&self, ids: &[RefId]) -> Result<Vec<bool>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let batch = refs::<T>(ids).map(Expr::Exists).collect();
        decode(self.query(Expr::Batch(batch)).await?)
    }

    pub async fn delete<T: Record>(&self, id: RefId) -> Result<()> {
        self.query(Expr::Delete(Ref::new(T::COLLECTION, id))).await?;
        Ok(())
    }

    pub async fn delete_many<T: Record>(&self, ids: &[RefId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let batch = refs::<T>(ids).map(Expr::Delete).collect();
        self.query(Expr::Batch(batch)).await?;
        Ok(())
    }

    /// Create a document under `id`. Not idempotent: an existing id fails
    /// with [`DbError::AlreadyExists`].
    pub async fn create<T: Record>(&self, id: RefId, record: &T) -> Result<Document<T>> {
        let expr = Expr::Create {
            target: Ref::new(T::COLLECTION, id),
            data: to_data(record)?,
        };
        decode(self.query(expr).await?)
    }

    /// Create several documents in one request
    pub async fn create_many<T: Record>(&self, records: &[(RefId, T)]) -> Result<Vec<Document<T>>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let batch = records
            .iter()
            .map(|(id, record)| {
                Ok(Expr::Create {
                    target: Ref::new(T::COLLECTION, *id),
                    data: to_data(record)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        decode(self.query(Expr::Batch(batch)).await?)
    }

    pub async fn write_location(&self, id: RefId, location: &Location) -> Result<Document<Location>> {
        self.create(id, location).await
    }

    pub async fn write_locations(&self, locations: &[(RefId, Location)]) -> Result<Vec<Document<Location>>> {
        self.create_many(locations).await
    }

    /// Create the location unless it exists, in a single transaction.
    /// Returns whether it was created.
    pub async fn insert_location_if_absent(&self, id: RefId, location: &Location) -> Result<bool> {
        let expr = Expr::InsertIfAbsent {
            target: Ref::location(id),
            data: to_data(location)?,
        };
        decode(self.query(expr).await?)
    }

    pub async fn write_scraper_run(
        &self,
        id: RefId,
        location_id: RefId,
        timestamp: DateTime<Utc>,
    ) -> Result<Document<ScraperRun>> {
        let run = ScraperRun {
            location_ref: Ref::location(location_id),
            timestamp,
        };
        self.create(id, &run).await
    }

    pub async fn write_appointment(&self, id: RefId, appointment: &Appointment) -> Result<Document<Appointment>> {
        self.create(id, appointment).await
    }

    async fn page<T: Record>(&self, expr: Expr) -> Result<Page<Document<T>>> {
        decode(self.query(expr).await?)
    }

    /// Every page of a scan, following the `after` cursor until it runs out
    async fn scan_all<T, F>(&self, scan: F) -> Result<Vec<Document<T>>>
    where
        T: Record,
        F: Fn(Option<Value>) -> Expr,
    {
        let mut docs = Vec::new();
        let mut after = None;
        loop {
            let page = self.page::<T>(scan(after)).await?;
            docs.extend(page.data);
            match page.after {
                Some(cursor) => after = Some(cursor),
                None => return Ok(docs),
            }
        }
    }

    async fn match_index<T: Record>(&self, index: Index, term: Ref) -> Result<Vec<Document<T>>> {
        let page = self
            .page::<T>(Expr::MatchIndex { index, term, after: None })
            .await?;
        debug!("{} for {} matched {} documents", index, term, page.data.len());
        Ok(page.data)
    }

    /// Scraper runs of a location, first page only
    pub async fn scraper_runs_by_location(&self, location_id: RefId) -> Result<Vec<Document<ScraperRun>>> {
        self.match_index(Index::ScraperRunsByLocation, Ref::location(location_id))
            .await
    }

    /// Appointments found by a scraper run, first page only
    pub async fn appointments_by_scraper_run(&self, run_id: RefId) -> Result<Vec<Document<Appointment>>> {
        self.match_index(Index::AppointmentsByScraperRun, Ref::scraper_run(run_id))
            .await
    }

    /// All documents of a collection, first page only
    pub async fn list<T: Record>(&self) -> Result<Vec<Document<T>>> {
        let page = self
            .page::<T>(Expr::ListCollection { collection: T::COLLECTION, after: None })
            .await?;
        Ok(page.data)
    }

    /// Every scraper run of a location, across all pages
    pub async fn all_scraper_runs_by_location(&self, location_id: RefId) -> Result<Vec<Document<ScraperRun>>> {
        let term = Ref::location(location_id);
        self.scan_all(|after| Expr::MatchIndex {
            index: Index::ScraperRunsByLocation,
            term,
            after,
        })
        .await
    }

    /// Every appointment of a scraper run, across all pages
    pub async fn all_appointments_by_scraper_run(&self, run_id: RefId) -> Result<Vec<Document<Appointment>>> {
        let term = Ref::scraper_run(run_id);
        self.scan_all(|after| Expr::MatchIndex {
            index: Index::AppointmentsByScraperRun,
            term,
            after,
        })
        .await
    }

    /// Every document of a collection, across all pages
    pub async fn list_all<T: Record>(&self) -> Result<Vec<Document<T>>> {
        self.scan_all(|after| Expr::ListCollection {
            collection: T::COLLECTION,
            after,
        })
        .await
    }
}
