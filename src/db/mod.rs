//! Document store access.
//!
//! Every database round trip is a single [`Expr`] sent through a
//! [`DocumentStore`]. The store answers with JSON in the remote database's
//! shapes: documents as `{"ref", "ts", "data"}`, pages as `{"data": [...]}`.
//! A [`Expr::Batch`] is one request and runs as one transaction.

pub mod crud;
pub mod fauna;
pub mod memory;

use crate::config::LogConfig;
use crate::error::Result;
use crate::models::{Collection, Index, Ref};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

pub use fauna::FaunaStore;
pub use memory::MemoryStore;

/// Documents returned by one page of an index or collection scan
pub const PAGE_SIZE: usize = 64;

/// A query expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A fresh store-issued id
    NewId,
    Get(Ref),
    Exists(Ref),
    /// Fails if the document already exists
    Create { target: Ref, data: Value },
    Delete(Ref),
    /// Create unless present; evaluates to `true` when a document was created
    InsertIfAbsent { target: Ref, data: Value },
    /// One page of documents whose index term equals `term`, starting at
    /// the `after` cursor of a previous page
    MatchIndex {
        index: Index,
        term: Ref,
        after: Option<Value>,
    },
    /// One page of all documents in a collection
    ListCollection {
        collection: Collection,
        after: Option<Value>,
    },
    /// Several expressions in one request, results in the same order
    Batch(Vec<Expr>),
}

impl Expr {
    /// Short label for log lines
    pub fn label(&self) -> String {
        match self {
            Expr::NewId => "new_id".to_string(),
            Expr::Get(r) => format!("get {}", r),
            Expr::Exists(r) => format!("exists {}", r),
            Expr::Create { target, .. } => format!("create {}", target),
            Expr::Delete(r) => format!("delete {}", r),
            Expr::InsertIfAbsent { target, .. } => format!("insert_if_absent {}", target),
            Expr::MatchIndex { index, term, .. } => format!("match {} {}", index, term),
            Expr::ListCollection { collection, .. } => format!("list {}", collection),
            Expr::Batch(items) => format!("batch of {}", items.len()),
        }
    }
}

/// Backend executing query expressions
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(&self, expr: Expr) -> Result<Value>;

    /// Name of the backend for log lines
    fn backend_name(&self) -> &'static str;
}

/// Typed access to the collections, over any store
pub struct Database<S> {
    store: S,
    log: LogConfig,
}

impl<S: DocumentStore> Database<S> {
    pub fn new(store: S, log: LogConfig) -> Self {
        Self { store, log }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one expression, logging it and its outcome. Errors are returned unchanged.
    pub async fn query(&self, expr: Expr) -> Result<Value> {
        let label = expr.label();
        if self.log.debug {
            debug!(backend = self.store.backend_name(), "trying query {}", label);
        }

        match self.store.query(expr).await {
            Ok(value) => {
                if self.log.debug {
                    debug!("query {} returned {}", label, value);
                }
                Ok(value)
            }
            Err(e) => {
                warn!("query {} failed: {}", label, e);
                Err(e)
            }
        }
    }
}
