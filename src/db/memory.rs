//! In-process document store with the remote store's semantics.
//!
//! Used for dry runs and tests. Batches are transactional, missing documents
//! fail with "instance not found", duplicate creates with "instance already
//! exists", and index scans return documents in insertion order.

use super::{DocumentStore, Expr, PAGE_SIZE};
use crate::error::{DbError, Result};
use crate::models::{Collection, Ref, RefId};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// First id handed out by `NewId`, in the range the remote store uses
const FIRST_GENERATED_ID: u64 = 290_000_000_000_000_000;

#[derive(Debug, Clone)]
struct StoredDoc {
    id: RefId,
    ts: i64,
    data: Value,
}

impl StoredDoc {
    fn to_json(&self, collection: Collection) -> Value {
        json!({
            "ref": Ref::new(collection, self.id),
            "ts": self.ts,
            "data": self.data,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    collections: HashMap<Collection, Vec<StoredDoc>>,
}

impl State {
    fn docs(&self, collection: Collection) -> &[StoredDoc] {
        self.collections
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn find(&self, r: &Ref) -> Option<&StoredDoc> {
        self.docs(r.collection).iter().find(|d| d.id == r.id)
    }

    fn insert(&mut self, r: &Ref, data: Value) -> Value {
        let doc = StoredDoc {
            id: r.id,
            ts: Utc::now().timestamp_micros(),
            data,
        };
        let json = doc.to_json(r.collection);
        self.collections.entry(r.collection).or_default().push(doc);
        json
    }

    fn remove(&mut self, r: &Ref) -> Option<StoredDoc> {
        let docs = self.collections.get_mut(&r.collection)?;
        let pos = docs.iter().position(|d| d.id == r.id)?;
        Some(docs.remove(pos))
    }

    /// One page starting at the `after` cursor, with a cursor for the next
    /// page when more documents follow
    fn page<'a>(
        collection: Collection,
        docs: impl Iterator<Item = &'a StoredDoc>,
        after: Option<&Value>,
    ) -> Result<Value> {
        let start = after.map(cursor_id).transpose()?;
        let mut docs = docs.skip_while(|d| start.is_some_and(|id| d.id != id));

        let data: Vec<Value> = docs
            .by_ref()
            .take(PAGE_SIZE)
            .map(|d| d.to_json(collection))
            .collect();
        let mut page = json!({ "data": data });
        if let Some(next) = docs.next() {
            page["after"] = json!([Ref::new(collection, next.id)]);
        }
        Ok(page)
    }
}

/// Cursors are `[ref]` of the first document of the next page
fn cursor_id(after: &Value) -> Result<RefId> {
    let first = after.get(0).cloned().unwrap_or_default();
    let r: Ref = serde_json::from_value(first)?;
    Ok(r.id)
}

fn not_found(r: &Ref) -> DbError {
    DbError::NotFound(format!("document {} not found", r))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    next_id: AtomicU64,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of round trips served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Number of documents currently in a collection
    pub async fn count(&self, collection: Collection) -> usize {
        self.state.lock().await.docs(collection).len()
    }

    fn eval(&self, state: &mut State, expr: Expr) -> Result<Value> {
        match expr {
            Expr::NewId => {
                let n = self.next_id.fetch_add(1, Ordering::Relaxed);
                Ok(Value::String((FIRST_GENERATED_ID + n).to_string()))
            }
            Expr::Get(r) => state
                .find(&r)
                .map(|d| d.to_json(r.collection))
                .ok_or_else(|| not_found(&r)),
            Expr::Exists(r) => Ok(Value::Bool(state.find(&r).is_some())),
            Expr::Create { target, data } => {
                if state.find(&target).is_some() {
                    return Err(DbError::AlreadyExists(format!(
                        "document {} already exists",
                        target
                    )));
                }
                Ok(state.insert(&target, data))
            }
            Expr::Delete(r) => state
                .remove(&r)
                .map(|d| d.to_json(r.collection))
                .ok_or_else(|| not_found(&r)),
            Expr::InsertIfAbsent { target, data } => {
                if state.find(&target).is_some() {
                    Ok(Value::Bool(false))
                } else {
                    state.insert(&target, data);
                    Ok(Value::Bool(true))
                }
            }
            Expr::MatchIndex { index, term, after } => {
                if term.collection != index.term_collection() {
                    return Err(DbError::Query {
                        code: "invalid argument".to_string(),
                        description: format!(
                            "{} takes a {} reference, got {}",
                            index,
                            index.term_collection(),
                            term
                        ),
                    });
                }
                let term = serde_json::to_value(term)?;
                let field = index.term_field();
                let matching = state
                    .docs(index.source())
                    .iter()
                    .filter(|d| d.data.get(field) == Some(&term));
                State::page(index.source(), matching, after.as_ref())
            }
            Expr::ListCollection { collection, after } => {
                State::page(collection, state.docs(collection).iter(), after.as_ref())
            }
            Expr::Batch(items) => items
                .into_iter()
                .map(|item| self.eval(state, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, expr: Expr) -> Result<Value> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().await;

        if !matches!(expr, Expr::Batch(_)) {
            // A single expression either applies whole or fails before writing
            return self.eval(&mut state, expr);
        }

        // Evaluate against a scratch copy so a failing batch leaves nothing behind
        let mut scratch = state.clone();
        let value = self.eval(&mut scratch, expr)?;
        *state = scratch;
        Ok(value)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
