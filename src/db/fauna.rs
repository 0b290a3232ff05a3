//! HTTPS client for the hosted FaunaDB document store.
//!
//! Expressions are encoded in the FQL v4 JSON wire format and posted to the
//! endpoint; one [`Expr`] is one request and one transaction.

use super::{DocumentStore, Expr, PAGE_SIZE};
use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::models::Ref;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct QueryError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    resource: Option<Value>,
    #[serde(default)]
    errors: Vec<QueryError>,
}

pub struct FaunaStore {
    client: Client,
    endpoint: String,
    secret: String,
}

impl FaunaStore {
    pub fn new(endpoint: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            secret: secret.into(),
        })
    }

    /// Client for the database selected by the `DEVELOPMENT` flag
    pub fn from_config(config: &DbConfig) -> Result<Self> {
        Self::new(config.fauna_endpoint.clone(), config.secret()?)
    }
}

fn encode_ref(r: &Ref) -> Result<Value> {
    Ok(serde_json::to_value(r)?)
}

/// Wrap plain objects as `{"object": ...}` so the server reads them as values.
/// Tagged literals such as `@ref` pass through untouched.
fn wrap_value(value: Value) -> Value {
    match value {
        Value::Object(map) if map.keys().any(|k| k.starts_with('@')) => Value::Object(map),
        Value::Object(map) => {
            let wrapped: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, wrap_value(v)))
                .collect();
            json!({ "object": wrapped })
        }
        Value::Array(items) => Value::Array(items.into_iter().map(wrap_value).collect()),
        other => other,
    }
}

fn create_params(data: Value) -> Value {
    json!({ "object": { "data": wrap_value(data) } })
}

fn map_get(source: Value, after: &Option<Value>) -> Value {
    let mut paginate = json!({ "paginate": source, "size": PAGE_SIZE });
    if let Some(cursor) = after {
        paginate["after"] = cursor.clone();
    }
    json!({
        "map": { "lambda": "x", "expr": { "get": { "var": "x" } } },
        "collection": paginate,
    })
}

/// Encode an expression in the FQL v4 JSON wire format
pub fn encode(expr: &Expr) -> Result<Value> {
    Ok(match expr {
        Expr::NewId => json!({ "new_id": null }),
        Expr::Get(r) => json!({ "get": encode_ref(r)? }),
        Expr::Exists(r) => json!({ "exists": encode_ref(r)? }),
        Expr::Create { target, data } => json!({
            "create": encode_ref(target)?,
            "params": create_params(data.clone()),
        }),
        Expr::Delete(r) => json!({ "delete": encode_ref(r)? }),
        Expr::InsertIfAbsent { target, data } => {
            let target = encode_ref(target)?;
            json!({
                "if": { "exists": target },
                "then": false,
                "else": {
                    "do": [
                        { "create": target, "params": create_params(data.clone()) },
                        true,
                    ]
                },
            })
        }
        Expr::MatchIndex { index, term, after } => map_get(
            json!({
                "match": { "index": index.name() },
                "terms": encode_ref(term)?,
            }),
            after,
        ),
        Expr::ListCollection { collection, after } => map_get(
            json!({ "documents": { "collection": collection.name() } }),
            after,
        ),
        Expr::Batch(items) => Value::Array(items.iter().map(encode).collect::<Result<_>>()?),
    })
}

/// Strip `@obj` escapes the server puts around objects with `@` keys
fn unescape(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            if map.len() == 1 {
                if let Some(inner) = map.remove("@obj") {
                    return unescape(inner);
                }
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, unescape(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(unescape).collect()),
        other => other,
    }
}

#[async_trait]
impl DocumentStore for FaunaStore {
    async fn query(&self, expr: Expr) -> Result<Value> {
        let body = encode(&expr)?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.secret)
            .header("X-FaunaDB-API-Version", "4")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!("fauna responded {} ({} bytes)", status, text.len());

        let parsed: QueryResponse = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                DbError::Json(e)
            } else {
                DbError::Query {
                    code: status.to_string(),
                    description: text.clone(),
                }
            }
        })?;

        if let Some(err) = parsed.errors.first() {
            return Err(DbError::from_code(&err.code, &err.description));
        }
        if !status.is_success() {
            return Err(DbError::Query {
                code: status.to_string(),
                description: text,
            });
        }

        parsed
            .resource
            .map(unescape)
            .ok_or_else(|| DbError::UnexpectedResponse("response has no resource".to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "fauna"
    }
}
