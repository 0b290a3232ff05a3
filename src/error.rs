//! Error types for database operations

use thiserror::Error;

/// Errors surfaced by the document store and the wrappers built on it
#[derive(Error, Debug)]
pub enum DbError {
    #[error("instance not found: {0}")]
    NotFound(String),

    #[error("instance already exists: {0}")]
    AlreadyExists(String),

    #[error("query failed ({code}): {description}")]
    Query { code: String, description: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Map an error code reported by the store onto a variant
    pub fn from_code(code: &str, description: &str) -> Self {
        match code {
            "instance not found" => Self::NotFound(description.to_string()),
            "instance already exists" => Self::AlreadyExists(description.to_string()),
            _ => Self::Query {
                code: code.to_string(),
                description: description.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
