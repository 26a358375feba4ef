//! Unified error types for the ingestion pipeline.
//!
//! Error codes:
//! - PARSE_001: Malformed OTLP payload
//! - DB_001-002: ClickHouse errors (query, insert)
//! - STORE_001: Object storage errors
//! - EMBED_001: Embedding service errors
//! - CONF_001: Configuration errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Database error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Query or DDL failed
    QueryFailed,
    /// DB_002: Bulk insert failed
    InsertFailed,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueryFailed => "DB_001",
            Self::InsertFailed => "DB_002",
        }
    }
}

/// Unified error type for the ingestion pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error with code.
    #[error("[{code}] {message}")]
    Database { code: &'static str, message: String },

    #[error("[STORE_001] object storage error: {0}")]
    Storage(String),

    #[error("[EMBED_001] embedding service error: {0}")]
    Embedding(String),

    #[error("[PARSE_001] malformed payload: {0}")]
    Parse(String),

    #[error("[CONF_001] invalid configuration: {0}")]
    Config(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("cursor regression: {from} -> {to}")]
    CursorRegression { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a database error.
    pub fn database(code: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error comes from unreachable or failing infrastructure
    /// rather than from the content of one item.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database { .. } | Self::Storage(_) | Self::Embedding(_))
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Database { code, .. } => Some(*code),
            Self::Storage(_) => Some("STORE_001"),
            Self::Embedding(_) => Some("EMBED_001"),
            Self::Parse(_) => Some("PARSE_001"),
            Self::Config(_) => Some("CONF_001"),
            _ => None,
        }
    }
}
