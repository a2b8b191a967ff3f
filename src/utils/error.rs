//! Error types for the roomwatch scraper
//!
//! This module defines the domain error types raised by the remote source
//! client and the storage layer.

use thiserror::Error;

/// Errors that can occur while talking to the remote reservation system
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-success status
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    /// Session page did not contain an anti-forgery token
    #[error("Session token not found in response body")]
    TokenNotFound,

    /// Response body is not the expected `{"d": "..."}` envelope
    #[error("Malformed response envelope: {0}")]
    Envelope(String),

    /// Payload JSON could not be decoded
    #[error("Invalid payload JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Endpoint URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A header name or value is not representable
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl FetchError {
    /// Whether this failure means the cached session token is no longer accepted
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::Status(401 | 403))
    }
}

/// Errors raised by repository implementations
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An update was issued for an event id that has no live row
    #[error("Event {0} does not exist")]
    EventNotFound(i64),

    /// A first observation was inserted for an id that already has a live row
    #[error("Event {0} already exists")]
    DuplicateEvent(i64),

    /// A stored value could not be decoded
    #[error("Corrupt stored value in {column}: {value}")]
    Corrupt { column: String, value: String },

    /// I/O error while preparing the database location
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for repository operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;
