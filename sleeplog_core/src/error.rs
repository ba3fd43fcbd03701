//! Error types for the sleeplog_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for sleeplog_core operations
///
/// `NotFound`, `InvalidQuality` and `NoRecordsFound` are the domain failures
/// returned by the query layer. The remaining variants only come from the
/// storage and configuration plumbing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No live record has the requested id
    #[error("Sleep record with id={id} not found")]
    NotFound { id: String },

    /// Quality string is not one of the enumerated values
    #[error("Invalid sleep quality '{value}': expected one of good, average, poor")]
    InvalidQuality { value: String },

    /// Aggregate requested over an empty store
    #[error("No sleep records found.")]
    NoRecordsFound,

    /// Record cannot be written to durable storage as-is
    #[error("Cannot store sleep record {id}: {reason}")]
    Unstorable { id: String, reason: String },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(id: impl Into<String>) -> Self {
        Error::NotFound { id: id.into() }
    }

    pub fn invalid_quality(value: impl Into<String>) -> Self {
        Error::InvalidQuality {
            value: value.into(),
        }
    }

    pub fn unstorable(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Unstorable {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
