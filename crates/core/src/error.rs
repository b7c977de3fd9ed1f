//! Error types for tablekeep
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - `NotFound`: row absent. Recoverable, the caller decides.
//! - `AlreadyExists` / `DuplicateResource`: insert collision. The former is the
//!   raw backend signal, the latter is what `EntityRepository::create` surfaces.
//! - `PreconditionFailed`: version token mismatch. Retried internally by the
//!   optimistic protocols, only surfaced through `ContentionExhausted`.
//! - `Decode`: malformed entity reference.
//! - `Cancelled` / `ContentionExhausted`: retry loop stopped early.
//! - `Backend`: every other backend failure, propagated unchanged.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for tablekeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fully-qualified location of a row: table plus the two-part key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowLocation {
    /// Table name
    pub table: String,
    /// Partition key
    pub partition_key: String,
    /// Row key
    pub row_key: String,
}

impl RowLocation {
    /// Create a new row location
    pub fn new(
        table: impl Into<String>,
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl fmt::Display for RowLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.table, self.partition_key, self.row_key)
    }
}

/// Error types for tablekeep
#[derive(Debug, Error)]
pub enum Error {
    /// Row does not exist
    #[error("Row not found: {0}")]
    NotFound(RowLocation),

    /// Insert collided with an existing row (raw backend signal)
    #[error("Row already exists: {0}")]
    AlreadyExists(RowLocation),

    /// Entity creation collided with an existing row
    #[error("Duplicate resource: {0}")]
    DuplicateResource(RowLocation),

    /// Conditional write lost against a concurrent writer
    #[error("Precondition failed: {0}")]
    PreconditionFailed(RowLocation),

    /// Table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Malformed encoded entity reference
    #[error("Decode error: {0}")]
    Decode(String),

    /// Locator (URN) could not be parsed into a row address
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Empty or otherwise unusable key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Property missing or holding a value of the wrong type
    #[error("Property '{name}' is not a {expected}")]
    PropertyType {
        /// Property name
        name: String,
        /// Expected type name
        expected: &'static str,
    },

    /// Operation cancelled before it could complete
    #[error("Operation cancelled")]
    Cancelled,

    /// Retry bound exceeded under contention
    #[error("Contention exhausted after {attempts} attempts")]
    ContentionExhausted {
        /// Number of attempts made
        attempts: usize,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other backend failure (network, authorization, malformed request)
    #[error("Backend error (status {status:?}): {message}")]
    Backend {
        /// HTTP-equivalent status code, if the backend reported one
        status: Option<u16>,
        /// Backend message
        message: String,
    },
}

impl Error {
    /// Classify a status-coded backend failure
    ///
    /// 404 → `NotFound`, 409 → `AlreadyExists`, 412 → `PreconditionFailed`,
    /// anything else → `Backend`.
    pub fn from_status(status: u16, location: RowLocation, message: impl Into<String>) -> Self {
        match status {
            404 => Error::NotFound(location),
            409 => Error::AlreadyExists(location),
            412 => Error::PreconditionFailed(location),
            _ => Error::Backend {
                status: Some(status),
                message: message.into(),
            },
        }
    }

    /// Row absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Insert collision, either raw or surfaced by the repository
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_) | Error::DuplicateResource(_))
    }

    /// Version token mismatch
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Error::PreconditionFailed(_))
    }

    /// Lost a race against another writer
    pub fn is_conflict(&self) -> bool {
        self.is_precondition_failed() || self.is_already_exists()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> RowLocation {
        RowLocation::new("kvp", "container-A", "key-1")
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound(location());
        let msg = err.to_string();
        assert!(msg.contains("Row not found"));
        assert!(msg.contains("kvp/container-A/key-1"));
    }

    #[test]
    fn test_error_display_contention() {
        let err = Error::ContentionExhausted { attempts: 7 };
        assert!(err.to_string().contains("7 attempts"));
    }

    #[test]
    fn test_from_status_classification() {
        assert!(Error::from_status(404, location(), "gone").is_not_found());
        assert!(Error::from_status(409, location(), "conflict").is_already_exists());
        assert!(Error::from_status(412, location(), "etag").is_precondition_failed());

        match Error::from_status(403, location(), "forbidden") {
            Error::Backend { status, message } => {
                assert_eq!(status, Some(403));
                assert_eq!(message, "forbidden");
            }
            other => panic!("Wrong error variant: {other:?}"),
        }
    }

    #[test]
    fn test_conflict_predicates() {
        assert!(Error::PreconditionFailed(location()).is_conflict());
        assert!(Error::AlreadyExists(location()).is_conflict());
        assert!(Error::DuplicateResource(location()).is_already_exists());
        assert!(!Error::NotFound(location()).is_conflict());
        assert!(!Error::Cancelled.is_conflict());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let result: Result<u32> = serde_json::from_str::<u32>("not json").map_err(Error::from);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_error_from_toml() {
        let result: Result<toml::Value> = toml::from_str("= broken").map_err(Error::from);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
