//! Error types for CRM pipeline operations

use std::fmt;
use thiserror::Error;

/// Validation errors raised before any data-store call is made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Category of a data-store rejection.
///
/// Stores that know why a write failed report it here. Opaque upstream
/// failures use `Other` and are classified from their message instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataStoreErrorKind {
    /// The target column does not exist or is not usable.
    InvalidColumn,
    /// The caller may not perform the write.
    PermissionDenied,
    /// The target column belongs to another pipeline.
    PipelineMismatch,
    /// A referenced row does not exist (foreign key violation).
    InvalidReference,
    Other,
}

impl fmt::Display for DataStoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataStoreErrorKind::InvalidColumn => "invalid column",
            DataStoreErrorKind::PermissionDenied => "permission denied",
            DataStoreErrorKind::PipelineMismatch => "pipeline mismatch",
            DataStoreErrorKind::InvalidReference => "invalid reference",
            DataStoreErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A rejection from the data-store collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct DataStoreError {
    pub kind: DataStoreErrorKind,
    pub message: String,
}

impl DataStoreError {
    pub fn new(kind: DataStoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// An unclassified failure carrying only the upstream message.
    pub fn opaque(message: impl Into<String>) -> Self {
        Self::new(DataStoreErrorKind::Other, message)
    }
}

/// Query-cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Fetch failed for {key}: {reason}")]
    FetchFailed { key: String, reason: String },

    #[error("Invalidation failed for {key}: {reason}")]
    InvalidationFailed { key: String, reason: String },

    #[error("No fetcher route for key {key}")]
    UnknownKey { key: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all CRM pipeline errors.
#[derive(Debug, Clone, Error)]
pub enum CrmError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Data store error: {0}")]
    DataStore(#[from] DataStoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for CRM pipeline operations.
pub type CrmResult<T> = Result<T, CrmError>;

// =============================================================================
// TESTS
// =============================================================================
