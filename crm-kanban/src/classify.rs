//! Classification of persistence failures into user-facing messages.

use crm_core::{DataStoreError, DataStoreErrorKind};
use std::fmt;

/// Why a lead move was rejected by the data store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveFailure {
    InvalidColumn,
    PermissionDenied,
    PipelineMismatch,
    InvalidReference,
    /// Nothing recognizable; carries the raw upstream message.
    Unclassified(String),
}

impl MoveFailure {
    /// Classify a store error.
    ///
    /// A structured kind wins. Opaque errors fall back to matching the
    /// message, most specific substring first, so a foreign key violation
    /// that names a column is still reported as a bad reference.
    pub fn classify(err: &DataStoreError) -> Self {
        match err.kind {
            DataStoreErrorKind::InvalidColumn => MoveFailure::InvalidColumn,
            DataStoreErrorKind::PermissionDenied => MoveFailure::PermissionDenied,
            DataStoreErrorKind::PipelineMismatch => MoveFailure::PipelineMismatch,
            DataStoreErrorKind::InvalidReference => MoveFailure::InvalidReference,
            DataStoreErrorKind::Other => Self::from_message(&err.message),
        }
    }

    fn from_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        if lowered.contains("foreign key") {
            MoveFailure::InvalidReference
        } else if lowered.contains("permission") {
            MoveFailure::PermissionDenied
        } else if lowered.contains("pipeline") {
            MoveFailure::PipelineMismatch
        } else if lowered.contains("column") {
            MoveFailure::InvalidColumn
        } else {
            MoveFailure::Unclassified(message.to_string())
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            MoveFailure::InvalidColumn => {
                "Invalid column: the target column does not exist or is inactive".to_string()
            }
            MoveFailure::PermissionDenied => {
                "Permission denied: you are not allowed to move this lead".to_string()
            }
            MoveFailure::PipelineMismatch => {
                "Pipeline mismatch: the target column belongs to another pipeline".to_string()
            }
            MoveFailure::InvalidReference => {
                "Invalid database reference: the lead or column no longer exists".to_string()
            }
            MoveFailure::Unclassified(raw) => format!("Failed to move lead: {}", raw),
        }
    }
}

impl fmt::Display for MoveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}
