//! Identity types for CRM entities
//!
//! Identifiers are opaque strings issued by the backing data store. The core
//! never parses them; it only needs to compare them and tell an empty value
//! from a real one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behavior for strongly-typed entity identifiers.
pub trait EntityIdType: Clone + Eq + std::hash::Hash + fmt::Display {
    /// Wrap a raw identifier.
    fn new(raw: impl Into<String>) -> Self;

    /// Borrow the raw identifier.
    fn as_str(&self) -> &str;

    /// Generate a fresh identifier (UUIDv7, timestamp-sortable).
    fn generate() -> Self {
        Self::new(Uuid::now_v7().to_string())
    }

    /// True when the identifier is empty or whitespace only.
    fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(String);

        impl EntityIdType for $name {
            fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

define_entity_id!(
    /// Identifier of a lead (prospect record).
    LeadId
);
define_entity_id!(
    /// Identifier of a pipeline (ordered funnel).
    PipelineId
);
define_entity_id!(
    /// Identifier of a column (stage within a pipeline).
    ColumnId
);
define_entity_id!(
    /// Identifier of a platform user (lead owner).
    UserId
);
define_entity_id!(TagId);
define_entity_id!(ContactId);
define_entity_id!(CommentId);
