//! CRM Core - Entity Types
//!
//! Pure data structures for the lead pipeline: leads, pipelines, columns and
//! their related records, identifiers, the error taxonomy and configuration.
//! All other crates depend on this one.

pub mod config;
pub mod entities;
pub mod error;
pub mod identity;

pub use config::{ActivationConstraints, CacheTimingConfig, CrmConfig, DragConfig, StaleTimes};
pub use entities::{
    Column, Comment, Contact, Lead, LeadStatus, Pipeline, PipelineStats, Qualification, Tag,
};
pub use error::{
    CacheError, ConfigError, CrmError, CrmResult, DataStoreError, DataStoreErrorKind,
    ValidationError,
};
pub use identity::{
    ColumnId, CommentId, ContactId, EntityIdType, LeadId, PipelineId, TagId, Timestamp, UserId,
};
