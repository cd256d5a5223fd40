//! CRM Storage - Data-Store Contract, In-Memory Store and Query Cache
//!
//! Defines the data-store collaborator the pipeline core talks to, an
//! in-memory implementation that enforces the same invariants a hosted
//! backend would, and the client-side query cache with its coordinator.

pub mod cache;
pub mod memory;

pub use cache::{
    spawn_cleanup_task, CacheCoordinator, CacheEntry, CacheMetrics, CacheRead, CacheStats,
    CleanupMetrics, CleanupSnapshot, EntryStatus, InMemoryQueryStore, InvalidationReport,
    PrefetchReport, QueryFetcher, QueryKey, QueryStore, StoreFetcher,
};
pub use memory::InMemoryLeadStore;

use async_trait::async_trait;
use crm_core::{
    Column, ColumnId, Comment, Contact, DataStoreError, Lead, LeadId, LeadStatus, Pipeline,
    PipelineId, PipelineStats, Tag,
};

/// Result type for data-store calls.
pub type StoreResult<T> = Result<T, DataStoreError>;

// ============================================================================
// QUERY TYPES
// ============================================================================

/// Filter for lead list queries. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    pub pipeline_id: Option<PipelineId>,
    pub column_id: Option<ColumnId>,
    pub status: Option<LeadStatus>,
}

impl LeadFilter {
    pub fn in_column(column_id: ColumnId) -> Self {
        Self {
            column_id: Some(column_id),
            ..Default::default()
        }
    }

    pub fn in_pipeline(pipeline_id: PipelineId) -> Self {
        Self {
            pipeline_id: Some(pipeline_id),
            ..Default::default()
        }
    }

    /// Parse a list-key filter segment such as `status:won`.
    pub fn from_segment(segment: &str) -> Option<Self> {
        let (field, value) = segment.split_once(':')?;
        match field {
            "status" => {
                let status = match value {
                    "open" => LeadStatus::Open,
                    "won" => LeadStatus::Won,
                    "lost" => LeadStatus::Lost,
                    _ => return None,
                };
                Some(Self {
                    status: Some(status),
                    ..Default::default()
                })
            }
            "pipeline" => Some(Self::in_pipeline(PipelineId::from(value))),
            "column" => Some(Self::in_column(ColumnId::from(value))),
            _ => None,
        }
    }

    pub fn matches(&self, lead: &Lead) -> bool {
        self.pipeline_id.as_ref().map_or(true, |p| &lead.pipeline_id == p)
            && self.column_id.as_ref().map_or(true, |c| &lead.column_id == c)
            && self.status.map_or(true, |s| lead.status == s)
    }
}

// ============================================================================
// DATA-STORE TRAIT
// ============================================================================

/// The data-store collaborator.
///
/// The hosted backend is the authority for row-level permissions and for
/// the lead/column/pipeline invariants; implementations report violations
/// as [`DataStoreError`]s with the most specific kind they know.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Reassign a lead to another column of its pipeline.
    async fn move_lead_to_column(&self, lead_id: &LeadId, column_id: &ColumnId)
        -> StoreResult<()>;

    // === Pipelines / columns ===

    /// Active pipelines ordered by position.
    async fn list_pipelines(&self) -> StoreResult<Vec<Pipeline>>;

    async fn get_pipeline(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>>;

    /// Active columns of a pipeline ordered by position.
    async fn list_columns(&self, pipeline_id: &PipelineId) -> StoreResult<Vec<Column>>;

    // === Leads ===

    async fn get_lead(&self, id: &LeadId) -> StoreResult<Option<Lead>>;

    /// Leads matching `filter`, newest first.
    async fn list_leads(&self, filter: &LeadFilter) -> StoreResult<Vec<Lead>>;

    // === Related records ===

    async fn list_lead_contacts(&self, lead_id: &LeadId) -> StoreResult<Vec<Contact>>;

    /// Contacts not yet completed, across every lead, soonest first.
    async fn list_pending_contacts(&self) -> StoreResult<Vec<Contact>>;

    async fn list_tags(&self) -> StoreResult<Vec<Tag>>;

    async fn list_lead_tags(&self, lead_id: &LeadId) -> StoreResult<Vec<Tag>>;

    /// Comments of a lead, oldest first.
    async fn list_lead_comments(&self, lead_id: &LeadId) -> StoreResult<Vec<Comment>>;

    // === Analytics ===

    async fn pipeline_stats(&self, pipeline_id: &PipelineId) -> StoreResult<PipelineStats>;
}
