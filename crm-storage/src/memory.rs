//! In-memory data store.
//!
//! Mirrors what the hosted backend enforces on a lead move (row permissions,
//! column existence, column/pipeline membership) so the coordinators can be
//! exercised without a network.

use async_trait::async_trait;
use chrono::Utc;
use crm_core::{
    Column, ColumnId, Comment, Contact, DataStoreError, DataStoreErrorKind, Lead, LeadId,
    LeadStatus, Pipeline, PipelineId, PipelineStats, Tag, TagId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{LeadFilter, LeadStore, StoreResult};

#[derive(Debug, Default)]
struct StoreState {
    pipelines: HashMap<PipelineId, Pipeline>,
    columns: HashMap<ColumnId, Column>,
    leads: HashMap<LeadId, Lead>,
    tags: HashMap<TagId, Tag>,
    contacts: Vec<Contact>,
    comments: Vec<Comment>,
}

#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    state: RwLock<StoreState>,
    read_only: AtomicBool,
    move_calls: AtomicU64,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| DataStoreError::opaque("storage lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| DataStoreError::opaque("storage lock poisoned"))
    }

    /// Reject every write with a permission error, like a viewer-only role.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of `move_lead_to_column` calls received, successful or not.
    pub fn move_calls(&self) -> u64 {
        self.move_calls.load(Ordering::SeqCst)
    }

    // === Seeding ===

    pub fn insert_pipeline(&self, pipeline: Pipeline) -> StoreResult<()> {
        self.write()?.pipelines.insert(pipeline.id.clone(), pipeline);
        Ok(())
    }

    /// Insert a column. Its pipeline must already exist.
    pub fn insert_column(&self, column: Column) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.pipelines.contains_key(&column.pipeline_id) {
            return Err(DataStoreError::new(
                DataStoreErrorKind::InvalidReference,
                format!(
                    "insert on table \"columns\" violates foreign key constraint: pipeline {} not found",
                    column.pipeline_id
                ),
            ));
        }
        state.columns.insert(column.id.clone(), column);
        Ok(())
    }

    /// Insert a lead. Its column must exist and belong to its pipeline.
    pub fn insert_lead(&self, lead: Lead) -> StoreResult<()> {
        let mut state = self.write()?;
        match state.columns.get(&lead.column_id) {
            None => {
                return Err(DataStoreError::new(
                    DataStoreErrorKind::InvalidColumn,
                    format!("column {} does not exist", lead.column_id),
                ))
            }
            Some(column) if column.pipeline_id != lead.pipeline_id => {
                return Err(DataStoreError::new(
                    DataStoreErrorKind::PipelineMismatch,
                    format!(
                        "column {} does not belong to pipeline {}",
                        lead.column_id, lead.pipeline_id
                    ),
                ))
            }
            Some(_) => {}
        }
        state.leads.insert(lead.id.clone(), lead);
        Ok(())
    }

    pub fn insert_tag(&self, tag: Tag) -> StoreResult<()> {
        self.write()?.tags.insert(tag.id.clone(), tag);
        Ok(())
    }

    /// Attach an existing tag to an existing lead.
    pub fn tag_lead(&self, lead_id: &LeadId, tag_id: &TagId) -> StoreResult<()> {
        let mut state = self.write()?;
        let tag = state.tags.get(tag_id).cloned().ok_or_else(|| {
            DataStoreError::new(
                DataStoreErrorKind::InvalidReference,
                format!("foreign key violation: tag {} not found", tag_id),
            )
        })?;
        let lead = state.leads.get_mut(lead_id).ok_or_else(|| missing_lead(lead_id))?;
        if !lead.has_tag(tag_id) {
            lead.tags.push(tag);
        }
        Ok(())
    }

    pub fn insert_contact(&self, contact: Contact) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.leads.contains_key(&contact.lead_id) {
            return Err(missing_lead(&contact.lead_id));
        }
        state.contacts.push(contact);
        Ok(())
    }

    pub fn insert_comment(&self, comment: Comment) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.leads.contains_key(&comment.lead_id) {
            return Err(missing_lead(&comment.lead_id));
        }
        state.comments.push(comment);
        Ok(())
    }
}

fn missing_lead(lead_id: &LeadId) -> DataStoreError {
    DataStoreError::new(
        DataStoreErrorKind::InvalidReference,
        format!("foreign key violation: lead {} not found", lead_id),
    )
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn move_lead_to_column(
        &self,
        lead_id: &LeadId,
        column_id: &ColumnId,
    ) -> StoreResult<()> {
        self.move_calls.fetch_add(1, Ordering::SeqCst);

        if self.read_only.load(Ordering::SeqCst) {
            return Err(DataStoreError::new(
                DataStoreErrorKind::PermissionDenied,
                "permission denied for table leads",
            ));
        }

        let mut state = self.write()?;
        let column = state.columns.get(column_id).cloned().ok_or_else(|| {
            DataStoreError::new(
                DataStoreErrorKind::InvalidColumn,
                format!("column {} does not exist", column_id),
            )
        })?;
        if !column.is_active {
            return Err(DataStoreError::new(
                DataStoreErrorKind::InvalidColumn,
                format!("column {} is not active", column_id),
            ));
        }

        let lead = state.leads.get_mut(lead_id).ok_or_else(|| missing_lead(lead_id))?;
        if lead.pipeline_id != column.pipeline_id {
            return Err(DataStoreError::new(
                DataStoreErrorKind::PipelineMismatch,
                format!(
                    "column {} belongs to pipeline {}, lead is in pipeline {}",
                    column_id, column.pipeline_id, lead.pipeline_id
                ),
            ));
        }

        lead.column_id = column_id.clone();
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn list_pipelines(&self) -> StoreResult<Vec<Pipeline>> {
        let state = self.read()?;
        let mut pipelines: Vec<Pipeline> = state
            .pipelines
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        pipelines.sort_by_key(|p| p.position);
        Ok(pipelines)
    }

    async fn get_pipeline(&self, id: &PipelineId) -> StoreResult<Option<Pipeline>> {
        Ok(self.read()?.pipelines.get(id).cloned())
    }

    async fn list_columns(&self, pipeline_id: &PipelineId) -> StoreResult<Vec<Column>> {
        let state = self.read()?;
        let mut columns: Vec<Column> = state
            .columns
            .values()
            .filter(|c| &c.pipeline_id == pipeline_id && c.is_active)
            .cloned()
            .collect();
        columns.sort_by_key(|c| c.position);
        Ok(columns)
    }

    async fn get_lead(&self, id: &LeadId) -> StoreResult<Option<Lead>> {
        Ok(self.read()?.leads.get(id).cloned())
    }

    async fn list_leads(&self, filter: &LeadFilter) -> StoreResult<Vec<Lead>> {
        let state = self.read()?;
        let mut leads: Vec<Lead> = state
            .leads
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(leads)
    }

    async fn list_lead_contacts(&self, lead_id: &LeadId) -> StoreResult<Vec<Contact>> {
        let state = self.read()?;
        let mut contacts: Vec<Contact> = state
            .contacts
            .iter()
            .filter(|c| &c.lead_id == lead_id)
            .cloned()
            .collect();
        contacts.sort_by_key(|c| c.scheduled_at);
        Ok(contacts)
    }

    async fn list_pending_contacts(&self) -> StoreResult<Vec<Contact>> {
        let state = self.read()?;
        let mut contacts: Vec<Contact> = state
            .contacts
            .iter()
            .filter(|c| c.is_pending())
            .cloned()
            .collect();
        contacts.sort_by_key(|c| c.scheduled_at);
        Ok(contacts)
    }

    async fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        let state = self.read()?;
        let mut tags: Vec<Tag> = state.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn list_lead_tags(&self, lead_id: &LeadId) -> StoreResult<Vec<Tag>> {
        let state = self.read()?;
        let lead = state.leads.get(lead_id).ok_or_else(|| missing_lead(lead_id))?;
        Ok(lead.tags.clone())
    }

    async fn list_lead_comments(&self, lead_id: &LeadId) -> StoreResult<Vec<Comment>> {
        let state = self.read()?;
        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| &c.lead_id == lead_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.created_at);
        Ok(comments)
    }

    async fn pipeline_stats(&self, pipeline_id: &PipelineId) -> StoreResult<PipelineStats> {
        let state = self.read()?;
        let mut stats = PipelineStats {
            pipeline_id: pipeline_id.clone(),
            ..Default::default()
        };
        for lead in state.leads.values().filter(|l| &l.pipeline_id == pipeline_id) {
            stats.total_leads += 1;
            *stats
                .leads_per_column
                .entry(lead.column_id.clone())
                .or_insert(0) += 1;
            match lead.status {
                LeadStatus::Open => stats.open += 1,
                LeadStatus::Won => stats.won += 1,
                LeadStatus::Lost => stats.lost += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::EntityIdType;

    fn seeded() -> InMemoryLeadStore {
        let now = Utc::now();
        let store = InMemoryLeadStore::new();
        for (id, position) in [("P1", 0), ("P2", 1)] {
            store
                .insert_pipeline(Pipeline {
                    id: PipelineId::new(id),
                    name: format!("Pipeline {}", id),
                    position,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
        }
        for (id, pipeline, position, active) in [
            ("novo", "P1", 0, true),
            ("qualificado", "P1", 1, true),
            ("arquivado", "P1", 2, false),
            ("outro", "P2", 0, true),
        ] {
            store
                .insert_column(Column {
                    id: ColumnId::new(id),
                    name: id.to_string(),
                    color: "#3b82f6".to_string(),
                    pipeline_id: PipelineId::new(pipeline),
                    position,
                    is_active: active,
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
        }
        store
            .insert_lead(Lead::new(
                LeadId::new("L1"),
                "Maria Souza",
                PipelineId::new("P1"),
                ColumnId::new("novo"),
                now,
            ))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_move_updates_column() {
        let store = seeded();
        store
            .move_lead_to_column(&LeadId::new("L1"), &ColumnId::new("qualificado"))
            .await
            .unwrap();

        let lead = store.get_lead(&LeadId::new("L1")).await.unwrap().unwrap();
        assert_eq!(lead.column_id, "qualificado");
        assert_eq!(store.move_calls(), 1);
    }

    #[tokio::test]
    async fn test_move_rejections_are_classified() {
        let store = seeded();
        let l1 = LeadId::new("L1");

        let err = store
            .move_lead_to_column(&l1, &ColumnId::new("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, DataStoreErrorKind::InvalidColumn);

        let err = store
            .move_lead_to_column(&l1, &ColumnId::new("arquivado"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, DataStoreErrorKind::InvalidColumn);

        let err = store
            .move_lead_to_column(&l1, &ColumnId::new("outro"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, DataStoreErrorKind::PipelineMismatch);

        let err = store
            .move_lead_to_column(&LeadId::new("nobody"), &ColumnId::new("novo"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, DataStoreErrorKind::InvalidReference);

        store.set_read_only(true);
        let err = store
            .move_lead_to_column(&l1, &ColumnId::new("qualificado"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, DataStoreErrorKind::PermissionDenied);

        // a rejected move leaves the lead where it was
        let lead = store.get_lead(&l1).await.unwrap().unwrap();
        assert_eq!(lead.column_id, "novo");
    }

    #[tokio::test]
    async fn test_insert_lead_enforces_column_membership() {
        let store = seeded();
        let err = store
            .insert_lead(Lead::new(
                LeadId::new("L2"),
                "Wrong",
                PipelineId::new("P1"),
                ColumnId::new("outro"),
                Utc::now(),
            ))
            .unwrap_err();
        assert_eq!(err.kind, DataStoreErrorKind::PipelineMismatch);
    }

    #[tokio::test]
    async fn test_columns_exclude_inactive_and_are_ordered() {
        let store = seeded();
        let columns = store.list_columns(&PipelineId::new("P1")).await.unwrap();
        let ids: Vec<&str> = columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["novo", "qualificado"]);
    }

    #[tokio::test]
    async fn test_pipeline_stats_counts() {
        let store = seeded();
        let mut won = Lead::new(
            LeadId::new("L2"),
            "João",
            PipelineId::new("P1"),
            ColumnId::new("qualificado"),
            Utc::now(),
        );
        won.status = LeadStatus::Won;
        store.insert_lead(won).unwrap();

        let stats = store.pipeline_stats(&PipelineId::new("P1")).await.unwrap();
        assert_eq!(stats.total_leads, 2);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.won, 1);
        assert_eq!(stats.leads_per_column.get(&ColumnId::new("novo")), Some(&1));
    }

    #[tokio::test]
    async fn test_tagging_is_idempotent() {
        let store = seeded();
        let tag = Tag {
            id: TagId::new("T1"),
            name: "vip".to_string(),
            color: "#f59e0b".to_string(),
        };
        store.insert_tag(tag).unwrap();
        store.tag_lead(&LeadId::new("L1"), &TagId::new("T1")).unwrap();
        store.tag_lead(&LeadId::new("L1"), &TagId::new("T1")).unwrap();

        let tags = store.list_lead_tags(&LeadId::new("L1")).await.unwrap();
        assert_eq!(tags.len(), 1);
    }
}
