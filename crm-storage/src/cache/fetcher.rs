//! Fetcher that resolves domain keys against a [`LeadStore`].

use async_trait::async_trait;
use crm_core::{CacheError, CrmResult, DataStoreError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::keys::{KeyRoute, QueryKey};
use super::traits::QueryFetcher;
use crate::{LeadFilter, LeadStore};

pub struct StoreFetcher<L: LeadStore> {
    store: Arc<L>,
}

impl<L: LeadStore> StoreFetcher<L> {
    pub fn new(store: Arc<L>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &L {
        &self.store
    }
}

impl<L: LeadStore> Clone for StoreFetcher<L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

fn to_value<T: Serialize>(key: &QueryKey, data: T) -> CrmResult<Value> {
    serde_json::to_value(data).map_err(|e| {
        CacheError::FetchFailed {
            key: key.to_string(),
            reason: format!("serialization failed: {}", e),
        }
        .into()
    })
}

fn fetch_failed(key: &QueryKey, e: DataStoreError) -> crm_core::CrmError {
    CacheError::FetchFailed {
        key: key.to_string(),
        reason: e.to_string(),
    }
    .into()
}

#[async_trait]
impl<L: LeadStore> QueryFetcher for StoreFetcher<L> {
    async fn fetch(&self, key: &QueryKey) -> CrmResult<Value> {
        let route = KeyRoute::resolve(key).ok_or_else(|| CacheError::UnknownKey {
            key: key.to_string(),
        })?;
        let store = &self.store;
        let fail = |e| fetch_failed(key, e);

        match route {
            KeyRoute::Pipelines => to_value(key, store.list_pipelines().await.map_err(fail)?),
            KeyRoute::Pipeline(id) => to_value(key, store.get_pipeline(&id).await.map_err(fail)?),
            KeyRoute::PipelineColumns(id) => {
                to_value(key, store.list_columns(&id).await.map_err(fail)?)
            }
            KeyRoute::LeadsList { filter } => {
                let filter = match filter {
                    None => LeadFilter::default(),
                    Some(segment) => LeadFilter::from_segment(&segment).ok_or_else(|| {
                        CacheError::UnknownKey {
                            key: key.to_string(),
                        }
                    })?,
                };
                to_value(key, store.list_leads(&filter).await.map_err(fail)?)
            }
            KeyRoute::Lead(id) => to_value(key, store.get_lead(&id).await.map_err(fail)?),
            KeyRoute::LeadsByColumn(id) => {
                let filter = LeadFilter::in_column(id);
                to_value(key, store.list_leads(&filter).await.map_err(fail)?)
            }
            KeyRoute::LeadsByPipeline(id) => {
                let filter = LeadFilter::in_pipeline(id);
                to_value(key, store.list_leads(&filter).await.map_err(fail)?)
            }
            KeyRoute::LeadContacts(id) => {
                to_value(key, store.list_lead_contacts(&id).await.map_err(fail)?)
            }
            KeyRoute::PendingContacts => {
                to_value(key, store.list_pending_contacts().await.map_err(fail)?)
            }
            KeyRoute::Tags => to_value(key, store.list_tags().await.map_err(fail)?),
            KeyRoute::LeadTags(id) => to_value(key, store.list_lead_tags(&id).await.map_err(fail)?),
            KeyRoute::LeadComments(id) => {
                to_value(key, store.list_lead_comments(&id).await.map_err(fail)?)
            }
            KeyRoute::PipelineStats(id) => {
                to_value(key, store.pipeline_stats(&id).await.map_err(fail)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys;
    use crate::memory::InMemoryLeadStore;
    use chrono::Utc;
    use crm_core::{Column, ColumnId, CrmError, EntityIdType, Lead, LeadId, Pipeline, PipelineId};

    fn store_with_lead() -> Arc<InMemoryLeadStore> {
        let now = Utc::now();
        let store = InMemoryLeadStore::new();
        store
            .insert_pipeline(Pipeline {
                id: PipelineId::new("P1"),
                name: "Vendas".to_string(),
                position: 0,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .unwrap();
        store
            .insert_column(Column {
                id: ColumnId::new("novo"),
                name: "Novo".to_string(),
                color: "#22c55e".to_string(),
                pipeline_id: PipelineId::new("P1"),
                position: 0,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .unwrap();
        store
            .insert_lead(Lead::new(
                LeadId::new("L1"),
                "Maria",
                PipelineId::new("P1"),
                ColumnId::new("novo"),
                now,
            ))
            .unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_fetch_leads_by_column() {
        let fetcher = StoreFetcher::new(store_with_lead());
        let value = fetcher
            .fetch(&keys::leads_by_column(&ColumnId::new("novo")))
            .await
            .unwrap();
        let leads = value.as_array().unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0]["id"], "L1");
    }

    #[tokio::test]
    async fn test_fetch_missing_lead_is_null() {
        let fetcher = StoreFetcher::new(store_with_lead());
        let value = fetcher.fetch(&keys::lead(&LeadId::new("L9"))).await.unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_fetch_stats() {
        let fetcher = StoreFetcher::new(store_with_lead());
        let value = fetcher
            .fetch(&keys::pipeline_stats(&PipelineId::new("P1")))
            .await
            .unwrap();
        assert_eq!(value["total_leads"], 1);
    }

    #[tokio::test]
    async fn test_prefix_key_has_no_route() {
        let fetcher = StoreFetcher::new(store_with_lead());
        let err = fetcher.fetch(&keys::leads()).await.unwrap_err();
        assert!(matches!(err, CrmError::Cache(CacheError::UnknownKey { .. })));
    }

    #[tokio::test]
    async fn test_store_error_becomes_fetch_failed() {
        let fetcher = StoreFetcher::new(store_with_lead());
        let err = fetcher
            .fetch(&keys::lead_tags(&LeadId::new("ghost")))
            .await
            .unwrap_err();
        assert!(matches!(err, CrmError::Cache(CacheError::FetchFailed { .. })));
    }
}
