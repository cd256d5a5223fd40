//! Board composition root.
//!
//! Wires one [`DragCoordinator`] to the shared [`CacheCoordinator`] so that a
//! committed move is always followed by the invalidation it requires.

use crm_core::{CrmConfig, LeadId, PipelineId};
use crm_storage::{
    CacheCoordinator, InvalidationReport, LeadStore, PrefetchReport, QueryStore,
};
use std::sync::Arc;

use crate::drag::{DragCoordinator, DragEndOutcome, DragStartOutcome, LeadMove};
use crate::events::DragEvent;
use crate::gesture::{Activation, GestureSample};
use crate::notify::Notifier;

/// Result of a drop handled by the board.
#[derive(Debug, Clone)]
pub struct BoardDrop {
    pub outcome: DragEndOutcome,
    /// Present when the drop committed a move.
    pub invalidation: Option<InvalidationReport>,
}

/// One kanban board over a lead store and a shared cache.
pub struct PipelineBoard<L: LeadStore, N: Notifier, S: QueryStore> {
    drag: DragCoordinator<L, N>,
    cache: Arc<CacheCoordinator<S>>,
}

impl<L: LeadStore, N: Notifier, S: QueryStore> PipelineBoard<L, N, S> {
    pub fn new(drag: DragCoordinator<L, N>, cache: Arc<CacheCoordinator<S>>) -> Self {
        Self { drag, cache }
    }

    /// Build the drag coordinator from `config` and attach it to `cache`.
    pub fn with_config(
        store: Arc<L>,
        notifier: N,
        cache: Arc<CacheCoordinator<S>>,
        config: &CrmConfig,
    ) -> Self {
        Self::new(DragCoordinator::new(store, notifier, &config.drag), cache)
    }

    pub fn drag(&self) -> &DragCoordinator<L, N> {
        &self.drag
    }

    pub fn cache(&self) -> &Arc<CacheCoordinator<S>> {
        &self.cache
    }

    /// Whether a press has become a drag yet.
    pub fn evaluate_gesture(&self, sample: &GestureSample) -> Activation {
        self.drag.activation().evaluate(sample)
    }

    pub fn drag_start(&self, event: &DragEvent) -> DragStartOutcome {
        self.drag.on_drag_start(event)
    }

    /// Handle a drop, then invalidate what a committed move made stale.
    pub async fn drag_end(&self, event: &DragEvent) -> BoardDrop {
        let outcome = self.drag.on_drag_end(event).await;
        let invalidation = match outcome.lead_move() {
            Some(lead_move) => Some(self.invalidate_after_move(lead_move).await),
            None => None,
        };
        BoardDrop {
            outcome,
            invalidation,
        }
    }

    async fn invalidate_after_move(&self, lead_move: &LeadMove) -> InvalidationReport {
        match &lead_move.pipeline_id {
            Some(pipeline_id) => {
                self.cache
                    .invalidate_lead_movement(
                        &lead_move.lead_id,
                        &lead_move.from_column,
                        &lead_move.to_column,
                        pipeline_id,
                    )
                    .await
            }
            None => {
                // Without the pipeline we cannot scope the batch.
                tracing::warn!(
                    lead_id = %lead_move.lead_id,
                    "Moved card carried no pipeline; invalidating whole domain"
                );
                self.cache.invalidate_all().await
            }
        }
    }

    /// Warm the cache for a lead detail view about to open.
    pub async fn open_lead(&self, lead_id: &LeadId) -> PrefetchReport {
        self.cache.prefetch_lead_data(lead_id).await
    }

    /// Warm the cache for a board about to render.
    pub async fn open_pipeline(&self, pipeline_id: &PipelineId) -> PrefetchReport {
        self.cache.prefetch_pipeline_data(pipeline_id).await
    }
}
