//! Drag Coordinator
//!
//! Turns a drag gesture over lead cards into at most one validated call to
//! [`LeadStore::move_lead_to_column`]. The coordinator is a plain state
//! machine with two entry points; the view layer adapts its drag library's
//! callbacks into [`DragEvent`]s.
//!
//! State is `Idle` or `Dragging`, plus an orthogonal move slot that is held
//! while a persistence call is in flight and for a short settle delay after
//! it. Only one move may hold the slot at a time. A second drop arriving
//! while it is held is rejected, never queued.

use chrono::Utc;
use crm_core::{
    ColumnId, DragConfig, EntityIdType, LeadId, PipelineId, Timestamp, ValidationError,
};
use crm_storage::LeadStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

use crate::classify::MoveFailure;
use crate::events::{CardSnapshot, DragEvent};
use crate::gesture::ActivationPolicy;
use crate::notify::{Notifier, Severity};

/// Shown when a drop arrives while another move holds the slot.
pub const BUSY_MESSAGE: &str = "Please wait for the previous move to finish";

// ============================================================================
// OUTCOMES
// ============================================================================

/// Gesture lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging,
}

/// Why a gesture was refused before any persistence call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragRejection {
    #[error("Lead data not found")]
    LeadNotFound,

    #[error("Lead data incomplete: {0}")]
    LeadIncomplete(ValidationError),

    #[error("Invalid drop: {0}")]
    InvalidDrop(ValidationError),
}

/// A committed move, as needed for cache invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadMove {
    pub lead_id: LeadId,
    pub lead_name: String,
    pub from_column: ColumnId,
    pub to_column: ColumnId,
    /// `None` when the card snapshot did not carry its pipeline.
    pub pipeline_id: Option<PipelineId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragStartOutcome {
    Started,
    /// A move holds the slot; no session was recorded.
    IgnoredWhileMoving,
    Rejected(DragRejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEndOutcome {
    /// Released outside any column.
    Cancelled,
    Rejected(DragRejection),
    /// Dropped back on its own column.
    Unchanged,
    /// Another move holds the slot.
    Busy,
    Moved(LeadMove),
    Failed(MoveFailure),
}

impl DragEndOutcome {
    pub fn lead_move(&self) -> Option<&LeadMove> {
        match self {
            DragEndOutcome::Moved(lead_move) => Some(lead_move),
            _ => None,
        }
    }

    /// True when the data store was called.
    pub fn persisted(&self) -> bool {
        matches!(self, DragEndOutcome::Moved(_) | DragEndOutcome::Failed(_))
    }
}

// ============================================================================
// MOVE SLOT
// ============================================================================

/// Holds the move flag for one commit.
///
/// If the commit future is dropped before it settles, the flag is cleared
/// on drop so the coordinator cannot stay busy forever.
struct MoveSlot {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl MoveSlot {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
                armed: true,
            })
    }

    /// Clear the flag after `delay`, without blocking the caller.
    fn release_after(mut self, delay: Duration) {
        self.armed = false;
        let flag = Arc::clone(&self.flag);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !delay.is_zero() => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    flag.store(false, Ordering::Release);
                    tracing::debug!("Move slot released");
                });
            }
            _ => flag.store(false, Ordering::Release),
        }
    }
}

impl Drop for MoveSlot {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::Release);
            tracing::debug!("Move slot released early: commit abandoned");
        }
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

#[derive(Debug, Clone)]
struct DragSession {
    card: CardSnapshot,
    started_at: Timestamp,
}

/// Drag coordinator for one board.
pub struct DragCoordinator<L: LeadStore, N: Notifier> {
    store: Arc<L>,
    notifier: N,
    settle_delay: Duration,
    activation: ActivationPolicy,
    moving: Arc<AtomicBool>,
    session: Mutex<Option<DragSession>>,
}

impl<L: LeadStore, N: Notifier> DragCoordinator<L, N> {
    /// The settle delay is timed on the tokio runtime current at drop time.
    /// Outside a runtime the move slot is released as soon as the store
    /// answers.
    pub fn new(store: Arc<L>, notifier: N, config: &DragConfig) -> Self {
        Self {
            store,
            notifier,
            settle_delay: config.settle_delay,
            activation: ActivationPolicy::new(&config.activation),
            moving: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &L {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn activation(&self) -> &ActivationPolicy {
        &self.activation
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// True while a move holds the slot.
    pub fn is_moving(&self) -> bool {
        self.moving.load(Ordering::Acquire)
    }

    pub fn state(&self) -> DragState {
        if self.session().is_some() {
            DragState::Dragging
        } else {
            DragState::Idle
        }
    }

    /// Card of the active session, if any.
    pub fn active_card(&self) -> Option<CardSnapshot> {
        self.session().as_ref().map(|s| s.card.clone())
    }

    fn session(&self) -> MutexGuard<'_, Option<DragSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reject(&self, lead_id: &LeadId, rejection: &DragRejection) {
        tracing::warn!(lead_id = %lead_id, reason = %rejection, "Drag rejected");
        self.notifier.notify(Severity::Error, &rejection.to_string());
    }

    /// Begin a gesture.
    ///
    /// Records the card snapshot as the active session. Ignored while a move
    /// is in flight; rejected with an error notification when the snapshot
    /// lacks an id, name or column.
    pub fn on_drag_start(&self, event: &DragEvent) -> DragStartOutcome {
        if self.is_moving() {
            tracing::debug!(lead_id = %event.active_id, "Drag start ignored: move in progress");
            return DragStartOutcome::IgnoredWhileMoving;
        }

        let card = match validate_start(event) {
            Ok(card) => card.clone(),
            Err(rejection) => {
                self.reject(&event.active_id, &rejection);
                return DragStartOutcome::Rejected(rejection);
            }
        };

        tracing::debug!(lead_id = %card.id, column_id = %card.column_id, "Drag started");
        let previous = self.session().replace(DragSession {
            card,
            started_at: Utc::now(),
        });
        if let Some(previous) = previous {
            tracing::debug!(lead_id = %previous.card.id, "Replaced unfinished drag session");
        }
        DragStartOutcome::Started
    }

    /// Finish a gesture.
    ///
    /// The session is cleared first, whatever happens next. Cancelled and
    /// no-op drops return silently. A valid drop onto another column takes
    /// the move slot, persists, notifies, and returns once the store has
    /// answered; the slot stays held for the settle delay after that.
    pub async fn on_drag_end(&self, event: &DragEvent) -> DragEndOutcome {
        if let Some(ended) = self.session().take() {
            let elapsed = Utc::now().signed_duration_since(ended.started_at);
            tracing::debug!(
                lead_id = %ended.card.id,
                elapsed_ms = elapsed.num_milliseconds(),
                "Drag session ended"
            );
        }

        let target = match &event.over_id {
            Some(target) if !event.active_id.is_blank() => target,
            _ => {
                tracing::debug!(lead_id = %event.active_id, "Drag cancelled");
                return DragEndOutcome::Cancelled;
            }
        };

        let card = match validate_end(event, target) {
            Ok(card) => card,
            Err(rejection) => {
                self.reject(&event.active_id, &rejection);
                return DragEndOutcome::Rejected(rejection);
            }
        };

        if &card.column_id == target {
            tracing::debug!(lead_id = %event.active_id, column_id = %target, "Dropped on origin column");
            return DragEndOutcome::Unchanged;
        }

        let Some(slot) = MoveSlot::acquire(&self.moving) else {
            tracing::warn!(lead_id = %event.active_id, "Drop rejected: move in progress");
            self.notifier.notify(Severity::Error, BUSY_MESSAGE);
            return DragEndOutcome::Busy;
        };

        let lead_id = event.active_id.clone();
        tracing::debug!(lead_id = %lead_id, from = %card.column_id, to = %target, "Persisting lead move");

        let outcome = match self.store.move_lead_to_column(&lead_id, target).await {
            Ok(()) => {
                tracing::info!(lead_id = %lead_id, from = %card.column_id, to = %target, "Lead moved");
                let name = if card.name.trim().is_empty() {
                    lead_id.as_str()
                } else {
                    card.name.as_str()
                };
                self.notifier.notify(
                    Severity::Success,
                    &format!("Lead \"{}\" moved successfully", name),
                );
                DragEndOutcome::Moved(LeadMove {
                    lead_id,
                    lead_name: card.name.clone(),
                    from_column: card.column_id.clone(),
                    to_column: target.clone(),
                    pipeline_id: Some(card.pipeline_id.clone()).filter(|p| !p.is_blank()),
                })
            }
            Err(e) => {
                let failure = MoveFailure::classify(&e);
                tracing::error!(
                    lead_id = %lead_id,
                    to = %target,
                    kind = %e.kind,
                    error = %e,
                    "Lead move failed"
                );
                self.notifier.notify(Severity::Error, &failure.user_message());
                DragEndOutcome::Failed(failure)
            }
        };

        slot.release_after(self.settle_delay);
        outcome
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::RequiredFieldMissing {
        field: field.to_string(),
    }
}

fn validate_start(event: &DragEvent) -> Result<&CardSnapshot, DragRejection> {
    if event.active_id.is_blank() {
        return Err(DragRejection::LeadNotFound);
    }
    let card = event.data.as_ref().ok_or(DragRejection::LeadNotFound)?;
    match card.missing_for_start() {
        Some(field) => Err(DragRejection::LeadIncomplete(missing(field))),
        None => Ok(card),
    }
}

fn validate_end<'a>(
    event: &'a DragEvent,
    target: &ColumnId,
) -> Result<&'a CardSnapshot, DragRejection> {
    if target.is_blank() {
        return Err(DragRejection::InvalidDrop(missing("over_id")));
    }
    let card = event
        .data
        .as_ref()
        .ok_or_else(|| DragRejection::InvalidDrop(missing("data")))?;
    match card.missing_for_end() {
        Some(field) => Err(DragRejection::InvalidDrop(missing(field))),
        None => Ok(card),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::{Column, DataStoreError, DataStoreErrorKind, Lead, Pipeline};
    use crm_storage::InMemoryLeadStore;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(Severity, String)>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, severity: Severity, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((severity, message.to_string()));
        }
    }

    impl Recorder {
        fn taken(&self) -> Vec<(Severity, String)> {
            std::mem::take(&mut *self.messages.lock().unwrap())
        }
    }

    fn board_store() -> Arc<InMemoryLeadStore> {
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
        for (position, id) in ["novo", "qualificado"].into_iter().enumerate() {
            store
                .insert_column(Column {
                    id: ColumnId::new(id),
                    name: id.to_string(),
                    color: "#3b82f6".to_string(),
                    pipeline_id: PipelineId::new("P1"),
                    position: position as i32,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
        }
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

    fn maria() -> CardSnapshot {
        CardSnapshot {
            id: LeadId::new("L1"),
            name: "Maria".to_string(),
            column_id: ColumnId::new("novo"),
            pipeline_id: PipelineId::new("P1"),
        }
    }

    fn coordinator() -> DragCoordinator<InMemoryLeadStore, Arc<Recorder>> {
        DragCoordinator::new(board_store(), Arc::new(Recorder::default()), &DragConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_move() {
        let drag = coordinator();
        assert_eq!(drag.on_drag_start(&DragEvent::start(maria())), DragStartOutcome::Started);
        assert_eq!(drag.state(), DragState::Dragging);

        let outcome = drag
            .on_drag_end(&DragEvent::drop_on(maria(), ColumnId::new("qualificado")))
            .await;

        let lead_move = outcome.lead_move().unwrap();
        assert_eq!(lead_move.from_column, "novo");
        assert_eq!(lead_move.to_column, "qualificado");
        assert_eq!(lead_move.pipeline_id, Some(PipelineId::new("P1")));
        assert_eq!(drag.state(), DragState::Idle);
        assert_eq!(drag.store().move_calls(), 1);

        let messages = drag.notifier().taken();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Severity::Success);
        assert!(messages[0].1.contains("Maria"));

        assert!(drag.is_moving());
        tokio::time::sleep(Duration::from_millis(310)).await;
        assert!(!drag.is_moving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_on_origin_is_silent() {
        let drag = coordinator();
        drag.on_drag_start(&DragEvent::start(maria()));
        let outcome = drag
            .on_drag_end(&DragEvent::drop_on(maria(), ColumnId::new("novo")))
            .await;

        assert_eq!(outcome, DragEndOutcome::Unchanged);
        assert_eq!(drag.store().move_calls(), 0);
        assert!(drag.notifier().taken().is_empty());
        assert!(!drag.is_moving());
        assert_eq!(drag.state(), DragState::Idle);
    }

    #[tokio::test]
    async fn test_release_outside_columns_is_silent() {
        let drag = coordinator();
        drag.on_drag_start(&DragEvent::start(maria()));
        let outcome = drag.on_drag_end(&DragEvent::released(maria())).await;

        assert_eq!(outcome, DragEndOutcome::Cancelled);
        assert!(drag.notifier().taken().is_empty());
        assert_eq!(drag.state(), DragState::Idle);
    }

    #[test]
    fn test_start_rejects_incomplete_snapshot() {
        let drag = coordinator();
        let mut card = maria();
        card.name = "  ".to_string();

        let outcome = drag.on_drag_start(&DragEvent::start(card));
        assert!(matches!(
            outcome,
            DragStartOutcome::Rejected(DragRejection::LeadIncomplete(_))
        ));
        assert_eq!(drag.state(), DragState::Idle);

        let messages = drag.notifier().taken();
        assert_eq!(messages[0].0, Severity::Error);
        assert_eq!(messages[0].1, "Lead data incomplete: Required field missing: name");
    }

    #[test]
    fn test_start_without_data_is_not_found() {
        let drag = coordinator();
        let event = DragEvent {
            active_id: LeadId::new("L1"),
            over_id: None,
            data: None,
        };
        assert_eq!(
            drag.on_drag_start(&event),
            DragStartOutcome::Rejected(DragRejection::LeadNotFound)
        );
        assert_eq!(drag.notifier().taken()[0].1, "Lead data not found");
    }

    #[tokio::test]
    async fn test_end_rejects_missing_column() {
        let drag = coordinator();
        let mut card = maria();
        card.column_id = ColumnId::new("");

        let outcome = drag
            .on_drag_end(&DragEvent::drop_on(card, ColumnId::new("qualificado")))
            .await;
        assert!(matches!(
            outcome,
            DragEndOutcome::Rejected(DragRejection::InvalidDrop(_))
        ));
        assert_eq!(drag.store().move_calls(), 0);
        assert_eq!(drag.notifier().taken().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_classified_and_slot_released() {
        let drag = coordinator();
        drag.store().set_read_only(true);

        let outcome = drag
            .on_drag_end(&DragEvent::drop_on(maria(), ColumnId::new("qualificado")))
            .await;
        assert_eq!(outcome, DragEndOutcome::Failed(MoveFailure::PermissionDenied));
        assert!(outcome.persisted());

        let messages = drag.notifier().taken();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.starts_with("Permission denied"));

        tokio::time::sleep(Duration::from_millis(310)).await;
        assert!(!drag.is_moving());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_ignored_and_end_busy_while_moving() {
        let drag = coordinator();
        drag.on_drag_end(&DragEvent::drop_on(maria(), ColumnId::new("qualificado")))
            .await;
        drag.notifier().taken();
        assert!(drag.is_moving());

        let mut other = maria();
        other.column_id = ColumnId::new("qualificado");
        assert_eq!(
            drag.on_drag_start(&DragEvent::start(other.clone())),
            DragStartOutcome::IgnoredWhileMoving
        );
        assert_eq!(drag.state(), DragState::Idle);

        let outcome = drag
            .on_drag_end(&DragEvent::drop_on(other, ColumnId::new("novo")))
            .await;
        assert_eq!(outcome, DragEndOutcome::Busy);
        assert_eq!(drag.store().move_calls(), 1);
        assert_eq!(drag.notifier().taken(), vec![(Severity::Error, BUSY_MESSAGE.to_string())]);
    }

    #[test]
    fn test_move_slot_drop_releases_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let slot = MoveSlot::acquire(&flag).unwrap();
        assert!(MoveSlot::acquire(&flag).is_none());
        drop(slot);
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_release_without_runtime_is_immediate() {
        let flag = Arc::new(AtomicBool::new(false));
        MoveSlot::acquire(&flag)
            .unwrap()
            .release_after(Duration::from_millis(300));
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_rejection_messages() {
        let err = DataStoreError::new(DataStoreErrorKind::InvalidColumn, "x");
        assert_eq!(MoveFailure::classify(&err), MoveFailure::InvalidColumn);
        assert_eq!(
            DragRejection::InvalidDrop(missing("over_id")).to_string(),
            "Invalid drop: Required field missing: over_id"
        );
    }
}
