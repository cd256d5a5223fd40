//! Property-Based Tests for the Drag Coordinator
//!
//! **Property 1: No-op drops.** Dropping a card on the column it is already
//! in never calls the store and never notifies.
//!
//! **Property 2: Validation completeness.** A snapshot missing `id`, `name`
//! or `column_id` at drag start, or `id`/`column_id` at drag end, is
//! rejected with an error notification and no store call.
//!
//! **Property 3: Cleanup.** Whatever a drag end does, the session is gone
//! when it returns and the move slot is free once the settle delay passes.

use crm_kanban::{
    CardSnapshot, DragCoordinator, DragEndOutcome, DragEvent, DragRejection, DragStartOutcome,
    DragState, Severity,
};
use crm_test_utils::fixtures::*;
use crm_test_utils::generators::*;
use crm_test_utils::{ColumnId, ControlledLeadStore, CrmConfig, EntityIdType, LeadId, PipelineId};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::sync::Arc;
use std::time::Duration;

#[path = "support/notifier.rs"]
mod notifier_support;
use notifier_support::RecordingNotifier;

type TestCoordinator = DragCoordinator<ControlledLeadStore, Arc<RecordingNotifier>>;

fn coordinator() -> TestCoordinator {
    DragCoordinator::new(
        Arc::new(ControlledLeadStore::new(seeded_store())),
        Arc::new(RecordingNotifier::default()),
        &CrmConfig::default().drag,
    )
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

fn card(id: &str, name: &str, column_id: &str, pipeline_id: &str) -> CardSnapshot {
    CardSnapshot {
        id: LeadId::new(id),
        name: name.to_string(),
        column_id: ColumnId::new(column_id),
        pipeline_id: PipelineId::new(pipeline_id),
    }
}

fn drop_target() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(COLUMN_NOVO.to_string())),
        Just(Some(COLUMN_QUALIFICADO.to_string())),
        Just(Some(COLUMN_ONBOARDING.to_string())),
        Just(Some("ghost".to_string())),
        Just(Some(String::new())),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_drop_on_origin_is_a_noop(
        lead_id in arb_id(),
        name in arb_lead_name(),
        column_id in arb_id(),
        pipeline_id in arb_id(),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let drag = coordinator();
            let snapshot = card(&lead_id, &name, &column_id, &pipeline_id);

            prop_assert_eq!(drag.on_drag_start(&DragEvent::start(snapshot.clone())), DragStartOutcome::Started);
            prop_assert!(!drag.is_moving());

            let outcome = drag
                .on_drag_end(&DragEvent::drop_on(snapshot, ColumnId::new(column_id.as_str())))
                .await;

            prop_assert_eq!(outcome, DragEndOutcome::Unchanged);
            prop_assert_eq!(drag.store().calls(), 0);
            prop_assert!(drag.notifier().is_empty());
            prop_assert!(!drag.is_moving());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_incomplete_start_is_rejected(
        id in arb_maybe_blank(),
        name in prop_oneof![arb_lead_name(), arb_blank()],
        column_id in arb_maybe_blank(),
    ) {
        prop_assume!(id.trim().is_empty() || name.trim().is_empty() || column_id.trim().is_empty());

        let drag = coordinator();
        let event = DragEvent {
            active_id: LeadId::new("L1"),
            over_id: None,
            data: Some(card(&id, &name, &column_id, PIPELINE)),
        };

        let outcome = drag.on_drag_start(&event);
        prop_assert!(
            matches!(outcome, DragStartOutcome::Rejected(DragRejection::LeadIncomplete(_))),
            "unexpected outcome {:?}",
            outcome
        );
        prop_assert_eq!(drag.state(), DragState::Idle);
        prop_assert_eq!(drag.notifier().count(Severity::Error), 1);
        prop_assert_eq!(drag.store().calls(), 0);
    }

    #[test]
    fn prop_incomplete_drop_is_rejected(
        id in arb_maybe_blank(),
        column_id in arb_maybe_blank(),
        target in arb_column_id(),
    ) {
        prop_assume!(id.trim().is_empty() || column_id.trim().is_empty());

        let rt = paused_runtime();
        rt.block_on(async {
            let drag = coordinator();
            let event = DragEvent {
                active_id: LeadId::new("L1"),
                over_id: Some(target),
                data: Some(card(&id, "Maria", &column_id, PIPELINE)),
            };

            let outcome = drag.on_drag_end(&event).await;
            prop_assert!(
                matches!(outcome, DragEndOutcome::Rejected(DragRejection::InvalidDrop(_))),
                "unexpected outcome {:?}",
                outcome
            );
            prop_assert_eq!(drag.notifier().count(Severity::Error), 1);
            prop_assert_eq!(drag.store().calls(), 0);
            prop_assert!(!drag.is_moving());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_every_drop_clears_session_and_slot(
        lead in prop_oneof![Just(LEAD_MARIA), Just(LEAD_JOAO), Just("ghost")],
        target in drop_target(),
        fail in any::<bool>(),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let drag = coordinator();
            if fail {
                drag.store().inner().set_read_only(true);
            }
            let snapshot = card(lead, "Lead", COLUMN_NOVO, PIPELINE);
            drag.on_drag_start(&DragEvent::start(snapshot.clone()));

            let event = DragEvent {
                active_id: snapshot.id.clone(),
                over_id: target.map(ColumnId::new),
                data: Some(snapshot),
            };
            let outcome = drag.on_drag_end(&event).await;

            prop_assert_eq!(drag.state(), DragState::Idle);
            prop_assert!(drag.active_card().is_none());
            prop_assert_eq!(outcome.persisted(), drag.store().calls() == 1);

            tokio::time::sleep(drag.settle_delay() + Duration::from_millis(10)).await;
            prop_assert!(!drag.is_moving(), "slot still held after {:?}", outcome);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
