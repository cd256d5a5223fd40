//! CRM Kanban - Lead Drag-and-Drop Coordination
//!
//! Moves lead cards between pipeline columns. The [`DragCoordinator`]
//! validates gestures and serializes persistence; the [`PipelineBoard`]
//! pairs it with the cache so every committed move is followed by the
//! matching invalidation.

pub mod board;
pub mod classify;
pub mod drag;
pub mod events;
pub mod gesture;
pub mod notify;

pub use board::{BoardDrop, PipelineBoard};
pub use classify::MoveFailure;
pub use drag::{
    DragCoordinator, DragEndOutcome, DragRejection, DragStartOutcome, DragState, LeadMove,
    BUSY_MESSAGE,
};
pub use events::{CardSnapshot, DragEvent};
pub use gesture::{
    Activation, ActivationConstraint, ActivationPolicy, GestureSample, InputModality,
};
pub use notify::{Notifier, Severity, TracingNotifier};
