//! Board demo.
//!
//! Seeds an in-memory pipeline, warms the cache, then plays three drops
//! through the board: a committed move, a drop back on the origin column,
//! and a move into another pipeline's column that the store refuses.
//!
//! Usage: `board-demo [config.toml]`. Set `RUST_LOG=debug` for transitions.

use chrono::Utc;
use crm_core::{
    Column, ColumnId, Comment, CommentId, Contact, ContactId, CrmConfig, CrmResult, EntityIdType,
    Lead, LeadId, Pipeline, PipelineId, Tag, TagId,
};
use crm_kanban::{CardSnapshot, DragEvent, PipelineBoard, TracingNotifier};
use crm_storage::{
    spawn_cleanup_task, CacheCoordinator, InMemoryLeadStore, InMemoryQueryStore, StoreFetcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> CrmResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("Failed to init subscriber: {}", e);
    }

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = CrmConfig::load(config_path.as_deref())?;

    let store = Arc::new(seed_store()?);
    let cache = Arc::new(CacheCoordinator::new(
        Arc::new(InMemoryQueryStore::new()),
        Arc::new(StoreFetcher::new(store.clone())),
        config.cache.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup = spawn_cleanup_task(cache.clone(), config.cache.cleanup_interval, shutdown_rx);

    let board = PipelineBoard::with_config(store, TracingNotifier, cache.clone(), &config);

    let pipeline_id = PipelineId::new("P1");
    let lead_id = LeadId::new("L1");
    board.open_pipeline(&pipeline_id).await;
    board.open_lead(&lead_id).await;
    tracing::info!(metrics = ?cache.cache_metrics(), "Cache warmed");

    let card = CardSnapshot {
        id: lead_id.clone(),
        name: "Maria".to_string(),
        column_id: ColumnId::new("novo"),
        pipeline_id: pipeline_id.clone(),
    };

    // 1. novo -> qualificado
    board.drag_start(&DragEvent::start(card.clone()));
    let drop = board
        .drag_end(&DragEvent::drop_on(card.clone(), ColumnId::new("qualificado")))
        .await;
    tracing::info!(
        outcome = ?drop.outcome,
        invalidated = drop.invalidation.as_ref().map_or(0, |r| r.entries_marked),
        "First drop"
    );
    tracing::info!(metrics = ?cache.cache_metrics(), "Cache after move");
    tokio::time::sleep(board.drag().settle_delay()).await;

    // 2. qualificado -> qualificado
    let card = CardSnapshot {
        column_id: ColumnId::new("qualificado"),
        ..card
    };
    board.drag_start(&DragEvent::start(card.clone()));
    let drop = board
        .drag_end(&DragEvent::drop_on(card.clone(), ColumnId::new("qualificado")))
        .await;
    tracing::info!(outcome = ?drop.outcome, "Second drop");

    // 3. into another pipeline
    board.drag_start(&DragEvent::start(card.clone()));
    let drop = board
        .drag_end(&DragEvent::drop_on(card, ColumnId::new("onboarding")))
        .await;
    tracing::info!(outcome = ?drop.outcome, "Third drop");
    tokio::time::sleep(board.drag().settle_delay()).await;

    let removed = cache.cleanup_stale_cache();
    tracing::info!(removed, metrics = ?cache.cache_metrics(), "Final cache state");

    let _ = shutdown_tx.send(true);
    if let Ok(totals) = cleanup.await {
        tracing::info!(cycles = totals.cycles, "Cleanup task stopped");
    }
    Ok(())
}

fn seed_store() -> CrmResult<InMemoryLeadStore> {
    let now = Utc::now();
    let store = InMemoryLeadStore::new();

    for (position, (id, name)) in [("P1", "Vendas"), ("P2", "Pós-venda")].into_iter().enumerate() {
        store.insert_pipeline(Pipeline {
            id: PipelineId::new(id),
            name: name.to_string(),
            position: position as i32,
            is_active: true,
            created_at: now,
            updated_at: now,
        })?;
    }

    let columns = [
        ("novo", "Novo", "#3b82f6", "P1"),
        ("qualificado", "Qualificado", "#f59e0b", "P1"),
        ("ganho", "Ganho", "#22c55e", "P1"),
        ("onboarding", "Onboarding", "#8b5cf6", "P2"),
    ];
    for (position, (id, name, color, pipeline)) in columns.into_iter().enumerate() {
        store.insert_column(Column {
            id: ColumnId::new(id),
            name: name.to_string(),
            color: color.to_string(),
            pipeline_id: PipelineId::new(pipeline),
            position: position as i32,
            is_active: true,
            created_at: now,
            updated_at: now,
        })?;
    }

    let mut maria = Lead::new(
        LeadId::new("L1"),
        "Maria",
        PipelineId::new("P1"),
        ColumnId::new("novo"),
        now,
    );
    maria.email = Some("maria@example.com".to_string());
    store.insert_lead(maria)?;
    store.insert_lead(Lead::new(
        LeadId::new("L2"),
        "João",
        PipelineId::new("P1"),
        ColumnId::new("novo"),
        now,
    ))?;

    store.insert_tag(Tag {
        id: TagId::new("hot"),
        name: "Quente".to_string(),
        color: "#ef4444".to_string(),
    })?;
    store.tag_lead(&LeadId::new("L1"), &TagId::new("hot"))?;

    store.insert_contact(Contact {
        id: ContactId::generate(),
        lead_id: LeadId::new("L1"),
        subject: "Primeira ligação".to_string(),
        scheduled_at: now + chrono::Duration::days(1),
        completed_at: None,
        responsible_id: None,
    })?;
    store.insert_comment(Comment {
        id: CommentId::generate(),
        lead_id: LeadId::new("L1"),
        author_id: None,
        body: "Interessada no plano anual".to_string(),
        created_at: now,
    })?;

    Ok(store)
}
