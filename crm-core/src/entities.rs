//! Entity types for the lead pipeline.
//!
//! Pure data. The data store is the authority for every invariant listed
//! here; these types only carry what it hands back.

use crate::identity::{
    ColumnId, CommentId, ContactId, LeadId, PipelineId, TagId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// LEAD
// ============================================================================

/// Commercial status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    Open,
    Won,
    Lost,
}

impl LeadStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LeadStatus::Open => "open",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self, LeadStatus::Open)
    }
}

/// Boolean qualification flags captured for a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Qualification {
    pub has_budget: bool,
    pub is_decision_maker: bool,
    pub has_need: bool,
    pub has_timeline: bool,
}

impl Qualification {
    /// Number of flags set.
    pub fn score(&self) -> u8 {
        [
            self.has_budget,
            self.is_decision_maker,
            self.has_need,
            self.has_timeline,
        ]
        .iter()
        .filter(|flag| **flag)
        .count() as u8
    }
}

/// A prospect record tracked through a pipeline.
///
/// `column_id` always references a column of `pipeline_id`; the data store
/// enforces this and the core trusts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub qualification: Qualification,
    pub pipeline_id: PipelineId,
    pub column_id: ColumnId,
    pub responsible_id: Option<UserId>,
    pub notes: Option<String>,
    pub status: LeadStatus,
    /// Why the lead was won or lost. `None` while open.
    pub status_reason: Option<String>,
    /// When the status left `Open`.
    pub status_changed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Unordered.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Lead {
    /// Create an open lead placed in `column_id` of `pipeline_id`.
    pub fn new(
        id: LeadId,
        name: impl Into<String>,
        pipeline_id: PipelineId,
        column_id: ColumnId,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
            phone: None,
            qualification: Qualification::default(),
            pipeline_id,
            column_id,
            responsible_id: None,
            notes: None,
            status: LeadStatus::Open,
            status_reason: None,
            status_changed_at: None,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
        }
    }

    pub fn has_tag(&self, tag_id: &TagId) -> bool {
        self.tags.iter().any(|t| &t.id == tag_id)
    }
}

// ============================================================================
// PIPELINE / COLUMN
// ============================================================================

/// A named, ordered funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    pub position: i32,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One stage within exactly one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    /// Display color, e.g. `#3b82f6`.
    pub color: String,
    pub pipeline_id: PipelineId,
    pub position: i32,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ============================================================================
// RELATED RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
}

/// A scheduled or completed interaction with a lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub lead_id: LeadId,
    pub subject: String,
    pub scheduled_at: Timestamp,
    /// `None` while the contact is still pending.
    pub completed_at: Option<Timestamp>,
    pub responsible_id: Option<UserId>,
}

impl Contact {
    pub fn is_pending(&self) -> bool {
        self.completed_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub lead_id: LeadId,
    pub author_id: Option<UserId>,
    pub body: String,
    pub created_at: Timestamp,
}

// ============================================================================
// ANALYTICS
// ============================================================================

/// Aggregate counts for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PipelineStats {
    pub pipeline_id: PipelineId,
    pub total_leads: u64,
    pub leads_per_column: BTreeMap<ColumnId, u64>,
    pub open: u64,
    pub won: u64,
    pub lost: u64,
}

impl PipelineStats {
    /// Won over closed leads, 0.0 when nothing is closed.
    pub fn win_rate(&self) -> f64 {
        let closed = self.won + self.lost;
        if closed == 0 {
            0.0
        } else {
            self.won as f64 / closed as f64
        }
    }
}
