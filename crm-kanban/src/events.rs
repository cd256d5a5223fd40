//! Plain gesture events handed to the coordinator by the view layer.
//!
//! The view adapts whatever its drag library emits into these two shapes.
//! Fields are deserialized leniently: a missing field arrives as an empty
//! identifier and is caught by validation instead of by the parser.

use crm_core::{ColumnId, EntityIdType, Lead, LeadId, PipelineId};
use serde::{Deserialize, Serialize};

/// Snapshot of a card's data taken when the gesture began.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSnapshot {
    pub id: LeadId,
    pub name: String,
    pub column_id: ColumnId,
    pub pipeline_id: PipelineId,
}

impl CardSnapshot {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            id: lead.id.clone(),
            name: lead.name.clone(),
            column_id: lead.column_id.clone(),
            pipeline_id: lead.pipeline_id.clone(),
        }
    }

    /// First field required at drag start that is blank.
    pub(crate) fn missing_for_start(&self) -> Option<&'static str> {
        if self.id.is_blank() {
            Some("id")
        } else if self.name.trim().is_empty() {
            Some("name")
        } else if self.column_id.is_blank() {
            Some("column_id")
        } else {
            None
        }
    }

    /// First field required at drag end that is blank.
    pub(crate) fn missing_for_end(&self) -> Option<&'static str> {
        if self.id.is_blank() {
            Some("id")
        } else if self.column_id.is_blank() {
            Some("column_id")
        } else {
            None
        }
    }
}

/// A drag-start or drag-end event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DragEvent {
    /// Identifier of the dragged card.
    pub active_id: LeadId,
    /// Drop target. Absent when the gesture ended outside any column.
    pub over_id: Option<ColumnId>,
    pub data: Option<CardSnapshot>,
}

impl DragEvent {
    /// Start event for `card`.
    pub fn start(card: CardSnapshot) -> Self {
        Self {
            active_id: card.id.clone(),
            over_id: None,
            data: Some(card),
        }
    }

    /// End event dropping `card` on `target`.
    pub fn drop_on(card: CardSnapshot, target: ColumnId) -> Self {
        Self {
            active_id: card.id.clone(),
            over_id: Some(target),
            data: Some(card),
        }
    }

    /// End event for a gesture released outside any column.
    pub fn released(card: CardSnapshot) -> Self {
        Self::start(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_deserialize_view_payload() {
        let event: DragEvent = serde_json::from_str(
            r#"{
                "activeId": "L1",
                "overId": "qualificado",
                "data": { "id": "L1", "name": "Maria", "column_id": "novo", "pipeline_id": "P1" }
            }"#,
        )
        .unwrap();

        assert_eq!(event.active_id, "L1");
        assert_eq!(event.over_id, Some(ColumnId::new("qualificado")));
        let data = event.data.unwrap();
        assert_eq!(data.column_id, "novo");
        assert_eq!(data.missing_for_end(), None);
    }

    #[test]
    fn test_missing_fields_become_blank() {
        let event: DragEvent =
            serde_json::from_str(r#"{ "activeId": "L1", "data": { "id": "L1" } }"#).unwrap();
        assert_eq!(event.over_id, None);
        let data = event.data.unwrap();
        assert_eq!(data.missing_for_start(), Some("name"));
        assert_eq!(data.missing_for_end(), Some("column_id"));
    }

    #[test]
    fn test_snapshot_from_lead() {
        let lead = Lead::new(
            LeadId::new("L1"),
            "Maria",
            PipelineId::new("P1"),
            ColumnId::new("novo"),
            Utc::now(),
        );
        let card = CardSnapshot::from_lead(&lead);
        assert_eq!(card.missing_for_start(), None);
        assert_eq!(DragEvent::start(card).active_id, "L1");
    }
}
