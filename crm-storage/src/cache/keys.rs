//! Hierarchical query keys.
//!
//! A key is a path of segments: the domain root, an entity segment, then an
//! optional relationship qualifier and identifier. Invalidation matches by
//! prefix, so a shorter key addresses every entry beneath it:
//!
//! ```text
//! crm                                   whole domain
//! crm/leads                             every lead entry
//! crm/leads/list                        every general leads list
//! crm/leads/by_column/<column_id>       leads in one column
//! crm/leads/detail/<lead_id>            one lead
//! ```

use crm_core::{ColumnId, EntityIdType, LeadId, PipelineId};
use std::fmt;

/// Root segment of every key owned by this crate.
pub const DOMAIN_ROOT: &str = "crm";

const DETAIL: &str = "detail";
const LIST: &str = "list";
const BY_COLUMN: &str = "by_column";
const BY_PIPELINE: &str = "by_pipeline";
const BY_LEAD: &str = "by_lead";
const PENDING: &str = "pending";
const PIPELINE: &str = "pipeline";

/// Entity segment of a domain key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Pipelines,
    Columns,
    Leads,
    Contacts,
    Tags,
    Comments,
    Analytics,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Pipelines,
        EntityKind::Columns,
        EntityKind::Leads,
        EntityKind::Contacts,
        EntityKind::Tags,
        EntityKind::Comments,
        EntityKind::Analytics,
    ];

    pub fn as_segment(&self) -> &'static str {
        match self {
            EntityKind::Pipelines => "pipelines",
            EntityKind::Columns => "columns",
            EntityKind::Leads => "leads",
            EntityKind::Contacts => "contacts",
            EntityKind::Tags => "tags",
            EntityKind::Comments => "comments",
            EntityKind::Analytics => "analytics",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_segment() == segment)
    }
}

/// A cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    segments: Vec<String>,
}

impl QueryKey {
    /// Build a key from raw segments. Keys of other domains are allowed; the
    /// cache stores them but the coordinator never targets them.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Extend this key by one segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `prefix` addresses this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    pub fn is_in_domain(&self) -> bool {
        self.segments.first().map(String::as_str) == Some(DOMAIN_ROOT)
    }

    /// Entity segment, for keys of this domain.
    pub fn entity(&self) -> Option<EntityKind> {
        if !self.is_in_domain() {
            return None;
        }
        self.segments.get(1).and_then(|s| EntityKind::from_segment(s))
    }

    /// Relationship qualifier (third segment), if any.
    pub fn qualifier(&self) -> Option<&str> {
        self.segments.get(2).map(String::as_str)
    }

    /// True for the detail entry of a single lead.
    pub fn is_lead_detail(&self) -> bool {
        self.entity() == Some(EntityKind::Leads) && self.qualifier() == Some(DETAIL)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

// ============================================================================
// KEY FACTORY
// ============================================================================

/// Whole domain.
pub fn all() -> QueryKey {
    QueryKey::new([DOMAIN_ROOT])
}

fn entity(kind: EntityKind) -> QueryKey {
    all().child(kind.as_segment())
}

pub fn pipelines() -> QueryKey {
    entity(EntityKind::Pipelines)
}

pub fn pipeline(id: &PipelineId) -> QueryKey {
    pipelines().child(DETAIL).child(id.as_str())
}

pub fn columns() -> QueryKey {
    entity(EntityKind::Columns)
}

pub fn pipeline_columns(id: &PipelineId) -> QueryKey {
    columns().child(BY_PIPELINE).child(id.as_str())
}

pub fn leads() -> QueryKey {
    entity(EntityKind::Leads)
}

/// Prefix of every general leads list, filtered or not.
pub fn leads_list() -> QueryKey {
    leads().child(LIST)
}

/// General leads list narrowed by a filter, e.g. `status:open`.
pub fn leads_list_filtered(filter: &str) -> QueryKey {
    leads_list().child(filter)
}

pub fn lead(id: &LeadId) -> QueryKey {
    leads().child(DETAIL).child(id.as_str())
}

pub fn leads_by_column(id: &ColumnId) -> QueryKey {
    leads().child(BY_COLUMN).child(id.as_str())
}

pub fn leads_by_pipeline(id: &PipelineId) -> QueryKey {
    leads().child(BY_PIPELINE).child(id.as_str())
}

pub fn contacts() -> QueryKey {
    entity(EntityKind::Contacts)
}

pub fn lead_contacts(id: &LeadId) -> QueryKey {
    contacts().child(BY_LEAD).child(id.as_str())
}

pub fn pending_contacts() -> QueryKey {
    contacts().child(PENDING)
}

pub fn tags() -> QueryKey {
    entity(EntityKind::Tags)
}

pub fn lead_tags(id: &LeadId) -> QueryKey {
    tags().child(BY_LEAD).child(id.as_str())
}

pub fn comments() -> QueryKey {
    entity(EntityKind::Comments)
}

pub fn lead_comments(id: &LeadId) -> QueryKey {
    comments().child(BY_LEAD).child(id.as_str())
}

pub fn analytics() -> QueryKey {
    entity(EntityKind::Analytics)
}

pub fn pipeline_stats(id: &PipelineId) -> QueryKey {
    analytics().child(PIPELINE).child(id.as_str())
}

// ============================================================================
// KEY PARSING
// ============================================================================

/// A domain key resolved to the query it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRoute {
    Pipelines,
    Pipeline(PipelineId),
    PipelineColumns(PipelineId),
    LeadsList { filter: Option<String> },
    Lead(LeadId),
    LeadsByColumn(ColumnId),
    LeadsByPipeline(PipelineId),
    LeadContacts(LeadId),
    PendingContacts,
    Tags,
    LeadTags(LeadId),
    LeadComments(LeadId),
    PipelineStats(PipelineId),
}

impl KeyRoute {
    /// Resolve a concrete key. Prefix-only keys (`crm/leads`) have no route.
    pub fn resolve(key: &QueryKey) -> Option<Self> {
        let entity = key.entity()?;
        let rest: Vec<&str> = key.segments()[2..].iter().map(String::as_str).collect();

        let route = match (entity, rest.as_slice()) {
            (EntityKind::Pipelines, []) => KeyRoute::Pipelines,
            (EntityKind::Pipelines, [DETAIL, id]) => KeyRoute::Pipeline(PipelineId::new(*id)),
            (EntityKind::Columns, [BY_PIPELINE, id]) => {
                KeyRoute::PipelineColumns(PipelineId::new(*id))
            }
            (EntityKind::Leads, [LIST]) => KeyRoute::LeadsList { filter: None },
            (EntityKind::Leads, [LIST, filter]) => KeyRoute::LeadsList {
                filter: Some(filter.to_string()),
            },
            (EntityKind::Leads, [DETAIL, id]) => KeyRoute::Lead(LeadId::new(*id)),
            (EntityKind::Leads, [BY_COLUMN, id]) => KeyRoute::LeadsByColumn(ColumnId::new(*id)),
            (EntityKind::Leads, [BY_PIPELINE, id]) => {
                KeyRoute::LeadsByPipeline(PipelineId::new(*id))
            }
            (EntityKind::Contacts, [BY_LEAD, id]) => KeyRoute::LeadContacts(LeadId::new(*id)),
            (EntityKind::Contacts, [PENDING]) => KeyRoute::PendingContacts,
            (EntityKind::Tags, []) => KeyRoute::Tags,
            (EntityKind::Tags, [BY_LEAD, id]) => KeyRoute::LeadTags(LeadId::new(*id)),
            (EntityKind::Comments, [BY_LEAD, id]) => KeyRoute::LeadComments(LeadId::new(*id)),
            (EntityKind::Analytics, [PIPELINE, id]) => {
                KeyRoute::PipelineStats(PipelineId::new(*id))
            }
            _ => return None,
        };
        Some(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = leads_by_column(&ColumnId::new("novo"));
        assert_eq!(key.to_string(), "crm/leads/by_column/novo");
    }

    #[test]
    fn test_prefix_matching() {
        let detail = lead(&LeadId::new("L1"));
        assert!(detail.starts_with(&all()));
        assert!(detail.starts_with(&leads()));
        assert!(!detail.starts_with(&leads_list()));
        assert!(leads_list_filtered("status:open").starts_with(&leads_list()));
        assert!(!leads().starts_with(&detail));
    }

    #[test]
    fn test_entity_and_qualifier() {
        let key = lead_tags(&LeadId::new("L1"));
        assert_eq!(key.entity(), Some(EntityKind::Tags));
        assert_eq!(key.qualifier(), Some("by_lead"));
        assert!(lead(&LeadId::new("L1")).is_lead_detail());
        assert!(!leads_list().is_lead_detail());
    }

    #[test]
    fn test_foreign_domain_has_no_entity() {
        let key = QueryKey::new(["mentoring", "leads"]);
        assert!(!key.is_in_domain());
        assert_eq!(key.entity(), None);
    }

    #[test]
    fn test_sibling_ids_do_not_collide() {
        // "L1" must not address "L10"
        let l1 = lead(&LeadId::new("L1"));
        let l10 = lead(&LeadId::new("L10"));
        assert!(!l10.starts_with(&l1));
    }

    #[test]
    fn test_resolve_routes() {
        let p = PipelineId::new("P1");
        assert_eq!(KeyRoute::resolve(&pipelines()), Some(KeyRoute::Pipelines));
        assert_eq!(
            KeyRoute::resolve(&pipeline_stats(&p)),
            Some(KeyRoute::PipelineStats(p.clone()))
        );
        assert_eq!(
            KeyRoute::resolve(&leads_list_filtered("status:won")),
            Some(KeyRoute::LeadsList {
                filter: Some("status:won".to_string())
            })
        );
        assert_eq!(KeyRoute::resolve(&leads()), None);
        assert_eq!(KeyRoute::resolve(&all()), None);
    }
}
