use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A directed edge of the knowledge graph. `surpriseScore` and `weight`
/// are caller-supplied inputs per spec §9's Open Questions; this crate
/// does not invent an update policy for either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub channel_id: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relationship_type: String,
    pub label: String,
    pub properties: serde_json::Value,
    pub confidence: f64,
    pub surprise_score: Option<f64>,
    pub weight: f64,
    pub source_memory_ids: HashSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        from_entity_id: impl Into<String>,
        to_entity_id: impl Into<String>,
        relationship_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            from_entity_id: from_entity_id.into(),
            to_entity_id: to_entity_id.into(),
            relationship_type: relationship_type.into(),
            label: String::new(),
            properties: serde_json::json!({}),
            confidence: 1.0,
            surprise_score: None,
            weight: 1.0,
            source_memory_ids: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touches(&self, entity_id: &str) -> bool {
        self.from_entity_id == entity_id || self.to_entity_id == entity_id
    }
}
