use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Project,
    System,
    Technology,
    Concept,
    Location,
    Document,
    Task,
    Goal,
    Resource,
    Custom,
}

/// Q-value and retrieval/outcome bookkeeping carried by every entity and
/// memory record (spec §4.6, the MULS subsystem).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utility {
    pub q_value: f64,
    pub retrieval_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub last_q_value_update_at: Option<DateTime<Utc>>,
}

impl Default for Utility {
    fn default() -> Self {
        Self {
            q_value: 0.5,
            retrieval_count: 0,
            success_count: 0,
            failure_count: 0,
            last_accessed_at: None,
            last_q_value_update_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub channel_id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub aliases: HashSet<String>,
    pub description: String,
    pub properties: serde_json::Value,
    pub utility: Utility,
    pub confidence: f64,
    pub source: Option<String>,
    pub source_memory_ids: HashSet<String>,
    pub merged: bool,
    pub merged_into: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        entity_type: EntityType,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            entity_type,
            name: name.into(),
            aliases: HashSet::new(),
            description: String::new(),
            properties: serde_json::json!({}),
            utility: Utility::default(),
            confidence: 1.0,
            source: None,
            source_memory_ids: HashSet::new(),
            merged: false,
            merged_into: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive match against name or any alias.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        let k = keyword.to_lowercase();
        self.name.to_lowercase().contains(&k)
            || self.aliases.iter().any(|a| a.to_lowercase().contains(&k))
    }
}
