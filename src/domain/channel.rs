use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The scoping unit for tasks, memory, and the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub participants: HashSet<String>,
    pub privacy: bool,
    pub allowed_tools: HashSet<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            participants: HashSet::new(),
            privacy: false,
            allowed_tools: HashSet::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, agent_id: &str) -> bool {
        self.participants.contains(agent_id)
    }

    pub fn add_participant(&mut self, agent_id: impl Into<String>) {
        self.participants.insert(agent_id.into());
        self.updated_at = Utc::now();
    }

    pub fn remove_participant(&mut self, agent_id: &str) {
        self.participants.remove(agent_id);
        self.updated_at = Utc::now();
    }
}
