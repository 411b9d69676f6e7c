use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Admin,
    Provider,
    Consumer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Inactive,
    Error,
}

/// A principal that authors and executes work. Agents are shared by
/// every channel they participate in; their lifecycle is independent of
/// any one channel (spec §3, "Ownership & lifecycle").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub display_name: String,
    pub role: AgentRole,
    pub service_types: HashSet<String>,
    pub capabilities: HashSet<String>,
    pub status: AgentStatus,
    pub created_by: Option<String>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: AgentRole) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            service_types: HashSet::new(),
            capabilities: HashSet::new(),
            status: AgentStatus::Active,
            created_by: None,
            last_active: now,
            created_at: now,
        }
    }

    pub fn is_stale(&self, threshold: chrono::Duration) -> bool {
        Utc::now() - self.last_active > threshold
    }
}
