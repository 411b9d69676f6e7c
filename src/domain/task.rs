use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationMode {
    Collaborative,
    Sequential,
    Hierarchical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub assigned_agent_id: Option<String>,
    pub assigned_agent_ids: HashSet<String>,
    pub coordination_mode: Option<CoordinationMode>,
}

impl Default for TaskAssignment {
    fn default() -> Self {
        Self {
            assigned_agent_id: None,
            assigned_agent_ids: HashSet::new(),
            coordination_mode: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub progress: u8,
    pub assignment: TaskAssignment,
    /// Ordered set of task ids in the same channel this task depends on.
    pub depends_on: Vec<String>,
    /// Derived mirror of `depends_on`'s unmet members; recomputed by the
    /// DAG engine, not hand-maintained by the caller.
    pub blocked_by: Vec<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub estimated_duration_ms: Option<u64>,
    pub actual_duration_ms: Option<u64>,
    pub result: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            title: title.into(),
            description: description.into(),
            priority,
            status: TaskStatus::Pending,
            progress: 0,
            assignment: TaskAssignment::default(),
            depends_on: Vec::new(),
            blocked_by: Vec::new(),
            due_at: None,
            estimated_duration_ms: None,
            actual_duration_ms: None,
            result: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_depends_on(mut self, deps: Vec<String>) -> Self {
        self.depends_on = deps;
        self
    }
}
