use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitivePhase {
    Observation,
    Reasoning,
    Plan,
    Reflection,
}

/// An append-only record of one ORPAR phase's output (spec §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub id: String,
    pub agent_id: String,
    pub channel_id: String,
    pub phase: CognitivePhase,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PhaseEntry {
    pub fn new(
        id: impl Into<String>,
        agent_id: impl Into<String>,
        channel_id: impl Into<String>,
        phase: CognitivePhase,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            channel_id: channel_id.into(),
            phase,
            content,
            created_at: Utc::now(),
        }
    }
}
