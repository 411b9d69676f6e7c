use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::entity::Utility;

/// Tag used by the context assembler (spec §4.8) to decide whether a
/// history message survives prompt assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextLayer {
    Conversation,
    ToolResult,
    Task,
    System,
    Identity,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub context_layer: Option<ContextLayer>,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            context_layer: None,
            created_at: Utc::now(),
        }
    }

    pub fn tagged(mut self, layer: ContextLayer) -> Self {
        self.context_layer = Some(layer);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMemory {
    pub agent_id: String,
    pub persistence_level: String,
    pub notes: Vec<String>,
    pub conversation_history: Vec<ConversationMessage>,
    pub custom_data: serde_json::Value,
    pub utility: Utility,
}

impl AgentMemory {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            persistence_level: "durable".to_string(),
            notes: Vec::new(),
            conversation_history: Vec::new(),
            custom_data: serde_json::json!({}),
            utility: Utility::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMemory {
    pub channel_id: String,
    pub shared_state: HashMap<String, serde_json::Value>,
    pub conversation_history: Vec<ConversationMessage>,
    pub utility: Utility,
}

impl ChannelMemory {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            shared_state: HashMap::new(),
            conversation_history: Vec::new(),
            utility: Utility::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipMemory {
    /// Sorted so `(a,b)` and `(b,a)` collapse to the same record.
    pub agent_id_1: String,
    pub agent_id_2: String,
    pub interaction_history: Vec<ConversationMessage>,
    pub utility: Utility,
}

impl RelationshipMemory {
    pub fn new(agent_a: impl Into<String>, agent_b: impl Into<String>) -> Self {
        let (a, b) = Self::sort_pair(agent_a.into(), agent_b.into());
        Self {
            agent_id_1: a,
            agent_id_2: b,
            interaction_history: Vec::new(),
            utility: Utility::default(),
        }
    }

    pub fn sort_pair(a: String, b: String) -> (String, String) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
