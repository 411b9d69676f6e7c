//! Agent, channel, and pairwise-relationship memory (spec §4.6).
//! Distinct from the knowledge graph: this is conversational and
//! scalar state, keyed by agent/channel identity rather than by entity.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::{AgentMemory, ChannelMemory, ConversationMessage, RelationshipMemory};
use crate::error::{MxfError, MxfResult};
use crate::utility::record_outcome;

#[derive(Debug, Clone, Default)]
pub struct UtilityRollup {
    pub count: usize,
    pub avg_q_value: f64,
    pub total_retrievals: u64,
    pub total_successes: u64,
    pub total_failures: u64,
}

/// The in-process memory store (spec §4.6). A production deployment
/// backs this with the same repository port as tasks and channels; the
/// in-memory form here is this crate's test fixture.
#[derive(Default)]
pub struct MemoryStore {
    agents: RwLock<HashMap<String, AgentMemory>>,
    channels: RwLock<HashMap<String, ChannelMemory>>,
    relationships: RwLock<HashMap<(String, String), RelationshipMemory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create_agent_memory(&self, agent_id: &str) -> AgentMemory {
        let mut agents = self.agents.write().await;
        agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentMemory::new(agent_id))
            .clone()
    }

    pub async fn get_or_create_channel_memory(&self, channel_id: &str) -> ChannelMemory {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel_id.to_string())
            .or_insert_with(|| ChannelMemory::new(channel_id))
            .clone()
    }

    pub async fn get_or_create_relationship_memory(
        &self,
        agent_a: &str,
        agent_b: &str,
    ) -> RelationshipMemory {
        let key = RelationshipMemory::sort_pair(agent_a.to_string(), agent_b.to_string());
        let mut relationships = self.relationships.write().await;
        relationships
            .entry(key.clone())
            .or_insert_with(|| RelationshipMemory::new(key.0, key.1))
            .clone()
    }

    pub async fn append_agent_message(
        &self,
        agent_id: &str,
        message: ConversationMessage,
        max_history: usize,
    ) -> MxfResult<AgentMemory> {
        let mut agents = self.agents.write().await;
        let memory = agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentMemory::new(agent_id));
        memory.conversation_history.push(message);
        truncate_history(&mut memory.conversation_history, max_history);
        Ok(memory.clone())
    }

    pub async fn append_channel_message(
        &self,
        channel_id: &str,
        message: ConversationMessage,
        max_history: usize,
    ) -> MxfResult<ChannelMemory> {
        let mut channels = self.channels.write().await;
        let memory = channels
            .entry(channel_id.to_string())
            .or_insert_with(|| ChannelMemory::new(channel_id));
        memory.conversation_history.push(message);
        truncate_history(&mut memory.conversation_history, max_history);
        Ok(memory.clone())
    }

    /// Returns the last `limit` messages in chronological order.
    pub async fn recent_agent_history(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Vec<ConversationMessage> {
        let agents = self.agents.read().await;
        agents
            .get(agent_id)
            .map(|m| tail(&m.conversation_history, limit))
            .unwrap_or_default()
    }

    pub async fn recent_channel_history(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Vec<ConversationMessage> {
        let channels = self.channels.read().await;
        channels
            .get(channel_id)
            .map(|m| tail(&m.conversation_history, limit))
            .unwrap_or_default()
    }

    pub async fn record_agent_outcome(&self, agent_id: &str, success: bool) -> MxfResult<()> {
        let mut agents = self.agents.write().await;
        let memory = agents
            .get_mut(agent_id)
            .ok_or_else(|| MxfError::NotFound(agent_id.to_string()))?;
        record_outcome(&mut memory.utility, success);
        Ok(())
    }

    pub async fn record_channel_outcome(&self, channel_id: &str, success: bool) -> MxfResult<()> {
        let mut channels = self.channels.write().await;
        let memory = channels
            .get_mut(channel_id)
            .ok_or_else(|| MxfError::NotFound(channel_id.to_string()))?;
        record_outcome(&mut memory.utility, success);
        Ok(())
    }

    pub async fn agent_utility_rollup(&self) -> UtilityRollup {
        let agents = self.agents.read().await;
        rollup(agents.values().map(|m| &m.utility))
    }

    pub async fn channel_utility_rollup(&self) -> UtilityRollup {
        let channels = self.channels.read().await;
        rollup(channels.values().map(|m| &m.utility))
    }
}

fn truncate_history(history: &mut Vec<ConversationMessage>, max_history: usize) {
    if history.len() > max_history {
        let overflow = history.len() - max_history;
        history.drain(0..overflow);
    }
}

fn tail(history: &[ConversationMessage], limit: usize) -> Vec<ConversationMessage> {
    let start = history.len().saturating_sub(limit);
    history[start..].to_vec()
}

fn rollup<'a>(utilities: impl Iterator<Item = &'a crate::domain::Utility>) -> UtilityRollup {
    let mut out = UtilityRollup::default();
    let mut q_sum = 0.0;
    for utility in utilities {
        out.count += 1;
        q_sum += utility.q_value;
        out.total_retrievals += utility.retrieval_count;
        out.total_successes += utility.success_count;
        out.total_failures += utility.failure_count;
    }
    if out.count > 0 {
        out.avg_q_value = q_sum / out.count as f64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageRole;

    #[tokio::test]
    async fn conversation_history_is_capped_and_chronological() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .append_agent_message(
                    "a1",
                    ConversationMessage::new(MessageRole::User, format!("msg {i}")),
                    3,
                )
                .await
                .unwrap();
        }

        let recent = store.recent_agent_history("a1", 10).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg 2");
        assert_eq!(recent[2].content, "msg 4");
    }

    #[tokio::test]
    async fn relationship_memory_is_keyed_symmetrically() {
        let store = MemoryStore::new();
        let forward = store.get_or_create_relationship_memory("a1", "a2").await;
        let backward = store.get_or_create_relationship_memory("a2", "a1").await;
        assert_eq!(forward.agent_id_1, backward.agent_id_1);
        assert_eq!(forward.agent_id_2, backward.agent_id_2);
    }

    #[tokio::test]
    async fn outcome_rollup_averages_q_values() {
        let store = MemoryStore::new();
        store.get_or_create_agent_memory("a1").await;
        store.get_or_create_agent_memory("a2").await;
        store.record_agent_outcome("a1", true).await.unwrap();
        store.record_agent_outcome("a2", false).await.unwrap();

        let rollup = store.agent_utility_rollup().await;
        assert_eq!(rollup.count, 2);
        assert_eq!(rollup.total_successes, 1);
        assert_eq!(rollup.total_failures, 1);
    }
}
