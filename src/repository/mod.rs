//! The repository port (spec §4.1): a persistence-agnostic capability
//! set the core consumes. The backing store is an external collaborator;
//! this module only defines the trait surface plus one in-memory adapter
//! used as the fixture backend for tests.

pub mod filter;
pub mod memory;
pub mod pagination;

pub use filter::Filter;
pub use pagination::{Page, Pagination};

use crate::error::{MxfError, MxfResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Merge a JSON partial into a serialized record, shallow at the top
/// level, matching `update(id, partial)`'s "patch" semantics in spec §4.1.
pub fn apply_partial<T: Serialize + DeserializeOwned>(
    record: &T,
    partial: Value,
) -> MxfResult<T> {
    let mut base = serde_json::to_value(record)
        .map_err(|e| MxfError::StorageFailure(e.to_string()))?;
    if let (Some(base_obj), Some(partial_obj)) = (base.as_object_mut(), partial.as_object()) {
        for (k, v) in partial_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(base).map_err(|e| MxfError::InvalidRequest(e.to_string()))
}

#[async_trait]
pub trait Repository<T: Send + Sync>: Send + Sync {
    async fn find_by_id(&self, id: &str) -> MxfResult<Option<T>>;
    async fn find_one(&self, filter: &Filter) -> MxfResult<Option<T>>;
    async fn find_many(&self, filter: &Filter, pagination: &Pagination) -> MxfResult<Page<T>>;
    async fn create(&self, item: T) -> MxfResult<T>;
    async fn update(&self, id: &str, partial: Value) -> MxfResult<T>;
    async fn delete(&self, id: &str) -> MxfResult<()>;
    async fn count(&self, filter: &Filter) -> MxfResult<usize>;
    async fn exists(&self, filter: &Filter) -> MxfResult<bool> {
        Ok(self.count(filter).await? > 0)
    }
}

/// Per-status task counts for one channel, plus the average progress
/// across its tasks (spec §4.1's `getChannelStatistics`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelTaskStatistics {
    pub total: usize,
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub avg_progress: f64,
}

/// Per-status task counts for one agent's assignments (spec §4.1's
/// `getAgentStatistics`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentTaskStatistics {
    pub total_assigned: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub avg_progress: f64,
}

#[async_trait]
pub trait TaskRepository: Repository<crate::domain::Task> {
    async fn find_by_channel(&self, channel_id: &str) -> MxfResult<Vec<crate::domain::Task>>;
    async fn find_by_assignee(&self, agent_id: &str) -> MxfResult<Vec<crate::domain::Task>>;
    async fn find_by_status(
        &self,
        channel_id: &str,
        status: crate::domain::TaskStatus,
    ) -> MxfResult<Vec<crate::domain::Task>>;
    async fn find_overdue(&self, channel_id: &str) -> MxfResult<Vec<crate::domain::Task>>;
    async fn assign_to(&self, id: &str, agent_id: &str) -> MxfResult<crate::domain::Task>;
    async fn unassign(&self, id: &str) -> MxfResult<crate::domain::Task>;
    async fn update_status(
        &self,
        id: &str,
        status: crate::domain::TaskStatus,
    ) -> MxfResult<crate::domain::Task>;
    async fn update_progress(&self, id: &str, progress: u8) -> MxfResult<crate::domain::Task>;
    async fn search(&self, channel_id: &str, query: &str) -> MxfResult<Vec<crate::domain::Task>>;
    async fn get_channel_statistics(&self, channel_id: &str) -> MxfResult<ChannelTaskStatistics>;
    async fn get_agent_statistics(&self, agent_id: &str) -> MxfResult<AgentTaskStatistics>;
}

#[async_trait]
pub trait ChannelRepository: Repository<crate::domain::Channel> {
    async fn add_participant(&self, channel_id: &str, agent_id: &str)
        -> MxfResult<crate::domain::Channel>;
    async fn remove_participant(
        &self,
        channel_id: &str,
        agent_id: &str,
    ) -> MxfResult<crate::domain::Channel>;
    async fn is_participant(&self, channel_id: &str, agent_id: &str) -> MxfResult<bool>;
    async fn search_by_name(&self, query: &str) -> MxfResult<Vec<crate::domain::Channel>>;
    async fn update_last_active(&self, channel_id: &str) -> MxfResult<crate::domain::Channel>;
}

#[async_trait]
pub trait AgentRepository: Repository<crate::domain::Agent> {
    async fn find_by_key_id(&self, key_id: &str) -> MxfResult<Option<crate::domain::Agent>>;
    async fn find_by_service_types(
        &self,
        types: &[String],
        match_all: bool,
    ) -> MxfResult<Vec<crate::domain::Agent>>;
    async fn find_stale_agents(&self, threshold_ms: i64) -> MxfResult<Vec<crate::domain::Agent>>;
    async fn bulk_update_status(
        &self,
        ids: &[String],
        status: crate::domain::AgentStatus,
    ) -> MxfResult<()>;
}
