//! In-memory reference adapter for the repository port. This is the
//! fixture backend used by every test in this crate; a production
//! backend is an external collaborator (spec §4.1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    apply_partial, AgentTaskStatistics, ChannelTaskStatistics, Filter, Page, Pagination, Repository,
};
use crate::domain::{
    Agent, AgentRepository, AgentStatus, Channel, ChannelRepository, Entity, Relationship, Task,
    TaskAssignment, TaskRepository, TaskStatus,
};
use crate::error::{MxfError, MxfResult};
use crate::repository::pagination::SortOrder;

pub trait Record: Clone + Send + Sync + serde::Serialize {
    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for Channel {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for Agent {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for Entity {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Record for Relationship {
    fn id(&self) -> &str {
        &self.id
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A generic, single table, in-memory collection guarded by one
/// reader/writer lock (§5: "repositories are expected to provide their
/// own concurrency discipline").
pub struct InMemoryStore<T> {
    rows: RwLock<HashMap<String, T>>,
}

impl<T: Record> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Record> InMemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn sort_key(value: &Value, field: &str) -> Option<f64> {
        value.get(field).and_then(|v| {
            if let Some(n) = v.as_f64() {
                Some(n)
            } else {
                v.as_str().map(|s| s.len() as f64)
            }
        })
    }

    pub async fn filtered(&self, filter: &Filter) -> MxfResult<Vec<T>> {
        let rows = self.rows.read().await;
        let mut out = Vec::new();
        for item in rows.values() {
            let value = serde_json::to_value(item).map_err(|e| MxfError::StorageFailure(e.to_string()))?;
            if filter.is_empty() || super::filter::matches(filter, &value) {
                out.push(item.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl<T: Record + serde::de::DeserializeOwned> Repository<T> for InMemoryStore<T> {
    async fn find_by_id(&self, id: &str) -> MxfResult<Option<T>> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_one(&self, filter: &Filter) -> MxfResult<Option<T>> {
        Ok(self.filtered(filter).await?.into_iter().next())
    }

    async fn find_many(&self, filter: &Filter, pagination: &Pagination) -> MxfResult<Page<T>> {
        let mut items = self.filtered(filter).await?;

        let sort_field = pagination.sort_by.clone();
        let order = pagination.sort_order.unwrap_or(SortOrder::Desc);
        items.sort_by(|a, b| {
            let (va, vb) = (
                serde_json::to_value(a).unwrap_or(Value::Null),
                serde_json::to_value(b).unwrap_or(Value::Null),
            );
            let cmp = if let Some(field) = &sort_field {
                Self::sort_key(&va, field)
                    .partial_cmp(&Self::sort_key(&vb, field))
                    .unwrap_or(std::cmp::Ordering::Equal)
            } else {
                a.created_at().cmp(&b.created_at())
            };
            match order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            }
        });

        let total = items.len();
        let offset = pagination.offset.unwrap_or(0);
        let limit = pagination.limit.unwrap_or(total);
        let page_items: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
        Ok(Page::new(page_items, total, pagination))
    }

    async fn create(&self, item: T) -> MxfResult<T> {
        let mut rows = self.rows.write().await;
        rows.insert(item.id().to_string(), item.clone());
        Ok(item)
    }

    async fn update(&self, id: &str, partial: Value) -> MxfResult<T> {
        let mut rows = self.rows.write().await;
        let current = rows
            .get(id)
            .cloned()
            .ok_or_else(|| MxfError::NotFound(id.to_string()))?;
        let updated = apply_partial(&current, partial)?;
        rows.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> MxfResult<()> {
        self.rows.write().await.remove(id);
        Ok(())
    }

    async fn count(&self, filter: &Filter) -> MxfResult<usize> {
        Ok(self.filtered(filter).await?.len())
    }
}

/// Task-specialized in-memory store (spec §4.1's `TaskRepository`).
pub struct InMemoryTaskRepository {
    inner: InMemoryStore<Task>,
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self {
            inner: InMemoryStore::new(),
        }
    }
}

#[async_trait]
impl Repository<Task> for InMemoryTaskRepository {
    async fn find_by_id(&self, id: &str) -> MxfResult<Option<Task>> {
        self.inner.find_by_id(id).await
    }
    async fn find_one(&self, filter: &Filter) -> MxfResult<Option<Task>> {
        self.inner.find_one(filter).await
    }
    async fn find_many(&self, filter: &Filter, pagination: &Pagination) -> MxfResult<Page<Task>> {
        self.inner.find_many(filter, pagination).await
    }
    async fn create(&self, item: Task) -> MxfResult<Task> {
        self.inner.create(item).await
    }
    async fn update(&self, id: &str, partial: Value) -> MxfResult<Task> {
        self.inner.update(id, partial).await
    }
    async fn delete(&self, id: &str) -> MxfResult<()> {
        self.inner.delete(id).await
    }
    async fn count(&self, filter: &Filter) -> MxfResult<usize> {
        self.inner.count(filter).await
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn find_by_channel(&self, channel_id: &str) -> MxfResult<Vec<Task>> {
        self.inner
            .filtered(&Filter::eq("channel_id", channel_id.to_string()))
            .await
    }

    async fn find_by_assignee(&self, agent_id: &str) -> MxfResult<Vec<Task>> {
        let all = self.inner.filtered(&Filter::default()).await?;
        Ok(all
            .into_iter()
            .filter(|t| t.assignment.assigned_agent_id.as_deref() == Some(agent_id))
            .collect())
    }

    async fn find_by_status(&self, channel_id: &str, status: TaskStatus) -> MxfResult<Vec<Task>> {
        let by_channel = self.find_by_channel(channel_id).await?;
        Ok(by_channel.into_iter().filter(|t| t.status == status).collect())
    }

    async fn find_overdue(&self, channel_id: &str) -> MxfResult<Vec<Task>> {
        let now = Utc::now();
        let by_channel = self.find_by_channel(channel_id).await?;
        Ok(by_channel
            .into_iter()
            .filter(|t| !t.status.is_terminal() && t.due_at.map_or(false, |d| d < now))
            .collect())
    }

    async fn assign_to(&self, id: &str, agent_id: &str) -> MxfResult<Task> {
        let mut task = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| MxfError::NotFound(id.to_string()))?;
        task.assignment.assigned_agent_id = Some(agent_id.to_string());
        task.assignment.assigned_agent_ids.insert(agent_id.to_string());
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Assigned;
        }
        task.updated_at = Utc::now();
        self.inner.create(task).await
    }

    async fn unassign(&self, id: &str) -> MxfResult<Task> {
        let mut task = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| MxfError::NotFound(id.to_string()))?;
        task.assignment = TaskAssignment::default();
        task.updated_at = Utc::now();
        self.inner.create(task).await
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> MxfResult<Task> {
        let mut task = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| MxfError::NotFound(id.to_string()))?;
        task.status = status;
        if status == TaskStatus::Completed {
            task.progress = 100;
        }
        task.updated_at = Utc::now();
        self.inner.create(task).await
    }

    async fn update_progress(&self, id: &str, progress: u8) -> MxfResult<Task> {
        let mut task = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| MxfError::NotFound(id.to_string()))?;
        task.progress = progress.min(100);
        task.updated_at = Utc::now();
        self.inner.create(task).await
    }

    async fn search(&self, channel_id: &str, query: &str) -> MxfResult<Vec<Task>> {
        let by_channel = self.find_by_channel(channel_id).await?;
        let q = query.to_lowercase();
        Ok(by_channel
            .into_iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&q) || t.description.to_lowercase().contains(&q)
            })
            .collect())
    }

    async fn get_channel_statistics(&self, channel_id: &str) -> MxfResult<ChannelTaskStatistics> {
        let tasks = self.find_by_channel(channel_id).await?;
        let mut stats = ChannelTaskStatistics {
            total: tasks.len(),
            ..Default::default()
        };
        let mut progress_sum = 0u64;
        for task in &tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Assigned => stats.assigned += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
            progress_sum += task.progress as u64;
        }
        if !tasks.is_empty() {
            stats.avg_progress = progress_sum as f64 / tasks.len() as f64;
        }
        Ok(stats)
    }

    async fn get_agent_statistics(&self, agent_id: &str) -> MxfResult<AgentTaskStatistics> {
        let tasks = self.find_by_assignee(agent_id).await?;
        let mut stats = AgentTaskStatistics {
            total_assigned: tasks.len(),
            ..Default::default()
        };
        let mut progress_sum = 0u64;
        for task in &tasks {
            match task.status {
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                _ => {}
            }
            progress_sum += task.progress as u64;
        }
        if !tasks.is_empty() {
            stats.avg_progress = progress_sum as f64 / tasks.len() as f64;
        }
        Ok(stats)
    }
}

/// Channel-specialized in-memory store.
pub struct InMemoryChannelRepository {
    inner: InMemoryStore<Channel>,
}

impl Default for InMemoryChannelRepository {
    fn default() -> Self {
        Self {
            inner: InMemoryStore::new(),
        }
    }
}

#[async_trait]
impl Repository<Channel> for InMemoryChannelRepository {
    async fn find_by_id(&self, id: &str) -> MxfResult<Option<Channel>> {
        self.inner.find_by_id(id).await
    }
    async fn find_one(&self, filter: &Filter) -> MxfResult<Option<Channel>> {
        self.inner.find_one(filter).await
    }
    async fn find_many(
        &self,
        filter: &Filter,
        pagination: &Pagination,
    ) -> MxfResult<Page<Channel>> {
        self.inner.find_many(filter, pagination).await
    }
    async fn create(&self, item: Channel) -> MxfResult<Channel> {
        self.inner.create(item).await
    }
    async fn update(&self, id: &str, partial: Value) -> MxfResult<Channel> {
        self.inner.update(id, partial).await
    }
    async fn delete(&self, id: &str) -> MxfResult<()> {
        self.inner.delete(id).await
    }
    async fn count(&self, filter: &Filter) -> MxfResult<usize> {
        self.inner.count(filter).await
    }
}

#[async_trait]
impl ChannelRepository for InMemoryChannelRepository {
    async fn add_participant(&self, channel_id: &str, agent_id: &str) -> MxfResult<Channel> {
        let mut channel = self
            .find_by_id(channel_id)
            .await?
            .ok_or_else(|| MxfError::NotFound(channel_id.to_string()))?;
        channel.add_participant(agent_id);
        self.inner.create(channel).await
    }

    async fn remove_participant(&self, channel_id: &str, agent_id: &str) -> MxfResult<Channel> {
        let mut channel = self
            .find_by_id(channel_id)
            .await?
            .ok_or_else(|| MxfError::NotFound(channel_id.to_string()))?;
        channel.remove_participant(agent_id);
        self.inner.create(channel).await
    }

    async fn is_participant(&self, channel_id: &str, agent_id: &str) -> MxfResult<bool> {
        Ok(self
            .find_by_id(channel_id)
            .await?
            .map_or(false, |c| c.is_participant(agent_id)))
    }

    async fn search_by_name(&self, query: &str) -> MxfResult<Vec<Channel>> {
        let all = self.inner.filtered(&Filter::default()).await?;
        let q = query.to_lowercase();
        Ok(all
            .into_iter()
            .filter(|c| c.name.to_lowercase().contains(&q))
            .collect())
    }

    async fn update_last_active(&self, channel_id: &str) -> MxfResult<Channel> {
        let mut channel = self
            .find_by_id(channel_id)
            .await?
            .ok_or_else(|| MxfError::NotFound(channel_id.to_string()))?;
        channel.updated_at = Utc::now();
        self.inner.create(channel).await
    }
}

/// Agent-specialized in-memory store.
pub struct InMemoryAgentRepository {
    inner: InMemoryStore<Agent>,
}

impl Default for InMemoryAgentRepository {
    fn default() -> Self {
        Self {
            inner: InMemoryStore::new(),
        }
    }
}

#[async_trait]
impl Repository<Agent> for InMemoryAgentRepository {
    async fn find_by_id(&self, id: &str) -> MxfResult<Option<Agent>> {
        self.inner.find_by_id(id).await
    }
    async fn find_one(&self, filter: &Filter) -> MxfResult<Option<Agent>> {
        self.inner.find_one(filter).await
    }
    async fn find_many(&self, filter: &Filter, pagination: &Pagination) -> MxfResult<Page<Agent>> {
        self.inner.find_many(filter, pagination).await
    }
    async fn create(&self, item: Agent) -> MxfResult<Agent> {
        self.inner.create(item).await
    }
    async fn update(&self, id: &str, partial: Value) -> MxfResult<Agent> {
        self.inner.update(id, partial).await
    }
    async fn delete(&self, id: &str) -> MxfResult<()> {
        self.inner.delete(id).await
    }
    async fn count(&self, filter: &Filter) -> MxfResult<usize> {
        self.inner.count(filter).await
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn find_by_key_id(&self, key_id: &str) -> MxfResult<Option<Agent>> {
        self.find_by_id(key_id).await
    }

    async fn find_by_service_types(
        &self,
        types: &[String],
        match_all: bool,
    ) -> MxfResult<Vec<Agent>> {
        let all = self.inner.filtered(&Filter::default()).await?;
        Ok(all
            .into_iter()
            .filter(|a| {
                if match_all {
                    types.iter().all(|t| a.service_types.contains(t))
                } else {
                    types.iter().any(|t| a.service_types.contains(t))
                }
            })
            .collect())
    }

    async fn find_stale_agents(&self, threshold_ms: i64) -> MxfResult<Vec<Agent>> {
        let all = self.inner.filtered(&Filter::default()).await?;
        let threshold = chrono::Duration::milliseconds(threshold_ms);
        Ok(all.into_iter().filter(|a| a.is_stale(threshold)).collect())
    }

    async fn bulk_update_status(&self, ids: &[String], status: AgentStatus) -> MxfResult<()> {
        for id in ids {
            if let Some(mut agent) = self.find_by_id(id).await? {
                agent.status = status;
                self.inner.create(agent).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;

    #[tokio::test]
    async fn channel_statistics_break_down_by_status() {
        let repo = InMemoryTaskRepository::default();
        let mut t1 = Task::new("t1", "c1", "a", "d", Priority::Medium);
        t1.progress = 40;
        let mut t2 = Task::new("t2", "c1", "b", "d", Priority::Medium);
        t2.status = TaskStatus::Completed;
        t2.progress = 100;
        repo.create(t1).await.unwrap();
        repo.create(t2).await.unwrap();

        let stats = repo.get_channel_statistics("c1").await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.avg_progress, 70.0);
    }

    #[tokio::test]
    async fn agent_statistics_only_count_assigned_tasks() {
        let repo = InMemoryTaskRepository::default();
        let t1 = Task::new("t1", "c1", "a", "d", Priority::Medium);
        let mut t2 = Task::new("t2", "c1", "b", "d", Priority::Medium);
        t2.assignment.assigned_agent_id = Some("agent-1".to_string());
        t2.status = TaskStatus::InProgress;
        t2.progress = 50;
        repo.create(t1).await.unwrap();
        repo.create(t2).await.unwrap();

        let stats = repo.get_agent_statistics("agent-1").await.unwrap();
        assert_eq!(stats.total_assigned, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.avg_progress, 50.0);
    }
}
