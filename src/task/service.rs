use std::sync::Arc;

use tracing::{info, warn};

use crate::dag::DagEngine;
use crate::domain::{Task, TaskStatus};
use crate::error::{MxfError, MxfResult};
use crate::repository::TaskRepository;

/// Allowed status transitions (spec §4.2). Terminal states have no
/// outgoing edges.
fn is_allowed_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    match (from, to) {
        (Pending, Assigned) => true,
        (Assigned, InProgress) => true,
        (InProgress, Completed) | (InProgress, Failed) | (InProgress, Cancelled) => true,
        (Pending, Cancelled) | (Assigned, Cancelled) => true,
        (Completed, _) | (Failed, _) | (Cancelled, _) => false,
        _ => false,
    }
}

pub struct TaskService {
    repo: Arc<dyn TaskRepository>,
    dag: Arc<DagEngine>,
}

impl TaskService {
    pub fn new(repo: Arc<dyn TaskRepository>, dag: Arc<DagEngine>) -> Self {
        Self { repo, dag }
    }

    /// Validates every `dependsOn` edge (same channel, no cycle) before
    /// persisting, then notifies the DAG engine.
    pub async fn create(&self, task: Task) -> MxfResult<Task> {
        let siblings = self.repo.find_by_channel(&task.channel_id).await?;

        for dep_id in &task.depends_on {
            let dep = siblings
                .iter()
                .find(|t| &t.id == dep_id)
                .ok_or_else(|| {
                    MxfError::InvalidDependency(format!(
                        "dependency {dep_id} not found in channel {}",
                        task.channel_id
                    ))
                })?;

            let dag = self.dag.build_dag_from_tasks(&task.channel_id, &siblings).await?;
            self.dag
                .validate_dependency(&dag, &task.id, &dep.id)
                .map_err(|_| {
                    MxfError::CyclicDependency(format!(
                        "task {} cannot depend on {dep_id}: would introduce a cycle",
                        task.id
                    ))
                })?;
        }

        let created = self.repo.create(task).await?;
        self.dag.on_task_created(&created.channel_id).await;
        info!(task_id = %created.id, channel_id = %created.channel_id, "task created");
        Ok(created)
    }

    pub async fn update_status(&self, id: &str, new_status: TaskStatus) -> MxfResult<Task> {
        let current = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| MxfError::NotFound(id.to_string()))?;

        if current.status == new_status {
            return Ok(current);
        }

        if !is_allowed_transition(current.status, new_status) {
            return Err(MxfError::InvalidTransition(format!(
                "cannot transition task {id} from {:?} to {:?}",
                current.status, new_status
            )));
        }

        let updated = self.repo.update_status(id, new_status).await?;
        self.dag
            .on_task_status_changed(&updated.channel_id, id, new_status)
            .await;
        Ok(updated)
    }

    /// Idempotent for the same agent; transitions pending -> assigned.
    pub async fn assign(&self, id: &str, agent_id: &str) -> MxfResult<Task> {
        let current = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| MxfError::NotFound(id.to_string()))?;

        if current.assignment.assigned_agent_id.as_deref() == Some(agent_id) {
            return Ok(current);
        }

        self.repo.assign_to(id, agent_id).await
    }

    pub async fn update_progress(&self, id: &str, progress: u8) -> MxfResult<Task> {
        self.repo.update_progress(id, progress.min(100)).await
    }

    pub async fn delete(&self, id: &str) -> MxfResult<()> {
        let task = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| MxfError::NotFound(id.to_string()))?;

        self.repo.delete(id).await?;
        self.dag.on_task_deleted(&task.channel_id).await;
        warn!(task_id = %id, "task deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use crate::repository::memory::InMemoryTaskRepository;

    fn service() -> TaskService {
        TaskService::new(
            Arc::new(InMemoryTaskRepository::default()),
            Arc::new(DagEngine::new()),
        )
    }

    #[tokio::test]
    async fn valid_transitions_follow_the_table() {
        let svc = service();
        let task = Task::new("t1", "c1", "Title", "desc", Priority::Medium);
        svc.create(task).await.unwrap();

        svc.assign("t1", "agent-1").await.unwrap();
        let updated = svc.update_status("t1", TaskStatus::InProgress).await.unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);

        let completed = svc.update_status("t1", TaskStatus::Completed).await.unwrap();
        assert_eq!(completed.status, TaskStatus::Completed);
        assert_eq!(completed.progress, 100);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let svc = service();
        let task = Task::new("t1", "c1", "Title", "desc", Priority::Medium);
        svc.create(task).await.unwrap();
        svc.update_status("t1", TaskStatus::Completed).await.unwrap();

        let result = svc.update_status("t1", TaskStatus::InProgress).await;
        assert!(matches!(result, Err(MxfError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn dependency_on_missing_task_is_rejected() {
        let svc = service();
        let task = Task::new("t1", "c1", "Title", "desc", Priority::Medium)
            .with_depends_on(vec!["ghost".to_string()]);
        let result = svc.create(task).await;
        assert!(matches!(result, Err(MxfError::InvalidDependency(_))));
    }
}
