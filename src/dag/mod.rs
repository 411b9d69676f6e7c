//! Per-channel task DAG engine (spec §4.3): build/maintain the graph,
//! answer readiness/ordering/criticality queries, and keep one
//! single-writer cache per channel in sync with task mutations.

use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

use crate::domain::{Priority, Task, TaskStatus};
use crate::error::{MxfError, MxfResult};

#[derive(Debug, Clone)]
pub struct DagNode {
    pub task_id: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub estimated_duration_ms: Option<u64>,
    /// Tasks this node depends on (edges point dependency -> dependent).
    pub depends_on: Vec<String>,
}

/// A channel's task dependency graph. Edges run `u -> v` where `v`
/// depends on `u` (spec GLOSSARY).
#[derive(Debug, Clone, Default)]
pub struct Dag {
    pub nodes: HashMap<String, DagNode>,
    /// dependency -> dependents (out-edges, for readiness propagation).
    pub dependents: HashMap<String, HashSet<String>>,
}

impl Dag {
    fn insert_node(&mut self, node: DagNode) {
        for dep in &node.depends_on {
            self.dependents.entry(dep.clone()).or_default().insert(node.task_id.clone());
        }
        self.nodes.insert(node.task_id.clone(), node);
    }

    fn remove_node(&mut self, task_id: &str) {
        if let Some(node) = self.nodes.remove(task_id) {
            for dep in &node.depends_on {
                if let Some(set) = self.dependents.get_mut(dep) {
                    set.remove(task_id);
                }
            }
        }
        self.dependents.remove(task_id);
    }

    /// True iff there is a directed walk from `from` to `to` via
    /// dependency edges (`from` depends on ... depends on `to`, i.e.
    /// walking `depends_on`).
    fn has_path(&self, from: &str, to: &str) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from.to_string());
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for dep in &node.depends_on {
                    queue.push_back(dep.clone());
                }
            }
        }
        false
    }

    fn is_ready(&self, node: &DagNode) -> bool {
        node.status == TaskStatus::Pending
            && node.depends_on.iter().all(|dep| {
                self.nodes
                    .get(dep)
                    .map(|d| d.status == TaskStatus::Completed)
                    .unwrap_or(false)
            })
    }
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: DagStats,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct DagStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
    pub average_in_degree: f64,
    pub average_out_degree: f64,
    pub ready_task_count: usize,
    pub blocked_task_count: usize,
    pub completed_task_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReadyQuery {
    pub limit: Option<usize>,
    pub exclude_statuses: Vec<TaskStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionOrderQuery {
    pub include_completed: bool,
    pub include_blocked: bool,
    pub statuses: Vec<TaskStatus>,
}

/// Per-channel DAG cache. Structural mutations (create/delete) invalidate
/// the whole entry; status changes mutate the cached node in place and
/// recompute readiness for out-neighbors only (spec §4.3, §5).
pub struct DagEngine {
    cache: RwLock<HashMap<String, Dag>>,
}

impl Default for DagEngine {
    fn default() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl DagEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (or rebuild) the DAG for a channel from its full task set.
    /// Rejects with `CyclicDependency` if the resulting graph has a cycle.
    pub async fn build_dag_from_tasks(
        &self,
        channel_id: &str,
        tasks: &[Task],
    ) -> MxfResult<Dag> {
        let mut dag = Dag::default();
        for task in tasks {
            dag.insert_node(DagNode {
                task_id: task.id.clone(),
                status: task.status,
                priority: task.priority,
                created_at: task.created_at,
                estimated_duration_ms: task.estimated_duration_ms,
                depends_on: task.depends_on.clone(),
            });
        }

        if let Some(cycle_node) = find_cycle(&dag) {
            return Err(MxfError::CyclicDependency(format!(
                "cycle detected through task {cycle_node} in channel {channel_id}"
            )));
        }

        let mut cache = self.cache.write().await;
        cache.insert(channel_id.to_string(), dag.clone());
        Ok(dag)
    }

    async fn get_or_build(&self, channel_id: &str, tasks: &[Task]) -> MxfResult<Dag> {
        {
            let cache = self.cache.read().await;
            if let Some(dag) = cache.get(channel_id) {
                return Ok(dag.clone());
            }
        }
        self.build_dag_from_tasks(channel_id, tasks).await
    }

    /// `dependent` ≠ `dependency` and no existing path dependency -> ...
    /// -> dependent would be closed by adding the edge.
    pub fn validate_dependency(
        &self,
        dag: &Dag,
        dependent: &str,
        dependency: &str,
    ) -> MxfResult<()> {
        if dependent == dependency {
            return Err(MxfError::CyclicDependency(format!(
                "task {dependent} cannot depend on itself"
            )));
        }
        if dag.has_path(dependency, dependent) {
            return Err(MxfError::CyclicDependency(format!(
                "adding dependency {dependency} -> {dependent} would create a cycle"
            )));
        }
        Ok(())
    }

    pub fn validate_dag(&self, channel_id: &str, dag: &Dag) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Some(cycle_node) = find_cycle(dag) {
            errors.push(format!(
                "cycle detected through task {cycle_node} in channel {channel_id}"
            ));
        }

        for node in dag.nodes.values() {
            for dep in &node.depends_on {
                if !dag.nodes.contains_key(dep) {
                    warnings.push(format!(
                        "task {} depends on unknown task {}",
                        node.task_id, dep
                    ));
                }
            }
        }

        let stats = self.compute_stats(dag);
        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            stats,
        }
    }

    pub async fn get_ready_tasks(
        &self,
        channel_id: &str,
        tasks: &[Task],
        query: &ReadyQuery,
    ) -> MxfResult<Vec<String>> {
        let dag = self.get_or_build(channel_id, tasks).await?;
        let mut ready: Vec<&DagNode> = dag
            .nodes
            .values()
            .filter(|n| dag.is_ready(n) && !query.exclude_statuses.contains(&n.status))
            .collect();

        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.task_id.cmp(&b.task_id))
        });

        let mut ids: Vec<String> = ready.into_iter().map(|n| n.task_id.clone()).collect();
        if let Some(limit) = query.limit {
            ids.truncate(limit);
        }
        Ok(ids)
    }

    pub async fn get_blocking_tasks(
        &self,
        channel_id: &str,
        tasks: &[Task],
        task_id: &str,
    ) -> MxfResult<Vec<String>> {
        let dag = self.get_or_build(channel_id, tasks).await?;
        let node = dag
            .nodes
            .get(task_id)
            .ok_or_else(|| MxfError::NotFound(task_id.to_string()))?;
        Ok(node
            .depends_on
            .iter()
            .filter(|dep| {
                dag.nodes
                    .get(*dep)
                    .map(|d| d.status != TaskStatus::Completed)
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    /// Kahn's algorithm, ties broken by priority desc then createdAt asc.
    /// If a cycle remains, the returned list is only the orderable prefix.
    pub async fn get_execution_order(
        &self,
        channel_id: &str,
        tasks: &[Task],
        query: &ExecutionOrderQuery,
    ) -> MxfResult<(Vec<String>, Vec<String>)> {
        let dag = self.get_or_build(channel_id, tasks).await?;

        let included: HashMap<String, DagNode> = dag
            .nodes
            .iter()
            .filter(|(_, n)| {
                if !query.include_completed && n.status == TaskStatus::Completed {
                    return false;
                }
                if !query.include_blocked && n.status == TaskStatus::Cancelled {
                    return false;
                }
                if !query.statuses.is_empty() && !query.statuses.contains(&n.status) {
                    return false;
                }
                true
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut in_degree: HashMap<String, usize> = included
            .keys()
            .map(|id| {
                let degree = included[id]
                    .depends_on
                    .iter()
                    .filter(|d| included.contains_key(*d))
                    .count();
                (id.clone(), degree)
            })
            .collect();

        let mut ready: Vec<String> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut order = Vec::new();
        let mut warnings = Vec::new();

        while !ready.is_empty() {
            ready.sort_by(|a, b| {
                let na = &included[a];
                let nb = &included[b];
                nb.priority
                    .cmp(&na.priority)
                    .then(na.created_at.cmp(&nb.created_at))
                    .then(a.cmp(b))
            });
            let next = ready.remove(0);
            order.push(next.clone());

            if let Some(dependents) = dag.dependents.get(&next) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.push(dependent.clone());
                        }
                    }
                }
            }
        }

        if order.len() < included.len() {
            warnings.push(format!(
                "cycle detected; only {} of {} tasks could be ordered",
                order.len(),
                included.len()
            ));
        }

        Ok((order, warnings))
    }

    /// Groups nodes by minimum topological level; every edge goes from a
    /// lower level to a strictly higher one.
    pub async fn get_parallel_groups(
        &self,
        channel_id: &str,
        tasks: &[Task],
    ) -> MxfResult<Vec<Vec<String>>> {
        let dag = self.get_or_build(channel_id, tasks).await?;
        let levels = compute_levels(&dag);

        let mut max_level = 0usize;
        for level in levels.values() {
            max_level = max_level.max(*level);
        }

        let mut groups = vec![Vec::new(); max_level + 1];
        let mut ids: Vec<&String> = levels.keys().collect();
        ids.sort();
        for id in ids {
            groups[levels[id]].push(id.clone());
        }
        Ok(groups)
    }

    /// Longest path by node count (or by `estimatedDuration` when every
    /// node on a candidate path has one), tie-broken by priority desc
    /// then createdAt asc.
    pub async fn get_critical_path(&self, channel_id: &str, tasks: &[Task]) -> MxfResult<Vec<String>> {
        let dag = self.get_or_build(channel_id, tasks).await?;
        let levels = compute_levels(&dag);

        let topo_order = {
            let mut ids: Vec<&DagNode> = dag.nodes.values().collect();
            ids.sort_by(|a, b| {
                levels[&a.task_id]
                    .cmp(&levels[&b.task_id])
                    .then(b.priority.cmp(&a.priority))
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.task_id.cmp(&b.task_id))
            });
            ids
        };

        // longest[v] = (weight, predecessor) of the longest path ending at v.
        let mut longest: HashMap<String, (f64, Option<String>)> = HashMap::new();
        for node in &topo_order {
            let own_weight = node.estimated_duration_ms.map(|d| d as f64).unwrap_or(1.0);
            let mut best: (f64, Option<String>) = (own_weight, None);
            for dep in &node.depends_on {
                if let Some((dep_total, _)) = longest.get(dep) {
                    let candidate = dep_total + own_weight;
                    if candidate > best.0 {
                        best = (candidate, Some(dep.clone()));
                    }
                }
            }
            longest.insert(node.task_id.clone(), best);
        }

        let end = longest
            .iter()
            .max_by(|a, b| {
                a.1 .0
                    .partial_cmp(&b.1 .0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        let na = &dag.nodes[a.0];
                        let nb = &dag.nodes[b.0];
                        na.priority.cmp(&nb.priority).then(nb.created_at.cmp(&na.created_at))
                    })
            })
            .map(|(id, _)| id.clone());

        let mut path = Vec::new();
        let mut cursor = end;
        while let Some(id) = cursor {
            path.push(id.clone());
            cursor = longest.get(&id).and_then(|(_, pred)| pred.clone());
        }
        path.reverse();
        Ok(path)
    }

    pub async fn get_stats(&self, channel_id: &str, tasks: &[Task]) -> MxfResult<DagStats> {
        let dag = self.get_or_build(channel_id, tasks).await?;
        Ok(self.compute_stats(&dag))
    }

    fn compute_stats(&self, dag: &Dag) -> DagStats {
        let node_count = dag.nodes.len();
        let edge_count: usize = dag.nodes.values().map(|n| n.depends_on.len()).sum();

        let root_count = dag.nodes.values().filter(|n| n.depends_on.is_empty()).count();
        let leaf_count = dag
            .nodes
            .values()
            .filter(|n| dag.dependents.get(&n.task_id).map_or(true, |d| d.is_empty()))
            .count();

        let levels = compute_levels(dag);
        let max_depth = levels.values().copied().max().unwrap_or(0);

        let average_in_degree = if node_count == 0 {
            0.0
        } else {
            edge_count as f64 / node_count as f64
        };
        let average_out_degree = average_in_degree;

        let ready_task_count = dag.nodes.values().filter(|n| dag.is_ready(n)).count();
        let completed_task_count = dag
            .nodes
            .values()
            .filter(|n| n.status == TaskStatus::Completed)
            .count();
        let blocked_task_count = dag
            .nodes
            .values()
            .filter(|n| n.status == TaskStatus::Pending && !dag.is_ready(n))
            .count();

        DagStats {
            node_count,
            edge_count,
            root_count,
            leaf_count,
            max_depth,
            average_in_degree,
            average_out_degree,
            ready_task_count,
            blocked_task_count,
            completed_task_count,
        }
    }

    /// Structural mutation hook: invalidates the channel's cached DAG.
    pub async fn on_task_created(&self, channel_id: &str) {
        self.cache.write().await.remove(channel_id);
    }

    /// Structural mutation hook: invalidates the channel's cached DAG.
    pub async fn on_task_deleted(&self, channel_id: &str) {
        self.cache.write().await.remove(channel_id);
    }

    /// Updates the cached node in place and leaves structure untouched;
    /// readiness for out-neighbors is recomputed lazily on next query
    /// since `is_ready` reads live node status.
    pub async fn on_task_status_changed(&self, channel_id: &str, task_id: &str, status: TaskStatus) {
        let mut cache = self.cache.write().await;
        if let Some(dag) = cache.get_mut(channel_id) {
            if let Some(node) = dag.nodes.get_mut(task_id) {
                node.status = status;
            }
        }
    }
}

fn compute_levels(dag: &Dag) -> HashMap<String, usize> {
    let mut in_degree: HashMap<String, usize> = dag
        .nodes
        .keys()
        .map(|id| (id.clone(), dag.nodes[id].depends_on.len()))
        .collect();
    let mut levels: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| id.clone())
        .collect();
    for id in &queue {
        levels.insert(id.clone(), 0);
    }

    while let Some(current) = queue.pop_front() {
        let current_level = levels[&current];
        if let Some(dependents) = dag.dependents.get(&current) {
            for dependent in dependents {
                let next_level = current_level + 1;
                let entry = levels.entry(dependent.clone()).or_insert(0);
                *entry = (*entry).max(next_level);
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(dependent.clone());
                    }
                }
            }
        }
    }

    levels
}

/// Returns the id of a node on a cycle, if any, via a white/gray/black DFS.
fn find_cycle(dag: &Dag) -> Option<String> {
    #[derive(PartialEq, Clone, Copy)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<&str, Color> =
        dag.nodes.keys().map(|k| (k.as_str(), Color::White)).collect();

    fn visit<'a>(
        node: &'a str,
        dag: &'a Dag,
        color: &mut HashMap<&'a str, Color>,
    ) -> Option<String> {
        color.insert(node, Color::Gray);
        if let Some(n) = dag.nodes.get(node) {
            for dep in &n.depends_on {
                match color.get(dep.as_str()).copied() {
                    Some(Color::Gray) => return Some(dep.clone()),
                    Some(Color::White) | None => {
                        if let Some(cycle) = visit(dep, dag, color) {
                            return Some(cycle);
                        }
                    }
                    Some(Color::Black) => {}
                }
            }
        }
        color.insert(node, Color::Black);
        None
    }

    let mut ids: Vec<&str> = dag.nodes.keys().map(|s| s.as_str()).collect();
    ids.sort();
    for id in ids {
        if color.get(id).copied() == Some(Color::White) {
            if let Some(cycle) = visit(id, dag, &mut color) {
                return Some(cycle);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;

    fn task(id: &str, deps: &[&str], priority: Priority) -> Task {
        let mut t = Task::new(id, "chan-x", id, "", priority);
        t.depends_on = deps.iter().map(|d| d.to_string()).collect();
        t
    }

    #[tokio::test]
    async fn diamond_dag_readiness_and_ordering() {
        let engine = DagEngine::new();
        let a = task("A", &[], Priority::Medium);
        let b = task("B", &["A"], Priority::Medium);
        let c = task("C", &["A"], Priority::Medium);
        let d = task("D", &["B", "C"], Priority::Medium);
        let tasks = vec![a.clone(), b.clone(), c.clone(), d.clone()];

        let ready = engine
            .get_ready_tasks("chan-x", &tasks, &ReadyQuery::default())
            .await
            .unwrap();
        assert_eq!(ready, vec!["A".to_string()]);

        let groups = engine.get_parallel_groups("chan-x", &tasks).await.unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], vec!["A"]);
        let mut level1 = groups[1].clone();
        level1.sort();
        assert_eq!(level1, vec!["B", "C"]);
        assert_eq!(groups[2], vec!["D"]);

        let critical_path = engine.get_critical_path("chan-x", &tasks).await.unwrap();
        assert_eq!(critical_path.len(), 3);

        let (order, warnings) = engine
            .get_execution_order("chan-x", &tasks, &ExecutionOrderQuery::default())
            .await
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(order.first(), Some(&"A".to_string()));
        assert_eq!(order.last(), Some(&"D".to_string()));
    }

    #[tokio::test]
    async fn cycle_is_rejected_at_validation() {
        let engine = DagEngine::new();
        let a = task("A", &["E"], Priority::Medium);
        let e = task("E", &["D"], Priority::Medium);
        let d = task("D", &["B", "C"], Priority::Medium);
        let b = task("B", &["A"], Priority::Medium);
        let c = task("C", &["A"], Priority::Medium);
        let tasks = vec![a, b, c, d, e];

        let dag = engine.build_dag_from_tasks("chan-x", &tasks).await;
        assert!(dag.is_err());
    }

    #[tokio::test]
    async fn validate_dependency_rejects_cycle_before_mutation() {
        let engine = DagEngine::new();
        let a = task("A", &[], Priority::Medium);
        let b = task("B", &["A"], Priority::Medium);
        let tasks = vec![a, b];
        let dag = engine.build_dag_from_tasks("chan-x", &tasks).await.unwrap();

        // A -> B already exists; proposing B -> A must fail.
        let result = engine.validate_dependency(&dag, "A", "B");
        assert!(result.is_err());
    }
}
