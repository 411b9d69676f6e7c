//! The per-agent ORPAR cognitive control loop (spec §4.4): Observe ->
//! Reason -> Plan -> Act -> Reflect. `act` is realized by the LLM
//! dispatcher and the sandbox executor, not by this controller; the
//! other four phases each append one `PhaseEntry` to cognitive memory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{CognitivePhase, PhaseEntry};
use crate::error::{MxfError, MxfResult};
use crate::utility::{update_q_value, UtilityTracker};

/// One entry of a reflection's `outcomes` attribution: spec §4.6's
/// update rule applies `q' = q + alpha*(s-q)` per entity it names.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeAttribution {
    entity_id: String,
    success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Cancelled,
}

#[derive(Debug, Clone)]
struct ActiveLoop {
    phase: CognitivePhase,
    cycle_count: usize,
    state: LoopState,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct PhaseCounts {
    pub observations: usize,
    pub reasonings: usize,
    pub plans: usize,
    pub reflections: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OrparStatus {
    pub enabled: bool,
    pub active_loops: usize,
    pub active_agents: usize,
    pub cognitive_memory_count: usize,
    pub phase_counts: PhaseCounts,
}

type LoopKey = (String, String);

pub struct OrparController {
    enabled: bool,
    ceiling: usize,
    active: RwLock<HashMap<LoopKey, ActiveLoop>>,
    phase_entries: RwLock<Vec<PhaseEntry>>,
    utility: Arc<UtilityTracker>,
}

impl OrparController {
    pub fn new(enabled: bool, ceiling: usize, utility: Arc<UtilityTracker>) -> Self {
        Self {
            enabled,
            ceiling,
            active: RwLock::new(HashMap::new()),
            phase_entries: RwLock::new(Vec::new()),
            utility,
        }
    }

    fn key(agent_id: &str, channel_id: &str) -> LoopKey {
        (agent_id.to_string(), channel_id.to_string())
    }

    /// Admits only if under the active-loop ceiling and this (agent,
    /// channel) pair has no loop already running.
    pub async fn start_loop(
        &self,
        agent_id: &str,
        channel_id: &str,
        trigger: serde_json::Value,
    ) -> MxfResult<PhaseEntry> {
        let mut active = self.active.write().await;
        let key = Self::key(agent_id, channel_id);

        if active.contains_key(&key) {
            return Err(MxfError::InvalidRequest(format!(
                "a loop is already running for agent {agent_id} in channel {channel_id}"
            )));
        }
        if active.len() >= self.ceiling {
            return Err(MxfError::InvalidRequest(format!(
                "active loop ceiling of {} reached",
                self.ceiling
            )));
        }

        active.insert(
            key,
            ActiveLoop {
                phase: CognitivePhase::Observation,
                cycle_count: 1,
                state: LoopState::Running,
            },
        );
        drop(active);

        self.append_phase(agent_id, channel_id, CognitivePhase::Observation, trigger)
            .await
    }

    /// Linear phase transition: Observation -> Reasoning -> Plan ->
    /// Reflection -> Observation (next cycle). Skipping is not permitted.
    pub async fn advance(
        &self,
        agent_id: &str,
        channel_id: &str,
        phase_result: serde_json::Value,
    ) -> MxfResult<PhaseEntry> {
        let key = Self::key(agent_id, channel_id);
        let mut active = self.active.write().await;
        let loop_state = active
            .get_mut(&key)
            .ok_or_else(|| MxfError::NotFound(format!("no active loop for {agent_id}/{channel_id}")))?;

        if loop_state.state == LoopState::Cancelled {
            // Cooperative cancellation: discard the in-flight output.
            return Err(MxfError::InvalidRequest(
                "loop was cancelled; phase output discarded".to_string(),
            ));
        }

        let completing_reflection = loop_state.phase == CognitivePhase::Reflection;
        let next_phase = match loop_state.phase {
            CognitivePhase::Observation => CognitivePhase::Reasoning,
            CognitivePhase::Reasoning => CognitivePhase::Plan,
            CognitivePhase::Plan => CognitivePhase::Reflection,
            CognitivePhase::Reflection => {
                loop_state.cycle_count += 1;
                CognitivePhase::Observation
            }
        };
        loop_state.phase = next_phase;
        drop(active);

        if completing_reflection {
            self.apply_reflection_outcomes(&phase_result).await?;
        }

        self.append_phase(agent_id, channel_id, next_phase, phase_result).await
    }

    /// Spec §4.6's update rule, run by the controller: for each entity a
    /// completed reflection attributes an outcome to, compute the new Q
    /// with the EMA formula and push the precomputed result through the
    /// repository-facing ops. A reflection with no `outcomes` array
    /// attributes nothing, which is valid.
    async fn apply_reflection_outcomes(&self, phase_result: &serde_json::Value) -> MxfResult<()> {
        let Some(raw_outcomes) = phase_result.get("outcomes").and_then(|v| v.as_array()) else {
            return Ok(());
        };

        let mut new_values = Vec::new();
        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for raw in raw_outcomes {
            let Ok(attribution) = serde_json::from_value::<OutcomeAttribution>(raw.clone()) else {
                continue;
            };
            let Some(current_q) = self.utility.current_q_value(&attribution.entity_id).await? else {
                continue;
            };
            let new_q = update_q_value(current_q, attribution.success);
            new_values.push((attribution.entity_id.clone(), new_q));
            if attribution.success {
                successes.push(attribution.entity_id);
            } else {
                failures.push(attribution.entity_id);
            }
        }

        if !new_values.is_empty() {
            self.utility
                .batch_update_q_values(&new_values)
                .await?;
        }
        if !successes.is_empty() {
            self.utility.record_outcome(&successes, true).await?;
        }
        if !failures.is_empty() {
            self.utility.record_outcome(&failures, false).await?;
        }
        Ok(())
    }

    /// Terminal. Removes the active-loop entry, recording its final state.
    pub async fn stop_loop(
        &self,
        agent_id: &str,
        channel_id: &str,
        reason: impl Into<String>,
    ) -> MxfResult<()> {
        let key = Self::key(agent_id, channel_id);
        let mut active = self.active.write().await;
        active
            .remove(&key)
            .ok_or_else(|| MxfError::NotFound(format!("no active loop for {agent_id}/{channel_id}")))?;
        drop(active);

        self.append_phase(
            agent_id,
            channel_id,
            CognitivePhase::Reflection,
            serde_json::json!({ "stopped": true, "reason": reason.into() }),
        )
        .await?;
        Ok(())
    }

    /// Cooperative cancellation: prevents subsequent `advance` calls.
    pub async fn cancel_loop(&self, agent_id: &str, channel_id: &str) -> MxfResult<()> {
        let key = Self::key(agent_id, channel_id);
        let mut active = self.active.write().await;
        let loop_state = active
            .get_mut(&key)
            .ok_or_else(|| MxfError::NotFound(format!("no active loop for {agent_id}/{channel_id}")))?;
        loop_state.state = LoopState::Cancelled;
        Ok(())
    }

    pub async fn status(&self) -> OrparStatus {
        let active = self.active.read().await;
        let entries = self.phase_entries.read().await;

        let active_agents: HashSet<&str> = active.keys().map(|(agent, _)| agent.as_str()).collect();

        let mut counts = PhaseCounts::default();
        for entry in entries.iter() {
            match entry.phase {
                CognitivePhase::Observation => counts.observations += 1,
                CognitivePhase::Reasoning => counts.reasonings += 1,
                CognitivePhase::Plan => counts.plans += 1,
                CognitivePhase::Reflection => counts.reflections += 1,
            }
        }

        OrparStatus {
            enabled: self.enabled,
            active_loops: active.len(),
            active_agents: active_agents.len(),
            cognitive_memory_count: entries.len(),
            phase_counts: counts,
        }
    }

    async fn append_phase(
        &self,
        agent_id: &str,
        channel_id: &str,
        phase: CognitivePhase,
        content: serde_json::Value,
    ) -> MxfResult<PhaseEntry> {
        let entry = PhaseEntry::new(Uuid::new_v4().to_string(), agent_id, channel_id, phase, content);
        self.phase_entries.write().await.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory::InMemoryStore;
    use crate::repository::Repository;

    fn controller(ceiling: usize) -> OrparController {
        let entities = Arc::new(InMemoryStore::new());
        OrparController::new(true, ceiling, Arc::new(UtilityTracker::new(entities)))
    }

    #[tokio::test]
    async fn admission_ceiling_is_enforced() {
        let controller = controller(2);
        controller
            .start_loop("a1", "c", serde_json::json!({}))
            .await
            .unwrap();
        controller
            .start_loop("a2", "c", serde_json::json!({}))
            .await
            .unwrap();

        let result = controller.start_loop("a3", "c", serde_json::json!({})).await;
        assert!(result.is_err());
        assert_eq!(controller.status().await.active_loops, 2);
    }

    #[tokio::test]
    async fn stop_loop_decrements_active_count() {
        let controller = controller(4);
        controller
            .start_loop("a1", "c", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(controller.status().await.active_loops, 1);

        controller.stop_loop("a1", "c", "done").await.unwrap();
        assert_eq!(controller.status().await.active_loops, 0);
    }

    #[tokio::test]
    async fn phases_advance_linearly_and_cycle() {
        let controller = controller(4);
        controller
            .start_loop("a1", "c", serde_json::json!({}))
            .await
            .unwrap();

        let reasoning = controller
            .advance("a1", "c", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(reasoning.phase, CognitivePhase::Reasoning);

        let plan = controller.advance("a1", "c", serde_json::json!({})).await.unwrap();
        assert_eq!(plan.phase, CognitivePhase::Plan);

        let reflection = controller
            .advance("a1", "c", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(reflection.phase, CognitivePhase::Reflection);

        let next_observation = controller
            .advance("a1", "c", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(next_observation.phase, CognitivePhase::Observation);

        let status = controller.status().await;
        assert_eq!(status.phase_counts.observations, 2);
        assert_eq!(status.phase_counts.reflections, 1);
    }

    #[tokio::test]
    async fn cancellation_discards_subsequent_advance() {
        let controller = controller(4);
        controller
            .start_loop("a1", "c", serde_json::json!({}))
            .await
            .unwrap();
        controller.cancel_loop("a1", "c").await.unwrap();

        let result = controller.advance("a1", "c", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    /// Spec §2's data-flow step: a completed reflection's outcome
    /// attributions feed the entity store's Q-value via the controller's
    /// EMA, not via any formula living in the repository.
    #[tokio::test]
    async fn completed_reflection_applies_ema_to_attributed_entities() {
        use crate::domain::{Entity, EntityType};

        let entities = Arc::new(InMemoryStore::new());
        entities
            .create(Entity::new("e1", "c", EntityType::Concept, "E1"))
            .await
            .unwrap();
        let utility = Arc::new(UtilityTracker::new(entities.clone()));
        let controller = OrparController::new(true, 4, utility);

        controller
            .start_loop("a1", "c", serde_json::json!({}))
            .await
            .unwrap();
        controller.advance("a1", "c", serde_json::json!({})).await.unwrap(); // -> Reasoning
        controller.advance("a1", "c", serde_json::json!({})).await.unwrap(); // -> Plan
        controller.advance("a1", "c", serde_json::json!({})).await.unwrap(); // -> Reflection

        controller
            .advance(
                "a1",
                "c",
                serde_json::json!({ "outcomes": [{ "entityId": "e1", "success": true }] }),
            )
            .await
            .unwrap(); // completes Reflection -> Observation

        let entity = entities.find_by_id("e1").await.unwrap().unwrap();
        assert!((entity.utility.q_value - 0.55).abs() < 1e-9);
        assert_eq!(entity.utility.success_count, 1);
    }
}
