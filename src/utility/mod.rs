//! MULS: the memory/entity utility layer (spec §4.6). Stores a Q-value
//! in `[0, 1]` per entity plus retrieval/outcome counters. The EMA
//! update rule is the caller's (the ORPAR controller's) responsibility;
//! this module only applies and stores whatever Q it is handed, so the
//! learning policy stays swappable without touching the repository.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::domain::Utility;
use crate::error::MxfResult;
use crate::repository::memory::InMemoryStore;
use crate::repository::{Filter, Repository};

/// Learning rate for the Q-value update rule `q' = q + alpha * (s - q)`.
/// Used by callers that compute a new Q themselves; never applied here.
pub const LEARNING_RATE: f64 = 0.1;

pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// The controller-side EMA formula. `s=1.0` on success, `s=0.0` on
/// failure. This module exposes it for callers to use, but never calls
/// it itself — the repository only stores whatever Q it's given.
pub fn update_q_value(current: f64, success: bool) -> f64 {
    let signal = if success { 1.0 } else { 0.0 };
    clamp_unit(current + LEARNING_RATE * (signal - current))
}

/// Batch increments the success or failure counter. Never touches
/// `q_value` — that's `update_q_value_for`'s job.
pub fn record_outcome(utility: &mut Utility, success: bool) {
    if success {
        utility.success_count += 1;
    } else {
        utility.failure_count += 1;
    }
}

pub fn record_retrieval(utility: &mut Utility) {
    utility.retrieval_count += 1;
    utility.last_accessed_at = Some(Utc::now());
}

/// Sets `q_value` to a caller-computed value, clamped to `[0, 1]`, and
/// logs the free-form reason. The only place `q_value` changes.
pub fn update_q_value_for(utility: &mut Utility, new_q: f64, reason: &str) {
    utility.q_value = clamp_unit(new_q);
    utility.last_q_value_update_at = Some(Utc::now());
    debug!(q_value = utility.q_value, reason, "q_value updated");
}

/// Q-value bookkeeping for entities, operating directly on the
/// knowledge graph's entity store so callers don't need to round-trip
/// through the graph's higher-level operations just to touch a score.
pub struct UtilityTracker {
    entities: Arc<InMemoryStore<crate::domain::Entity>>,
}

impl UtilityTracker {
    pub fn new(entities: Arc<InMemoryStore<crate::domain::Entity>>) -> Self {
        Self { entities }
    }

    pub async fn increment_retrieval_count(&self, entity_id: &str) -> MxfResult<()> {
        if let Some(mut entity) = self.entities.find_by_id(entity_id).await? {
            record_retrieval(&mut entity.utility);
            self.entities.create(entity).await?;
        }
        Ok(())
    }

    /// Batch-increments the success or failure counter for `ids`.
    /// Does not derive or touch `q_value`.
    pub async fn record_outcome(&self, ids: &[String], success: bool) -> MxfResult<()> {
        for id in ids {
            if let Some(mut entity) = self.entities.find_by_id(id).await? {
                record_outcome(&mut entity.utility, success);
                self.entities.create(entity).await?;
            }
        }
        Ok(())
    }

    /// Reads the current `q_value` for an entity, if it exists. Callers
    /// use this to seed their own EMA computation; this module never
    /// runs the formula itself.
    pub async fn current_q_value(&self, entity_id: &str) -> MxfResult<Option<f64>> {
        Ok(self
            .entities
            .find_by_id(entity_id)
            .await?
            .map(|e| e.utility.q_value))
    }

    /// The repository-facing half of `updateQValue`: stores a
    /// caller-computed Q and logs why. Never derives `new_q` itself.
    pub async fn update_q_value_for(&self, entity_id: &str, new_q: f64, reason: &str) -> MxfResult<()> {
        if let Some(mut entity) = self.entities.find_by_id(entity_id).await? {
            update_q_value_for(&mut entity.utility, new_q, reason);
            self.entities.create(entity).await?;
        }
        Ok(())
    }

    /// Single bulk write of precomputed `(id, newQ)` pairs, run
    /// concurrently since no entity appears twice in the same batch.
    pub async fn batch_update_q_values(&self, updates: &[(String, f64)]) -> MxfResult<()> {
        let writes = updates
            .iter()
            .map(|(entity_id, new_q)| self.update_q_value_for(entity_id, *new_q, "batch update"));
        for result in futures::future::join_all(writes).await {
            result?;
        }
        Ok(())
    }

    pub async fn get_entities_by_q_value(
        &self,
        channel_id: &str,
        min_q: Option<f64>,
        max_q: Option<f64>,
        limit: Option<usize>,
    ) -> MxfResult<Vec<crate::domain::Entity>> {
        let min_q = min_q.unwrap_or(0.0);
        let max_q = max_q.unwrap_or(1.0);

        let mut entities = self
            .entities
            .filtered(&Filter::eq("channel_id", channel_id.to_string()))
            .await?
            .into_iter()
            .filter(|e| !e.merged && e.utility.q_value >= min_q && e.utility.q_value <= max_q)
            .collect::<Vec<_>>();

        entities.sort_by(|a, b| {
            b.utility
                .q_value
                .partial_cmp(&a.utility.q_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = limit {
            entities.truncate(limit);
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_success_moves_halfway_point_up_by_alpha() {
        let updated = update_q_value(0.5, true);
        assert!((updated - 0.55).abs() < 1e-9);
    }

    #[test]
    fn ten_successes_converge_toward_one() {
        let mut q = 0.5;
        for _ in 0..10 {
            q = update_q_value(q, true);
        }
        assert!(q > 0.80 && q < 0.83);
    }

    #[test]
    fn failure_pulls_q_value_toward_zero() {
        let updated = update_q_value(0.5, false);
        assert!((updated - 0.45).abs() < 1e-9);
    }

    #[test]
    fn q_value_never_leaves_unit_interval() {
        assert_eq!(clamp_unit(1.4), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
    }

    #[test]
    fn record_outcome_never_touches_q_value() {
        let mut utility = Utility::default();
        let before = utility.q_value;
        record_outcome(&mut utility, true);
        assert_eq!(utility.q_value, before);
        assert_eq!(utility.success_count, 1);
    }

    #[tokio::test]
    async fn tracker_ranks_entities_by_q_value() {
        use crate::domain::{Entity, EntityType};

        let store = Arc::new(InMemoryStore::new());
        let mut hot = Entity::new("hot", "c1", EntityType::Concept, "Hot");
        hot.utility.q_value = 0.9;
        let mut cold = Entity::new("cold", "c1", EntityType::Concept, "Cold");
        cold.utility.q_value = 0.2;
        store.create(hot).await.unwrap();
        store.create(cold).await.unwrap();

        let tracker = UtilityTracker::new(store);
        let ranked = tracker
            .get_entities_by_q_value("c1", Some(0.5), None, Some(10))
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "hot");
    }

    #[tokio::test]
    async fn get_entities_by_q_value_respects_max_bound() {
        use crate::domain::{Entity, EntityType};

        let store = Arc::new(InMemoryStore::new());
        let mut hot = Entity::new("hot", "c1", EntityType::Concept, "Hot");
        hot.utility.q_value = 0.95;
        let mut mid = Entity::new("mid", "c1", EntityType::Concept, "Mid");
        mid.utility.q_value = 0.6;
        store.create(hot).await.unwrap();
        store.create(mid).await.unwrap();

        let tracker = UtilityTracker::new(store);
        let ranked = tracker
            .get_entities_by_q_value("c1", None, Some(0.8), None)
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "mid");
    }

    #[tokio::test]
    async fn update_q_value_for_stores_caller_computed_value_without_rederiving() {
        use crate::domain::{Entity, EntityType};

        let store = Arc::new(InMemoryStore::new());
        store
            .create(Entity::new("e1", "c1", EntityType::Concept, "E1"))
            .await
            .unwrap();

        let tracker = UtilityTracker::new(store.clone());
        tracker.update_q_value_for("e1", 0.77, "manual override").await.unwrap();

        let entity = store.find_by_id("e1").await.unwrap().unwrap();
        assert!((entity.utility.q_value - 0.77).abs() < 1e-9);
        assert!(entity.utility.last_q_value_update_at.is_some());
    }

    #[tokio::test]
    async fn batch_update_q_values_writes_precomputed_pairs() {
        use crate::domain::{Entity, EntityType};

        let store = Arc::new(InMemoryStore::new());
        store
            .create(Entity::new("e1", "c1", EntityType::Concept, "E1"))
            .await
            .unwrap();
        store
            .create(Entity::new("e2", "c1", EntityType::Concept, "E2"))
            .await
            .unwrap();

        let tracker = UtilityTracker::new(store.clone());
        tracker
            .batch_update_q_values(&[("e1".to_string(), 0.1), ("e2".to_string(), 0.9)])
            .await
            .unwrap();

        assert!((store.find_by_id("e1").await.unwrap().unwrap().utility.q_value - 0.1).abs() < 1e-9);
        assert!((store.find_by_id("e2").await.unwrap().unwrap().utility.q_value - 0.9).abs() < 1e-9);
    }
}
