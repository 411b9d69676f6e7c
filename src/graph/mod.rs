//! The knowledge graph (spec §4.5): entity CRUD with channel scoping and
//! soft-delete via `merged`, similarity-based merge, path search, and
//! bounded context extraction for prompt assembly.

pub mod similarity;

use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::domain::{Entity, EntityType, Relationship};
use crate::error::{MxfError, MxfResult};
use crate::repository::memory::InMemoryStore;
use crate::repository::{Filter, Repository};

#[derive(Debug, Clone, Default)]
pub struct FindOrCreateRequest {
    pub channel_id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub aliases: HashSet<String>,
    pub description: String,
    pub properties: serde_json::Value,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct NeighborQuery {
    pub direction: Option<Direction>,
    pub relationship_type: Option<String>,
    pub entity_type: Option<EntityType>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SimilarPair {
    pub a: String,
    pub b: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct GraphQuery {
    pub start_filters: Filter,
    pub relationship_filters: Option<Filter>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub execution_time_ms: u128,
}

#[derive(Debug, Clone)]
pub struct PathResult {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub confidence: f64,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct Subgraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GraphContextStats {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub avg_q_value: f64,
    pub max_q_value: f64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone)]
pub struct GraphContext {
    pub central_entities: Vec<Entity>,
    pub related_entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub stats: GraphContextStats,
}

pub struct KnowledgeGraph {
    entities: InMemoryStore<Entity>,
    relationships: InMemoryStore<Relationship>,
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self {
            entities: InMemoryStore::new(),
            relationships: InMemoryStore::new(),
        }
    }
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    async fn non_merged(&self, channel_id: &str) -> MxfResult<Vec<Entity>> {
        let all = self
            .entities
            .filtered(&Filter::eq("channel_id", channel_id.to_string()))
            .await?;
        Ok(all.into_iter().filter(|e| !e.merged).collect())
    }

    pub async fn get_entity(&self, id: &str) -> MxfResult<Option<Entity>> {
        self.entities.find_by_id(id).await
    }

    pub async fn get_relationship(&self, id: &str) -> MxfResult<Option<Relationship>> {
        self.relationships.find_by_id(id).await
    }

    pub async fn create_relationship(&self, relationship: Relationship) -> MxfResult<Relationship> {
        let from = self
            .entities
            .find_by_id(&relationship.from_entity_id)
            .await?
            .ok_or_else(|| MxfError::InvalidRelationship("from entity not found".to_string()))?;
        let to = self
            .entities
            .find_by_id(&relationship.to_entity_id)
            .await?
            .ok_or_else(|| MxfError::InvalidRelationship("to entity not found".to_string()))?;

        if from.channel_id != relationship.channel_id || to.channel_id != relationship.channel_id {
            return Err(MxfError::InvalidRelationship(
                "relationship endpoints must be in the same channel".to_string(),
            ));
        }

        self.relationships.create(relationship).await
    }

    /// Case-insensitive exact match on (channelId, type, name) among
    /// non-merged entities; unions new aliases in on a match.
    pub async fn find_or_create_entity(&self, request: FindOrCreateRequest) -> MxfResult<Entity> {
        let candidates = self.non_merged(&request.channel_id).await?;
        let existing = candidates.into_iter().find(|e| {
            e.entity_type == request.entity_type
                && e.name.to_lowercase() == request.name.to_lowercase()
        });

        if let Some(mut entity) = existing {
            entity.aliases.extend(request.aliases);
            entity.updated_at = chrono::Utc::now();
            return self.entities.create(entity).await;
        }

        let mut entity = Entity::new(
            Uuid::new_v4().to_string(),
            request.channel_id,
            request.entity_type,
            request.name,
        );
        entity.aliases = request.aliases;
        entity.description = request.description;
        entity.properties = request.properties;
        entity.source = request.source;
        self.entities.create(entity).await
    }

    /// Unions aliases and `sourceMemoryIds` into `target`, flips every
    /// source to `merged=true`, and rewrites relationship endpoints.
    /// Atomic per target: either every rewrite below succeeds or this
    /// function returns before mutating anything (the in-memory adapter
    /// can offer this; an external adapter must provide the same
    /// guarantee per spec §4.5).
    pub async fn merge_entities(&self, target_id: &str, source_ids: &[String]) -> MxfResult<Entity> {
        let mut target = self
            .entities
            .find_by_id(target_id)
            .await?
            .ok_or_else(|| MxfError::NotFound(target_id.to_string()))?;

        let mut sources = Vec::new();
        for id in source_ids {
            let source = self
                .entities
                .find_by_id(id)
                .await?
                .ok_or_else(|| MxfError::NotFound(id.to_string()))?;
            sources.push(source);
        }

        for source in &sources {
            target.aliases.extend(source.aliases.iter().cloned());
            target.aliases.insert(source.name.clone());
            target
                .source_memory_ids
                .extend(source.source_memory_ids.iter().cloned());
        }
        target.updated_at = chrono::Utc::now();
        let target = self.entities.create(target).await?;

        let all_relationships = self
            .relationships
            .filtered(&Filter::eq("channel_id", target.channel_id.clone()))
            .await?;
        for relationship in all_relationships {
            let touches_source = source_ids.contains(&relationship.from_entity_id)
                || source_ids.contains(&relationship.to_entity_id);
            if !touches_source {
                continue;
            }
            let mut rewritten = relationship.clone();
            if source_ids.contains(&rewritten.from_entity_id) {
                rewritten.from_entity_id = target.id.clone();
            }
            if source_ids.contains(&rewritten.to_entity_id) {
                rewritten.to_entity_id = target.id.clone();
            }
            rewritten.updated_at = chrono::Utc::now();
            self.relationships.create(rewritten).await?;
        }

        for source_id in source_ids {
            if let Some(mut source) = self.entities.find_by_id(source_id).await? {
                source.merged = true;
                source.merged_into = Some(target.id.clone());
                self.entities.create(source).await?;
            }
        }

        Ok(target)
    }

    /// Pairwise over non-merged entities of the same type; similarity is
    /// `max(name_similarity, alias_overlap)`.
    pub async fn find_similar_entities(
        &self,
        channel_id: &str,
        threshold: f64,
    ) -> MxfResult<Vec<SimilarPair>> {
        let entities = self.non_merged(channel_id).await?;
        let mut pairs = Vec::new();

        for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                let (a, b) = (&entities[i], &entities[j]);
                if a.entity_type != b.entity_type {
                    continue;
                }
                let name_score = similarity::name_similarity(&a.name, &b.name);
                let alias_score = similarity::alias_overlap(&a.aliases, &b.aliases);
                let score = name_score.max(alias_score);
                if score >= threshold {
                    let reason = if name_score >= alias_score {
                        format!("name similarity {name_score:.2}")
                    } else {
                        format!("alias overlap {alias_score:.2}")
                    };
                    pairs.push(SimilarPair {
                        a: a.id.clone(),
                        b: b.id.clone(),
                        score,
                        reason,
                    });
                }
            }
        }

        Ok(pairs)
    }

    pub async fn query(&self, channel_id: &str, query: &GraphQuery) -> MxfResult<QueryResult> {
        let start = std::time::Instant::now();

        let candidates = self.non_merged(channel_id).await?;
        let seed_value_matches = |entity: &Entity| {
            let value = serde_json::to_value(entity).unwrap_or(serde_json::Value::Null);
            query.start_filters.is_empty() || crate::repository::filter::matches(&query.start_filters, &value)
        };
        let mut entities: Vec<Entity> = candidates.into_iter().filter(seed_value_matches).collect();
        if let Some(limit) = query.limit {
            entities.truncate(limit);
        }

        let seed_ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let all_relationships = self
            .relationships
            .filtered(&Filter::eq("channel_id", channel_id.to_string()))
            .await?;

        let mut relationships: Vec<Relationship> = all_relationships
            .into_iter()
            .filter(|r| seed_ids.contains(r.from_entity_id.as_str()) || seed_ids.contains(r.to_entity_id.as_str()))
            .filter(|r| {
                query.relationship_filters.as_ref().map_or(true, |f| {
                    let value = serde_json::to_value(r).unwrap_or(serde_json::Value::Null);
                    crate::repository::filter::matches(f, &value)
                })
            })
            .collect();

        if let Some(limit) = query.limit {
            relationships.truncate(limit);
        }

        Ok(QueryResult {
            entities,
            relationships,
            execution_time_ms: start.elapsed().as_millis(),
        })
    }

    pub async fn get_neighbors(&self, entity_id: &str, query: &NeighborQuery) -> MxfResult<Vec<Entity>> {
        let entity = self
            .entities
            .find_by_id(entity_id)
            .await?
            .ok_or_else(|| MxfError::NotFound(entity_id.to_string()))?;

        let direction = query.direction.unwrap_or(Direction::Both);
        let relationships = self
            .relationships
            .filtered(&Filter::eq("channel_id", entity.channel_id.clone()))
            .await?;

        let mut neighbor_ids = Vec::new();
        for r in &relationships {
            if let Some(rel_type) = &query.relationship_type {
                if &r.relationship_type != rel_type {
                    continue;
                }
            }
            let matches_direction = match direction {
                Direction::Outgoing => r.from_entity_id == entity_id,
                Direction::Incoming => r.to_entity_id == entity_id,
                Direction::Both => r.touches(entity_id),
            };
            if !matches_direction {
                continue;
            }
            if r.from_entity_id == entity_id {
                neighbor_ids.push(r.to_entity_id.clone());
            } else if r.to_entity_id == entity_id {
                neighbor_ids.push(r.from_entity_id.clone());
            }
        }

        let mut neighbors = Vec::new();
        for id in neighbor_ids {
            if let Some(n) = self.entities.find_by_id(&id).await? {
                if n.merged {
                    continue;
                }
                if let Some(entity_type) = query.entity_type {
                    if n.entity_type != entity_type {
                        continue;
                    }
                }
                neighbors.push(n);
            }
        }

        if let Some(limit) = query.limit {
            neighbors.truncate(limit);
        }
        Ok(neighbors)
    }

    async fn out_edges(&self, channel_id: &str) -> MxfResult<HashMap<String, Vec<Relationship>>> {
        let relationships = self
            .relationships
            .filtered(&Filter::eq("channel_id", channel_id.to_string()))
            .await?;
        let mut map: HashMap<String, Vec<Relationship>> = HashMap::new();
        for r in relationships {
            map.entry(r.from_entity_id.clone()).or_default().push(r);
        }
        Ok(map)
    }

    /// BFS over outgoing edges. Each frontier entry carries accumulated
    /// confidence (product) and weight (sum); `visited` records minimum
    /// path length so longer candidates to the same node are pruned.
    pub async fn find_path(&self, from: &str, to: &str, max_hops: usize) -> MxfResult<Option<PathResult>> {
        Ok(self.find_all_paths(from, to, max_hops, 1).await?.into_iter().next())
    }

    pub async fn find_all_paths(
        &self,
        from: &str,
        to: &str,
        max_hops: usize,
        limit: usize,
    ) -> MxfResult<Vec<PathResult>> {
        let origin = self
            .entities
            .find_by_id(from)
            .await?
            .ok_or_else(|| MxfError::NotFound(from.to_string()))?;
        let out_edges = self.out_edges(&origin.channel_id).await?;

        struct Frontier {
            node: String,
            entity_path: Vec<String>,
            rel_path: Vec<Relationship>,
            confidence: f64,
            weight: f64,
        }

        let mut queue: VecDeque<Frontier> = VecDeque::new();
        queue.push_back(Frontier {
            node: from.to_string(),
            entity_path: vec![from.to_string()],
            rel_path: Vec::new(),
            confidence: 1.0,
            weight: 0.0,
        });

        let mut visited: HashMap<String, usize> = HashMap::new();
        visited.insert(from.to_string(), 0);
        let mut results = Vec::new();

        while let Some(current) = queue.pop_front() {
            if current.entity_path.len() - 1 >= max_hops {
                continue;
            }
            let Some(edges) = out_edges.get(&current.node) else {
                continue;
            };
            for edge in edges {
                let next_len = current.entity_path.len();
                if let Some(&best) = visited.get(&edge.to_entity_id) {
                    if best < next_len {
                        continue;
                    }
                }
                visited.insert(edge.to_entity_id.clone(), next_len);

                let mut entity_path = current.entity_path.clone();
                entity_path.push(edge.to_entity_id.clone());
                let mut rel_path = current.rel_path.clone();
                rel_path.push(edge.clone());
                let confidence = current.confidence * edge.confidence;
                let weight = current.weight + edge.weight;

                if edge.to_entity_id == to {
                    let mut entities = Vec::new();
                    for id in &entity_path {
                        if let Some(e) = self.entities.find_by_id(id).await? {
                            entities.push(e);
                        }
                    }
                    results.push(PathResult {
                        entities,
                        relationships: rel_path.clone(),
                        confidence,
                        weight,
                    });
                    if results.len() >= limit {
                        return Ok(results);
                    }
                    continue;
                }

                queue.push_back(Frontier {
                    node: edge.to_entity_id.clone(),
                    entity_path,
                    rel_path,
                    confidence,
                    weight,
                });
            }
        }

        Ok(results)
    }

    pub async fn get_subgraph(&self, entity_id: &str, depth: usize, limit: usize) -> MxfResult<Subgraph> {
        let origin = self
            .entities
            .find_by_id(entity_id)
            .await?
            .ok_or_else(|| MxfError::NotFound(entity_id.to_string()))?;

        let mut entities = vec![origin.clone()];
        let mut relationships = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(entity_id.to_string());

        let mut frontier = vec![entity_id.to_string()];
        for _ in 0..depth {
            if entities.len() >= limit {
                break;
            }
            let mut next_frontier = Vec::new();
            for node in &frontier {
                let rels = self
                    .relationships
                    .filtered(&Filter::eq("channel_id", origin.channel_id.clone()))
                    .await?
                    .into_iter()
                    .filter(|r| r.touches(node));

                for r in rels {
                    if relationships.len() < limit {
                        relationships.push(r.clone());
                    }
                    let other = if r.from_entity_id == *node {
                        r.to_entity_id.clone()
                    } else {
                        r.from_entity_id.clone()
                    };
                    if visited.insert(other.clone()) {
                        if let Some(e) = self.entities.find_by_id(&other).await? {
                            if !e.merged && entities.len() < limit {
                                entities.push(e);
                                next_frontier.push(other);
                            }
                        }
                    }
                }
            }
            frontier = next_frontier;
        }

        Ok(Subgraph {
            entities,
            relationships,
        })
    }

    /// Assembles a bounded context bundle for prompt seeding (spec §4.5).
    pub async fn get_graph_context(
        &self,
        channel_id: &str,
        keywords: &[String],
        max_entities: usize,
        max_relationships: usize,
    ) -> MxfResult<GraphContext> {
        let entities = self.non_merged(channel_id).await?;

        let mut central_entities: Vec<Entity> = entities
            .iter()
            .filter(|e| keywords.iter().any(|k| e.matches_keyword(k)))
            .cloned()
            .collect();
        central_entities.truncate(max_entities);

        let mut related_entities: Vec<Entity> = entities
            .iter()
            .filter(|e| e.utility.q_value >= 0.6)
            .cloned()
            .collect();
        related_entities.sort_by(|a, b| {
            b.utility
                .q_value
                .partial_cmp(&a.utility.q_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        related_entities.truncate(max_entities);

        let selected_ids: HashSet<&str> = central_entities
            .iter()
            .chain(related_entities.iter())
            .map(|e| e.id.as_str())
            .collect();

        let mut relationships: Vec<Relationship> = self
            .relationships
            .filtered(&Filter::eq("channel_id", channel_id.to_string()))
            .await?
            .into_iter()
            .filter(|r| {
                selected_ids.contains(r.from_entity_id.as_str())
                    && selected_ids.contains(r.to_entity_id.as_str())
            })
            .collect();
        relationships.truncate(max_relationships);

        let selected: Vec<&Entity> = central_entities.iter().chain(related_entities.iter()).collect();
        let stats = if selected.is_empty() {
            GraphContextStats::default()
        } else {
            let avg_q = selected.iter().map(|e| e.utility.q_value).sum::<f64>() / selected.len() as f64;
            let max_q = selected
                .iter()
                .map(|e| e.utility.q_value)
                .fold(0.0_f64, f64::max);
            let avg_conf = selected.iter().map(|e| e.confidence).sum::<f64>() / selected.len() as f64;
            GraphContextStats {
                entity_count: selected.len(),
                relationship_count: relationships.len(),
                avg_q_value: avg_q,
                max_q_value: max_q,
                avg_confidence: avg_conf,
            }
        };

        Ok(GraphContext {
            central_entities,
            related_entities,
            relationships,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_merge_scenario(graph: &KnowledgeGraph) -> (Entity, Entity, Relationship) {
        let e1 = graph
            .entities
            .create(Entity::new("e1", "c1", EntityType::Organization, "Acme"))
            .await
            .unwrap();
        let e2 = graph
            .entities
            .create(Entity::new("e2", "c1", EntityType::Organization, "ACME Inc"))
            .await
            .unwrap();
        let e3 = graph
            .entities
            .create(Entity::new("e3", "c1", EntityType::Person, "Alice"))
            .await
            .unwrap();
        let rel = graph
            .create_relationship(Relationship::new("r1", "c1", "e2", "e3", "employs"))
            .await
            .unwrap();
        (e1, e2, rel)
    }

    #[tokio::test]
    async fn merge_rewrites_relationships_and_soft_deletes_source() {
        let graph = KnowledgeGraph::new();
        let (e1, e2, rel) = seed_merge_scenario(&graph).await;

        graph.merge_entities(&e1.id, &[e2.id.clone()]).await.unwrap();

        let merged_source = graph.get_entity(&e2.id).await.unwrap().unwrap();
        assert!(merged_source.merged);
        assert_eq!(merged_source.merged_into, Some(e1.id.clone()));

        let rewritten = graph.get_relationship(&rel.id).await.unwrap().unwrap();
        assert_eq!(rewritten.from_entity_id, e1.id);

        let remaining = graph.non_merged("c1").await.unwrap();
        assert!(!remaining.iter().any(|e| e.id == e2.id));
    }

    #[tokio::test]
    async fn find_similar_entities_flags_close_names() {
        let graph = KnowledgeGraph::new();
        seed_merge_scenario(&graph).await;

        let pairs = graph.find_similar_entities("c1", 0.6).await.unwrap();
        assert!(pairs.iter().any(|p| p.score >= 0.6));
    }

    #[tokio::test]
    async fn find_path_returns_endpoints_matching_query() {
        let graph = KnowledgeGraph::new();
        let (_, e2, _) = seed_merge_scenario(&graph).await;

        let path = graph.find_path(&e2.id, "e3", 5).await.unwrap().unwrap();
        assert_eq!(path.entities.first().unwrap().id, e2.id);
        assert_eq!(path.entities.last().unwrap().id, "e3");
    }
}
