//! Process configuration, read once at startup from the environment.
//!
//! Follows the teacher's `env::var(..).unwrap_or_else(|_| default)` style
//! (see `services/memory.rs` in the source pack) but centralizes the
//! variables named in spec §6 instead of scattering `env::var` calls.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MxfConfig {
    pub knowledge_graph_enabled: bool,
    pub dag_enabled: bool,
    pub context_max_entities: usize,
    pub context_max_relationships: usize,
    pub orpar_loop_ceiling: usize,
    pub llm_timeout: Duration,
    pub sandbox_timeout: Duration,
    pub webhook_bind: String,
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

impl Default for MxfConfig {
    fn default() -> Self {
        Self {
            knowledge_graph_enabled: true,
            dag_enabled: true,
            context_max_entities: 12,
            context_max_relationships: 24,
            orpar_loop_ceiling: 8,
            llm_timeout: Duration::from_millis(30_000),
            sandbox_timeout: Duration::from_millis(5_000),
            webhook_bind: "0.0.0.0:4000".to_string(),
        }
    }
}

impl MxfConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            knowledge_graph_enabled: env_bool(
                "MXF_KNOWLEDGE_GRAPH_ENABLED",
                default.knowledge_graph_enabled,
            ),
            dag_enabled: env_bool("MXF_DAG_ENABLED", default.dag_enabled),
            context_max_entities: env_usize(
                "MXF_CONTEXT_MAX_ENTITIES",
                default.context_max_entities,
            ),
            context_max_relationships: env_usize(
                "MXF_CONTEXT_MAX_RELATIONSHIPS",
                default.context_max_relationships,
            ),
            orpar_loop_ceiling: env_usize("MXF_ORPAR_LOOP_CEILING", default.orpar_loop_ceiling),
            llm_timeout: Duration::from_millis(env_u64(
                "MXF_LLM_TIMEOUT_MS",
                default.llm_timeout.as_millis() as u64,
            )),
            sandbox_timeout: Duration::from_millis(env_u64(
                "MXF_SANDBOX_TIMEOUT_MS",
                default.sandbox_timeout.as_millis() as u64,
            )),
            webhook_bind: env::var("MXF_WEBHOOK_BIND").unwrap_or(default.webhook_bind),
        }
    }
}
