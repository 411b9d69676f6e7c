//! Provider registry keyed by name (spec §9: "avoid inheritance beyond
//! one level; prefer per-provider adapter objects registered in a map
//! keyed by provider name"), grounded in the teacher's
//! `AgentType -> default_model` dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{MxfError, MxfResult};

use super::LLMProvider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn LLMProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> MxfResult<Arc<dyn LLMProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| MxfError::ProviderUnavailable(format!("no provider registered as {name}")))
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;

    #[test]
    fn unregistered_provider_is_provider_unavailable() {
        let registry = ProviderRegistry::new();
        let result = registry.get("nonexistent");
        assert!(matches!(result, Err(MxfError::ProviderUnavailable(_))));
    }

    #[test]
    fn registered_provider_is_retrievable_by_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("mock-1")));
        assert!(registry.get("mock").is_ok());
        assert_eq!(registry.names(), vec!["mock"]);
    }
}
