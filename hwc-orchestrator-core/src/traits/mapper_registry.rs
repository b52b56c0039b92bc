//! Mapper registry abstract Trait

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use hwc_orchestrator_provider::ResourceMapper;

/// Mapper Registry Trait
///
/// Resolves the field mapper for a resource kind. Provides a default memory
/// implementation, `InMemoryMapperRegistry`.
#[async_trait]
pub trait MapperRegistry: Send + Sync {
    /// Register a mapper under its own kind, replacing any previous one
    async fn register(&self, mapper: Arc<dyn ResourceMapper>);

    /// Remove the mapper for `kind`
    async fn unregister(&self, kind: &str);

    /// Get the mapper for `kind`
    async fn get(&self, kind: &str) -> Option<Arc<dyn ResourceMapper>>;

    /// List all registered kinds, sorted
    async fn list_kinds(&self) -> Vec<String>;
}

/// In-memory mapper registry
#[derive(Clone)]
pub struct InMemoryMapperRegistry {
    mappers: Arc<RwLock<HashMap<String, Arc<dyn ResourceMapper>>>>,
}

impl InMemoryMapperRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            mappers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry pre-filled with `mappers`
    #[must_use]
    pub fn with_mappers(mappers: impl IntoIterator<Item = Arc<dyn ResourceMapper>>) -> Self {
        let map = mappers
            .into_iter()
            .map(|m| (m.kind().to_string(), m))
            .collect();
        Self {
            mappers: Arc::new(RwLock::new(map)),
        }
    }
}

impl Default for InMemoryMapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MapperRegistry for InMemoryMapperRegistry {
    async fn register(&self, mapper: Arc<dyn ResourceMapper>) {
        self.mappers
            .write()
            .await
            .insert(mapper.kind().to_string(), mapper);
    }

    async fn unregister(&self, kind: &str) {
        self.mappers.write().await.remove(kind);
    }

    async fn get(&self, kind: &str) -> Option<Arc<dyn ResourceMapper>> {
        self.mappers.read().await.get(kind).cloned()
    }

    async fn list_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.mappers.read().await.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
