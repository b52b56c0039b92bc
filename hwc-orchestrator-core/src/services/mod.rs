//! Reconciliation service layer

mod reconciler;

pub use reconciler::{ResourceReconciler, TimeoutOverrides};

use std::sync::Arc;

use hwc_orchestrator_provider::{ErrorClassifier, ProviderError, ResourceMapper, Transport};

use crate::error::ErrorCause;
use crate::traits::{InMemoryMapperRegistry, MapperRegistry};

/// Service context - holds all dependencies
///
/// The binary builds the transport and the mapper list; everything else is
/// derived from them.
pub struct ServiceContext {
    /// Signed request executor
    pub transport: Arc<dyn Transport>,
    /// Response classifier loaded with every registered kind's code tables
    pub classifier: ErrorClassifier,
    /// Kind → field mapper
    pub mapper_registry: Arc<dyn MapperRegistry>,
}

impl ServiceContext {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        classifier: ErrorClassifier,
        mapper_registry: Arc<dyn MapperRegistry>,
    ) -> Self {
        Self {
            transport,
            classifier,
            mapper_registry,
        }
    }

    /// Context serving `mappers`, with their error codes registered.
    #[must_use]
    pub fn with_mappers(
        transport: Arc<dyn Transport>,
        mappers: Vec<Arc<dyn ResourceMapper>>,
    ) -> Self {
        let mut classifier = ErrorClassifier::new();
        for mapper in &mappers {
            classifier.register(mapper.kind(), &mapper.error_codes());
        }
        Self::new(
            transport,
            classifier,
            Arc::new(InMemoryMapperRegistry::with_mappers(mappers)),
        )
    }

    /// Mapper for `kind`
    pub async fn mapper(&self, kind: &str) -> Result<Arc<dyn ResourceMapper>, ErrorCause> {
        self.mapper_registry.get(kind).await.ok_or_else(|| {
            ErrorCause::Config(ProviderError::InvalidConfig {
                field: "kind".to_string(),
                detail: format!("no mapper registered for '{kind}'"),
            })
        })
    }
}
