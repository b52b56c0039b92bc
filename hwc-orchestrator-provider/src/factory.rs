//! Mapper factory functions and metadata.

use std::sync::Arc;

use crate::error::{ProviderError, Result};
use crate::resources::ProjectContext;
use crate::traits::{KindMetadata, ResourceMapper};

#[cfg(feature = "cdn")]
use crate::resources::cdn::{CacheTaskMapper, CacheTaskType, CdnDomainMapper, cache_task, domain};
#[cfg(feature = "oms")]
use crate::resources::oms::{MigrationTaskGroupMapper, MigrationTaskMapper, task, task_group};

/// Kinds enabled via feature flags, in a stable order.
pub fn supported_kinds() -> Vec<&'static str> {
    vec![
        #[cfg(feature = "cdn")]
        domain::KIND,
        #[cfg(feature = "cdn")]
        cache_task::REFRESH_KIND,
        #[cfg(feature = "cdn")]
        cache_task::PREHEAT_KIND,
        #[cfg(feature = "oms")]
        task::KIND,
        #[cfg(feature = "oms")]
        task_group::KIND,
    ]
}

/// Creates the [`ResourceMapper`] for `kind`.
///
/// OMS kinds need `ctx.project_id`; asking for one without it is a
/// configuration error rather than a failure on the first request.
pub fn create_mapper(kind: &str, ctx: &ProjectContext) -> Result<Arc<dyn ResourceMapper>> {
    match kind {
        #[cfg(feature = "cdn")]
        domain::KIND => Ok(Arc::new(CdnDomainMapper::new(ctx.clone()))),
        #[cfg(feature = "cdn")]
        cache_task::REFRESH_KIND => Ok(Arc::new(CacheTaskMapper::new(
            CacheTaskType::Refresh,
            ctx.clone(),
        ))),
        #[cfg(feature = "cdn")]
        cache_task::PREHEAT_KIND => Ok(Arc::new(CacheTaskMapper::new(
            CacheTaskType::Preheat,
            ctx.clone(),
        ))),
        #[cfg(feature = "oms")]
        task::KIND => Ok(Arc::new(MigrationTaskMapper::new(
            require_project(kind, ctx)?,
            ctx.clone(),
        ))),
        #[cfg(feature = "oms")]
        task_group::KIND => Ok(Arc::new(MigrationTaskGroupMapper::new(
            require_project(kind, ctx)?,
            ctx.clone(),
        ))),
        other => Err(ProviderError::InvalidConfig {
            field: "kind".to_string(),
            detail: format!(
                "unsupported resource kind '{other}' (supported: {})",
                supported_kinds().join(", ")
            ),
        }),
    }
}

/// Mappers for every enabled kind.
pub fn create_all_mappers(ctx: &ProjectContext) -> Result<Vec<Arc<dyn ResourceMapper>>> {
    supported_kinds()
        .into_iter()
        .map(|kind| create_mapper(kind, ctx))
        .collect()
}

/// Returns metadata for all kinds enabled via feature flags.
pub fn all_kind_metadata() -> Vec<KindMetadata> {
    let ctx = ProjectContext {
        project_id: Some(String::new()),
        ..ProjectContext::default()
    };
    supported_kinds()
        .into_iter()
        .filter_map(|kind| create_mapper(kind, &ctx).ok())
        .map(|mapper| mapper.metadata())
        .collect()
}

#[cfg(feature = "oms")]
fn require_project<'a>(kind: &str, ctx: &'a ProjectContext) -> Result<&'a str> {
    ctx.project_id
        .as_deref()
        .ok_or_else(|| ProviderError::InvalidConfig {
            field: "project_id".to_string(),
            detail: format!("'{kind}' needs a project id"),
        })
}
