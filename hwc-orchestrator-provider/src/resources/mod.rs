//! Field mappers for the supported resource kinds.

#[cfg(feature = "cdn")]
pub mod cdn;
pub mod codes;
pub(crate) mod common;
#[cfg(feature = "oms")]
pub mod oms;

use serde::{Deserialize, Serialize};

/// Account-level settings the mappers need to build paths and bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Project id substituted into OMS paths.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Enterprise project sent as a query parameter to CDN endpoints.
    #[serde(default)]
    pub enterprise_project_id: Option<String>,
    /// Destination bucket keys used when a migration spec omits them.
    #[serde(default, skip_serializing)]
    pub destination_access_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub destination_secret_key: Option<String>,
}

impl ProjectContext {
    /// Use the provider's own credentials as the migration destination fallback.
    #[must_use]
    pub fn with_destination_keys(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.destination_access_key = Some(access_key.into());
        self.destination_secret_key = Some(secret_key.into());
        self
    }
}
