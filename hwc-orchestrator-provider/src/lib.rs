//! # hwc-orchestrator-provider
//!
//! Huawei Cloud control-plane plumbing for the reconciliation core: a signed
//! HTTP transport, the error classifier and the stateless field mappers that
//! translate desired-state documents into API calls and back.
//!
//! ## Supported Kinds
//!
//! | Kind | Service | Feature Flag |
//! |------|---------|-------------|
//! | `cdn_domain` | CDN | `cdn` |
//! | `cdn_cache_refresh` | CDN | `cdn` |
//! | `cdn_cache_preheat` | CDN | `cdn` |
//! | `oms_migration_task` | OMS | `oms` |
//! | `oms_migration_task_group` | OMS | `oms` |
//!
//! ## Feature Flags
//!
//! - **`all-resources`** *(default)*: Enable every kind listed above.
//! - **`cdn`** / **`oms`**: Enable one service family only.
//! - **`native-tls`** *(default)* / **`rustls`**: TLS backend for `reqwest`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hwc_orchestrator_provider::{
//!     create_mapper, ApiRequest, HuaweicloudClient, ProjectContext, Transport,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HuaweicloudClient::builder("ak", "sk")
//!     .region("cn-north-4")
//!     .build()?;
//! let mapper = create_mapper("cdn_domain", &ProjectContext::default())?;
//!
//! let response = client.request(&mapper.build_read("domain-id")).await?;
//! println!("HTTP {}: {}", response.status, response.body);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! [`Transport`] calls return [`Result<T, ProviderError>`](ProviderError) for
//! transport-level failures only. API-level errors (including HTTP 200
//! responses carrying an error envelope) come back as a [`RawResponse`] and
//! are interpreted by [`ErrorClassifier`].

mod classifier;
mod client;
mod error;
mod factory;
mod http_client;
pub mod resources;
mod traits;
mod transport;
mod types;
pub mod utils;

// Re-export error types
pub use error::{ProviderError, Result};

pub use classifier::{ApiFault, Classification, ErrorClassifier};
pub use client::{HuaweicloudClient, HuaweicloudClientBuilder};
pub use factory::{all_kind_metadata, create_all_mappers, create_mapper, supported_kinds};
pub use resources::ProjectContext;
pub use traits::{ErrorCodes, KindMetadata, ListEndpoint, ResourceMapper, Transition};
pub use transport::{ApiRequest, Method, RawResponse, Service, Transport};
pub use types::{
    ABSENT_STATUS, Change, ChangeSet, Fields, MappingError, ObservedState, OverlappingStatus,
    Page, PageCursor, PagerConfig, ResourceSpec, StatusClass, StatusSets, StatusWait, Timeouts,
    WaitTiming,
};
