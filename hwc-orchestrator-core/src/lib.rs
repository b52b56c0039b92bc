//! Huawei Cloud Orchestrator Core Library
//!
//! Drives remote resources toward a declared desired state:
//! - Resource reconciliation (create / read / update / delete / apply / list)
//! - Bounded status waiting for asynchronous operations
//! - Paginated collection fetching
//! - Change-set computation between desired and observed state
//!
//! Field mapping, signing and error classification live in
//! `hwc-orchestrator-provider`; this crate only orchestrates.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hwc_orchestrator_core::{ResourceReconciler, ServiceContext};
//! use hwc_orchestrator_provider::{HuaweicloudClient, ProjectContext, ResourceSpec, create_all_mappers};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = HuaweicloudClient::builder(ak, sk).region("cn-north-4").build()?;
//! let project = ProjectContext { project_id: Some(project_id), ..Default::default() };
//! let ctx = ServiceContext::with_mappers(Arc::new(client), create_all_mappers(&project)?);
//! let reconciler = ResourceReconciler::new(Arc::new(ctx));
//!
//! let spec: ResourceSpec = serde_json::from_str(doc)?;
//! let observed = reconciler.apply(&spec, &CancellationToken::new()).await?;
//! println!("{} is {:?}", observed.remote_id, observed.status);
//! ```

pub mod diff;
pub mod error;
pub mod pager;
pub mod services;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod traits;
pub mod waiter;

// Re-export common types
pub use error::{CoreResult, ErrorCause, Phase, ReconcileError};
pub use services::{ResourceReconciler, ServiceContext, TimeoutOverrides};
pub use traits::{InMemoryMapperRegistry, MapperRegistry};
pub use waiter::{OperationHandle, ProbeResult, WaitError, WaitOutcome};
