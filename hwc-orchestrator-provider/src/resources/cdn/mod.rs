//! Huawei Cloud CDN kinds

pub mod cache_task;
pub mod domain;

pub use cache_task::{CacheTaskMapper, CacheTaskType};
pub use domain::CdnDomainMapper;

use crate::types::WaitTiming;

/// Domain activation and deactivation.
pub const CDN_TIMING: WaitTiming = WaitTiming::secs(20, 20);

/// Refresh and preheat completion.
pub const CACHE_TASK_TIMING: WaitTiming = WaitTiming::secs(3, 5);
