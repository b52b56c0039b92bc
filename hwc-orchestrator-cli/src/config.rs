//! CLI configuration: TOML file plus environment overrides.
//!
//! ```toml
//! region = "cn-north-4"
//! project_id = "0123456789abcdef"
//! enterprise_project_id = "0"
//! max_retries = 2
//!
//! [timeouts]
//! create = 1800
//! delete = 1200
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use hwc_orchestrator_core::TimeoutOverrides;
use hwc_orchestrator_provider::ProjectContext;

pub const ACCESS_KEY_ENV: &str = "HUAWEICLOUD_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "HUAWEICLOUD_SECRET_ACCESS_KEY";
pub const PROJECT_ID_ENV: &str = "HUAWEICLOUD_PROJECT_ID";
pub const REGION_ENV: &str = "HUAWEICLOUD_REGION";

const DEFAULT_REGION: &str = "cn-north-4";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub region: Option<String>,
    pub project_id: Option<String>,
    pub enterprise_project_id: Option<String>,
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

/// Per-operation budgets in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSettings {
    pub create: Option<u64>,
    pub update: Option<u64>,
    pub delete: Option<u64>,
}

impl Config {
    /// Read `path` if it exists (a missing default file is fine), then apply
    /// the process environment.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::parse(&text).with_context(|| format!("parsing {}", path.display()))?
        } else if required {
            bail!("config file {} does not exist", path.display());
        } else {
            log::debug!("no config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Environment values win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(region) = lookup(REGION_ENV).filter(|v| !v.is_empty()) {
            self.region = Some(region);
        }
        if let Some(project) = lookup(PROJECT_ID_ENV).filter(|v| !v.is_empty()) {
            self.project_id = Some(project);
        }
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn project_context(&self) -> ProjectContext {
        ProjectContext {
            project_id: self.project_id.clone(),
            enterprise_project_id: self.enterprise_project_id.clone(),
            ..ProjectContext::default()
        }
    }

    pub fn timeout_overrides(&self) -> TimeoutOverrides {
        TimeoutOverrides {
            create: self.timeouts.create.map(Duration::from_secs),
            update: self.timeouts.update.map(Duration::from_secs),
            delete: self.timeouts.delete.map(Duration::from_secs),
        }
    }
}

/// Access key pair, only ever taken from the environment.
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{key} is not set"))
        };
        Ok(Self {
            access_key_id: get(ACCESS_KEY_ENV)?,
            secret_access_key: get(SECRET_KEY_ENV)?,
        })
    }
}
