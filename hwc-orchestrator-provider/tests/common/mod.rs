//! Shared helpers for the live API tests

#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use hwc_orchestrator_provider::{
    ErrorClassifier, HuaweicloudClient, ProjectContext, ResourceMapper, create_all_mappers,
};

/// Skip the test when an environment variable is missing.
#[macro_export]
macro_rules! skip_if_no_credentials {
    ($($var:expr),+) => {
        $(
            if std::env::var($var).is_err() {
                eprintln!("skipping: environment variable {} is not set", $var);
                return;
            }
        )+
    };
}

/// Assert `Some` and unwrap it, failing the test otherwise.
#[macro_export]
macro_rules! require_some {
    ($expr:expr $(,)?) => {{
        let opt = $expr;
        assert!(opt.is_some(), "expected Some(..), got None");
        let Some(val) = opt else {
            return;
        };
        val
    }};
    ($expr:expr, $($msg:tt)+) => {{
        let opt = $expr;
        assert!(opt.is_some(), "{}", format_args!($($msg)+));
        let Some(val) = opt else {
            return;
        };
        val
    }};
}

/// Assert `Ok` and unwrap it, failing the test otherwise.
#[macro_export]
macro_rules! require_ok {
    ($expr:expr $(,)?) => {{
        let res = $expr;
        assert!(res.is_ok(), "expected Ok(..), got {res:?}");
        let Ok(val) = res else {
            return;
        };
        val
    }};
    ($expr:expr, $($msg:tt)+) => {{
        let res = $expr;
        assert!(
            res.is_ok(),
            "{}: {res:?}",
            format_args!($($msg)+)
        );
        let Ok(val) = res else {
            return;
        };
        val
    }};
}

/// Domain name that cannot exist on the account.
pub fn missing_domain_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    format!("{}", uuid.simple())
}

/// Live client plus classifier wired for every enabled kind.
pub struct TestContext {
    pub client: Arc<HuaweicloudClient>,
    pub classifier: ErrorClassifier,
    pub project: ProjectContext,
}

impl TestContext {
    pub fn huaweicloud() -> Option<Self> {
        let access_key_id = env::var("HUAWEICLOUD_ACCESS_KEY_ID").ok()?;
        let secret_access_key = env::var("HUAWEICLOUD_SECRET_ACCESS_KEY").ok()?;
        let region = env::var("HUAWEICLOUD_REGION").unwrap_or_else(|_| "cn-north-4".to_string());

        let client = HuaweicloudClient::builder(access_key_id, secret_access_key)
            .region(region)
            .build()
            .ok()?;
        let project = ProjectContext {
            project_id: env::var("HUAWEICLOUD_PROJECT_ID").ok(),
            ..ProjectContext::default()
        };

        let mut classifier = ErrorClassifier::new();
        let probe_ctx = ProjectContext {
            project_id: Some(project.project_id.clone().unwrap_or_default()),
            ..project.clone()
        };
        for mapper in create_all_mappers(&probe_ctx).ok()? {
            classifier.register(mapper.kind(), &mapper.error_codes());
        }

        Some(Self {
            client: Arc::new(client),
            classifier,
            project,
        })
    }

    pub fn mapper(&self, kind: &str) -> Option<Arc<dyn ResourceMapper>> {
        hwc_orchestrator_provider::create_mapper(kind, &self.project).ok()
    }
}
