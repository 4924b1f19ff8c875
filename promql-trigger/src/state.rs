//! Persisting registered queries as the trigger app's own configuration.
//!
//! Queries are stored in the app's `QUERIES` environment variable, and the app is
//! restarted so that the new process picks them up at startup.

use crate::{
    query::{Queries, Query},
    sanitizer::BoxError,
};
use async_trait::async_trait;
use displaydoc::Display;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::info;

/// Environment variable the registered queries are stored in
pub const QUERIES_ENV_VAR: &str = "QUERIES";

/// The app-management calls saving needs
#[async_trait]
pub trait AppEnvironment: Send + Sync {
    /// Merge `vars` into the app's environment
    async fn set_environment_variables(
        &self,
        app_guid: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<(), BoxError>;
    /// Restart the app
    async fn restart(&self, app_guid: &str) -> Result<(), BoxError>;
}

/// Errors from saving state
#[derive(Debug, Display)]
pub enum SaveError {
    /// Failed to encode queries: {0}
    Encode(serde_json::Error),
    /// Setting env vars failed: {0}
    SetEnvironment(BoxError),
    /// Restarting app failed: {0}
    Restart(BoxError),
    /// Saving state timed out after {0:?}
    Timeout(Duration),
}

impl std::error::Error for SaveError {}

/// Saves queries into the environment of one app, then restarts it
pub struct StateSaver {
    app_guid: String,
    platform: Arc<dyn AppEnvironment>,
    timeout: Duration,
}

impl StateSaver {
    /// Default bound on setting the environment and restarting, together
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a saver for the app with `app_guid`
    pub fn new(app_guid: impl Into<String>, platform: Arc<dyn AppEnvironment>) -> Self {
        Self {
            app_guid: app_guid.into(),
            platform,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Bound the whole save (both calls)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Store `queries` and restart. If setting the environment fails, no restart is attempted.
    pub async fn save(&self, queries: &[Query]) -> Result<(), SaveError> {
        let doc = Queries {
            queries: queries.to_vec(),
        };
        let encoded = serde_json::to_string(&doc).map_err(SaveError::Encode)?;
        let vars = BTreeMap::from([(QUERIES_ENV_VAR.to_owned(), encoded)]);

        tokio::time::timeout(self.timeout, async {
            self.platform
                .set_environment_variables(&self.app_guid, &vars)
                .await
                .map_err(SaveError::SetEnvironment)?;
            self.platform
                .restart(&self.app_guid)
                .await
                .map_err(SaveError::Restart)?;
            Ok::<_, SaveError>(())
        })
        .await
        .map_err(|_| SaveError::Timeout(self.timeout))??;

        info!("Saved {} queries, restarting {}", queries.len(), self.app_guid);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub(crate) enum Call {
        SetEnv(String, BTreeMap<String, String>),
        Restart(String),
    }

    #[derive(Default)]
    pub(crate) struct SpyPlatform {
        pub(crate) fail_set_env: bool,
        pub(crate) fail_restart: bool,
        pub(crate) calls: Mutex<Vec<Call>>,
    }

    impl SpyPlatform {
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AppEnvironment for SpyPlatform {
        async fn set_environment_variables(
            &self,
            app_guid: &str,
            vars: &BTreeMap<String, String>,
        ) -> Result<(), BoxError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::SetEnv(app_guid.to_owned(), vars.clone()));
            if self.fail_set_env {
                return Err("some-error".into());
            }
            Ok(())
        }

        async fn restart(&self, app_guid: &str) -> Result<(), BoxError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Restart(app_guid.to_owned()));
            if self.fail_restart {
                return Err("some-error".into());
            }
            Ok(())
        }
    }

    fn queries() -> Vec<Query> {
        vec![Query {
            query: "up".into(),
            path: "/1-prom-ql".into(),
            context: "ctx".into(),
        }]
    }

    #[tokio::test]
    async fn test_save_sets_env_then_restarts() {
        let spy = Arc::new(SpyPlatform::default());
        let saver = StateSaver::new("app-guid", spy.clone());

        saver.save(&queries()).await.unwrap();

        let expected_vars = BTreeMap::from([(
            "QUERIES".to_owned(),
            r#"{"queries":[{"query":"up","path":"/1-prom-ql","context":"ctx"}]}"#.to_owned(),
        )]);
        assert_eq!(
            spy.calls(),
            vec![
                Call::SetEnv("app-guid".into(), expected_vars),
                Call::Restart("app-guid".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_set_env_failure_skips_restart() {
        let spy = Arc::new(SpyPlatform {
            fail_set_env: true,
            ..Default::default()
        });
        let saver = StateSaver::new("app-guid", spy.clone());

        let err = saver.save(&queries()).await.unwrap_err();
        assert_eq!(err.to_string(), "Setting env vars failed: some-error");
        assert_eq!(spy.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_failure() {
        let spy = Arc::new(SpyPlatform {
            fail_restart: true,
            ..Default::default()
        });
        let saver = StateSaver::new("app-guid", spy.clone());

        let err = saver.save(&queries()).await.unwrap_err();
        assert_eq!(err.to_string(), "Restarting app failed: some-error");
        assert_eq!(spy.calls().len(), 2);
    }
}
