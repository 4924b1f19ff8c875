//! Configuration of the trigger, and wiring it into a scheduler.

use crate::{
    capi::PlatformClient,
    client::QueryClient,
    query::Queries,
    reader::{DeliveryMode, Reader},
    sanitizer::Sanitizer,
    scheduler::Scheduler,
    state::StateSaver,
};
use conf::Conf;
use promql_http_client::ReqwestClient;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};

/// Application metadata the platform provides in `VCAP_APPLICATION`
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct VcapApplication {
    /// Platform API address
    pub cf_api: String,
    /// Guid of this app
    pub application_id: String,
    /// Guid of this app's space
    pub space_id: String,
}

impl VcapApplication {
    /// The platform API address. Traffic stays inside the platform, so plain http is used.
    pub fn platform_addr(&self) -> String {
        self.cf_api.replacen("https", "http", 1)
    }

    /// The log-cache address, derived from the platform API address
    pub fn log_cache_addr(&self) -> String {
        self.platform_addr().replacen("api", "log-cache", 1)
    }
}

/// A humantime duration which must be non-zero
fn parse_period(src: &str) -> Result<Duration, String> {
    let period = humantime::parse_duration(src).map_err(|err| err.to_string())?;
    if period.is_zero() {
        return Err(format!("'{src}' must be greater than zero"));
    }
    Ok(period)
}

fn parse_queries(src: &str) -> Result<Queries, serde_json::Error> {
    Queries::parse(src)
}

/// Config for the trigger: where queries run, where results go, how often
#[derive(Conf, Debug)]
pub struct TriggerConfig {
    /// Platform metadata for this app, as JSON
    #[conf(long, env, value_parser = serde_json::from_str)]
    pub vcap_application: VcapApplication,
    /// Registered queries, as JSON `{"queries": [...]}`
    #[conf(long, env, value_parser = parse_queries)]
    pub queries: Option<Queries>,
    /// How often every query runs
    #[conf(long, env, default_value = "1s", value_parser = parse_period)]
    pub interval: Duration,
    /// Host of the function platform, which serves the webhooks
    #[conf(long, env)]
    pub cf_faas_addr: String,
    /// Bearer token for the platform API
    #[conf(long, env)]
    pub platform_token: Option<String>,
    /// How many readers may tick at once
    #[conf(long, env, default_value = "1")]
    pub reader_concurrency: usize,
    /// Deliver only the query context, instead of the full result
    #[conf(long, env)]
    pub context_only: bool,
    /// Bound on each network step
    #[conf(long, env, default_value = "5s", value_parser = parse_period)]
    pub operation_timeout: Duration,
}

impl TriggerConfig {
    /// How readers deliver
    pub fn delivery_mode(&self) -> DeliveryMode {
        if self.context_only {
            DeliveryMode::ContextOnly
        } else {
            DeliveryMode::FullResult
        }
    }

    /// Full webhook URL for a registered path
    pub fn webhook_url(&self, path: &str) -> String {
        format!("http://{}{}", self.cf_faas_addr, path)
    }

    /// Client for the platform API, scoped to our space
    pub fn platform_client(&self, http: ReqwestClient) -> PlatformClient {
        PlatformClient::new(
            http,
            self.vcap_application.platform_addr(),
            &self.vcap_application.space_id,
        )
        .with_token(self.platform_token.clone())
        .with_timeout(self.operation_timeout)
    }

    /// Saver which persists queries into this app
    pub fn state_saver(&self, platform: PlatformClient) -> StateSaver {
        StateSaver::new(&self.vcap_application.application_id, Arc::new(platform))
            .with_timeout(self.operation_timeout)
    }

    /// One reader per registered query, sharing one query client
    pub fn scheduler(&self, http: ReqwestClient, platform: PlatformClient) -> Scheduler {
        let sanitizer = Sanitizer::new(Arc::new(platform));
        let backend = Arc::new(
            QueryClient::new(self.vcap_application.log_cache_addr(), sanitizer, http.clone())
                .with_timeouts(self.operation_timeout, self.operation_timeout),
        );

        let readers = self
            .queries
            .iter()
            .flat_map(|queries| &queries.queries)
            .map(|query| {
                Reader::new(
                    query.clone(),
                    self.webhook_url(&query.path),
                    backend.clone(),
                    http.clone(),
                )
                .with_mode(self.delivery_mode())
                .with_timeout(self.operation_timeout)
            })
            .collect();

        Scheduler::new(readers).with_concurrency(self.reader_concurrency)
    }
}
