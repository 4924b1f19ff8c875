//! A reader owns one registered query. Each tick it runs the query and, when there is
//! data, POSTs it to the query's webhook.

use crate::{
    client::{ErrorKind, QueryBackend},
    query::Query,
};
use http::{StatusCode, header::CONTENT_TYPE};
use promql_http_client::ReqwestClient;
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// What gets delivered to the webhook
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DeliveryMode {
    /// The decoded result, re-encoded as JSON with the query's context attached
    #[default]
    FullResult,
    /// Only the context string, when the query returned anything
    ContextOnly,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        match src {
            "full-result" => Ok(Self::FullResult),
            "context-only" => Ok(Self::ContextOnly),
            other => Err(format!(
                "Unknown delivery mode '{other}', expected 'full-result' or 'context-only'"
            )),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullResult => f.write_str("full-result"),
            Self::ContextOnly => f.write_str("context-only"),
        }
    }
}

/// The result of one tick
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    /// The query returned data and the webhook answered 200
    Delivered,
    /// The query returned no data, so nothing was sent
    NoData,
    /// The query failed, so nothing was sent
    QueryFailed(ErrorKind),
    /// The webhook answered with this status, or could not be reached at all (None)
    DeliveryFailed(Option<u16>),
}

struct Payload {
    body: Vec<u8>,
    content_type: &'static str,
}

/// Runs one query and delivers its results
pub struct Reader {
    query: Query,
    webhook: String,
    backend: Arc<dyn QueryBackend>,
    http: ReqwestClient,
    mode: DeliveryMode,
    timeout: Duration,
}

impl Reader {
    /// Create a reader which delivers results of `query` to `webhook`
    pub fn new(
        query: Query,
        webhook: impl Into<String>,
        backend: Arc<dyn QueryBackend>,
        http: ReqwestClient,
    ) -> Self {
        Self {
            query,
            webhook: webhook.into(),
            backend,
            http,
            mode: DeliveryMode::default(),
            timeout: crate::client::DEFAULT_TIMEOUT,
        }
    }

    /// Set what gets delivered
    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bound a whole tick, query and delivery together
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The query this reader runs
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// The URL results are POSTed to
    pub fn webhook(&self) -> &str {
        &self.webhook
    }

    /// Run the query once, and deliver to the webhook if it returned data.
    ///
    /// Failures are logged and reported in the outcome. A failed tick has no effect on
    /// the next one.
    pub async fn tick(&self) -> TickOutcome {
        let deadline = Instant::now() + self.timeout;
        let payload = match self.poll(deadline).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("No data for query {}", self.query.query);
                return TickOutcome::NoData;
            }
            Err(outcome) => return outcome,
        };
        self.deliver(payload, deadline).await
    }

    async fn poll(&self, deadline: Instant) -> Result<Option<Payload>, TickOutcome> {
        match self.mode {
            DeliveryMode::FullResult => {
                let result = self.bounded(deadline, self.backend.query(&self.query.query)).await?;
                if result.is_empty() {
                    return Ok(None);
                }
                let body = serde_json::to_vec(&result.with_context(self.query.context.clone()))
                    .map_err(|err| {
                        error!("failed to encode PromQL result for {}: {err}", self.webhook);
                        TickOutcome::DeliveryFailed(None)
                    })?;
                Ok(Some(Payload {
                    body,
                    content_type: "application/json",
                }))
            }
            DeliveryMode::ContextOnly => {
                if !self.bounded(deadline, self.backend.has_data(&self.query.query)).await? {
                    return Ok(None);
                }
                Ok(Some(Payload {
                    body: self.query.context.clone().into_bytes(),
                    content_type: "text/plain; charset=utf-8",
                }))
            }
        }
    }

    async fn bounded<T>(
        &self,
        deadline: Instant,
        fut: impl Future<Output = Result<T, crate::client::Error>>,
    ) -> Result<T, TickOutcome> {
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(Ok(val)) => Ok(val),
            Ok(Err(err)) => {
                error!("failed to make PromQL query: {err}");
                Err(TickOutcome::QueryFailed(err.kind()))
            }
            Err(_) => {
                error!(
                    "PromQL query timed out after {:?}: {}",
                    self.timeout, self.query.query
                );
                Err(TickOutcome::QueryFailed(ErrorKind::Transport))
            }
        }
    }

    async fn deliver(&self, payload: Payload, deadline: Instant) -> TickOutcome {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            error!("no time left to POST to {}", self.webhook);
            return TickOutcome::DeliveryFailed(None);
        }
        let resp = self
            .http
            .post(&self.webhook)
            .header(CONTENT_TYPE, payload.content_type)
            .body(payload.body)
            .timeout(remaining)
            .send()
            .await;

        match resp {
            Err(err) => {
                error!("failed to make POST request to {}: {err}", self.webhook);
                TickOutcome::DeliveryFailed(None)
            }
            Ok(resp) if resp.status() != StatusCode::OK => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!("POST to {} returned unexpected status code {status}: {body}", self.webhook);
                TickOutcome::DeliveryFailed(Some(status.as_u16()))
            }
            Ok(_) => {
                info!("successfully made POST to {}", self.webhook);
                TickOutcome::Delivered
            }
        }
    }
}
