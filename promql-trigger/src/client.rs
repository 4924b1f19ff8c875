//! PromQL client which sanitizes queries before sending them to log-cache.

use crate::sanitizer::{SanitizeError, Sanitizer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use displaydoc::Display;
use promql_http_client::{PromRequest, QueryRangeRequest, QueryRequest, QueryResult, ReqwestClient};
use std::{ops::Range, time::Duration};
use tracing::debug;

/// Default bound for each network step (sanitizing, querying)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from querying the backend
#[derive(Debug, Display)]
pub enum Error {
    /// {0}
    Sanitize(SanitizeError),
    /// Sanitizing query timed out after {0:?}
    SanitizeTimeout(Duration),
    /// Failed to make PromQL request: {0}
    Request(promql_http_client::Error),
}

impl std::error::Error for Error {}

impl From<SanitizeError> for Error {
    fn from(src: SanitizeError) -> Self {
        Self::Sanitize(src)
    }
}

impl From<promql_http_client::Error> for Error {
    fn from(src: promql_http_client::Error) -> Self {
        Self::Request(src)
    }
}

/// What went wrong, for control flow and reporting
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The query is not valid PromQL
    Parse,
    /// An app name could not be resolved to a guid
    Resolution,
    /// The backend could not be reached, or did not answer in time
    Transport,
    /// The backend answered with something other than a usable result
    Protocol,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        use promql_http_client::Error as HttpError;
        match self {
            Self::Sanitize(SanitizeError::Parse { .. } | SanitizeError::Regex(_)) => ErrorKind::Parse,
            Self::Sanitize(SanitizeError::Resolve { .. }) | Self::SanitizeTimeout(_) => {
                ErrorKind::Resolution
            }
            Self::Request(HttpError::Reqwest(_) | HttpError::Url(_)) => ErrorKind::Transport,
            Self::Request(_) => ErrorKind::Protocol,
        }
    }
}

/// The part of the backend a reader needs
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Run an instant query and decode the typed result
    async fn query(&self, query: &str) -> Result<QueryResult, Error>;
    /// Run an instant query and only report whether it returned anything
    async fn has_data(&self, query: &str) -> Result<bool, Error>;
}

/// Queries log-cache's PromQL API, resolving app names first.
pub struct QueryClient {
    addr: String,
    sanitizer: Sanitizer,
    http: ReqwestClient,
    sanitize_timeout: Duration,
    request_timeout: Duration,
}

impl QueryClient {
    /// Create a client for the backend at `addr`, sharing the connection pool of `http`
    pub fn new(addr: impl Into<String>, sanitizer: Sanitizer, http: ReqwestClient) -> Self {
        Self {
            addr: addr.into(),
            sanitizer,
            http,
            sanitize_timeout: DEFAULT_TIMEOUT,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the bounds on sanitizing and on the backend request. They are independent.
    pub fn with_timeouts(mut self, sanitize_timeout: Duration, request_timeout: Duration) -> Self {
        self.sanitize_timeout = sanitize_timeout;
        self.request_timeout = request_timeout;
        self
    }

    /// Run an instant query
    pub async fn query(&self, query: &str) -> Result<QueryResult, Error> {
        let query = self.sanitize(query).await?;
        Ok(QueryRequest::new(query)
            .send_with_client(&self.http, &self.addr, Some(self.request_timeout))
            .await?)
    }

    /// Run a range query over `range`, one point per `step`
    pub async fn query_range(
        &self,
        query: &str,
        range: Range<DateTime<Utc>>,
        step: Duration,
    ) -> Result<QueryResult, Error> {
        let query = self.sanitize(query).await?;
        Ok(QueryRangeRequest::builder(query)
            .range(range)
            .step(step)
            .build()?
            .send_with_client(&self.http, &self.addr, Some(self.request_timeout))
            .await?)
    }

    /// Run an instant query and only report whether it returned anything
    pub async fn has_data(&self, query: &str) -> Result<bool, Error> {
        let query = self.sanitize(query).await?;
        Ok(QueryRequest::new(query)
            .has_data_with_client(&self.http, &self.addr, Some(self.request_timeout))
            .await?)
    }

    async fn sanitize(&self, query: &str) -> Result<String, Error> {
        let sanitized = tokio::time::timeout(self.sanitize_timeout, self.sanitizer.sanitize(query))
            .await
            .map_err(|_| Error::SanitizeTimeout(self.sanitize_timeout))??;
        debug!("PromQL query: {sanitized}");
        Ok(sanitized)
    }
}

#[async_trait]
impl QueryBackend for QueryClient {
    async fn query(&self, query: &str) -> Result<QueryResult, Error> {
        QueryClient::query(self, query).await
    }

    async fn has_data(&self, query: &str) -> Result<bool, Error> {
        QueryClient::has_data(self, query).await
    }
}
