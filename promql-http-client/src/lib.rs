#![deny(missing_docs)]

//! Minimal API for running PromQL queries against a log-cache style metrics backend.
//!
//! To use it, instantiate one of the request objects,
//! e.g. QueryRequest or QueryRangeRequest. A builder is provided for range queries.
//!
//! Then use the `PromRequest` trait and call `send` or `send_with_client`.
//! This takes the backend url, and optionally a reqwest client to use.
//!
//! On success, the result is a `QueryResult`, whose `data` is either a vector of
//! `Sample`s or a matrix of `Series`, decided once by the `resultType` tag of the response.
//!
//! Timestamps and values are kept as `DecimalToken`s, which carry the exact text the
//! backend sent. Large integer timestamps therefore survive decoding and re-encoding
//! without any loss of precision; convert them with `to_f64` or `to_decimal` as needed.

use serde::Serialize;

mod builders;
pub use builders::QueryRangeRequestBuilder;

mod error;
pub use error::Error;

mod messages;
pub use messages::{DecimalToken, Labels, Point, QueryData, QueryResult, Sample, Series};

mod traits;
pub use traits::PromRequest;

/// Re-export of the reqwest client, so that callers can share one connection pool
pub use reqwest::Client as ReqwestClient;

/// Query parameters for /api/v1/query request
#[derive(Clone, Debug, Serialize)]
pub struct QueryRequest {
    /// The PromQL query string
    pub query: String,
}

impl QueryRequest {
    /// Make an instant query request for the given PromQL
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

impl PromRequest for QueryRequest {
    const PATH: &'static str = "/api/v1/query";
}

/// Query parameters for /api/v1/query_range request
/// Use builder to populate it
#[derive(Clone, Debug, Serialize)]
pub struct QueryRangeRequest {
    query: String,
    /// Unix seconds
    start: i64,
    /// Unix seconds
    end: i64,
    /// Duration string, e.g. `1m30s`
    step: String,
}

impl QueryRangeRequest {
    /// Get builder for query range request with given query
    pub fn builder(query: impl Into<String>) -> QueryRangeRequestBuilder {
        QueryRangeRequestBuilder::new(query.into())
    }

    /// The PromQL query string
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Start of the range, in whole unix seconds
    pub fn start(&self) -> i64 {
        self.start
    }

    /// End of the range, in whole unix seconds
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Resolution step, as a duration string
    pub fn step(&self) -> &str {
        &self.step
    }
}

impl PromRequest for QueryRangeRequest {
    const PATH: &'static str = "/api/v1/query_range";
}
