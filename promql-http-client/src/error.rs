//! Error types for promql-http-client

use displaydoc::Display;
use url::ParseError;

/// Errors that can occur when making PromQL API requests
#[derive(Debug, Display)]
pub enum Error {
    /// URL: {0}
    Url(ParseError),
    /// Reqwest: {0}
    Reqwest(reqwest::Error),
    /// Unexpected status code {0} getting PromQL results: {1}
    Status(u16, String),
    /// API: {0}: {1}
    API(String, String),
    /// Invalid JSON: {0}
    Json(serde_json::Error),
    /// Unknown result type: {0}
    UnknownResultType(String),
    /// Missing data on success response
    MissingData,
    /// Invalid request: {0}
    InvalidRequest(String),
}

impl Error {
    /// True if the request never produced a response (connect failure, timeout, ...)
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Reqwest(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(src: reqwest::Error) -> Self {
        Self::Reqwest(src)
    }
}

impl From<ParseError> for Error {
    fn from(src: ParseError) -> Self {
        Self::Url(src)
    }
}

impl From<serde_json::Error> for Error {
    fn from(src: serde_json::Error) -> Self {
        Self::Json(src)
    }
}

impl std::error::Error for Error {}
