//! Registered queries, as persisted in the `QUERIES` environment variable.

use serde::{Deserialize, Serialize};

/// A PromQL query registered for a function, and where to deliver its results.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Query {
    /// The PromQL query, with app names in `source_id` matchers
    pub query: String,
    /// The webhook invoked when the query returns data.
    /// Persisted as a bare path; the full URL is built at startup.
    pub path: String,
    /// Opaque context, echoed to the webhook
    #[serde(default)]
    pub context: String,
}

/// The `{"queries": [...]}` document stored as platform configuration
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Queries {
    /// Every registered query
    #[serde(default)]
    pub queries: Vec<Query>,
}

impl Queries {
    /// Parse the persisted document. An empty string means nothing is registered yet.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text)
    }
}
