//! Converting `promql` function events into HTTP function events.
//!
//! The function platform POSTs every function which declares `promql` events. Each
//! declaration gets a fresh webhook path, the platform gets back the same handlers bound
//! to those paths, and the queries are persisted so the next start polls them.

use crate::{query::Query, state::StateSaver};
use displaydoc::Display;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Event type this service converts
pub const PROMQL_EVENT: &str = "promql";

/// Body of a conversion request
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConvertRequest {
    /// Functions declaring events
    #[serde(default)]
    pub functions: Vec<ConvertFunction>,
}

/// A function and the events it declares, keyed by event type
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConvertFunction {
    /// Opaque to us, handed back unchanged
    #[serde(default)]
    pub handler: Value,
    /// Declarations for each event type
    #[serde(default)]
    pub events: HashMap<String, Vec<Map<String, Value>>>,
}

/// Body of the conversion response
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConvertResponse {
    /// One HTTP function per `promql` declaration
    pub functions: Vec<HttpFunction>,
}

/// A handler bound to HTTP events
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HttpFunction {
    /// The handler from the request
    pub handler: Value,
    /// Where the handler is invoked
    pub events: Vec<HttpEvent>,
}

/// An HTTP route invoking a handler
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HttpEvent {
    /// Always POST
    pub method: String,
    /// Generated webhook path
    pub path: String,
}

/// Why a conversion request was rejected
#[derive(Debug, Display)]
pub enum RegistrationError {
    /// {0}
    Json(serde_json::Error),
    /// promql type
    MissingPromqlEvents,
    /// invalid/missing Query
    MissingQuery,
}

impl std::error::Error for RegistrationError {}

impl RegistrationError {
    /// The `{"error": "..."}` body for a 400 response
    pub fn to_json(&self) -> String {
        error_json(self.to_string())
    }
}

/// `{"error": "<msg>"}`
pub fn error_json(msg: impl Into<String>) -> String {
    serde_json::json!({ "error": msg.into() }).to_string()
}

/// A successful conversion
#[derive(Clone, Debug)]
pub struct Registration {
    /// What to answer the platform with
    pub response: ConvertResponse,
    /// What to persist
    pub queries: Vec<Query>,
}

impl Registration {
    /// The response body
    pub fn response_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.response)
    }
}

/// Convert a parsed request. Nothing is returned unless every declaration is valid.
pub fn convert(req: ConvertRequest) -> Result<Registration, RegistrationError> {
    let mut response = ConvertResponse::default();
    let mut queries = Vec::new();
    let mut paths = HashSet::new();

    for function in req.functions {
        let declarations = function
            .events
            .get(PROMQL_EVENT)
            .ok_or(RegistrationError::MissingPromqlEvents)?;

        for declaration in declarations {
            let query = match declaration.get("query") {
                Some(Value::String(query)) if !query.is_empty() => query.clone(),
                _ => return Err(RegistrationError::MissingQuery),
            };
            let context = match declaration.get("context") {
                Some(Value::String(context)) => context.clone(),
                _ => String::new(),
            };

            let path = loop {
                let path = generate_path();
                if paths.insert(path.clone()) {
                    break path;
                }
            };

            response.functions.push(HttpFunction {
                handler: function.handler.clone(),
                events: vec![HttpEvent {
                    method: "POST".into(),
                    path: path.clone(),
                }],
            });
            queries.push(Query {
                query,
                path,
                context,
            });
        }
    }

    Ok(Registration { response, queries })
}

/// `/<random non-negative i64>-prom-ql`
fn generate_path() -> String {
    format!("/{}-prom-ql", rand::rng().next_u64() >> 1)
}

/// Handles conversion requests and persists what they register
#[derive(Clone)]
pub struct Registrar {
    saver: Arc<StateSaver>,
}

impl Registrar {
    /// Create a registrar which persists through `saver`
    pub fn new(saver: Arc<StateSaver>) -> Self {
        Self { saver }
    }

    /// Parse and convert a request body
    pub fn register(&self, body: &[u8]) -> Result<Registration, RegistrationError> {
        let req: ConvertRequest = serde_json::from_slice(body).map_err(RegistrationError::Json)?;
        let registration = convert(req)?;
        info!(
            "Registered {} PromQL queries",
            registration.queries.len()
        );
        Ok(registration)
    }

    /// Persist `queries` in the background. Saving may restart this process,
    /// so it must not hold up the response.
    pub fn persist(&self, queries: Vec<Query>) -> JoinHandle<()> {
        let saver = self.saver.clone();
        tokio::spawn(async move {
            if let Err(err) = saver.save(&queries).await {
                error!("failed to save state: {err}");
            }
        })
    }
}
