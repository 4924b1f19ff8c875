//! Triggers function webhooks when PromQL queries against log-cache return data.
//!
//! Queries are registered through a conversion endpoint, persisted in the app's own
//! environment, and polled by one [Reader] each. App names in `source_id` matchers are
//! resolved to guids before every query.

#![deny(missing_docs)]

pub mod capi;
pub mod client;
pub mod config;
pub mod query;
pub mod reader;
pub mod registration;
pub mod sanitizer;
pub mod scheduler;
pub mod state;

mod init_logging;

pub use client::{ErrorKind, QueryBackend, QueryClient};
pub use config::{TriggerConfig, VcapApplication};
pub use init_logging::init_logging;
pub use query::{Queries, Query};
pub use reader::{DeliveryMode, Reader, TickOutcome};
pub use registration::Registrar;
pub use sanitizer::{GuidResolver, Sanitizer};
pub use scheduler::Scheduler;
pub use state::StateSaver;
