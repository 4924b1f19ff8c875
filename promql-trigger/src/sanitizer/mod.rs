//! Rewriting app names in PromQL queries into the guids log-cache indexes by.
//!
//! Users write `metric{source_id="my-app"}`, but log-cache only knows `my-app` by its guid.
//! The sanitizer finds every `source_id` value with a real PromQL parser, resolves each one,
//! and then substitutes the matchers in the query text. The substitution is textual, so
//! everything else in the query stays byte-for-byte what the user registered.

use async_trait::async_trait;
use displaydoc::Display;
use regex::{NoExpand, Regex};
use std::{error::Error, sync::Arc};
use tracing::debug;

mod extract;
pub use extract::{ParseError, SOURCE_ID_LABEL, extract_label_values, extract_source_ids};

/// Boxed error from a resolver
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Resolves an app name to the guid which log-cache indexes the app's data by.
#[async_trait]
pub trait GuidResolver: Send + Sync {
    /// Look up the guid of the app called `app_name`
    async fn app_guid(&self, app_name: &str) -> Result<String, BoxError>;
}

/// Errors from sanitizing a query
#[derive(Debug, Display)]
pub enum SanitizeError {
    /// Failed to parse PromQL query {query}: {err}
    Parse {
        /// The query as registered
        query: String,
        /// What the parser reported
        err: ParseError,
    },
    /// Failed to fetch guid for {name}: {err}
    Resolve {
        /// The app name which could not be resolved
        name: String,
        /// What the resolver reported
        err: BoxError,
    },
    /// Failed to create regex: {0}
    Regex(regex::Error),
}

impl Error for SanitizeError {}

impl From<regex::Error> for SanitizeError {
    fn from(src: regex::Error) -> Self {
        Self::Regex(src)
    }
}

/// Replaces `source_id` app names in queries with app guids
#[derive(Clone)]
pub struct Sanitizer {
    resolver: Arc<dyn GuidResolver>,
}

impl Sanitizer {
    /// Create a sanitizer which looks guids up with `resolver`
    pub fn new(resolver: Arc<dyn GuidResolver>) -> Self {
        Self { resolver }
    }

    /// Rewrite every `source_id="<app name>"` in `query` to `source_id="<app guid>"`.
    ///
    /// Each distinct name is resolved once, in the order it first appears. The first
    /// resolution failure aborts the whole call. Nothing is cached between calls, since
    /// an app can be deleted and recreated under the same name.
    ///
    /// Names are substituted one after another, in that same order. If a guid is itself
    /// the name of another app used later in the same query, it gets rewritten again.
    pub async fn sanitize(&self, query: &str) -> Result<String, SanitizeError> {
        let names = extract_source_ids(query).map_err(|err| SanitizeError::Parse {
            query: query.to_owned(),
            err,
        })?;

        let mut guids = Vec::with_capacity(names.len());
        for name in names {
            match self.resolver.app_guid(&name).await {
                Ok(guid) => guids.push((name, guid)),
                Err(err) => return Err(SanitizeError::Resolve { name, err }),
            }
        }

        let mut query = query.to_owned();
        for (name, guid) in &guids {
            debug!("Resolved {SOURCE_ID_LABEL} {name} to {guid}");
            let replacement = format!(r#"{SOURCE_ID_LABEL}="{guid}""#);
            query = source_id_matcher(name)?
                .replace_all(&query, NoExpand(&replacement))
                .into_owned();
        }

        Ok(query)
    }
}

/// Matches `source_id="<name>"`, `source_id='<name>'` or `` source_id=`<name>` ``,
/// with any whitespace around `=`.
/// The label name must start at a word boundary, so `other_source_id` never matches.
fn source_id_matcher(name: &str) -> Result<Regex, regex::Error> {
    let name = regex::escape(name);
    Regex::new(&format!(
        r#"\b{SOURCE_ID_LABEL}\s*=\s*(?:"{name}"|'{name}'|`{name}`)"#
    ))
}
