//! Trait for PromQL API requests

use crate::{Error, QueryResult, messages::PromResponse};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::time::Duration;

/// Trait for types that can be sent as PromQL API requests.
///
/// The request is serialized as the query string of a GET to `PATH` on the backend host.
#[async_trait::async_trait]
pub trait PromRequest: Serialize + Sync {
    /// The API path for this request type (e.g., "/api/v1/query")
    const PATH: &'static str;

    /// Send the request to the given backend URL
    async fn send(&self, host: &str) -> Result<QueryResult, Error> {
        self.send_with_client(&Client::new(), host, None).await
    }

    /// Send the request using the provided reqwest client, and decode the typed result.
    ///
    /// `timeout`, if given, bounds the whole request including reading the body.
    async fn send_with_client(
        &self,
        client: &Client,
        host: &str,
        timeout: Option<Duration>,
    ) -> Result<QueryResult, Error> {
        let body = self.fetch(client, host, timeout).await?;
        serde_json::from_slice::<PromResponse>(&body)?.into_result()
    }

    /// Send the request, and only report whether the result had any entries.
    ///
    /// The entries are counted without being decoded, so this works for any `resultType`.
    async fn has_data_with_client(
        &self,
        client: &Client,
        host: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, Error> {
        let body = self.fetch(client, host, timeout).await?;
        Ok(serde_json::from_slice::<PromResponse>(&body)?.result_count() > 0)
    }

    /// Perform the GET and return the body of a 200 response
    async fn fetch(
        &self,
        client: &Client,
        host: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, Error> {
        let url = Url::parse(host)?.join(Self::PATH)?;

        let mut req = client.get(url).query(&self);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if status != StatusCode::OK {
            // Whatever could be read is good enough for diagnostics
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status(status.as_u16(), body));
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
