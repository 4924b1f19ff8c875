//! Minimal client for the platform's v3 API: looking up apps, setting
//! environment variables and restarting.

use crate::{
    sanitizer::{BoxError, GuidResolver},
    state::AppEnvironment,
};
use async_trait::async_trait;
use displaydoc::Display;
use promql_http_client::ReqwestClient;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use tracing::debug;
use url::Url;

/// Errors from the platform API
#[derive(Debug, Display)]
pub enum PlatformError {
    /// Url parse error: {0}
    Url(url::ParseError),
    /// Reqwest error: {0}
    Reqwest(reqwest::Error),
    /// Unexpected status code {0} from platform API: {1}
    Status(u16, String),
    /// No app named {name} in space {space_guid}
    AppNotFound {
        /// App name that was looked up
        name: String,
        /// Space that was searched
        space_guid: String,
    },
}

impl std::error::Error for PlatformError {}

impl From<url::ParseError> for PlatformError {
    fn from(src: url::ParseError) -> Self {
        Self::Url(src)
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(src: reqwest::Error) -> Self {
        Self::Reqwest(src)
    }
}

#[derive(Deserialize)]
struct AppList {
    #[serde(default)]
    resources: Vec<AppResource>,
}

#[derive(Deserialize)]
struct AppResource {
    guid: String,
}

#[derive(Serialize)]
struct EnvironmentVariables<'a> {
    var: &'a BTreeMap<String, String>,
}

/// Talks to the platform API at `addr`, scoped to one space
#[derive(Clone)]
pub struct PlatformClient {
    http: ReqwestClient,
    addr: String,
    space_guid: String,
    token: Option<String>,
    timeout: Duration,
}

impl PlatformClient {
    /// Create a client for apps in `space_guid`
    pub fn new(http: ReqwestClient, addr: impl Into<String>, space_guid: impl Into<String>) -> Self {
        Self {
            http,
            addr: addr.into(),
            space_guid: space_guid.into(),
            token: None,
            timeout: crate::client::DEFAULT_TIMEOUT,
        }
    }

    /// Send this bearer token with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Bound each request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Look up the guid of the app called `name` in our space
    pub async fn app_guid(&self, name: &str) -> Result<String, PlatformError> {
        let url = self.url("/v3/apps")?;
        let resp = self
            .authorized(self.http.get(url))
            .query(&[("names", name), ("space_guids", self.space_guid.as_str())])
            .send()
            .await?;
        let list: AppList = Self::check(resp).await?.json().await?;
        let guid = list
            .resources
            .into_iter()
            .next()
            .map(|app| app.guid)
            .ok_or_else(|| PlatformError::AppNotFound {
                name: name.to_owned(),
                space_guid: self.space_guid.clone(),
            })?;
        debug!("App {name} has guid {guid}");
        Ok(guid)
    }

    /// Merge `vars` into the environment of the app with `app_guid`
    pub async fn set_environment_variables(
        &self,
        app_guid: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!("/v3/apps/{app_guid}/environment_variables"))?;
        let resp = self
            .authorized(self.http.patch(url))
            .json(&EnvironmentVariables { var: vars })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Restart the app with `app_guid`
    pub async fn restart(&self, app_guid: &str) -> Result<(), PlatformError> {
        let url = self.url(&format!("/v3/apps/{app_guid}/actions/restart"))?;
        let resp = self.authorized(self.http.post(url)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, PlatformError> {
        Ok(Url::parse(&self.addr)?.join(path)?)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.timeout(self.timeout);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlatformError::Status(status.as_u16(), body));
        }
        Ok(resp)
    }
}

#[async_trait]
impl GuidResolver for PlatformClient {
    async fn app_guid(&self, app_name: &str) -> Result<String, BoxError> {
        Ok(PlatformClient::app_guid(self, app_name).await?)
    }
}

#[async_trait]
impl AppEnvironment for PlatformClient {
    async fn set_environment_variables(
        &self,
        app_guid: &str,
        vars: &BTreeMap<String, String>,
    ) -> Result<(), BoxError> {
        Ok(PlatformClient::set_environment_variables(self, app_guid, vars).await?)
    }

    async fn restart(&self, app_guid: &str) -> Result<(), BoxError> {
        Ok(PlatformClient::restart(self, app_guid).await?)
    }
}
