use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{header::HeaderMap, Method, Response};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::{Deserialize, Serialize};
use wedeploy_common::models::{
    activity::{Activities, ActivitiesFilter},
    project::{Project, ProjectCreateRequest},
    service::{EnvVariable, LinkRequest, Service, ServiceCreateRequest},
};

#[cfg(feature = "tracing")]
mod middleware;
#[cfg(feature = "tracing")]
use tracing::debug;

#[cfg(feature = "tracing")]
use crate::middleware::LoggingMiddleware;

pub mod util;
use util::{api_error, ParsedJson, ToBodyContent};

/// Timeout for the usage metrics bulk submission
pub const BULK_EVENTS_TIMEOUT: Duration = Duration::from_secs(5);

/// How requests authenticate. A token wins over username and password.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Credentials {
    #[default]
    None,
    Token(String),
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn from_parts(
        token: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        match (token, username) {
            (Some(token), _) => Credentials::Token(token),
            (None, Some(username)) => Credentials::Basic {
                username,
                password: password.unwrap_or_default(),
            },
            (None, None) => Credentials::None,
        }
    }
}

#[derive(Clone)]
pub struct WeDeployApiClient {
    pub client: ClientWithMiddleware,
    pub api_url: String,
    pub credentials: Credentials,
}

impl WeDeployApiClient {
    pub fn new(
        api_url: String,
        credentials: Credentials,
        headers: Option<HeaderMap>,
        timeout: Option<u64>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Ok(proxy) = std::env::var("HTTP_PROXY") {
            builder = builder.proxy(reqwest::Proxy::http(proxy).context("invalid HTTP_PROXY")?);
        }

        if let Ok(proxy) = std::env::var("HTTPS_PROXY") {
            builder =
                builder.proxy(reqwest::Proxy::https(proxy).context("invalid HTTPS_PROXY")?);
        }

        if let Some(headers) = headers {
            builder = builder.default_headers(headers);
        }

        let client = builder
            .timeout(Duration::from_secs(timeout.unwrap_or(60)))
            .build()
            .context("failed to build the HTTP client")?;

        let builder = reqwest_middleware::ClientBuilder::new(client);

        #[cfg(feature = "tracing")]
        let builder = builder.with(LoggingMiddleware);

        let client = builder.build();

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    pub fn set_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.credentials {
            Credentials::Token(ref token) => builder.bearer_auth(token),
            Credentials::Basic {
                ref username,
                ref password,
            } => builder.basic_auth(username, Some(password)),
            Credentials::None => builder,
        }
    }

    pub async fn get_projects(&self) -> Result<ParsedJson<Vec<Project>>> {
        self.get_json("/projects").await
    }

    pub async fn get_project(&self, project: &str) -> Result<ParsedJson<Project>> {
        self.get_json(format!("/projects/{project}")).await
    }

    pub async fn create_project(&self, project: &str) -> Result<ParsedJson<Project>> {
        self.post_json(
            "/projects",
            Some(ProjectCreateRequest {
                project_id: project.to_owned(),
            }),
        )
        .await
    }

    /// Creates the project unless it is already there
    pub async fn ensure_project(&self, project: &str) -> Result<()> {
        match self.create_project(project).await {
            Ok(_) => Ok(()),
            Err(e) if api_error(&e).is_some_and(|e| e.is_already_exists()) => {
                #[cfg(feature = "tracing")]
                debug!(project, "project already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_project(&self, project: &str) -> Result<()> {
        self.request(Method::DELETE, format!("/projects/{project}"), Option::<()>::None)
            .await?
            .to_empty()
            .await
    }

    pub async fn get_services(&self, project: &str) -> Result<ParsedJson<Vec<Service>>> {
        self.get_json(format!("/projects/{project}/services")).await
    }

    pub async fn get_service(&self, project: &str, service: &str) -> Result<ParsedJson<Service>> {
        self.get_json(format!("/projects/{project}/services/{service}"))
            .await
    }

    pub async fn create_service(
        &self,
        project: &str,
        req: &ServiceCreateRequest,
    ) -> Result<ParsedJson<Service>> {
        self.post_json(format!("/projects/{project}/services"), Some(req))
            .await
    }

    /// Installs the service definition unless a service with this id is already there
    pub async fn ensure_service(&self, project: &str, req: &ServiceCreateRequest) -> Result<()> {
        match self.create_service(project, req).await {
            Ok(_) => Ok(()),
            Err(e) if api_error(&e).is_some_and(|e| e.is_already_exists()) => {
                #[cfg(feature = "tracing")]
                debug!(project, service = %req.service_id, "service already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_service(&self, project: &str, service: &str) -> Result<()> {
        self.request(
            Method::DELETE,
            format!("/projects/{project}/services/{service}"),
            Option::<()>::None,
        )
        .await?
        .to_empty()
        .await
    }

    /// Uploads a gzipped tarball of the service. Activities of the resulting
    /// build and deploy carry `group_uid`.
    pub async fn upload_bundle(
        &self,
        project: &str,
        service: &str,
        group_uid: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let url = format!("{}/projects/{project}/services/{service}/deploy", self.api_url);
        let mut builder = self.client.post(url);
        builder = self.set_auth(builder);

        builder
            .query(&[("groupUid", group_uid)])
            .header("Content-Type", "application/gzip")
            .body(data)
            .send()
            .await
            .context("failed to upload bundle")?
            .to_empty()
            .await
    }

    pub async fn link_service(&self, project: &str, req: &LinkRequest) -> Result<()> {
        self.request(
            Method::POST,
            format!("/projects/{project}/services/{}/link", req.service_id),
            Some(req),
        )
        .await?
        .to_empty()
        .await
    }

    pub async fn get_activities(
        &self,
        project: &str,
        filter: &ActivitiesFilter,
    ) -> Result<ParsedJson<Activities>> {
        let url = format!("{}/projects/{project}/activities", self.api_url);
        let mut builder = self.client.get(url);
        builder = self.set_auth(builder);

        builder
            .query(&filter.to_query())
            .send()
            .await
            .context("failed to fetch activities")?
            .to_json()
            .await
    }

    pub async fn get_env(
        &self,
        project: &str,
        service: &str,
    ) -> Result<ParsedJson<Vec<EnvVariable>>> {
        self.get_json(format!("/projects/{project}/services/{service}/env"))
            .await
    }

    pub async fn set_env(&self, project: &str, service: &str, vars: &[EnvVariable]) -> Result<()> {
        self.request(
            Method::PUT,
            format!("/projects/{project}/services/{service}/env"),
            Some(vars),
        )
        .await?
        .to_empty()
        .await
    }

    pub async fn unset_env(&self, project: &str, service: &str, name: &str) -> Result<()> {
        let name = utf8_percent_encode(name, NON_ALPHANUMERIC).to_string();

        self.request(
            Method::DELETE,
            format!("/projects/{project}/services/{service}/env/{name}"),
            Option::<()>::None,
        )
        .await?
        .to_empty()
        .await
    }

    /// Sends an NDJSON bulk body of usage events
    pub async fn submit_events(&self, ndjson: String) -> Result<()> {
        let url = format!("{}/events/_bulk", self.api_url);
        let mut builder = self.client.post(url);
        builder = self.set_auth(builder);

        builder
            .timeout(BULK_EVENTS_TIMEOUT)
            .header("Content-Type", "application/x-ndjson")
            .body(ndjson)
            .send()
            .await
            .context("failed to submit usage events")?
            .to_empty()
            .await
    }

    /// Authenticated request with a raw body, used by `we curl`
    pub async fn raw_request(
        &self,
        method: Method,
        path: impl AsRef<str>,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.api_url, path.as_ref());
        let mut builder = self.client.request(method, url);
        builder = self.set_auth(builder);

        if let Some(body) = body {
            builder = builder.body(body);
            builder = builder.header("Content-Type", "application/json");
        }

        Ok(builder.send().await?)
    }

    pub async fn request<T: Serialize>(
        &self,
        method: Method,
        path: impl AsRef<str>,
        body: Option<T>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.api_url, path.as_ref());

        let mut builder = self.client.request(method, url);
        builder = self.set_auth(builder);

        if let Some(body) = body {
            let body = serde_json::to_string(&body)?;
            #[cfg(feature = "tracing")]
            debug!("Outgoing body: {}", body);
            builder = builder.body(body);
            builder = builder.header("Content-Type", "application/json");
        }

        Ok(builder.send().await?)
    }

    pub async fn get_json<R>(&self, path: impl AsRef<str>) -> Result<ParsedJson<R>>
    where
        R: for<'de> Deserialize<'de>,
    {
        self.request(Method::GET, path, Option::<()>::None)
            .await?
            .to_json()
            .await
    }

    pub async fn post_json<T: Serialize, R>(
        &self,
        path: impl AsRef<str>,
        body: Option<T>,
    ) -> Result<ParsedJson<R>>
    where
        R: for<'de> Deserialize<'de>,
    {
        self.request(Method::POST, path, body).await?.to_json().await
    }
}
