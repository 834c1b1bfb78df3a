//! Netlify REST API adapter
//!
//! A Netlify "site" plays the role of a project. Submission resolves the site
//! (explicit `site_id`, lookup by name, or creation linked to the GitHub repo),
//! pushes environment variables into the site's build settings and triggers a
//! build. The build's `deploy_id` is what gets polled.

use crate::platform::adapter::{DeploymentLookup, PlatformAdapter};
use crate::platform::http::{build_client, check_response, endpoint};
use crate::platform::types::{
    AdapterError, Platform, PlatformOptions, ProviderState, StatusReport, SubmitRequest,
    Submission,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
pub struct NetlifyAdapter {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct SiteResponse {
    id: String,
    name: Option<String>,
    ssl_url: Option<String>,
    url: Option<String>,
    published_deploy: Option<DeployResponse>,
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    id: String,
    deploy_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeployResponse {
    id: String,
    state: Option<String>,
    ssl_url: Option<String>,
    deploy_ssl_url: Option<String>,
    url: Option<String>,
    error_message: Option<String>,
}

impl DeployResponse {
    fn into_report(self) -> StatusReport {
        StatusReport {
            state: map_deploy_state(self.state.as_deref()),
            url: self.ssl_url.or(self.url).or(self.deploy_ssl_url),
            message: self.error_message,
            deployment_id: self.id,
        }
    }
}

/// Map Netlify's deploy `state` onto the canonical provider state
pub fn map_deploy_state(state: Option<&str>) -> ProviderState {
    match state.map(str::to_lowercase).as_deref() {
        None | Some("new") | Some("pending_review") | Some("accepted") | Some("enqueued") => {
            ProviderState::Queued
        }
        Some("building") | Some("uploading") | Some("uploaded") | Some("preparing")
        | Some("prepared") | Some("processing") | Some("processed") => ProviderState::Building,
        Some("ready") => ProviderState::Ready,
        Some("error") | Some("rejected") => ProviderState::Error,
        Some("canceled") | Some("cancelled") => ProviderState::Canceled,
        Some(other) => ProviderState::Unknown(other.to_string()),
    }
}

impl NetlifyAdapter {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.to_string(),
            token: token.into(),
        })
    }

    async fn resolve_site(&self, request: &SubmitRequest) -> Result<String, AdapterError> {
        if let Some(PlatformOptions::Netlify {
            site_id: Some(site_id),
        }) = &request.config.options
        {
            return Ok(site_id.clone());
        }

        let name = request.project_name();
        let response = self
            .client
            .get(endpoint(&self.base_url, "sites"))
            .bearer_auth(&self.token)
            .query(&[("name", name.as_str()), ("filter", "all")])
            .send()
            .await?;
        let sites: Vec<SiteResponse> = check_response(response).await?.json().await?;
        if let Some(site) = sites
            .into_iter()
            .find(|site| site.name.as_deref() == Some(name.as_str()))
        {
            debug!("Found Netlify site {} ({})", name, site.id);
            return Ok(site.id);
        }

        let repo_slug = request.repo_slug().ok_or_else(|| {
            AdapterError::Validation(format!(
                "Netlify sites can only be linked to GitHub repositories, got '{}'",
                request.repo_url
            ))
        })?;

        let body = json!({
            "name": name,
            "repo": {
                "provider": "github",
                "repo": repo_slug,
                "branch": request.config.branch.as_deref().unwrap_or("main"),
                "cmd": request.config.build_command,
                "base": request.config.root_directory,
            },
        });
        let response = self
            .client
            .post(endpoint(&self.base_url, "sites"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let site: SiteResponse = check_response(response).await?.json().await?;
        info!("Created Netlify site {} ({})", name, site.id);
        Ok(site.id)
    }

    async fn push_env_vars(
        &self,
        site_id: &str,
        request: &SubmitRequest,
    ) -> Result<(), AdapterError> {
        if request.config.env_vars.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .patch(endpoint(&self.base_url, &format!("sites/{}", site_id)))
            .bearer_auth(&self.token)
            .json(&json!({ "build_settings": { "env": request.config.env_vars } }))
            .send()
            .await?;
        check_response(response).await?;
        debug!(
            "Updated {} environment variables on site {}",
            request.config.env_vars.len(),
            site_id
        );
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for NetlifyAdapter {
    fn platform(&self) -> Platform {
        Platform::Netlify
    }

    fn adapter_name(&self) -> &'static str {
        "netlify-api"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, AdapterError> {
        let site_id = self.resolve_site(request).await?;
        self.push_env_vars(&site_id, request).await?;

        let response = self
            .client
            .post(endpoint(&self.base_url, &format!("sites/{}/builds", site_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let build: BuildResponse = check_response(response).await?.json().await?;
        let deployment_id = build.deploy_id.ok_or_else(|| {
            AdapterError::InvalidResponse(format!("build {} has no deploy_id", build.id))
        })?;

        info!(
            "Netlify build {} started deploy {} for job {}",
            build.id, deployment_id, request.job_id
        );
        Ok(Submission {
            deployment_id,
            url: None,
            state: ProviderState::Queued,
        })
    }

    async fn query_status(&self, deployment_id: &str) -> Result<StatusReport, AdapterError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, &format!("deploys/{}", deployment_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let deploy: DeployResponse = check_response(response).await?.json().await?;
        Ok(deploy.into_report())
    }

    async fn cancel(&self, deployment_id: &str) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(endpoint(
                &self.base_url,
                &format!("deploys/{}/cancel", deployment_id),
            ))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check_response(response).await?;
        info!("Canceled Netlify deploy {}", deployment_id);
        Ok(())
    }
}

#[async_trait]
impl DeploymentLookup for NetlifyAdapter {
    /// Netlify accepts a site's domain wherever a site id is expected
    async fn lookup_by_url(&self, url: &str) -> Result<Option<StatusReport>, AdapterError> {
        let host = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        let response = self
            .client
            .get(endpoint(&self.base_url, &format!("sites/{}", host)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let site: SiteResponse = match check_response(response).await {
            Ok(response) => response.json().await?,
            Err(AdapterError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(Some(match site.published_deploy {
            Some(deploy) => deploy.into_report(),
            None => StatusReport {
                deployment_id: site.id,
                state: ProviderState::Ready,
                url: site.ssl_url.or(site.url),
                message: None,
            },
        }))
    }
}
