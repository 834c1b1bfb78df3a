//! Vercel REST API adapter
//!
//! Deployments are created from the repository's GitHub source:
//!
//! 1. `GET /v9/projects/{name}` looks the project up, `POST /v10/projects`
//!    creates it (with environment variables) when it does not exist
//! 2. `POST /v13/deployments` starts a production deployment
//! 3. `GET /v13/deployments/{id-or-host}` reports `readyState`
//! 4. `PATCH /v12/deployments/{id}/cancel` cancels a running build

use crate::platform::adapter::{DeploymentLookup, PlatformAdapter};
use crate::platform::http::{absolute_url, build_client, check_response, endpoint};
use crate::platform::types::{
    AdapterError, Platform, PlatformOptions, ProviderState, StatusReport, SubmitRequest,
    Submission,
};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
pub struct VercelAdapter {
    client: Client,
    base_url: String,
    token: String,
    /// Team scope recorded per deployment so status queries use the same scope
    deployment_teams: DashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentResponse {
    id: String,
    url: Option<String>,
    ready_state: Option<String>,
    error_message: Option<String>,
}

impl VercelAdapter {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.to_string(),
            token: token.into(),
            deployment_teams: DashMap::new(),
        })
    }

    /// Deployments whose team scope is still tracked
    pub fn scoped_deployments(&self) -> usize {
        self.deployment_teams.len()
    }

    fn authorized(&self, builder: RequestBuilder, team_id: Option<&str>) -> RequestBuilder {
        let builder = builder.bearer_auth(&self.token);
        match team_id {
            Some(team_id) => builder.query(&[("teamId", team_id)]),
            None => builder,
        }
    }

    fn team_for(request: &SubmitRequest) -> Option<&str> {
        match &request.config.options {
            Some(PlatformOptions::Vercel { team_id }) => team_id.as_deref(),
            _ => None,
        }
    }

    /// Find the project by name, creating it when absent
    async fn ensure_project(
        &self,
        request: &SubmitRequest,
        repo_slug: &str,
    ) -> Result<String, AdapterError> {
        let name = request.project_name();
        let team_id = Self::team_for(request);

        let lookup = self
            .authorized(
                self.client
                    .get(endpoint(&self.base_url, &format!("v9/projects/{}", name))),
                team_id,
            )
            .send()
            .await?;

        match check_response(lookup).await {
            Ok(response) => {
                let project: ProjectResponse = response.json().await?;
                debug!("Found Vercel project {} ({})", name, project.id);
                return Ok(project.id);
            }
            Err(AdapterError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let environment_variables: Vec<serde_json::Value> = request
            .config
            .env_vars
            .iter()
            .map(|(key, value)| {
                json!({
                    "key": key,
                    "value": value,
                    "type": "encrypted",
                    "target": ["production", "preview"],
                })
            })
            .collect();

        let body = json!({
            "name": name,
            "framework": request.config.framework,
            "buildCommand": request.config.build_command,
            "rootDirectory": request.config.root_directory,
            "gitRepository": { "type": "github", "repo": repo_slug },
            "environmentVariables": environment_variables,
        });

        let response = self
            .authorized(
                self.client.post(endpoint(&self.base_url, "v10/projects")),
                team_id,
            )
            .json(&body)
            .send()
            .await?;
        let project: ProjectResponse = check_response(response).await?.json().await?;
        info!("Created Vercel project {} ({})", name, project.id);
        Ok(project.id)
    }

    async fn fetch_deployment(
        &self,
        id_or_host: &str,
        team_id: Option<&str>,
    ) -> Result<StatusReport, AdapterError> {
        let response = self
            .authorized(
                self.client.get(endpoint(
                    &self.base_url,
                    &format!("v13/deployments/{}", id_or_host),
                )),
                team_id,
            )
            .send()
            .await?;
        let deployment: DeploymentResponse = check_response(response).await?.json().await?;
        Ok(deployment.into_report())
    }
}

impl DeploymentResponse {
    fn into_report(self) -> StatusReport {
        StatusReport {
            state: map_ready_state(self.ready_state.as_deref()),
            url: self.url.as_deref().map(absolute_url),
            message: self.error_message,
            deployment_id: self.id,
        }
    }
}

/// Map Vercel's `readyState` onto the canonical provider state
pub fn map_ready_state(ready_state: Option<&str>) -> ProviderState {
    match ready_state.map(str::to_uppercase).as_deref() {
        Some("QUEUED") => ProviderState::Queued,
        Some("INITIALIZING") | Some("BUILDING") => ProviderState::Building,
        Some("READY") => ProviderState::Ready,
        Some("ERROR") => ProviderState::Error,
        Some("CANCELED") => ProviderState::Canceled,
        Some(other) => ProviderState::Unknown(other.to_string()),
        None => ProviderState::Queued,
    }
}

#[async_trait]
impl PlatformAdapter for VercelAdapter {
    fn platform(&self) -> Platform {
        Platform::Vercel
    }

    fn adapter_name(&self) -> &'static str {
        "vercel-api"
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, AdapterError> {
        let repo_slug = request.repo_slug().ok_or_else(|| {
            AdapterError::Validation(format!(
                "Vercel API deployments need a GitHub repository, got '{}'",
                request.repo_url
            ))
        })?;
        let (org, repo) = repo_slug.split_once('/').unwrap_or(("", repo_slug.as_str()));

        let project_id = self.ensure_project(request, &repo_slug).await?;
        let team_id = Self::team_for(request);

        let body = json!({
            "name": request.project_name(),
            "project": project_id,
            "target": "production",
            "gitSource": {
                "type": "github",
                "org": org,
                "repo": repo,
                "ref": request.config.branch.as_deref().unwrap_or("main"),
            },
        });

        let response = self
            .authorized(
                self.client.post(endpoint(&self.base_url, "v13/deployments")),
                team_id,
            )
            .json(&body)
            .send()
            .await?;
        let deployment: DeploymentResponse = check_response(response).await?.json().await?;

        if let Some(team_id) = team_id
            && !map_ready_state(deployment.ready_state.as_deref()).is_terminal()
        {
            self.deployment_teams
                .insert(deployment.id.clone(), team_id.to_string());
        }

        let report = deployment.into_report();
        info!(
            "Vercel deployment {} created for job {}",
            report.deployment_id, request.job_id
        );
        Ok(Submission {
            deployment_id: report.deployment_id,
            url: report.url,
            state: report.state,
        })
    }

    async fn query_status(&self, deployment_id: &str) -> Result<StatusReport, AdapterError> {
        let team_id = self
            .deployment_teams
            .get(deployment_id)
            .map(|entry| entry.value().clone());
        let report = self
            .fetch_deployment(deployment_id, team_id.as_deref())
            .await?;
        if report.state.is_terminal() {
            self.deployment_teams.remove(deployment_id);
        }
        Ok(report)
    }

    async fn cancel(&self, deployment_id: &str) -> Result<(), AdapterError> {
        let team_id = self
            .deployment_teams
            .get(deployment_id)
            .map(|entry| entry.value().clone());
        let response = self
            .authorized(
                self.client.patch(endpoint(
                    &self.base_url,
                    &format!("v12/deployments/{}/cancel", deployment_id),
                )),
                team_id.as_deref(),
            )
            .send()
            .await?;
        check_response(response).await?;
        self.deployment_teams.remove(deployment_id);
        info!("Canceled Vercel deployment {}", deployment_id);
        Ok(())
    }
}

#[async_trait]
impl DeploymentLookup for VercelAdapter {
    async fn lookup_by_url(&self, url: &str) -> Result<Option<StatusReport>, AdapterError> {
        let host = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        match self.fetch_deployment(host, None).await {
            Ok(report) => Ok(Some(report)),
            Err(AdapterError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
