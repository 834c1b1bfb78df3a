use crate::analyzer::source::{FetchResponse, FetchStatus, ManifestSource};
use crate::analyzer::types::{AnalyzerError, RepoRef};
use crate::github::rate_limiter::RateLimiter;
use crate::platform::http::endpoint;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

/// Reads manifests through the GitHub contents API
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<String>,
    encoding: Option<String>,
}

impl GitHubClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("shipwright/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnalyzerError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    fn decode(body: ContentsResponse, path: &str) -> Result<FetchStatus, AnalyzerError> {
        if body.kind.as_deref().is_some_and(|kind| kind != "file") {
            return Ok(FetchStatus::Missing);
        }

        let content = body.content.ok_or_else(|| {
            AnalyzerError::InvalidResponse(format!("contents response for {} has no content", path))
        })?;

        let raw = match body.encoding.as_deref() {
            Some("base64") | None => {
                let compact: String = content.split_whitespace().collect();
                STANDARD.decode(compact).map_err(|e| {
                    AnalyzerError::InvalidResponse(format!("invalid base64 for {}: {}", path, e))
                })?
            }
            Some(other) => {
                return Err(AnalyzerError::InvalidResponse(format!(
                    "unsupported content encoding '{}' for {}",
                    other, path
                )));
            }
        };

        Ok(FetchStatus::Found(raw))
    }
}

#[async_trait]
impl ManifestSource for GitHubClient {
    fn source_name(&self) -> &'static str {
        "github"
    }

    async fn fetch(&self, repo: &RepoRef, path: &str) -> Result<FetchResponse, AnalyzerError> {
        let url = endpoint(
            &self.base_url,
            &format!("repos/{}/{}/contents/{}", repo.owner, repo.name, path),
        );
        trace!("GET {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(git_ref) = &repo.git_ref {
            request = request.query(&[("ref", git_ref)]);
        }
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        let snapshot = RateLimiter::snapshot_from_headers(response.headers());
        debug!("GitHub responded {} for {}:{}", status, repo, path);

        let fetch_status = match status {
            s if s.is_success() => {
                let body: ContentsResponse = response.json().await?;
                Self::decode(body, path)?
            }
            StatusCode::NOT_FOUND => FetchStatus::Missing,
            StatusCode::TOO_MANY_REQUESTS => FetchStatus::RateLimited,
            StatusCode::FORBIDDEN if snapshot.is_some_and(|s| s.remaining == 0) => {
                FetchStatus::RateLimited
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AnalyzerError::Auth(format!(
                    "GitHub refused access to {} ({})",
                    repo, status
                )));
            }
            s if s.is_server_error() => {
                return Err(AnalyzerError::Network(format!(
                    "GitHub returned {} for {}",
                    s, repo
                )));
            }
            s => {
                return Err(AnalyzerError::InvalidResponse(format!(
                    "GitHub returned {} for {}",
                    s, repo
                )));
            }
        };

        Ok(FetchResponse {
            status: fetch_status,
            rate_limit: snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(content: &str) -> ContentsResponse {
        ContentsResponse {
            kind: Some("file".to_string()),
            content: Some(STANDARD.encode(content)),
            encoding: Some("base64".to_string()),
        }
    }

    #[test]
    fn test_decode_handles_wrapped_base64() {
        let mut body = contents(r#"{"dependencies":{"next":"14.0.0"}}"#);
        let encoded = body.content.take().unwrap();
        let (head, tail) = encoded.split_at(10);
        body.content = Some(format!("{}\n{}\n", head, tail));

        assert_eq!(
            GitHubClient::decode(body, "package.json").unwrap(),
            FetchStatus::Found(br#"{"dependencies":{"next":"14.0.0"}}"#.to_vec())
        );
    }

    #[test]
    fn test_decode_directory_is_missing() {
        let body = ContentsResponse {
            kind: Some("dir".to_string()),
            content: None,
            encoding: None,
        };
        assert_eq!(
            GitHubClient::decode(body, "package.json").unwrap(),
            FetchStatus::Missing
        );
    }

    #[test]
    fn test_decode_rejects_unknown_encoding() {
        let mut body = contents("{}");
        body.encoding = Some("utf-16".to_string());
        assert!(matches!(
            GitHubClient::decode(body, "package.json"),
            Err(AnalyzerError::InvalidResponse(_))
        ));
    }
}
