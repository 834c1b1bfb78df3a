use crate::analyzer::types::{AnalyzerError, RepoRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Rate-limit counters reported alongside a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Outcome of reading a single manifest path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// Raw manifest bytes, decoded by the analyzer
    Found(Vec<u8>),
    Missing,
    /// The source refused the request because its quota is spent
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: FetchStatus,
    pub rate_limit: Option<RateLimitSnapshot>,
}

impl FetchResponse {
    pub fn found(content: impl Into<Vec<u8>>) -> Self {
        Self {
            status: FetchStatus::Found(content.into()),
            rate_limit: None,
        }
    }

    pub fn missing() -> Self {
        Self {
            status: FetchStatus::Missing,
            rate_limit: None,
        }
    }

    pub fn with_rate_limit(mut self, snapshot: Option<RateLimitSnapshot>) -> Self {
        self.rate_limit = snapshot;
        self
    }
}

/// Where package manifests are read from
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Name used in logs
    fn source_name(&self) -> &'static str;

    async fn fetch(&self, repo: &RepoRef, path: &str) -> Result<FetchResponse, AnalyzerError>;
}

/// Reads manifests from a local checkout
#[derive(Debug, Clone)]
pub struct LocalManifestSource {
    root: PathBuf,
}

impl LocalManifestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ManifestSource for LocalManifestSource {
    fn source_name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, _repo: &RepoRef, path: &str) -> Result<FetchResponse, AnalyzerError> {
        match tokio::fs::read(self.root.join(path)).await {
            Ok(content) => Ok(FetchResponse::found(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FetchResponse::missing()),
            Err(e) => Err(AnalyzerError::Io(format!(
                "{}: {}",
                self.root.join(path).display(),
                e
            ))),
        }
    }
}
