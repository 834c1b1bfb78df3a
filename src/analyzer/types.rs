use crate::deployment::types::ErrorKind;
use crate::env;
use crate::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Framework name used when no manifest could be read
pub const UNKNOWN_FRAMEWORK: &str = "unknown";

/// Framework name used when dependencies exist but no rule matched
pub const GENERIC_FRAMEWORK: &str = "generic";

/// Score assigned to every platform for `unknown` results
pub const UNKNOWN_SCORE: u8 = 50;

/// Score assigned to every platform for `generic` results
pub const GENERIC_SCORE: u8 = 60;

/// Suitability score (0-100) per platform
pub type PlatformScores = BTreeMap<Platform, u8>;

/// Uniform score table
pub fn uniform_scores(score: u8) -> PlatformScores {
    Platform::ALL.iter().map(|p| (*p, score)).collect()
}

/// A GitHub repository reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    /// Branch, tag or commit to read manifests from
    pub git_ref: Option<String>,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            git_ref: None,
        }
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    /// Parse `owner/repo`, `https://github.com/owner/repo[.git]`,
    /// `github.com/owner/repo` or `git@github.com:owner/repo.git`
    pub fn parse(identifier: &str) -> Result<Self, AnalyzerError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AnalyzerError::Validation(
                "repository identifier is empty".to_string(),
            ));
        }

        let path = if let Some(rest) = identifier.strip_prefix("git@") {
            let (host, path) = rest.split_once(':').ok_or_else(|| {
                AnalyzerError::Validation(format!("malformed SSH remote '{}'", identifier))
            })?;
            Self::check_host(host)?;
            path.to_string()
        } else if identifier.contains("://") {
            let url = Url::parse(identifier).map_err(|e| {
                AnalyzerError::Validation(format!("malformed repository URL '{}': {}", identifier, e))
            })?;
            Self::check_host(url.host_str().unwrap_or_default())?;
            url.path().to_string()
        } else if let Some(rest) = identifier.strip_prefix("github.com/") {
            rest.to_string()
        } else if identifier.split('/').count() == 2 {
            identifier.to_string()
        } else {
            return Err(AnalyzerError::Validation(format!(
                "unrecognized repository identifier '{}'",
                identifier
            )));
        };

        let mut segments = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty());
        let owner = segments.next().unwrap_or_default();
        let name = segments
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git");

        for part in [owner, name] {
            let valid = !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid {
                return Err(AnalyzerError::Validation(format!(
                    "repository identifier '{}' must name an owner and a repository",
                    identifier
                )));
            }
        }

        Ok(Self::new(owner, name))
    }

    fn check_host(host: &str) -> Result<(), AnalyzerError> {
        let host = host.trim_start_matches("www.").to_lowercase();
        if host == "github.com" {
            Ok(())
        } else {
            Err(AnalyzerError::Validation(format!(
                "unsupported repository host '{}'",
                host
            )))
        }
    }

    /// `owner/repo` as written
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Normalized key used for caching and job identity
    pub fn cache_key(&self) -> String {
        let key = self.slug().to_lowercase();
        match &self.git_ref {
            Some(git_ref) => format!("{}@{}", key, git_ref),
            None => key,
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slug())?;
        if let Some(git_ref) = &self.git_ref {
            write!(f, "@{}", git_ref)?;
        }
        Ok(())
    }
}

/// Result of classifying a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkAnalysis {
    pub repo_key: String,
    pub framework: String,
    pub scores: PlatformScores,
    /// Path the manifest was read from, if one was found
    pub manifest_path: Option<String>,
    /// Merged, lowercased dependency names
    pub dependencies: Vec<String>,
    pub cached_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl FrameworkAnalysis {
    /// Low-confidence result for repositories without a readable manifest
    pub fn unknown(repo_key: impl Into<String>) -> Self {
        Self {
            repo_key: repo_key.into(),
            framework: UNKNOWN_FRAMEWORK.to_string(),
            scores: uniform_scores(UNKNOWN_SCORE),
            manifest_path: None,
            dependencies: Vec::new(),
            cached_at: Utc::now(),
            ttl: Duration::ZERO,
        }
    }

    pub fn score(&self, platform: Platform) -> u8 {
        self.scores.get(&platform).copied().unwrap_or(0)
    }

    /// Highest-scoring platform; ties go to the platform listed first
    pub fn recommended_platform(&self) -> Option<Platform> {
        Platform::ALL
            .iter()
            .copied()
            .filter(|platform| self.scores.contains_key(platform))
            .fold(None, |best: Option<Platform>, platform| match best {
                Some(current) if self.score(current) >= self.score(platform) => Some(current),
                _ => Some(platform),
            })
    }

    /// Whether the entry is still valid at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.cached_at.checked_add_signed(ttl))
            .is_some_and(|expires_at| now < expires_at)
    }
}

/// Analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub github_api_url: String,
    pub cache_ttl: Duration,
    /// Manifest paths probed in order; the first entry is the primary path
    pub manifest_paths: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let mut manifest_paths = vec![env::manifest::PRIMARY_PATH.to_string()];
        manifest_paths.extend(env::manifest::FALLBACK_PATHS.iter().map(|p| p.to_string()));
        Self {
            github_api_url: env::endpoints::GITHUB_API_URL.to_string(),
            cache_ttl: Duration::from_secs(600),
            manifest_paths,
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Errors produced while analyzing a repository
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Invalid repository: {0}")]
    Validation(String),
    #[error("GitHub rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Manifest parse error: {0}")]
    Parse(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unexpected upstream response: {0}")]
    InvalidResponse(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl AnalyzerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalyzerError::Validation(_) | AnalyzerError::Parse(_) => ErrorKind::Validation,
            AnalyzerError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            AnalyzerError::NotFound(_) => ErrorKind::NotFound,
            AnalyzerError::Auth(_) => ErrorKind::Auth,
            AnalyzerError::Network(_)
            | AnalyzerError::InvalidResponse(_)
            | AnalyzerError::Io(_) => ErrorKind::TransientNetwork,
        }
    }

    /// Retry-after hint for rate-limit failures
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AnalyzerError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            AnalyzerError::InvalidResponse(error.to_string())
        } else {
            AnalyzerError::Network(error.to_string())
        }
    }
}
