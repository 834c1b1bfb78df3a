use crate::deployment::backoff::BackoffPolicy;
use crate::platform::{AdapterError, DeploymentConfig, Platform, SubmitRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for deployment jobs
pub type JobId = Uuid;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Admitted, not yet started
    Queued,
    /// Submission to the provider in progress (including retries)
    Submitting,
    /// Submitted; waiting for the provider to reach a terminal state
    Polling,
    Succeeded,
    Failed,
    Canceled,
    /// Poll deadline elapsed; the deployment may still finish out-of-band
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled | JobStatus::TimedOut
        )
    }

    /// Whether a job in this state blocks another job with the same key
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Allowed edges of the job state machine
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Submitting)
                | (Submitting, Polling)
                | (Submitting, Failed)
                | (Polling, Succeeded)
                | (Polling, Failed)
                | (Polling, TimedOut)
                | (Queued, Canceled)
                | (Submitting, Canceled)
                | (Polling, Canceled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Queued => "queued",
            JobStatus::Submitting => "submitting",
            JobStatus::Polling => "polling",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::TimedOut => "timed_out",
        };
        f.write_str(label)
    }
}

/// Error classification shared by the analyzer, adapters and jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    RateLimitExceeded,
    NotFound,
    TransientNetwork,
    Auth,
    ProviderTerminal,
    Timeout,
    Canceled,
}

/// Last error observed on a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&AdapterError> for JobError {
    fn from(error: &AdapterError) -> Self {
        JobError::new(error.kind(), error.to_string())
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Caller input for a new deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub repo_url: String,
    pub repo_path: Option<String>,
    pub platform: Platform,
    pub config: DeploymentConfig,
    /// Target environment, part of the logical job key
    pub environment: Option<String>,
}

impl JobRequest {
    pub fn new(repo_url: impl Into<String>, platform: Platform) -> Self {
        Self {
            repo_url: repo_url.into(),
            repo_path: None,
            platform,
            config: DeploymentConfig::default(),
            environment: None,
        }
    }

    pub fn with_config(mut self, config: DeploymentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_repo_path(mut self, repo_path: impl Into<String>) -> Self {
        self.repo_path = Some(repo_path.into());
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.repo_url, self.platform, self.environment.as_deref())
    }
}

/// Identity used to serialize deployments of the same target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub repo: String,
    pub platform: Platform,
    pub environment: Option<String>,
}

impl JobKey {
    pub fn new(repo_url: &str, platform: Platform, environment: Option<&str>) -> Self {
        let repo = crate::analyzer::RepoRef::parse(repo_url)
            .map(|repo| repo.cache_key())
            .unwrap_or_else(|_| {
                repo_url
                    .trim()
                    .trim_end_matches('/')
                    .trim_end_matches(".git")
                    .to_lowercase()
            });
        Self {
            repo,
            platform,
            environment: environment.map(|env| env.trim().to_lowercase()),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repo, self.platform)?;
        if let Some(env) = &self.environment {
            write!(f, ":{}", env)?;
        }
        Ok(())
    }
}

/// A single deployment attempt tracked by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentJob {
    pub id: JobId,
    pub repo_url: String,
    pub repo_path: Option<String>,
    pub platform: Platform,
    pub config: DeploymentConfig,
    pub environment: Option<String>,
    pub status: JobStatus,
    /// Submission attempts consumed
    pub attempts: u32,
    /// Status queries consumed
    pub polls: u32,
    pub deployment_id: Option<String>,
    pub url: Option<String>,
    pub last_error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentJob {
    /// Create a queued job with a fresh id
    pub fn new(request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            repo_url: request.repo_url,
            repo_path: request.repo_path,
            platform: request.platform,
            config: request.config,
            environment: request.environment,
            status: JobStatus::Queued,
            attempts: 0,
            polls: 0,
            deployment_id: None,
            url: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.repo_url, self.platform, self.environment.as_deref())
    }

    pub fn submit_request(&self) -> SubmitRequest {
        SubmitRequest {
            job_id: self.id,
            repo_url: self.repo_url.clone(),
            repo_path: self.repo_path.clone(),
            config: self.config.clone(),
        }
    }

    /// Human-readable reason attached to the terminal state, if any
    pub fn reason(&self) -> Option<&str> {
        self.last_error.as_ref().map(|error| error.message.as_str())
    }
}

/// Status-change notification for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub key: JobKey,
    pub old_status: JobStatus,
    pub new_status: JobStatus,
    pub url: Option<String>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result contract of a one-shot deployment run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub id: String,
    pub url: String,
    pub ready_state: String,
}

impl TryFrom<&DeploymentJob> for DeploymentResult {
    type Error = DeploymentError;

    fn try_from(job: &DeploymentJob) -> Result<Self, Self::Error> {
        match (job.status, &job.url) {
            (JobStatus::Succeeded, Some(url)) => Ok(DeploymentResult {
                id: job.deployment_id.clone().unwrap_or_else(|| job.id.to_string()),
                url: url.clone(),
                ready_state: "READY".to_string(),
            }),
            (status, _) => Err(DeploymentError::NotSucceeded {
                job_id: job.id,
                status,
                reason: job.reason().unwrap_or("no reason recorded").to_string(),
            }),
        }
    }
}

/// Orchestrator timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Backoff and attempt budget for provider submission
    pub submit_backoff: BackoffPolicy,
    /// Backoff between status queries
    pub poll_backoff: BackoffPolicy,
    /// Wall-clock budget for polling, measured from the first poll
    pub poll_deadline: Duration,
    /// Ask the provider to cancel the remote deployment on job cancellation
    pub cancel_remote: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            submit_backoff: BackoffPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1000),
                multiplier: 2.0,
                max_delay: Duration::from_secs(30),
            },
            poll_backoff: BackoffPolicy {
                max_attempts: u32::MAX,
                initial_delay: Duration::from_secs(2),
                multiplier: 1.5,
                max_delay: Duration::from_secs(15),
            },
            poll_deadline: Duration::from_secs(300),
            cancel_remote: true,
        }
    }
}

/// Errors surfaced by the orchestrator and queue APIs
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeploymentError {
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),
    #[error("Job {job_id} ended as {status}: {reason}")]
    NotSucceeded {
        job_id: JobId,
        status: JobStatus,
        reason: String,
    },
    #[error("Job status channel closed for {0}")]
    ChannelClosed(JobId),
}
