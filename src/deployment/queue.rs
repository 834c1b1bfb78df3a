use crate::deployment::orchestrator::{DeploymentOrchestrator, JobHandle};
use crate::deployment::types::{DeploymentJob, ErrorKind, JobId, JobKey, JobRequest};
use futures::future::join_all;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Why a request was not admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: ErrorKind,
    pub reason: String,
    /// Job currently holding the same logical key, if that was the cause
    pub active_job: Option<JobId>,
}

/// Outcome of [`DeploymentQueue::enqueue`]
#[derive(Debug)]
pub enum Admission {
    Accepted(JobHandle),
    Rejected(Rejection),
}

impl Admission {
    pub fn handle(&self) -> Option<&JobHandle> {
        match self {
            Admission::Accepted(handle) => Some(handle),
            Admission::Rejected(_) => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

/// Admission control in front of the orchestrator.
///
/// At most one non-terminal job exists per logical key (repository,
/// platform, environment). Accepted jobs start immediately.
#[derive(Debug)]
pub struct DeploymentQueue {
    orchestrator: DeploymentOrchestrator,
    by_key: Mutex<HashMap<JobKey, JobHandle>>,
}

impl DeploymentQueue {
    pub fn new(orchestrator: DeploymentOrchestrator) -> Self {
        Self {
            orchestrator,
            by_key: Mutex::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &DeploymentOrchestrator {
        &self.orchestrator
    }

    pub async fn enqueue(&self, request: JobRequest) -> Admission {
        if let Err(e) = request.config.validate(request.platform) {
            warn!("Rejected deployment of {}: {}", request.repo_url, e);
            return Admission::Rejected(Rejection {
                kind: ErrorKind::Validation,
                reason: e.to_string(),
                active_job: None,
            });
        }

        let key = request.key();
        let mut by_key = self.by_key.lock().await;

        if let Some(existing) = by_key.get(&key) {
            let status = existing.status();
            if status.is_active() {
                warn!(
                    "Rejected deployment for {}: job {} is still {}",
                    key,
                    existing.id(),
                    status
                );
                return Admission::Rejected(Rejection {
                    kind: ErrorKind::Validation,
                    reason: format!(
                        "a deployment for {} is already {} (job {})",
                        key,
                        status,
                        existing.id()
                    ),
                    active_job: Some(existing.id()),
                });
            }
        }

        let handle = self.orchestrator.submit(request);
        info!("Accepted job {} for {}", handle.id(), key);
        by_key.insert(key, handle.clone());
        Admission::Accepted(handle)
    }

    /// Handles of jobs that have not reached a terminal state, oldest first
    pub async fn list_active(&self) -> Vec<JobHandle> {
        let mut by_key = self.by_key.lock().await;
        by_key.retain(|_, handle| handle.status().is_active());

        let mut active: Vec<JobHandle> = by_key.values().cloned().collect();
        active.sort_by_cached_key(JobHandle::created_at);
        active
    }

    /// Wait for every job admitted so far to finish
    pub async fn drain(&self) -> Vec<DeploymentJob> {
        let handles: Vec<JobHandle> = self.by_key.lock().await.values().cloned().collect();
        join_all(handles.iter().map(JobHandle::wait))
            .await
            .into_iter()
            .zip(handles.iter())
            .map(|(result, handle)| result.unwrap_or_else(|_| handle.snapshot()))
            .collect()
    }
}
