use crate::deployment::types::{
    DeploymentError, DeploymentJob, ErrorKind, JobError, JobEvent, JobId, JobKey, JobRequest,
    JobStatus, OrchestratorConfig,
};
use crate::platform::{AdapterRegistry, PlatformAdapter, ProviderState, StatusReport};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Finished jobs kept for lookup before the oldest are forgotten
pub const DEFAULT_FINISHED_RETENTION: usize = 256;

/// Runs deployment jobs against platform adapters.
///
/// Every job runs on its own task, which is the only writer of that job's
/// state. Status changes are published on the job's `watch` channel and as
/// [`JobEvent`]s to every subscriber.
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    registry: AdapterRegistry,
    config: OrchestratorConfig,
    jobs: DashMap<JobId, JobEntry>,
    finished_retention: usize,
    listeners: Mutex<Vec<mpsc::UnboundedSender<JobEvent>>>,
}

struct JobEntry {
    state: Arc<watch::Sender<DeploymentJob>>,
    cancel: CancellationToken,
}

/// Caller-side view of a submitted job
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    key: JobKey,
    receiver: watch::Receiver<DeploymentJob>,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// Current state of the job
    pub fn snapshot(&self) -> DeploymentJob {
        self.receiver.borrow().clone()
    }

    pub fn status(&self) -> JobStatus {
        self.receiver.borrow().status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.receiver.borrow().created_at
    }

    /// Wait until the job reaches a terminal state
    pub async fn wait(&self) -> Result<DeploymentJob, DeploymentError> {
        let mut receiver = self.receiver.clone();
        let job = receiver
            .wait_for(|job| job.status.is_terminal())
            .await
            .map_err(|_| DeploymentError::ChannelClosed(self.id))?;
        Ok(job.clone())
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Receiver notified on every change to the job
    pub fn watch(&self) -> watch::Receiver<DeploymentJob> {
        self.receiver.clone()
    }
}

/// Why a job stopped early
enum Interrupt {
    Canceled,
    Failed(JobError),
}

impl DeploymentOrchestrator {
    pub fn new(registry: AdapterRegistry, config: OrchestratorConfig) -> Self {
        Self::with_retention(registry, config, DEFAULT_FINISHED_RETENTION)
    }

    /// Keep at most `finished_retention` terminal jobs available to
    /// [`job`](Self::job) and [`cancel`](Self::cancel)
    pub fn with_retention(
        registry: AdapterRegistry,
        config: OrchestratorConfig,
        finished_retention: usize,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                registry,
                config,
                jobs: DashMap::new(),
                finished_retention,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.inner.registry
    }

    /// Admit a job and start running it on its own task
    pub fn submit(&self, request: JobRequest) -> JobHandle {
        let job = DeploymentJob::new(request);
        let id = job.id;
        let key = job.key();
        let (sender, receiver) = watch::channel(job);
        let state = Arc::new(sender);
        let cancel = CancellationToken::new();

        self.inner.jobs.insert(
            id,
            JobEntry {
                state: state.clone(),
                cancel: cancel.clone(),
            },
        );
        info!("Admitted deployment job {} for {}", id, key);

        let inner = self.inner.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            inner.run(state, token).await;
        });

        JobHandle {
            id,
            key,
            receiver,
            cancel,
        }
    }

    /// Request cancellation; a job that already finished is left untouched
    pub fn cancel(&self, job_id: JobId) -> Result<(), DeploymentError> {
        let entry = self
            .inner
            .jobs
            .get(&job_id)
            .ok_or(DeploymentError::UnknownJob(job_id))?;

        let status = entry.state.borrow().status;
        if status.is_terminal() {
            debug!("Ignoring cancel for job {} already {}", job_id, status);
            return Ok(());
        }

        info!("Cancellation requested for job {}", job_id);
        entry.cancel.cancel();
        Ok(())
    }

    /// Snapshot of a job by id
    pub fn job(&self, job_id: JobId) -> Option<DeploymentJob> {
        self.inner
            .jobs
            .get(&job_id)
            .map(|entry| entry.state.borrow().clone())
    }

    /// Handle for an already admitted job
    pub fn handle(&self, job_id: JobId) -> Option<JobHandle> {
        self.inner.jobs.get(&job_id).map(|entry| {
            let job = entry.state.borrow();
            JobHandle {
                id: job.id,
                key: job.key(),
                receiver: entry.state.subscribe(),
                cancel: entry.cancel.clone(),
            }
        })
    }

    /// Snapshots of every job, oldest first
    pub fn jobs(&self) -> Vec<DeploymentJob> {
        let mut jobs: Vec<DeploymentJob> = self
            .inner
            .jobs
            .iter()
            .map(|entry| entry.state.borrow().clone())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Receive every status change from now on, tagged with its job id
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<JobEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.listeners.lock().await.push(sender);
        receiver
    }
}

impl std::fmt::Debug for DeploymentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentOrchestrator")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .field("jobs", &self.inner.jobs.len())
            .finish()
    }
}

impl OrchestratorInner {
    async fn run(&self, state: Arc<watch::Sender<DeploymentJob>>, cancel: CancellationToken) {
        self.drive(&state, cancel).await;
        self.prune_finished();
    }

    /// Forget the oldest terminal jobs beyond the retention limit
    fn prune_finished(&self) {
        let mut finished: Vec<(DateTime<Utc>, JobId)> = self
            .jobs
            .iter()
            .filter_map(|entry| {
                let job = entry.state.borrow();
                job.status.is_terminal().then_some((job.updated_at, job.id))
            })
            .collect();
        if finished.len() <= self.finished_retention {
            return;
        }

        finished.sort_by_key(|(updated_at, _)| *updated_at);
        let excess = finished.len() - self.finished_retention;
        for (_, job_id) in finished.into_iter().take(excess) {
            self.jobs.remove(&job_id);
        }
        debug!("Forgot {} finished jobs", excess);
    }

    async fn drive(&self, state: &watch::Sender<DeploymentJob>, cancel: CancellationToken) {
        let job = state.borrow().clone();

        if cancel.is_cancelled() {
            self.finish_canceled(state, None, None).await;
            return;
        }
        self.transition(state, JobStatus::Submitting, |_| {}).await;

        let adapter = match job
            .config
            .validate(job.platform)
            .and_then(|_| self.registry.resolve(job.platform))
        {
            Ok(adapter) => adapter,
            Err(e) => {
                self.finish_failed(state, JobError::from(&e)).await;
                return;
            }
        };

        let submission = match self.submit_with_retry(state, adapter.as_ref(), &cancel).await {
            Ok(submission) => submission,
            Err(Interrupt::Canceled) => {
                self.finish_canceled(state, None, None).await;
                return;
            }
            Err(Interrupt::Failed(error)) => {
                self.finish_failed(state, error).await;
                return;
            }
        };

        let deployment_id = submission.deployment_id.clone();
        self.transition(state, JobStatus::Polling, |job| {
            job.deployment_id = Some(deployment_id.clone());
        })
        .await;

        let outcome = if submission.state.is_terminal() {
            debug!(
                "Provider reported {} at submission for job {}",
                submission.state.ready_state(),
                job.id
            );
            let report = StatusReport {
                deployment_id: deployment_id.clone(),
                state: submission.state.clone(),
                url: submission.url.clone(),
                message: None,
            };
            Ok(report)
        } else {
            self.poll_until_terminal(state, adapter.as_ref(), &deployment_id, &cancel)
                .await
        };

        match outcome {
            Ok(report) => self.finish_from_report(state, report, submission.url).await,
            Err(Interrupt::Canceled) => {
                self.finish_canceled(state, Some(adapter.as_ref()), Some(&deployment_id))
                    .await;
            }
            Err(Interrupt::Failed(error)) => {
                let next = if error.kind == ErrorKind::Timeout {
                    JobStatus::TimedOut
                } else {
                    JobStatus::Failed
                };
                self.transition(state, next, |job| job.last_error = Some(error))
                    .await;
            }
        }
    }

    async fn submit_with_retry(
        &self,
        state: &watch::Sender<DeploymentJob>,
        adapter: &dyn PlatformAdapter,
        cancel: &CancellationToken,
    ) -> Result<crate::platform::Submission, Interrupt> {
        let policy = &self.config.submit_backoff;
        let request = state.borrow().submit_request();
        let mut retry = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Interrupt::Canceled);
            }

            let mut attempt = 0;
            state.send_modify(|job| {
                job.attempts += 1;
                attempt = job.attempts;
            });
            debug!(
                "Submitting job {} to {} (attempt {}/{})",
                request.job_id,
                adapter.adapter_name(),
                attempt,
                policy.max_attempts
            );

            let error = match adapter.submit(&request).await {
                Ok(submission) => {
                    info!(
                        "Job {} submitted as deployment {}",
                        request.job_id, submission.deployment_id
                    );
                    return Ok(submission);
                }
                Err(e) => e,
            };

            if !error.is_transient() {
                warn!("Job {} submission rejected: {}", request.job_id, error);
                return Err(Interrupt::Failed(JobError::from(&error)));
            }
            if !policy.allows_attempt(attempt) {
                error!(
                    "Job {} submission failed after {} attempts: {}",
                    request.job_id, attempt, error
                );
                return Err(Interrupt::Failed(JobError::new(
                    error.kind(),
                    format!("{} (gave up after {} attempts)", error, attempt),
                )));
            }

            let delay = policy.delay_for(retry);
            warn!(
                "Job {} submission attempt {} failed: {}; retrying in {:?}",
                request.job_id, attempt, error, delay
            );
            state.send_modify(|job| job.last_error = Some(JobError::from(&error)));

            if !sleep_or_cancel(delay, cancel).await {
                return Err(Interrupt::Canceled);
            }
            retry += 1;
        }
    }

    async fn poll_until_terminal(
        &self,
        state: &watch::Sender<DeploymentJob>,
        adapter: &dyn PlatformAdapter,
        deployment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusReport, Interrupt> {
        let policy = &self.config.poll_backoff;
        let deadline = Instant::now() + self.config.poll_deadline;
        let mut poll = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !policy.allows_attempt(poll) {
                return Err(Interrupt::Failed(self.timeout_error(adapter, deployment_id)));
            }

            let delay = policy.delay_for(poll).min(remaining);
            if !sleep_or_cancel(delay, cancel).await {
                return Err(Interrupt::Canceled);
            }
            if Instant::now() >= deadline {
                return Err(Interrupt::Failed(self.timeout_error(adapter, deployment_id)));
            }

            state.send_modify(|job| job.polls += 1);
            poll += 1;

            match adapter.query_status(deployment_id).await {
                Ok(report) if report.state.is_terminal() => return Ok(report),
                Ok(report) => {
                    debug!(
                        "Deployment {} is {} (poll {})",
                        deployment_id,
                        report.state.ready_state(),
                        poll
                    );
                }
                Err(e) if e.is_transient() => {
                    warn!("Status query for {} failed, will retry: {}", deployment_id, e);
                    state.send_modify(|job| job.last_error = Some(JobError::from(&e)));
                }
                Err(e) => {
                    warn!("Status query for {} failed permanently: {}", deployment_id, e);
                    return Err(Interrupt::Failed(JobError::from(&e)));
                }
            }
        }
    }

    fn timeout_error(&self, adapter: &dyn PlatformAdapter, deployment_id: &str) -> JobError {
        let dashboard = adapter.platform().descriptor().dashboard_url;
        JobError::new(
            ErrorKind::Timeout,
            format!(
                "deployment {} did not finish within {:?}; it may still complete, check {}",
                deployment_id, self.config.poll_deadline, dashboard
            ),
        )
    }

    async fn finish_from_report(
        &self,
        state: &watch::Sender<DeploymentJob>,
        report: StatusReport,
        submission_url: Option<String>,
    ) {
        match report.state {
            ProviderState::Ready => match report.url.or(submission_url) {
                Some(url) => {
                    self.transition(state, JobStatus::Succeeded, |job| {
                        job.url = Some(url);
                    })
                    .await;
                }
                None => {
                    self.finish_failed(
                        state,
                        JobError::new(
                            ErrorKind::ProviderTerminal,
                            format!(
                                "deployment {} is ready but the provider reported no URL",
                                report.deployment_id
                            ),
                        ),
                    )
                    .await;
                }
            },
            ProviderState::Canceled => {
                let message = report
                    .message
                    .unwrap_or_else(|| "deployment was canceled by the provider".to_string());
                self.finish_failed(state, JobError::new(ErrorKind::ProviderTerminal, message))
                    .await;
            }
            _ => {
                let message = report
                    .message
                    .unwrap_or_else(|| "provider reported a failed deployment".to_string());
                self.finish_failed(state, JobError::new(ErrorKind::ProviderTerminal, message))
                    .await;
            }
        }
    }

    async fn finish_failed(&self, state: &watch::Sender<DeploymentJob>, error: JobError) {
        self.transition(state, JobStatus::Failed, |job| job.last_error = Some(error))
            .await;
    }

    async fn finish_canceled(
        &self,
        state: &watch::Sender<DeploymentJob>,
        adapter: Option<&dyn PlatformAdapter>,
        deployment_id: Option<&str>,
    ) {
        if self.config.cancel_remote
            && let (Some(adapter), Some(deployment_id)) = (adapter, deployment_id)
        {
            match adapter.cancel(deployment_id).await {
                Ok(()) => info!("Canceled remote deployment {}", deployment_id),
                Err(e) => warn!("Could not cancel remote deployment {}: {}", deployment_id, e),
            }
        }

        self.transition(state, JobStatus::Canceled, |job| {
            job.last_error = Some(JobError::new(ErrorKind::Canceled, "canceled by caller"));
        })
        .await;
    }

    /// Apply a state-machine edge and publish it; invalid edges are ignored.
    ///
    /// Listeners receive the event before `watch` receivers observe the new
    /// state, so a caller woken by [`JobHandle::wait`] has every event queued.
    async fn transition<F>(&self, state: &watch::Sender<DeploymentJob>, next: JobStatus, update: F)
    where
        F: FnOnce(&mut DeploymentJob),
    {
        let mut listeners = self.listeners.lock().await;
        let mut published = None;

        state.send_if_modified(|job| {
            if !job.status.can_transition_to(next) {
                error!(
                    "Refusing transition {} -> {} for job {}",
                    job.status, next, job.id
                );
                return false;
            }

            let old_status = job.status;
            update(job);
            job.status = next;
            job.updated_at = Utc::now();
            let event = JobEvent {
                job_id: job.id,
                key: job.key(),
                old_status,
                new_status: next,
                url: job.url.clone(),
                reason: if next.is_terminal() && next != JobStatus::Succeeded {
                    job.reason().map(str::to_string)
                } else {
                    None
                },
                timestamp: job.updated_at,
            };
            listeners.retain(|listener| listener.send(event.clone()).is_ok());
            published = Some(event);
            true
        });
        drop(listeners);

        match published {
            Some(JobEvent {
                job_id,
                old_status,
                new_status,
                reason: Some(reason),
                ..
            }) => info!("Job {}: {} -> {} ({})", job_id, old_status, new_status, reason),
            Some(event) => info!(
                "Job {}: {} -> {}",
                event.job_id, event.old_status, event.new_status
            ),
            None => {}
        }
    }
}

/// Sleep for `delay`; returns false if cancellation arrived first
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
