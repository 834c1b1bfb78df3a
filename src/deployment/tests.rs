use super::*;
use crate::platform::{
    AdapterError, AdapterRegistry, DeploymentConfig, Platform, PlatformAdapter, ProviderState,
    StatusReport, SubmitRequest, Submission,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const DEPLOYMENT_ID: &str = "dpl_123";
const SITE_URL: &str = "https://acme-site.vercel.app";

/// Adapter that replays scripted responses and records its calls
struct ScriptedAdapter {
    platform: Platform,
    submits: StdMutex<VecDeque<Result<Submission, AdapterError>>>,
    statuses: StdMutex<VecDeque<Result<StatusReport, AdapterError>>>,
    /// State reported once the scripted statuses run out
    steady_state: ProviderState,
    submission_url: Option<String>,
    submit_times: StdMutex<Vec<Instant>>,
    queries: AtomicUsize,
    cancels: AtomicUsize,
}

impl ScriptedAdapter {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            submits: StdMutex::new(VecDeque::new()),
            statuses: StdMutex::new(VecDeque::new()),
            steady_state: ProviderState::Ready,
            submission_url: None,
            submit_times: StdMutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        }
    }

    fn submit_error(self, error: AdapterError) -> Self {
        self.submits.lock().unwrap().push_back(Err(error));
        self
    }

    fn submit_ok(self, submission: Submission) -> Self {
        self.submits.lock().unwrap().push_back(Ok(submission));
        self
    }

    fn status(self, result: Result<StatusReport, AdapterError>) -> Self {
        self.statuses.lock().unwrap().push_back(result);
        self
    }

    fn steady(mut self, state: ProviderState) -> Self {
        self.steady_state = state;
        self
    }

    fn submission_url(mut self, url: &str) -> Self {
        self.submission_url = Some(url.to_string());
        self
    }

    fn submit_count(&self) -> usize {
        self.submit_times.lock().unwrap().len()
    }

    fn submit_gaps(&self) -> Vec<Duration> {
        let times = self.submit_times.lock().unwrap();
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }
}

fn report(state: ProviderState, url: Option<&str>, message: Option<&str>) -> StatusReport {
    StatusReport {
        deployment_id: DEPLOYMENT_ID.to_string(),
        state,
        url: url.map(str::to_string),
        message: message.map(str::to_string),
    }
}

fn unavailable() -> AdapterError {
    AdapterError::Unavailable {
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn adapter_name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, _request: &SubmitRequest) -> Result<Submission, AdapterError> {
        self.submit_times.lock().unwrap().push(Instant::now());
        self.submits.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(Submission {
                deployment_id: DEPLOYMENT_ID.to_string(),
                url: self.submission_url.clone(),
                state: ProviderState::Queued,
            })
        })
    }

    async fn query_status(&self, _deployment_id: &str) -> Result<StatusReport, AdapterError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.statuses.lock().unwrap().pop_front().unwrap_or_else(|| {
            let url = (self.steady_state == ProviderState::Ready).then_some(SITE_URL);
            Ok(report(self.steady_state.clone(), url, None))
        })
    }

    async fn cancel(&self, _deployment_id: &str) -> Result<(), AdapterError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn orchestrator(adapter: Arc<ScriptedAdapter>) -> DeploymentOrchestrator {
    let registry = AdapterRegistry::new().with_adapter(adapter);
    DeploymentOrchestrator::new(registry, OrchestratorConfig::default())
}

fn request() -> JobRequest {
    JobRequest::new("https://github.com/acme/site", Platform::Vercel)
}

fn drain(events: &mut mpsc::UnboundedReceiver<JobEvent>) -> Vec<(JobStatus, JobStatus)> {
    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        transitions.push((event.old_status, event.new_status));
    }
    transitions
}

#[tokio::test(start_paused = true)]
async fn test_transient_submit_failures_retry_with_backoff() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Platform::Vercel)
            .submit_error(unavailable())
            .submit_error(unavailable()),
    );
    let orchestrator = orchestrator(adapter.clone());
    let mut events = orchestrator.subscribe().await;

    let handle = orchestrator.submit(request());
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.attempts, 3);
    assert_eq!(job.url.as_deref(), Some(SITE_URL));
    assert_eq!(job.deployment_id.as_deref(), Some(DEPLOYMENT_ID));

    let gaps = adapter.submit_gaps();
    assert_eq!(gaps.len(), 2);
    assert!(gaps[0] >= Duration::from_millis(1000) && gaps[0] < Duration::from_millis(1100));
    assert!(gaps[1] >= Duration::from_millis(2000) && gaps[1] < Duration::from_millis(2100));

    assert_eq!(
        drain(&mut events),
        vec![
            (JobStatus::Queued, JobStatus::Submitting),
            (JobStatus::Submitting, JobStatus::Polling),
            (JobStatus::Polling, JobStatus::Succeeded),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_fails_job() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Platform::Vercel)
            .submit_error(unavailable())
            .submit_error(unavailable())
            .submit_error(unavailable()),
    );
    let orchestrator = orchestrator(adapter.clone());

    let job = orchestrator.submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert_eq!(adapter.submit_count(), 3);
    let error = job.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::TransientNetwork);
    assert!(error.message.contains("gave up after 3 attempts"));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_submit_failure_is_not_retried() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Platform::Vercel)
            .submit_error(AdapterError::Auth("invalid token".to_string())),
    );
    let orchestrator = orchestrator(adapter.clone());

    let job = orchestrator.submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(adapter.submit_count(), 1);
    assert_eq!(job.last_error.unwrap().kind, ErrorKind::Auth);
    assert!(job.url.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_poll_deadline_times_out() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel).steady(ProviderState::Building));
    let orchestrator = orchestrator(adapter.clone());
    let mut events = orchestrator.subscribe().await;

    let started = Instant::now();
    let job = orchestrator.submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::TimedOut);
    assert!(started.elapsed() >= Duration::from_secs(300));
    assert!(started.elapsed() < Duration::from_secs(301));
    assert!(job.polls > 10);
    assert!(job.url.is_none());

    let error = job.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert!(error.message.contains(DEPLOYMENT_ID));
    assert!(error.message.contains("vercel.com"));

    let transitions = drain(&mut events);
    assert_eq!(
        transitions.last(),
        Some(&(JobStatus::Polling, JobStatus::TimedOut))
    );
    assert!(!transitions.iter().any(|(_, next)| *next == JobStatus::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_provider_error_fails_with_message() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel).status(Ok(report(
        ProviderState::Error,
        None,
        Some("Build failed: exit code 1"),
    ))));
    let orchestrator = orchestrator(adapter);

    let job = orchestrator.submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.reason(), Some("Build failed: exit code 1"));
    assert_eq!(job.last_error.unwrap().kind, ErrorKind::ProviderTerminal);
}

#[tokio::test(start_paused = true)]
async fn test_transient_query_failure_keeps_polling() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Platform::Vercel)
            .status(Err(AdapterError::Network("connection reset".to_string())))
            .status(Ok(report(ProviderState::Building, None, None))),
    );
    let orchestrator = orchestrator(adapter.clone());

    let job = orchestrator.submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.polls, 3);
    assert_eq!(adapter.queries.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_query_failure_fails_job() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Platform::Vercel)
            .status(Err(AdapterError::NotFound("deployment missing".to_string()))),
    );
    let job = orchestrator(adapter).submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.unwrap().kind, ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_ready_without_url_falls_back_to_submission_url() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Platform::Vercel)
            .submission_url("https://acme-site-git-main.vercel.app")
            .status(Ok(report(ProviderState::Ready, None, None))),
    );
    let job = orchestrator(adapter).submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.url.as_deref(), Some("https://acme-site-git-main.vercel.app"));
}

#[tokio::test(start_paused = true)]
async fn test_ready_without_any_url_fails() {
    let adapter = Arc::new(
        ScriptedAdapter::new(Platform::Vercel).status(Ok(report(ProviderState::Ready, None, None))),
    );
    let job = orchestrator(adapter).submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.url.is_none());
    assert!(job.reason().unwrap().contains("no URL"));
}

#[tokio::test(start_paused = true)]
async fn test_terminal_submission_skips_polling() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel).submit_ok(Submission {
        deployment_id: DEPLOYMENT_ID.to_string(),
        url: Some(SITE_URL.to_string()),
        state: ProviderState::Ready,
    }));
    let orchestrator = orchestrator(adapter.clone());

    let started = Instant::now();
    let job = orchestrator.submit(request()).wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.polls, 0);
    assert_eq!(adapter.queries.load(Ordering::SeqCst), 0);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_never_reaches_adapter() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel));
    let orchestrator = orchestrator(adapter.clone());
    let mut config = DeploymentConfig::default();
    config
        .env_vars
        .insert("api-key".to_string(), "secret".to_string());

    let job = orchestrator
        .submit(request().with_config(config))
        .wait()
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.unwrap().kind, ErrorKind::Validation);
    assert_eq!(adapter.submit_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_platform_fails() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel));
    let orchestrator = orchestrator(adapter);

    let job = orchestrator
        .submit(JobRequest::new("acme/site", Platform::Netlify))
        .wait()
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.reason().unwrap().contains("No adapter registered"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_polling_cancels_remote() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel).steady(ProviderState::Building));
    let orchestrator = orchestrator(adapter.clone());
    let mut events = orchestrator.subscribe().await;

    let handle = orchestrator.submit(request());
    let mut watch = handle.watch();
    watch
        .wait_for(|job| job.status == JobStatus::Polling)
        .await
        .unwrap();

    orchestrator.cancel(handle.id()).unwrap();
    let job = handle.wait().await.unwrap();

    assert_eq!(job.status, JobStatus::Canceled);
    assert_eq!(job.last_error.unwrap().kind, ErrorKind::Canceled);
    assert_eq!(adapter.cancels.load(Ordering::SeqCst), 1);

    let terminal: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|(_, next)| next.is_terminal())
        .collect();
    assert_eq!(terminal, vec![(JobStatus::Polling, JobStatus::Canceled)]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_submit_backoff() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel).submit_error(unavailable()));
    let orchestrator = orchestrator(adapter.clone());

    let handle = orchestrator.submit(request());
    let mut watch = handle.watch();
    watch.wait_for(|job| job.attempts == 1).await.unwrap();
    handle.cancel();

    let job = handle.wait().await.unwrap();
    assert_eq!(job.status, JobStatus::Canceled);
    assert_eq!(adapter.submit_count(), 1);
    assert_eq!(adapter.cancels.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_noop_once_terminal() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel));
    let orchestrator = orchestrator(adapter.clone());
    let mut events = orchestrator.subscribe().await;

    let handle = orchestrator.submit(request());
    handle.wait().await.unwrap();
    let before = drain(&mut events);

    orchestrator.cancel(handle.id()).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(handle.status(), JobStatus::Succeeded);
    assert_eq!(orchestrator.job(handle.id()).unwrap().status, JobStatus::Succeeded);
    assert!(drain(&mut events).is_empty());
    assert_eq!(
        before
            .iter()
            .filter(|(_, next)| next.is_terminal())
            .count(),
        1
    );
    assert_eq!(adapter.cancels.load(Ordering::SeqCst), 0);

    let unknown = uuid::Uuid::new_v4();
    assert!(matches!(
        orchestrator.cancel(unknown),
        Err(DeploymentError::UnknownJob(id)) if id == unknown
    ));
}

#[tokio::test(start_paused = true)]
async fn test_deployment_result_conversion() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel));
    let job = orchestrator(adapter).submit(request()).wait().await.unwrap();

    let result = DeploymentResult::try_from(&job).unwrap();
    assert_eq!(result.id, DEPLOYMENT_ID);
    assert_eq!(result.url, SITE_URL);
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({ "id": DEPLOYMENT_ID, "url": SITE_URL, "readyState": "READY" })
    );

    let failed = DeploymentJob::new(request());
    assert!(matches!(
        DeploymentResult::try_from(&failed),
        Err(DeploymentError::NotSucceeded { status: JobStatus::Queued, .. })
    ));
}

#[test]
fn test_state_machine_edges() {
    use JobStatus::*;
    assert!(Queued.can_transition_to(Submitting));
    assert!(Polling.can_transition_to(TimedOut));
    assert!(!Queued.can_transition_to(Polling));
    assert!(!Submitting.can_transition_to(Queued));
    for terminal in [Succeeded, Failed, Canceled, TimedOut] {
        assert!(terminal.is_terminal());
        for next in [Queued, Submitting, Polling, Succeeded, Failed, Canceled, TimedOut] {
            assert!(!terminal.can_transition_to(next));
        }
    }
}

#[test]
fn test_job_key_normalizes_repository() {
    let a = JobKey::new("https://github.com/Acme/Site.git", Platform::Vercel, Some("Prod"));
    let b = JobKey::new("acme/site", Platform::Vercel, Some("prod"));
    let c = JobKey::new("acme/site", Platform::Netlify, Some("prod"));
    assert_eq!(a, b);
    assert_ne!(b, c);
    assert_eq!(a.to_string(), "acme/site@vercel:prod");
}

#[tokio::test(start_paused = true)]
async fn test_queue_rejects_duplicate_active_key() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel).steady(ProviderState::Building));
    let queue = DeploymentQueue::new(orchestrator(adapter));

    let first = queue.enqueue(request()).await;
    let first = first.handle().cloned().unwrap();

    match queue.enqueue(request()).await {
        Admission::Rejected(rejection) => {
            assert_eq!(rejection.active_job, Some(first.id()));
            assert!(rejection.reason.contains("acme/site@vercel"));
        }
        Admission::Accepted(_) => panic!("duplicate key was admitted"),
    }

    let staging = queue
        .enqueue(request().with_environment("staging"))
        .await;
    assert!(staging.is_accepted());

    let active = queue.list_active().await;
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].id(), first.id());
    assert!(active[0].created_at() <= active[1].created_at());

    active[0].cancel();
    let canceled = active[0].wait().await.unwrap();
    assert_eq!(canceled.status, JobStatus::Canceled);
    assert_eq!(first.status(), JobStatus::Canceled);

    let active = queue.list_active().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].key().to_string(), "acme/site@vercel:staging");

    let retry = queue.enqueue(request()).await;
    let retry = retry.handle().unwrap();
    assert_ne!(retry.id(), first.id());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_enqueue_admits_one_per_key() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel).steady(ProviderState::Building));
    let queue = DeploymentQueue::new(orchestrator(adapter.clone()));

    let (a, b) = tokio::join!(queue.enqueue(request()), queue.enqueue(request()));

    let accepted = [&a, &b].iter().filter(|admission| admission.is_accepted()).count();
    assert_eq!(accepted, 1);
    let (accepted, rejected) = if a.is_accepted() { (&a, &b) } else { (&b, &a) };
    let Admission::Rejected(rejection) = rejected else {
        panic!("second admission should be rejected");
    };
    assert_eq!(
        rejection.active_job,
        accepted.handle().map(|handle| handle.id())
    );
    assert_eq!(queue.list_active().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_finished_jobs_pruned_beyond_retention() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel));
    let registry = AdapterRegistry::new().with_adapter(adapter);
    let orchestrator = DeploymentOrchestrator::with_retention(registry, OrchestratorConfig::default(), 2);

    let mut ids = Vec::new();
    for _ in 0..4 {
        let handle = orchestrator.submit(request());
        let job = handle.wait().await.unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        ids.push(handle.id());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(orchestrator.jobs().len(), 2);
    assert!(orchestrator.job(ids[0]).is_none());
    assert!(orchestrator.job(ids[3]).is_some());
    assert!(matches!(
        orchestrator.cancel(ids[0]),
        Err(DeploymentError::UnknownJob(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_queue_rejects_invalid_config_at_admission() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Cloudflare));
    let registry = AdapterRegistry::new().with_adapter(adapter.clone());
    let queue = DeploymentQueue::new(DeploymentOrchestrator::new(
        registry,
        OrchestratorConfig::default(),
    ));

    let admission = queue
        .enqueue(JobRequest::new("acme/site", Platform::Cloudflare))
        .await;

    match admission {
        Admission::Rejected(rejection) => {
            assert_eq!(rejection.kind, ErrorKind::Validation);
            assert!(rejection.reason.contains("account_id"));
            assert_eq!(rejection.active_job, None);
        }
        Admission::Accepted(_) => panic!("invalid config was admitted"),
    }
    assert!(queue.list_active().await.is_empty());
    assert!(queue.orchestrator().jobs().is_empty());
    assert_eq!(adapter.submit_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_queue_drain_waits_for_all_jobs() {
    let adapter = Arc::new(ScriptedAdapter::new(Platform::Vercel));
    let queue = DeploymentQueue::new(orchestrator(adapter));

    for environment in ["preview", "production"] {
        assert!(
            queue
                .enqueue(request().with_environment(environment))
                .await
                .is_accepted()
        );
    }

    let finished = queue.drain().await;
    assert_eq!(finished.len(), 2);
    assert!(finished.iter().all(|job| job.status == JobStatus::Succeeded));
    assert!(queue.list_active().await.is_empty());
}
