use crate::analyzer::source::RateLimitSnapshot;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Tracks the GitHub API quota from response headers.
///
/// Before any response has been recorded every call is allowed. Once the
/// remaining count reaches zero calls are refused until the reset time.
#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
}

/// Last observed quota
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request may be made now
    pub async fn can_call(&self) -> bool {
        let state = self.state.lock().await;
        Self::allows(&state, Utc::now())
    }

    fn allows(state: &RateLimitState, now: DateTime<Utc>) -> bool {
        match (state.remaining, state.reset_at) {
            (Some(0), Some(reset_at)) => now >= reset_at,
            _ => true,
        }
    }

    /// Record the counters reported by a response
    pub async fn record_response(&self, limit: u32, remaining: u32, reset_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        state.limit = Some(limit);
        state.remaining = Some(remaining);
        state.reset_at = Some(reset_at);
        state.updated_at = Some(Utc::now());

        if remaining == 0 {
            warn!("GitHub API quota exhausted until {}", reset_at);
        } else {
            debug!("GitHub API quota: {}/{} remaining", remaining, limit);
        }
    }

    pub async fn record_snapshot(&self, snapshot: RateLimitSnapshot) {
        self.record_response(snapshot.limit, snapshot.remaining, snapshot.reset_at)
            .await;
    }

    /// Time left until the quota resets, zero when no reset is pending
    pub async fn time_until_reset(&self) -> Duration {
        let state = self.state.lock().await;
        state
            .reset_at
            .and_then(|reset_at| reset_at.signed_duration_since(Utc::now()).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    pub async fn status(&self) -> RateLimitState {
        self.state.lock().await.clone()
    }

    /// Read the quota headers from a response, if all three are present
    pub fn snapshot_from_headers(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
        let read = |name: &str| -> Option<i64> {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse().ok())
        };

        let limit = u32::try_from(read(LIMIT_HEADER)?).ok()?;
        let remaining = u32::try_from(read(REMAINING_HEADER)?).ok()?;
        let reset_at = Utc.timestamp_opt(read(RESET_HEADER)?, 0).single()?;

        Some(RateLimitSnapshot {
            limit,
            remaining,
            reset_at,
        })
    }
}
