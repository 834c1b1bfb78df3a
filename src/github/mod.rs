//! GitHub access: the contents API client and its quota tracker.

pub mod client;
pub mod rate_limiter;

pub use client::GitHubClient;
pub use rate_limiter::{RateLimitState, RateLimiter};
