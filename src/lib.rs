//! # Shipwright
//!
//! Repository analysis and deployment orchestration for static and
//! server-rendered web projects. Shipwright reads a repository's
//! `package.json`, recommends a hosting platform and drives the deployment
//! through the provider's API or CLI until it is live, failed or timed out.
//!
//! ## Architecture Overview
//!
//! - **[`analyzer`]**: Framework detection with an ordered rule table and a TTL cache
//! - **[`github`]**: GitHub contents client and the quota-aware rate limiter
//! - **[`platform`]**: Platform descriptors, the adapter contract and the
//!   Vercel, Netlify and CLI-backed adapters
//! - **[`deployment`]**: Job state machine, orchestrator and admission queue
//! - **[`store`]**: Token and analysis-history collaborator interfaces
//! - **[`config`]**: TOML configuration discovery
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shipwright::config::ConfigDiscovery;
//! use shipwright::deployment::{Admission, DeploymentOrchestrator, DeploymentQueue, JobRequest};
//! use shipwright::platform::{AdapterRegistry, Platform};
//! use shipwright::store::MemoryTokenStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigDiscovery::discover_config()?;
//!     let tokens = MemoryTokenStore::from_env();
//!     let registry = AdapterRegistry::from_config(&config.platforms, &tokens).await?;
//!     let queue = DeploymentQueue::new(DeploymentOrchestrator::new(registry, config.orchestrator));
//!
//!     let request = JobRequest::new("https://github.com/acme/site", Platform::Vercel);
//!     if let Admission::Accepted(handle) = queue.enqueue(request).await {
//!         let job = handle.wait().await?;
//!         println!("{} -> {:?}", job.status, job.url);
//!     }
//!     Ok(())
//! }
//! ```

/// Framework detection for repositories.
///
/// Reads manifests through a pluggable source, applies the ordered
/// framework rules and caches results per repository.
pub mod analyzer;

/// GitHub API access.
///
/// Contents API client plus the rate limiter fed from its response headers.
pub mod github;

/// Hosting platform integrations.
pub mod platform;

/// Deployment job lifecycle.
///
/// State machine, retrying orchestrator with status polling, and the
/// per-key admission queue.
pub mod deployment;

/// Token and analysis-history stores consumed by the core.
pub mod store;

/// Configuration discovery and loading.
pub mod config;

/// Environment constants and path utilities.
///
/// Centralizes default endpoints, environment variable names and
/// configuration paths used throughout the application.
pub mod env;

// CLI module for command-line interface
pub mod cli;

// Re-export main analyzer types
pub use analyzer::{AnalyzerConfig, AnalyzerError, FrameworkAnalysis, FrameworkAnalyzer, RepoRef};

// Re-export GitHub types
pub use github::{GitHubClient, RateLimiter};

// Re-export platform types
pub use platform::{
    AdapterError, AdapterRegistry, DeploymentConfig, Platform, PlatformAdapter, PlatformOptions,
};

// Re-export deployment types
pub use deployment::{
    Admission, DeploymentError, DeploymentJob, DeploymentOrchestrator, DeploymentQueue,
    DeploymentResult, JobHandle, JobRequest, JobStatus, OrchestratorConfig,
};

// Re-export configuration types
pub use config::{ConfigDiscovery, ShipwrightConfig};
