//! Deployment jobs: state machine, orchestration and admission control.
//!
//! [`DeploymentQueue`] admits at most one live job per logical key and hands
//! it to the [`DeploymentOrchestrator`], which submits with retry, polls the
//! provider until a terminal state or the deadline, and reports every
//! transition.

pub mod backoff;
pub mod orchestrator;
pub mod queue;
pub mod types;

#[cfg(test)]
pub mod tests;

pub use backoff::BackoffPolicy;
pub use orchestrator::{DEFAULT_FINISHED_RETENTION, DeploymentOrchestrator, JobHandle};
pub use queue::{Admission, DeploymentQueue, Rejection};
pub use types::*;
