//! CLI-specific functionality for shipwright
//!
//! This module contains argument parsing and the mapping from job outcomes
//! to process exit codes.

pub mod args;

pub use args::{AnalyzeConfig, Args, Commands, DeployConfig, ExecutionMode};

use crate::deployment::JobStatus;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_TIMED_OUT: i32 = 2;
pub const EXIT_CANCELED: i32 = 130;

/// Process exit code for a finished deployment job
pub fn exit_code(status: JobStatus) -> i32 {
    match status {
        JobStatus::Succeeded => EXIT_SUCCESS,
        JobStatus::TimedOut => EXIT_TIMED_OUT,
        JobStatus::Canceled => EXIT_CANCELED,
        JobStatus::Queued | JobStatus::Submitting | JobStatus::Polling | JobStatus::Failed => {
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinguish_outcomes() {
        assert_eq!(exit_code(JobStatus::Succeeded), 0);
        assert_eq!(exit_code(JobStatus::Failed), 1);
        assert_eq!(exit_code(JobStatus::TimedOut), 2);
        assert_eq!(exit_code(JobStatus::Canceled), 130);
    }
}
