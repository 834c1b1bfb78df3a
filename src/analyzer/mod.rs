//! Framework detection for repositories.
//!
//! [`FrameworkAnalyzer`] reads a repository's `package.json` through a
//! [`ManifestSource`], classifies it with the ordered rules in [`rules`] and
//! caches the result per repository.

pub mod cache;
pub mod manager;
pub mod rules;
pub mod source;
pub mod types;


pub use cache::AnalysisCache;
pub use manager::FrameworkAnalyzer;
pub use source::{FetchResponse, FetchStatus, LocalManifestSource, ManifestSource, RateLimitSnapshot};
pub use types::*;
