//! External collaborator interfaces.
//!
//! Credential storage and analysis history live outside the core. They are
//! consumed through [`TokenStore`] and [`AnalysisStore`]; the in-memory and
//! environment-backed implementations here serve the CLI and tests.

use crate::analyzer::FrameworkAnalysis;
use crate::platform::Platform;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("OAuth flow is not available for {0}")]
    OAuthUnavailable(Platform),
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Opaque credential store
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, platform: Platform) -> Result<Option<String>, StoreError>;
    async fn set(&self, platform: Platform, token: String) -> Result<(), StoreError>;
    /// Run an interactive OAuth flow and return the resulting token
    async fn oauth(&self, platform: Platform) -> Result<String, StoreError>;
}

/// Tokens held in memory, optionally seeded from the environment
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: DashMap<Platform, String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed tokens from each platform's token variable using `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = Self::new();
        for platform in Platform::ALL {
            if let Some(token) = lookup(platform.descriptor().token_env_var)
                .filter(|token| !token.trim().is_empty())
            {
                store.tokens.insert(platform, token);
            }
        }
        store
    }

    /// Seed tokens from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, platform: Platform) -> Result<Option<String>, StoreError> {
        Ok(self.tokens.get(&platform).map(|entry| entry.value().clone()))
    }

    async fn set(&self, platform: Platform, token: String) -> Result<(), StoreError> {
        self.tokens.insert(platform, token);
        Ok(())
    }

    async fn oauth(&self, platform: Platform) -> Result<String, StoreError> {
        Err(StoreError::OAuthUnavailable(platform))
    }
}

/// Persisted analysis record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub repo_url: String,
    pub analysis: FrameworkAnalysis,
    pub recorded_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(repo_url: impl Into<String>, analysis: FrameworkAnalysis) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo_url: repo_url.into(),
            analysis,
            recorded_at: Utc::now(),
        }
    }
}

/// Opaque analysis history store
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn save_analysis(&self, record: AnalysisRecord) -> Result<(), StoreError>;
    async fn get_analyses(&self) -> Result<Vec<AnalysisRecord>, StoreError>;
    async fn get_analysis_by_url(&self, url: &str) -> Result<Option<AnalysisRecord>, StoreError>;
}

/// Analysis history kept in memory, newest record per URL wins on lookup
#[derive(Debug, Default)]
pub struct MemoryAnalysisStore {
    records: RwLock<Vec<AnalysisRecord>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn save_analysis(&self, record: AnalysisRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn get_analyses(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }

    async fn get_analysis_by_url(&self, url: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .find(|record| record.repo_url == url)
            .cloned())
    }
}
