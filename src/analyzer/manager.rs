use crate::analyzer::cache::AnalysisCache;
use crate::analyzer::rules::{classify, collect_dependencies};
use crate::analyzer::source::{FetchStatus, ManifestSource};
use crate::analyzer::types::{AnalyzerConfig, AnalyzerError, FrameworkAnalysis, RepoRef};
use crate::github::RateLimiter;
use crate::store::{AnalysisRecord, AnalysisStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Classifies repositories by the frameworks their manifests depend on
pub struct FrameworkAnalyzer {
    source: Arc<dyn ManifestSource>,
    rate_limiter: Arc<RateLimiter>,
    cache: AnalysisCache,
    config: AnalyzerConfig,
    store: Option<Arc<dyn AnalysisStore>>,
}

/// Raw manifest located for a repository
struct LocatedManifest {
    path: String,
    content: Vec<u8>,
}

impl FrameworkAnalyzer {
    pub fn new(source: Arc<dyn ManifestSource>, config: AnalyzerConfig) -> Self {
        Self {
            source,
            rate_limiter: Arc::new(RateLimiter::new()),
            cache: AnalysisCache::new(),
            config,
            store: None,
        }
    }

    /// Share a rate limiter with other clients of the same upstream
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Persist fresh analyses to `store`
    pub fn with_store(mut self, store: Arc<dyn AnalysisStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze a repository given as `owner/repo` or a GitHub URL
    pub async fn analyze(&self, identifier: &str) -> Result<FrameworkAnalysis, AnalyzerError> {
        let repo = RepoRef::parse(identifier)?;
        self.analyze_repo(&repo).await
    }

    pub async fn analyze_repo(&self, repo: &RepoRef) -> Result<FrameworkAnalysis, AnalyzerError> {
        let key = repo.cache_key();

        if let Some(cached) = self.cache.get_fresh(&key, Utc::now()) {
            debug!("Using cached analysis for {}: {}", key, cached.framework);
            return Ok(cached);
        }
        debug!("No fresh analysis cached for {}", key);

        let manifest = self.locate_manifest(repo).await?;

        let mut analysis = FrameworkAnalysis::unknown(key.clone());
        analysis.ttl = self.config.cache_ttl;

        if let Some(manifest) = manifest {
            analysis.manifest_path = Some(manifest.path.clone());
            match Self::parse_manifest(&manifest.content) {
                Ok(parsed) => {
                    let dependencies = collect_dependencies(&parsed);
                    let classification = classify(&dependencies);
                    analysis.framework = classification.framework;
                    analysis.scores = classification.scores;
                    analysis.dependencies = dependencies.into_iter().collect();
                }
                Err(e) => {
                    warn!(
                        "Manifest {} for {} could not be parsed, treating as unknown: {}",
                        manifest.path, key, e
                    );
                }
            }
        } else {
            debug!("No manifest found for {}", key);
        }

        analysis.cached_at = Utc::now();
        let purged = self.cache.purge_expired(analysis.cached_at);
        if purged > 0 {
            debug!("Evicted {} expired analyses", purged);
        }
        self.cache.insert(analysis.clone());
        info!(
            "Analyzed {}: {} (recommended: {})",
            key,
            analysis.framework,
            analysis
                .recommended_platform()
                .map(|platform| platform.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        self.persist(repo, &analysis).await;
        Ok(analysis)
    }

    fn parse_manifest(content: &[u8]) -> Result<serde_json::Value, AnalyzerError> {
        let text = std::str::from_utf8(content)
            .map_err(|e| AnalyzerError::Parse(format!("manifest is not valid UTF-8: {}", e)))?;
        serde_json::from_str(text)
            .map_err(|e| AnalyzerError::Parse(format!("manifest is not valid JSON: {}", e)))
    }

    /// Drop the cached entry for a repository
    pub fn invalidate(&self, identifier: &str) -> Result<bool, AnalyzerError> {
        let repo = RepoRef::parse(identifier)?;
        Ok(self.cache.invalidate(&repo.cache_key()))
    }

    /// Probe the configured manifest paths in order
    async fn locate_manifest(
        &self,
        repo: &RepoRef,
    ) -> Result<Option<LocatedManifest>, AnalyzerError> {
        for path in &self.config.manifest_paths {
            if !self.rate_limiter.can_call().await {
                let retry_after = self.rate_limiter.time_until_reset().await;
                warn!(
                    "Refusing {} lookup for {}: rate limit exhausted for {:?}",
                    path, repo, retry_after
                );
                return Err(AnalyzerError::RateLimitExceeded { retry_after });
            }

            debug!("Probing {} via {}", path, self.source.source_name());
            let response = self.source.fetch(repo, path).await?;
            if let Some(snapshot) = response.rate_limit {
                self.rate_limiter.record_snapshot(snapshot).await;
            }

            match response.status {
                FetchStatus::Found(content) => {
                    return Ok(Some(LocatedManifest {
                        path: path.clone(),
                        content,
                    }));
                }
                FetchStatus::Missing => continue,
                FetchStatus::RateLimited => {
                    let retry_after = self.rate_limiter.time_until_reset().await;
                    warn!("{} rejected {} as rate limited", self.source.source_name(), repo);
                    return Err(AnalyzerError::RateLimitExceeded { retry_after });
                }
            }
        }

        Ok(None)
    }

    async fn persist(&self, repo: &RepoRef, analysis: &FrameworkAnalysis) {
        let Some(store) = &self.store else {
            return;
        };

        let record = AnalysisRecord::new(format!("https://github.com/{}", repo.slug()), analysis.clone());
        if let Err(e) = store.save_analysis(record).await {
            warn!("Failed to persist analysis for {}: {}", repo, e);
        }
    }
}

impl std::fmt::Debug for FrameworkAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkAnalyzer")
            .field("source", &self.source.source_name())
            .field("cached", &self.cache.len())
            .field("config", &self.config)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}
