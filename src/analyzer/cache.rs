use crate::analyzer::types::FrameworkAnalysis;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

/// Analysis results keyed by normalized repository identifier.
///
/// Each entry carries its own TTL. Concurrent writers for the same key
/// replace each other atomically; the last completed write wins.
#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: DashMap<String, FrameworkAnalysis>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `key` if it has not expired at `now`
    pub fn get_fresh(&self, key: &str, now: DateTime<Utc>) -> Option<FrameworkAnalysis> {
        let entry = self.entries.get(key)?;
        if entry.is_fresh(now) {
            trace!("Cache hit for {}", key);
            Some(entry.value().clone())
        } else {
            trace!("Cache entry for {} expired at {}", key, entry.cached_at);
            None
        }
    }

    pub fn insert(&self, analysis: FrameworkAnalysis) {
        self.entries.insert(analysis.repo_key.clone(), analysis);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry that is expired at `now`
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, analysis| {
            let keep = analysis.is_fresh(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(key: &str, ttl: Duration) -> FrameworkAnalysis {
        let mut analysis = FrameworkAnalysis::unknown(key);
        analysis.ttl = ttl;
        analysis
    }

    #[test]
    fn test_fresh_and_expired_entries() {
        let cache = AnalysisCache::new();
        let analysis = entry("acme/site", Duration::from_secs(60));
        let cached_at = analysis.cached_at;
        cache.insert(analysis);

        assert!(cache.get_fresh("acme/site", cached_at).is_some());
        assert!(
            cache
                .get_fresh("acme/site", cached_at + chrono::Duration::seconds(59))
                .is_some()
        );
        assert!(
            cache
                .get_fresh("acme/site", cached_at + chrono::Duration::seconds(60))
                .is_none()
        );
        assert!(cache.get_fresh("acme/other", cached_at).is_none());
    }

    #[test]
    fn test_zero_ttl_never_served() {
        let cache = AnalysisCache::new();
        let analysis = entry("acme/site", Duration::ZERO);
        let cached_at = analysis.cached_at;
        cache.insert(analysis);
        assert!(cache.get_fresh("acme/site", cached_at).is_none());
    }

    #[test]
    fn test_last_write_wins_and_purge() {
        let cache = AnalysisCache::new();
        cache.insert(entry("acme/site", Duration::from_secs(60)));
        let mut newer = entry("acme/site", Duration::from_secs(60));
        newer.framework = "astro".to_string();
        cache.insert(newer.clone());
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get_fresh("acme/site", newer.cached_at).unwrap().framework,
            "astro"
        );

        cache.insert(entry("acme/stale", Duration::from_secs(1)));
        let removed = cache.purge_expired(Utc::now() + chrono::Duration::seconds(5));
        assert_eq!(removed, 1);
        assert!(cache.invalidate("acme/site"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_counts_only_removed_entries_under_concurrent_inserts() {
        let cache = std::sync::Arc::new(AnalysisCache::new());
        for i in 0..50 {
            cache.insert(entry(&format!("acme/stale-{}", i), Duration::ZERO));
        }

        let writer = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    cache.insert(entry(&format!("acme/fresh-{}", i), Duration::from_secs(600)));
                }
            })
        };
        let removed = cache.purge_expired(Utc::now());
        writer.join().unwrap();

        assert_eq!(removed, 50);
        assert_eq!(cache.len(), 200);
    }
}
