use super::key::CacheKey;
use crate::analytics::EpisodeArtifact;
use crate::errors::StoreError;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::Arc;

pub const DEFAULT_MEMORY_CAPACITY: u64 = 64;

/// Process-local tier: decorated artifacts, least-recently-used eviction.
///
/// Cloning shares the underlying cache.
#[derive(Clone)]
pub struct MemoryTier {
    cache: Cache<CacheKey, Arc<EpisodeArtifact>>,
    capacity: u64,
}

impl MemoryTier {
    pub fn with_capacity(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache, capacity }
    }

    /// A tier that keeps nothing; used by producer stores.
    pub fn disabled() -> Self {
        Self::with_capacity(0)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<EpisodeArtifact>> {
        self.cache.get(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains_key(key)
    }

    pub fn insert(&self, key: CacheKey, artifact: Arc<EpisodeArtifact>) {
        self.cache.insert(key, artifact);
    }

    /// Returns the resident artifact or runs `init` to produce it.
    ///
    /// Concurrent callers for the same key wait on a single `init`; an error
    /// is handed to all of them and nothing is cached.
    pub fn get_or_try_insert_with<F>(
        &self,
        key: &CacheKey,
        init: F,
    ) -> Result<Arc<EpisodeArtifact>, StoreError>
    where
        F: FnOnce() -> Result<Arc<EpisodeArtifact>, StoreError>,
    {
        self.cache
            .try_get_with(key.clone(), init)
            .map_err(|e| (*e).clone())
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.cache.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// Number of resident entries after pending evictions are applied.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl std::fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTier")
            .field("capacity", &self.capacity)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::tests::sample_analytics;
    use crate::analytics::{RuntimeContext, SpaceDescription};
    use std::path::PathBuf;

    fn artifact() -> Arc<EpisodeArtifact> {
        let ctx = RuntimeContext {
            observation_space: Arc::new(SpaceDescription::default()),
            action_space: Arc::new(SpaceDescription::default()),
            source: PathBuf::from("/tmp"),
        };
        Arc::new(EpisodeArtifact::new(Arc::new(sample_analytics()), ctx))
    }

    #[test]
    fn evicts_beyond_capacity() {
        let tier = MemoryTier::with_capacity(2);
        tier.insert(CacheKey::new("a", "1"), artifact());
        tier.insert(CacheKey::new("a", "2"), artifact());
        tier.insert(CacheKey::new("a", "3"), artifact());

        assert_eq!(tier.len(), 2);
        assert!(tier.contains(&CacheKey::new("a", "3")));
    }

    #[test]
    fn failed_init_caches_nothing() {
        let tier = MemoryTier::default();
        let key = CacheKey::new("a", "1");
        let err = tier
            .get_or_try_insert_with(&key, || Err(StoreError::NotFound { key: key.clone() }))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!tier.contains(&key));

        let got = tier.get_or_try_insert_with(&key, || Ok(artifact())).unwrap();
        assert!(Arc::ptr_eq(&got, &tier.get(&key).unwrap()));
    }
}
