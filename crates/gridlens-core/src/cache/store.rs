use super::blob;
use super::key::{cache_root, CacheKey};
use super::memory::MemoryTier;
use super::rehydrate::{self, LoadReport};
use crate::analytics::{AnalyticsBuilder, EpisodeAnalytics, EpisodeArtifact, RuntimeContext};
use crate::errors::StoreError;
use crate::source::EpisodeSource;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Observable lifecycle of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Absent,
    ComputingFresh,
    PersistedOnly,
    Resident,
}

/// What a producer call did for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProduceOutcome {
    AlreadyCached,
    Persisted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub memory_hits: u64,
    pub disk_loads: u64,
    pub builds: u64,
    pub persists: u64,
    pub migrations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_loads: AtomicU64,
    builds: AtomicU64,
    persists: AtomicU64,
    migrations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StoreStats {
        StoreStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_loads: self.disk_loads.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            persists: self.persists.load(Ordering::Relaxed),
            migrations: self.migrations.load(Ordering::Relaxed),
        }
    }
}

/// Everything needed to open a store. Cheap to clone; the precomputation
/// scheduler hands one to every task so each owns a separate store.
#[derive(Clone)]
pub struct ArtifactStoreBuilder {
    agents_dir: PathBuf,
    cache_root: PathBuf,
    source: Arc<dyn EpisodeSource>,
    analytics: Arc<dyn AnalyticsBuilder>,
    memory: Option<MemoryTier>,
}

impl ArtifactStoreBuilder {
    pub fn new(
        agents_dir: impl Into<PathBuf>,
        source: Arc<dyn EpisodeSource>,
        analytics: Arc<dyn AnalyticsBuilder>,
    ) -> Self {
        let agents_dir = agents_dir.into();
        Self {
            cache_root: cache_root(&agents_dir),
            agents_dir,
            source,
            analytics,
            memory: None,
        }
    }

    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    pub fn memory(mut self, tier: MemoryTier) -> Self {
        self.memory = Some(tier);
        self
    }

    pub fn build(&self) -> ArtifactStore {
        self.open(self.memory.clone().unwrap_or_default())
    }

    /// A store for cache warming: no memory tier, so nothing it produces
    /// outlives the call that produced it.
    pub fn producer(&self) -> ArtifactStore {
        self.open(MemoryTier::disabled())
    }

    fn open(&self, memory: MemoryTier) -> ArtifactStore {
        ArtifactStore {
            agents_dir: self.agents_dir.clone(),
            cache_root: self.cache_root.clone(),
            source: self.source.clone(),
            analytics: self.analytics.clone(),
            memory,
            inflight: Mutex::new(HashSet::new()),
            counters: Counters::default(),
        }
    }
}

/// Two-tier artifact cache: a memory tier of decorated artifacts in front
/// of one compressed blob per key under `<agents_dir>/_cache`.
pub struct ArtifactStore {
    agents_dir: PathBuf,
    cache_root: PathBuf,
    source: Arc<dyn EpisodeSource>,
    analytics: Arc<dyn AnalyticsBuilder>,
    memory: MemoryTier,
    inflight: Mutex<HashSet<CacheKey>>,
    counters: Counters,
}

impl ArtifactStore {
    pub fn agents_dir(&self) -> &Path {
        &self.agents_dir
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    pub fn stats(&self) -> StoreStats {
        self.counters.snapshot()
    }

    pub fn state(&self, key: &CacheKey) -> KeyState {
        if self.memory.contains(key) {
            KeyState::Resident
        } else if self.lock_inflight().contains(key) {
            KeyState::ComputingFresh
        } else if blob::exists(&self.cache_root, key) {
            KeyState::PersistedOnly
        } else {
            KeyState::Absent
        }
    }

    pub fn is_persisted(&self, key: &CacheKey) -> bool {
        blob::exists(&self.cache_root, key)
    }

    /// Artifact for interactive use, always decorated with runtime context.
    ///
    /// Resident keys return the shared instance without I/O. Otherwise the
    /// blob is restored, or the episode is built from its logs and persisted,
    /// and the result is promoted to the memory tier. Concurrent calls for
    /// one key share a single computation.
    pub fn get(&self, key: &CacheKey) -> Result<Arc<EpisodeArtifact>, StoreError> {
        if let Some(hit) = self.memory.get(key) {
            Counters::bump(&self.counters.memory_hits);
            return Ok(hit);
        }

        self.memory.get_or_try_insert_with(key, || {
            let analytics = match self.load_persisted(key)? {
                Some(analytics) => analytics,
                None => self.compute_and_persist(key)?,
            };
            let context = self.attach_context(key)?;
            Ok(Arc::new(EpisodeArtifact::new(Arc::new(analytics), context)))
        })
    }

    /// Producer path: same tier order as [`get`](Self::get) but never
    /// attaches runtime context and never promotes to the memory tier.
    pub fn get_without_decoration(
        &self,
        key: &CacheKey,
    ) -> Result<Arc<EpisodeAnalytics>, StoreError> {
        if let Some(hit) = self.memory.get(key) {
            Counters::bump(&self.counters.memory_hits);
            return Ok(hit.analytics.clone());
        }
        let analytics = match self.load_persisted(key)? {
            Some(analytics) => analytics,
            None => self.compute_and_persist(key)?,
        };
        Ok(Arc::new(analytics))
    }

    /// Persist-only producer call: builds and writes the blob unless one is
    /// already there, without reading an existing blob back. A resident
    /// entry whose blob is gone still gets rebuilt.
    pub fn ensure_persisted(&self, key: &CacheKey) -> Result<ProduceOutcome, StoreError> {
        if self.is_persisted(key) {
            return Ok(ProduceOutcome::AlreadyCached);
        }
        self.compute_and_persist(key)?;
        Ok(ProduceOutcome::Persisted)
    }

    /// Removes the cache root. Refuses when it still holds blobs; see
    /// [`purge`](Self::purge) for a recursive wipe. Temp files of interrupted
    /// writes and scenario directories they leave empty do not count.
    pub fn clear(&self) -> Result<(), StoreError> {
        let swept = blob::sweep_temp_files(&self.cache_root)?;
        if swept > 0 {
            tracing::warn!(
                event = "gridlens.cache.temp_swept",
                root = %self.cache_root.display(),
                files = swept
            );
        }
        std::fs::remove_dir(&self.cache_root).map_err(|e| StoreError::io(&self.cache_root, e))
    }

    /// Deletes every blob and empties the memory tier.
    pub fn purge(&self) -> Result<(), StoreError> {
        self.memory.invalidate_all();
        if self.cache_root.exists() {
            std::fs::remove_dir_all(&self.cache_root)
                .map_err(|e| StoreError::io(&self.cache_root, e))?;
        }
        tracing::info!(
            event = "gridlens.cache.purged",
            cache_root = %self.cache_root.display()
        );
        Ok(())
    }

    fn load_persisted(&self, key: &CacheKey) -> Result<Option<EpisodeAnalytics>, StoreError> {
        let started = Instant::now();
        let Some(decoded) = blob::read(&self.cache_root, key)? else {
            return Ok(None);
        };
        let legacy_location = decoded.legacy_location;
        let (analytics, report) = rehydrate::restore(decoded, key)?;
        Counters::bump(&self.counters.disk_loads);

        if report.migrated || legacy_location {
            if let Err(e) = self.rewrite_migrated(key, &analytics, &report, legacy_location) {
                tracing::warn!(
                    event = "gridlens.cache.migrate_write_failed",
                    key = %key,
                    error = %e,
                    "serving migrated artifact without rewriting its blob"
                );
            }
        }

        tracing::info!(
            event = "gridlens.cache.disk_load",
            key = %key,
            from_version = report.from_version,
            interned = report.footprint.interned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent {} on scenario {} loaded from filesystem cache in {:.1} s",
            key.agent,
            key.scenario,
            started.elapsed().as_secs_f64()
        );
        Ok(Some(analytics))
    }

    fn rewrite_migrated(
        &self,
        key: &CacheKey,
        analytics: &EpisodeAnalytics,
        report: &LoadReport,
        legacy_location: bool,
    ) -> Result<(), StoreError> {
        self.persist(key, analytics)?;
        Counters::bump(&self.counters.migrations);
        if legacy_location {
            let legacy = key.legacy_blob_path(&self.cache_root);
            std::fs::remove_file(&legacy).map_err(|e| StoreError::io(&legacy, e))?;
        }
        tracing::info!(
            event = "gridlens.cache.migrated",
            key = %key,
            from_version = report.from_version,
            to_version = blob::CURRENT_FORMAT_VERSION
        );
        Ok(())
    }

    fn compute_and_persist(&self, key: &CacheKey) -> Result<EpisodeAnalytics, StoreError> {
        let _guard = InflightGuard::enter(&self.inflight, key);
        let started = Instant::now();

        let raw = self
            .source
            .read_raw_episode(&self.agents_dir, &key.agent, &key.scenario)
            .map_err(|e| StoreError::Build {
                key: key.clone(),
                reason: format!("{e:#}"),
            })?
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;

        let mut analytics = self
            .analytics
            .build(&raw, &key.scenario, &key.agent)
            .map_err(|e| StoreError::Build {
                key: key.clone(),
                reason: format!("{e:#}"),
            })?;
        Counters::bump(&self.counters.builds);

        self.persist(key, &analytics)?;
        analytics.reduce_footprint();

        tracing::info!(
            event = "gridlens.cache.built",
            key = %key,
            steps = analytics.n_steps(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent {} on scenario {} loaded from logs in {:.1} s",
            key.agent,
            key.scenario,
            started.elapsed().as_secs_f64()
        );
        Ok(analytics)
    }

    fn persist(&self, key: &CacheKey, analytics: &EpisodeAnalytics) -> Result<(), StoreError> {
        let path = key.blob_path(&self.cache_root);
        let bytes = blob::encode(analytics, &path)?;
        blob::write_atomic(&path, &bytes)?;
        Counters::bump(&self.counters.persists);
        tracing::debug!(
            event = "gridlens.cache.persisted",
            key = %key,
            path = %path.display(),
            bytes = bytes.len()
        );
        Ok(())
    }

    fn attach_context(&self, key: &CacheKey) -> Result<RuntimeContext, StoreError> {
        let agent_dir = self.agents_dir.join(&key.agent);
        self.analytics
            .runtime_context(&agent_dir)
            .map_err(|e| StoreError::Context {
                agent: key.agent.clone(),
                reason: format!("{e:#}"),
            })
    }

    fn lock_inflight(&self) -> std::sync::MutexGuard<'_, HashSet<CacheKey>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Marks a key as `ComputingFresh` for the lifetime of the guard.
struct InflightGuard<'a> {
    set: &'a Mutex<HashSet<CacheKey>>,
    key: CacheKey,
}

impl<'a> InflightGuard<'a> {
    fn enter(set: &'a Mutex<HashSet<CacheKey>>, key: &CacheKey) -> Self {
        set.lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone());
        Self {
            set,
            key: key.clone(),
        }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("agents_dir", &self.agents_dir)
            .field("cache_root", &self.cache_root)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}
