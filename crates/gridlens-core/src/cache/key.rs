use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const CACHE_DIR_NAME: &str = "_cache";
pub const BLOB_EXTENSION: &str = "json.zst";
pub const LEGACY_BLOB_EXTENSION: &str = "json";

/// Identity of one analytics artifact, shared by both cache tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub agent: String,
    pub scenario: String,
}

impl CacheKey {
    pub fn new(agent: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            scenario: scenario.into(),
        }
    }

    /// Compressed blob location. Pure function of the key, so producers of
    /// distinct keys never touch the same file.
    pub fn blob_path(&self, cache_root: &Path) -> PathBuf {
        cache_root
            .join(&self.scenario)
            .join(format!("{}.{}", self.agent, BLOB_EXTENSION))
    }

    /// Uncompressed location written by older releases; probed first on read.
    pub fn legacy_blob_path(&self, cache_root: &Path) -> PathBuf {
        cache_root
            .join(&self.scenario)
            .join(format!("{}.{}", self.agent, LEGACY_BLOB_EXTENSION))
    }

    /// Directory holding the raw logs of this episode.
    pub fn episode_dir(&self, agents_dir: &Path) -> PathBuf {
        agents_dir.join(&self.agent).join(&self.scenario)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent, self.scenario)
    }
}

pub fn cache_root(agents_dir: &Path) -> PathBuf {
    agents_dir.join(CACHE_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_paths_are_partitioned_by_scenario() {
        let root = Path::new("/data/agents/_cache");
        let key = CacheKey::new("do_nothing", "000");
        assert_eq!(
            key.blob_path(root),
            PathBuf::from("/data/agents/_cache/000/do_nothing.json.zst")
        );
        assert_eq!(
            key.legacy_blob_path(root),
            PathBuf::from("/data/agents/_cache/000/do_nothing.json")
        );
        assert_ne!(
            key.blob_path(root),
            CacheKey::new("do_nothing", "001").blob_path(root)
        );
    }

    #[test]
    fn cache_root_lives_under_agents_dir() {
        assert_eq!(
            cache_root(Path::new("/data/agents")),
            PathBuf::from("/data/agents/_cache")
        );
    }
}
