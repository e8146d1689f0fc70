use crate::cache::key::cache_root;
use crate::cache::memory::DEFAULT_MEMORY_CAPACITY;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// Process-wide settings, read once at startup: file, then environment,
/// then command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridlensConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Root of the agent logs: `<agents_dir>/<agent>/<scenario>/`.
    pub agents_dir: PathBuf,
    /// Environment description, used when an agent did not dump its spaces.
    #[serde(default)]
    pub env_dir: Option<PathBuf>,
    /// Worker pool size for cache warming.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Entries kept in the memory tier.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    SUPPORTED_CONFIG_VERSION
}

fn default_workers() -> usize {
    1
}

fn default_memory_capacity() -> u64 {
    DEFAULT_MEMORY_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GridlensConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            agents_dir: PathBuf::from("agents"),
            env_dir: None,
            workers: default_workers(),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            task_timeout_secs: None,
            log_level: default_log_level(),
        }
    }
}

impl GridlensConfig {
    pub fn cache_root(&self) -> PathBuf {
        cache_root(&self.agents_dir)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// Applies `GRIDLENS_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GRIDLENS_AGENTS_DIR") {
            self.agents_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("GRIDLENS_ENV_DIR") {
            self.env_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("GRIDLENS_WORKERS") {
            if let Ok(n) = v.parse() {
                self.workers = n;
            }
        }
        if let Some(v) = lookup("GRIDLENS_MEMORY_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.memory_capacity = n;
            }
        }
        if let Some(v) = lookup("GRIDLENS_TASK_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.task_timeout_secs = Some(n);
            }
        }
        if let Some(v) = lookup("GRIDLENS_LOG") {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        if self.workers == 0 {
            return Err(ConfigError("workers must be at least 1".into()));
        }
        if self.agents_dir.as_os_str().is_empty() {
            return Err(ConfigError("agents_dir is empty".into()));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(ConfigError("task_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Loads a YAML config. Unknown keys are reported; with `strict` they are an
/// error. Relative directories resolve against the config file's directory.
pub fn load_config(path: &Path, strict: bool) -> Result<GridlensConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut ignored_keys = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    let mut cfg: GridlensConfig = serde_ignored::deserialize(deserializer, |p| {
        ignored_keys.push(p.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML {}: {}", path.display(), e)))?;

    // `x-` keys hold YAML anchors
    ignored_keys.retain(|k| !k.starts_with("x-"));
    if !ignored_keys.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown fields in {}: {:?}",
                path.display(),
                ignored_keys
            )));
        }
        // logging is configured from this file, so it is not up yet
        eprintln!(
            "WARN: ignoring unknown config fields in {}: {:?}",
            path.display(),
            ignored_keys
        );
    }

    let base = path.parent().unwrap_or(Path::new("."));
    cfg.agents_dir = resolve(base, &cfg.agents_dir);
    cfg.env_dir = cfg.env_dir.as_deref().map(|d| resolve(base, d));

    cfg.validate()?;
    Ok(cfg)
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

pub fn write_sample_config(path: &Path, agents_dir: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        format!(
            r#"version: 1
# Root of the agent logs: <agents_dir>/<agent>/<scenario>/
agents_dir: {}
# env_dir: path/to/environment
workers: 2
memory_capacity: {}
# task_timeout_secs: 600
log_level: info
"#,
            agents_dir.display(),
            DEFAULT_MEMORY_CAPACITY
        ),
    )
    .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))
}
