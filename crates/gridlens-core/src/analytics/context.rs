use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const OBSERVATION_SPACE_FILE: &str = "dict_observation_space.json";
pub const ACTION_SPACE_FILE: &str = "dict_action_space.json";

/// Description of an observation or action space as dumped next to the
/// agent logs. Only the fields the dashboard inspects are typed; the rest is
/// kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceDescription {
    #[serde(default)]
    pub name_line: Vec<String>,
    #[serde(default)]
    pub name_sub: Vec<String>,
    #[serde(default)]
    pub name_load: Vec<String>,
    #[serde(default)]
    pub name_gen: Vec<String>,
    #[serde(default)]
    pub grid_layout: BTreeMap<String, (f64, f64)>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SpaceDescription {
    pub fn n_line(&self) -> usize {
        self.name_line.len()
    }

    pub fn n_sub(&self) -> usize {
        self.name_sub.len()
    }
}

/// Runtime-only state of an artifact. Never written to the filesystem tier;
/// re-attached on every load.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub observation_space: Arc<SpaceDescription>,
    pub action_space: Arc<SpaceDescription>,
    /// Directory the spaces were read from.
    pub source: PathBuf,
}

impl RuntimeContext {
    /// Reads both space files from `dir`.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let observation_space = read_space(&dir.join(OBSERVATION_SPACE_FILE))?;
        let action_space = read_space(&dir.join(ACTION_SPACE_FILE))?;
        Ok(Self {
            observation_space: Arc::new(observation_space),
            action_space: Arc::new(action_space),
            source: dir.to_path_buf(),
        })
    }

    pub fn has_spaces_in(dir: &Path) -> bool {
        dir.join(OBSERVATION_SPACE_FILE).is_file() && dir.join(ACTION_SPACE_FILE).is_file()
    }
}

fn read_space(path: &Path) -> anyhow::Result<SpaceDescription> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read space description {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse space description {}", path.display()))
}

/// Resolves runtime contexts for agent directories, falling back to the
/// environment directory when an agent did not dump its spaces.
///
/// Every agent of one environment shares the same spaces, so resolved
/// contexts are memoized per source directory.
#[derive(Debug, Default)]
pub struct ContextResolver {
    env_dir: Option<PathBuf>,
    resolved: Mutex<HashMap<PathBuf, RuntimeContext>>,
}

impl ContextResolver {
    pub fn new(env_dir: Option<PathBuf>) -> Self {
        Self {
            env_dir,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, agent_dir: &Path) -> anyhow::Result<RuntimeContext> {
        let dir = if RuntimeContext::has_spaces_in(agent_dir) {
            agent_dir.to_path_buf()
        } else if let Some(env) = self.env_dir.as_ref().filter(|d| RuntimeContext::has_spaces_in(d)) {
            env.clone()
        } else {
            anyhow::bail!(
                "no {} / {} found in {} or in the environment directory",
                OBSERVATION_SPACE_FILE,
                ACTION_SPACE_FILE,
                agent_dir.display()
            );
        };

        if let Some(ctx) = self.lock().get(&dir) {
            return Ok(ctx.clone());
        }
        let ctx = RuntimeContext::load(&dir)?;
        self.lock().insert(dir, ctx.clone());
        Ok(ctx)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, RuntimeContext>> {
        self.resolved.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_spaces(dir: &Path) {
        std::fs::write(
            dir.join(OBSERVATION_SPACE_FILE),
            r#"{"name_line":["0_1_0","1_2_1"],"name_sub":["sub_0","sub_1","sub_2"],"grid_layout":{"sub_0":[0.0,1.0]},"glop_version":"1.9"}"#,
        )
        .unwrap();
        std::fs::write(dir.join(ACTION_SPACE_FILE), r#"{"name_sub":["sub_0","sub_1","sub_2"]}"#)
            .unwrap();
    }

    #[test]
    fn resolves_from_agent_dir_and_memoizes() {
        let dir = tempfile::tempdir().unwrap();
        write_spaces(dir.path());

        let resolver = ContextResolver::new(None);
        let a = resolver.resolve(dir.path()).unwrap();
        let b = resolver.resolve(dir.path()).unwrap();

        assert_eq!(a.observation_space.n_line(), 2);
        assert_eq!(a.action_space.n_sub(), 3);
        assert!(a.observation_space.extra.contains_key("glop_version"));
        assert!(Arc::ptr_eq(&a.observation_space, &b.observation_space));
    }

    #[test]
    fn falls_back_to_env_dir() {
        let agent = tempfile::tempdir().unwrap();
        let env = tempfile::tempdir().unwrap();
        write_spaces(env.path());

        let resolver = ContextResolver::new(Some(env.path().to_path_buf()));
        let ctx = resolver.resolve(agent.path()).unwrap();
        assert_eq!(ctx.source, env.path());
    }

    #[test]
    fn missing_spaces_is_an_error() {
        let agent = tempfile::tempdir().unwrap();
        let resolver = ContextResolver::new(None);
        assert!(resolver.resolve(agent.path()).is_err());
    }
}
