#![allow(dead_code)]

use gridlens_core::analytics::{AnalyticsBuilder, EpisodeAnalytics, RuntimeContext, StandardAnalytics};
use gridlens_core::cache::ArtifactStoreBuilder;
use gridlens_core::source::{JsonlEpisodeReader, RawEpisode};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-step reward with a full mantissa, so running sums round.
pub fn step_reward(t: u64) -> f64 {
    234.0 + (t as f64 * 0.618_033_988_749_895).fract() * 1235.0 / 7.0
}

/// Line loading for step `t`, crossing 1.0 from the third step on.
pub fn step_rho(t: u64) -> f64 {
    0.412_345_678_901_23 + 0.298_765_432_109_87 * t as f64 + (t as f64).sqrt() / 9.0
}

/// Writes one episode under `<root>/<agent>/<scenario>/` with `steps` steps
/// out of `available`.
pub fn write_episode(root: &Path, agent: &str, scenario: &str, steps: u64, available: u64, reward: f64) {
    let dir = root.join(agent).join(scenario);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("episode_meta.json"),
        json!({
            "nb_timestep_played": steps,
            "chronics_max_timestep": available,
            "cumulative_reward": reward,
            "env_type": "case14"
        })
        .to_string(),
    )
    .unwrap();

    let mut lines = String::new();
    for t in 0..steps {
        let mut step = json!({
            "timestamp": format!("2019-01-06T00:{:02}:00", (t * 5) % 60),
            "reward": step_reward(t),
            "rho": {"0_4_2": step_rho(t), "1_2_3": 0.251_829_764_313 / 3.0},
            "load_p": {"load_1_0": 21.5 + t as f64 / 7.0},
            "gen_p": {"gen_0_0": 80.0 / 3.0 + t as f64 * 0.1}
        });
        if t % 2 == 1 {
            step["action"] = json!({"subs_modified": ["sub_4"], "lines_modified": []});
        }
        if t == 1 {
            step["alarm"] = json!(["zone_1"]);
        }
        lines.push_str(&step.to_string());
        lines.push('\n');
    }
    std::fs::write(dir.join("steps.jsonl"), lines).unwrap();
}

pub fn write_spaces(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let space = json!({
        "name_line": ["0_4_2", "1_2_3"],
        "name_sub": ["sub_0", "sub_4"],
        "name_load": ["load_1_0"],
        "name_gen": ["gen_0_0"],
        "grid_layout": {"sub_0": [0.0, 1.0], "sub_4": [2.0, 3.0]},
        "_init_subtype": "grid2op.Observation.CompleteObservation"
    });
    std::fs::write(dir.join("dict_observation_space.json"), space.to_string()).unwrap();
    std::fs::write(dir.join("dict_action_space.json"), space.to_string()).unwrap();
}

/// Agents `a0..a{n}` on scenarios `000` and `001`, each with its own spaces.
pub fn agents_tree(root: &Path, n_agents: usize) -> (Vec<String>, Vec<String>) {
    let agents: Vec<String> = (0..n_agents).map(|i| format!("a{i}")).collect();
    let scenarios = vec!["000".to_string(), "001".to_string()];
    for agent in &agents {
        write_spaces(&root.join(agent));
        for scenario in &scenarios {
            write_episode(root, agent, scenario, 4, 5, 10.0);
        }
    }
    (agents, scenarios)
}

pub fn builder(root: &Path) -> ArtifactStoreBuilder {
    ArtifactStoreBuilder::new(
        root,
        Arc::new(JsonlEpisodeReader),
        Arc::new(StandardAnalytics::default()),
    )
}

pub fn blob_count(cache_root: &Path) -> usize {
    let Ok(scenarios) = std::fs::read_dir(cache_root) else {
        return 0;
    };
    scenarios
        .flatten()
        .filter(|e| e.path().is_dir())
        .flat_map(|e| std::fs::read_dir(e.path()).unwrap().flatten())
        .filter(|f| f.file_name().to_string_lossy().ends_with(".json.zst"))
        .count()
}

/// Wraps [`StandardAnalytics`], counting builds. Optionally sleeps inside
/// `build` and fails or panics for one agent.
#[derive(Default)]
pub struct CountingAnalytics {
    pub inner: StandardAnalytics,
    pub builds: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub delay: Option<Duration>,
    pub fail_agent: Option<String>,
    pub panic_agent: Option<String>,
}

impl CountingAnalytics {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Most builds ever observed inside `build` at the same time.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl AnalyticsBuilder for CountingAnalytics {
    fn build(&self, raw: &RawEpisode, scenario: &str, agent: &str) -> anyhow::Result<EpisodeAnalytics> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        if self.fail_agent.as_deref() == Some(agent) {
            anyhow::bail!("synthetic build failure for {agent}");
        }
        if self.panic_agent.as_deref() == Some(agent) {
            panic!("synthetic panic for {agent}");
        }
        self.inner.build(raw, scenario, agent)
    }

    fn runtime_context(&self, agent_dir: &Path) -> anyhow::Result<RuntimeContext> {
        self.inner.runtime_context(agent_dir)
    }
}

pub fn counting_builder(root: &Path, analytics: Arc<CountingAnalytics>) -> ArtifactStoreBuilder {
    ArtifactStoreBuilder::new(root, Arc::new(JsonlEpisodeReader), analytics)
}

pub fn cache_dir(root: &Path) -> PathBuf {
    root.join("_cache")
}

/// Temp files left next to blobs by interrupted writes.
pub fn temp_file_count(cache_root: &Path) -> usize {
    let Ok(scenarios) = std::fs::read_dir(cache_root) else {
        return 0;
    };
    scenarios
        .flatten()
        .filter(|e| e.path().is_dir())
        .flat_map(|e| std::fs::read_dir(e.path()).unwrap().flatten())
        .filter(|f| f.file_name().to_string_lossy().ends_with(".tmp"))
        .count()
}
