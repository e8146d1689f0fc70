//! One pass over the agents tree at startup: which scenarios exist, who ran
//! them, and how well.

pub mod tables;

use crate::errors::IndexError;
use crate::model::{
    BestAgentRecord, EpisodeMeta, ATTENTION_SCORE_FIELD, EPISODE_META_FILE, OTHER_REWARDS_FILE,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub use tables::{AttentionTable, SurvivalTable, MISSING_SURVIVAL};

#[derive(Debug, Clone, Serialize)]
pub struct AgentIndex {
    pub agents: Vec<String>,
    /// Sorted union of every agent's scenarios.
    pub scenarios: Vec<String>,
    /// agent -> scenario -> metadata
    pub meta: BTreeMap<String, BTreeMap<String, EpisodeMeta>>,
    pub best_agents: BTreeMap<String, BestAgentRecord>,
    pub survival: SurvivalTable,
    pub attention: AttentionTable,
    pub scenarios_by_agent: BTreeMap<String, Vec<String>>,
    pub agents_by_scenario: BTreeMap<String, Vec<String>>,
}

impl AgentIndex {
    pub fn meta(&self, agent: &str, scenario: &str) -> Option<&EpisodeMeta> {
        self.meta.get(agent)?.get(scenario)
    }

    pub fn best_agent(&self, scenario: &str) -> Option<&BestAgentRecord> {
        self.best_agents.get(scenario)
    }
}

/// Agent directories under `root`, sorted. Entries starting with `_` (the
/// cache among them) are not agents.
pub fn discover_agents(root: &Path) -> Result<Vec<String>, IndexError> {
    let entries = std::fs::read_dir(root).map_err(|e| IndexError::Root {
        path: root.to_path_buf(),
        source: e,
    })?;
    let mut agents = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IndexError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('_') && entry.path().is_dir() {
            agents.push(name);
        }
    }
    agents.sort();
    Ok(agents)
}

pub fn index_agents(root: &Path, agents: &[String]) -> Result<AgentIndex, IndexError> {
    let mut meta: BTreeMap<String, BTreeMap<String, EpisodeMeta>> = BTreeMap::new();
    let mut best_agents: BTreeMap<String, BestAgentRecord> = BTreeMap::new();
    let mut attention_scores: Vec<(String, String, f64)> = Vec::new();
    let mut scenarios_by_agent: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut agents_by_scenario: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut all_scenarios = BTreeSet::new();

    for agent in agents {
        let agent_dir = root.join(agent);
        let scenarios = scenario_dirs(&agent_dir)?;

        for scenario in &scenarios {
            let scenario_dir = agent_dir.join(scenario);
            let episode_meta = read_meta(&scenario_dir, agent, scenario)?;

            match best_agents.get_mut(scenario) {
                Some(best) => {
                    if best.beaten_by(&episode_meta) {
                        best.agent = agent.clone();
                        best.steps_played = episode_meta.nb_timestep_played;
                        best.cumulative_reward = episode_meta.cumulative_reward;
                    }
                    best.out_of += 1;
                }
                None => {
                    best_agents.insert(
                        scenario.clone(),
                        BestAgentRecord {
                            agent: agent.clone(),
                            steps_played: episode_meta.nb_timestep_played,
                            cumulative_reward: episode_meta.cumulative_reward,
                            out_of: 1,
                        },
                    );
                }
            }

            if let Some(score) = read_attention_score(&scenario_dir)? {
                attention_scores.push((scenario.clone(), agent.clone(), score));
            }

            agents_by_scenario
                .entry(scenario.clone())
                .or_default()
                .push(agent.clone());
            all_scenarios.insert(scenario.clone());
            meta.entry(agent.clone())
                .or_default()
                .insert(scenario.clone(), episode_meta);
        }
        scenarios_by_agent.insert(agent.clone(), scenarios);
    }

    let scenarios: Vec<String> = all_scenarios.into_iter().collect();
    let mut survival = SurvivalTable::new(scenarios.clone(), agents.to_vec());
    for (agent, by_scenario) in &meta {
        for (scenario, m) in by_scenario {
            let pct = m.survival_pct().ok_or_else(|| IndexError::InvalidMetadata {
                path: root.join(agent).join(scenario).join(EPISODE_META_FILE),
                reason: "chronics_max_timestep is 0".into(),
            })?;
            survival.set(scenario, agent, pct);
        }
    }

    let mut attention = AttentionTable::default();
    for (scenario, agent, score) in attention_scores {
        attention.insert(&scenario, &agent, score);
    }

    tracing::info!(
        event = "gridlens.index.done",
        agents = agents.len(),
        scenarios = scenarios.len(),
        attention_scores = attention.len()
    );

    Ok(AgentIndex {
        agents: agents.to_vec(),
        scenarios,
        meta,
        best_agents,
        survival,
        attention,
        scenarios_by_agent,
        agents_by_scenario,
    })
}

fn scenario_dirs(agent_dir: &Path) -> Result<Vec<String>, IndexError> {
    let io = |e: std::io::Error| IndexError::Io {
        path: agent_dir.to_path_buf(),
        source: e,
    };
    let mut scenarios = Vec::new();
    for entry in std::fs::read_dir(agent_dir).map_err(io)? {
        let entry = entry.map_err(io)?;
        if entry.path().is_dir() {
            scenarios.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    scenarios.sort();
    Ok(scenarios)
}

fn read_meta(scenario_dir: &Path, agent: &str, scenario: &str) -> Result<EpisodeMeta, IndexError> {
    let path = scenario_dir.join(EPISODE_META_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::MetadataMissing {
                agent: agent.to_string(),
                scenario: scenario.to_string(),
                path,
            })
        }
        Err(e) => return Err(IndexError::Io { path, source: e }),
    };
    serde_json::from_str(&raw).map_err(|e| IndexError::InvalidMetadata {
        path,
        reason: e.to_string(),
    })
}

/// `attention_score` of the last record in `other_rewards.json`, if any.
fn read_attention_score(scenario_dir: &Path) -> Result<Option<f64>, IndexError> {
    let path = scenario_dir.join(OTHER_REWARDS_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| IndexError::Io {
        path: path.clone(),
        source: e,
    })?;
    let records: Vec<serde_json::Value> =
        serde_json::from_str(&raw).map_err(|e| IndexError::InvalidMetadata {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    Ok(records
        .last()
        .and_then(|last| last.get(ATTENTION_SCORE_FIELD))
        .and_then(serde_json::Value::as_f64))
}
