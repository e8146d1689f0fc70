use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const EPISODE_META_FILE: &str = "episode_meta.json";
pub const OTHER_REWARDS_FILE: &str = "other_rewards.json";
pub const ATTENTION_SCORE_FIELD: &str = "attention_score";

/// `episode_meta.json`, written by the agent runner next to each episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub nb_timestep_played: u64,
    pub chronics_max_timestep: u64,
    pub cumulative_reward: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EpisodeMeta {
    /// `floor(100 * played / available)`; `None` for an empty chronic.
    pub fn survival_pct(&self) -> Option<i64> {
        if self.chronics_max_timestep == 0 {
            return None;
        }
        Some((self.nb_timestep_played * 100 / self.chronics_max_timestep) as i64)
    }
}

/// Best agent of one scenario: most steps played, ties broken by the higher
/// cumulative reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestAgentRecord {
    pub agent: String,
    pub steps_played: u64,
    pub cumulative_reward: f64,
    /// Number of agents that ran the scenario.
    pub out_of: usize,
}

impl BestAgentRecord {
    pub(crate) fn beaten_by(&self, meta: &EpisodeMeta) -> bool {
        self.steps_played < meta.nb_timestep_played
            || (self.steps_played == meta.nb_timestep_played
                && self.cumulative_reward < meta.cumulative_reward)
    }
}
