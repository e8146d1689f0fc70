//! Raw episode logs: the boundary with whatever recorded the runs.

use crate::model::{EpisodeMeta, EPISODE_META_FILE};
use anyhow::Context;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const STEPS_FILE: &str = "steps.jsonl";

/// One recorded run of an agent on a scenario, as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEpisode {
    pub agent: String,
    pub scenario: String,
    pub meta: EpisodeMeta,
    pub steps: Vec<RawStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStep {
    pub timestamp: NaiveDateTime,
    pub reward: f64,
    #[serde(default)]
    pub action: Option<RawAction>,
    #[serde(default)]
    pub alarm: Option<Vec<String>>,
    #[serde(default)]
    pub rho: BTreeMap<String, f64>,
    #[serde(default)]
    pub load_p: BTreeMap<String, f64>,
    #[serde(default)]
    pub gen_p: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(default)]
    pub subs_modified: Vec<String>,
    #[serde(default)]
    pub lines_modified: Vec<String>,
}

impl RawAction {
    pub fn is_noop(&self) -> bool {
        self.subs_modified.is_empty() && self.lines_modified.is_empty()
    }
}

/// Reads raw episodes. `Ok(None)` means the episode directory does not exist.
pub trait EpisodeSource: Send + Sync {
    fn read_raw_episode(
        &self,
        agents_dir: &Path,
        agent: &str,
        scenario: &str,
    ) -> anyhow::Result<Option<RawEpisode>>;
}

/// Reads `episode_meta.json` and `steps.jsonl` from
/// `<agents_dir>/<agent>/<scenario>/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlEpisodeReader;

impl EpisodeSource for JsonlEpisodeReader {
    fn read_raw_episode(
        &self,
        agents_dir: &Path,
        agent: &str,
        scenario: &str,
    ) -> anyhow::Result<Option<RawEpisode>> {
        let dir = agents_dir.join(agent).join(scenario);
        if !dir.is_dir() {
            return Ok(None);
        }

        let meta_path = dir.join(EPISODE_META_FILE);
        let meta_raw = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("failed to read {}", meta_path.display()))?;
        let meta: EpisodeMeta = serde_json::from_str(&meta_raw)
            .with_context(|| format!("failed to parse {}", meta_path.display()))?;

        let steps_path = dir.join(STEPS_FILE);
        let file = File::open(&steps_path)
            .with_context(|| format!("failed to open {}", steps_path.display()))?;

        let mut steps = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let step: RawStep = serde_json::from_str(&line).with_context(|| {
                format!("{}: line {}: invalid step record", steps_path.display(), i + 1)
            })?;
            steps.push(step);
        }

        Ok(Some(RawEpisode {
            agent: agent.to_string(),
            scenario: scenario.to_string(),
            meta,
            steps,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_episode_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let got = JsonlEpisodeReader
            .read_raw_episode(dir.path(), "agent", "000")
            .unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn reads_steps_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let ep = dir.path().join("agent").join("000");
        std::fs::create_dir_all(&ep).unwrap();
        std::fs::write(
            ep.join(EPISODE_META_FILE),
            r#"{"nb_timestep_played":2,"chronics_max_timestep":3,"cumulative_reward":1.5}"#,
        )
        .unwrap();
        std::fs::write(
            ep.join(STEPS_FILE),
            concat!(
                r#"{"timestamp":"2019-01-06T00:00:00","reward":1.0,"rho":{"l0":0.5}}"#,
                "\n\n",
                r#"{"timestamp":"2019-01-06T00:05:00","reward":0.5,"action":{"subs_modified":["sub_1"]},"alarm":["z1"]}"#,
                "\n"
            ),
        )
        .unwrap();

        let raw = JsonlEpisodeReader
            .read_raw_episode(dir.path(), "agent", "000")
            .unwrap()
            .unwrap();
        assert_eq!(raw.steps.len(), 2);
        assert_eq!(raw.meta.nb_timestep_played, 2);
        assert_eq!(raw.steps[1].action.as_ref().unwrap().subs_modified, vec!["sub_1"]);
        assert_eq!(raw.steps[1].alarm.as_deref(), Some(&["z1".to_string()][..]));
    }

    #[test]
    fn bad_step_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let ep = dir.path().join("agent").join("000");
        std::fs::create_dir_all(&ep).unwrap();
        std::fs::write(
            ep.join(EPISODE_META_FILE),
            r#"{"nb_timestep_played":1,"chronics_max_timestep":1,"cumulative_reward":0.0}"#,
        )
        .unwrap();
        std::fs::write(ep.join(STEPS_FILE), "{not json}\n").unwrap();

        let err = JsonlEpisodeReader
            .read_raw_episode(dir.path(), "agent", "000")
            .unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));
    }
}
