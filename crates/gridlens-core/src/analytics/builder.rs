use super::context::{ContextResolver, RuntimeContext};
use super::{ActionRecord, AlarmRecord, EpisodeAnalytics, EpisodeKpis};
use crate::source::{RawEpisode, RawStep};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Derives analytics from a raw episode and resolves the runtime context
/// needed to use them interactively.
pub trait AnalyticsBuilder: Send + Sync {
    /// Persistable fields only.
    fn build(
        &self,
        raw: &RawEpisode,
        scenario: &str,
        agent: &str,
    ) -> anyhow::Result<EpisodeAnalytics>;

    /// Observation/action spaces for the agent whose logs live in `agent_dir`.
    fn runtime_context(&self, agent_dir: &Path) -> anyhow::Result<RuntimeContext>;
}

/// Default analytics: reward curves, action and alarm logs, per-asset series
/// and headline KPIs.
#[derive(Debug, Default)]
pub struct StandardAnalytics {
    resolver: ContextResolver,
}

impl StandardAnalytics {
    pub fn new(env_dir: Option<PathBuf>) -> Self {
        Self {
            resolver: ContextResolver::new(env_dir),
        }
    }
}

impl AnalyticsBuilder for StandardAnalytics {
    fn build(
        &self,
        raw: &RawEpisode,
        scenario: &str,
        agent: &str,
    ) -> anyhow::Result<EpisodeAnalytics> {
        let steps = &raw.steps;
        if steps.is_empty() && raw.meta.nb_timestep_played > 0 {
            anyhow::bail!(
                "metadata reports {} steps played but the log is empty",
                raw.meta.nb_timestep_played
            );
        }

        let timestamps = steps.iter().map(|s| s.timestamp).collect();
        let rewards: Vec<f64> = steps.iter().map(|s| s.reward).collect();
        let cumulative_rewards = running_sum(&rewards);

        let actions: Vec<ActionRecord> = steps
            .iter()
            .enumerate()
            .filter_map(|(t, s)| {
                let a = s.action.as_ref().filter(|a| !a.is_noop())?;
                Some(ActionRecord {
                    timestep: t,
                    subs_modified: a.subs_modified.iter().map(|n| Arc::from(n.as_str())).collect(),
                    lines_modified: a.lines_modified.iter().map(|n| Arc::from(n.as_str())).collect(),
                })
            })
            .collect();

        let alarms = steps
            .iter()
            .enumerate()
            .filter_map(|(t, s)| {
                let zones = s.alarm.as_ref().filter(|z| !z.is_empty())?;
                Some(AlarmRecord {
                    timestep: t,
                    zones: zones.iter().map(|z| Arc::from(z.as_str())).collect(),
                })
            })
            .collect();

        let flows = series(steps, |s| &s.rho);
        let overflow_count = flows
            .values()
            .flat_map(|v| v.iter())
            .filter(|rho| **rho > 1.0)
            .count() as u64;

        let kpis = EpisodeKpis {
            steps_played: raw.meta.nb_timestep_played,
            steps_available: raw.meta.chronics_max_timestep,
            total_reward: raw.meta.cumulative_reward,
            action_count: actions.len() as u64,
            overflow_count,
        };

        Ok(EpisodeAnalytics {
            agent: agent.to_string(),
            scenario: scenario.to_string(),
            timestamps,
            rewards,
            cumulative_rewards,
            actions,
            alarms: Some(alarms),
            flows,
            loads: series(steps, |s| &s.load_p),
            productions: series(steps, |s| &s.gen_p),
            kpis,
        })
    }

    fn runtime_context(&self, agent_dir: &Path) -> anyhow::Result<RuntimeContext> {
        self.resolver.resolve(agent_dir)
    }
}

pub(crate) fn running_sum(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// Pivots per-step readings into one series per asset. An asset missing at a
/// timestep reads 0 there.
fn series<F>(steps: &[RawStep], readings: F) -> BTreeMap<String, Vec<f64>>
where
    F: Fn(&RawStep) -> &BTreeMap<String, f64>,
{
    let assets: BTreeSet<&String> = steps.iter().flat_map(|s| readings(s).keys()).collect();
    assets
        .into_iter()
        .map(|name| {
            let values = steps
                .iter()
                .map(|s| readings(s).get(name).copied().unwrap_or(0.0))
                .collect();
            (name.clone(), values)
        })
        .collect()
}
