pub mod builder;
pub mod context;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub use builder::{AnalyticsBuilder, StandardAnalytics};
pub use context::{RuntimeContext, SpaceDescription};

/// Persistable analytics of one episode.
///
/// Everything here survives a trip through the filesystem tier. Runtime
/// state (observation/action spaces) lives in [`RuntimeContext`] and is
/// attached after load, see [`EpisodeArtifact`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeAnalytics {
    pub agent: String,
    pub scenario: String,
    pub timestamps: Vec<NaiveDateTime>,
    pub rewards: Vec<f64>,
    /// Running sum of `rewards`. Added in format version 2.
    #[serde(default)]
    pub cumulative_rewards: Vec<f64>,
    pub actions: Vec<ActionRecord>,
    /// `None` when the artifact predates alarm extraction (format version 3).
    #[serde(default)]
    pub alarms: Option<Vec<AlarmRecord>>,
    /// Line usage ratio per line, one value per timestep.
    pub flows: BTreeMap<String, Vec<f64>>,
    pub loads: BTreeMap<String, Vec<f64>>,
    pub productions: BTreeMap<String, Vec<f64>>,
    pub kpis: EpisodeKpis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub timestep: usize,
    #[serde(default)]
    pub subs_modified: Vec<Arc<str>>,
    #[serde(default)]
    pub lines_modified: Vec<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub timestep: usize,
    pub zones: Vec<Arc<str>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeKpis {
    pub steps_played: u64,
    pub steps_available: u64,
    pub total_reward: f64,
    pub action_count: u64,
    /// Number of (timestep, line) cells with a usage ratio above 1.
    pub overflow_count: u64,
}

impl EpisodeKpis {
    pub fn survival_pct(&self) -> i64 {
        if self.steps_available == 0 {
            return 0;
        }
        (self.steps_played * 100 / self.steps_available) as i64
    }
}

/// Result of [`EpisodeAnalytics::reduce_footprint`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FootprintReport {
    /// Names that now share an allocation with an earlier equal name.
    pub interned: usize,
    /// Vectors whose spare capacity was released.
    pub shrunk: usize,
}

impl EpisodeAnalytics {
    pub fn n_steps(&self) -> usize {
        self.timestamps.len()
    }

    pub fn alarm_count(&self) -> Option<usize> {
        self.alarms.as_ref().map(Vec::len)
    }

    /// Substations touched at least once, sorted and deduplicated.
    pub fn substations_modified(&self) -> Vec<Arc<str>> {
        let mut subs: Vec<Arc<str>> = self
            .actions
            .iter()
            .flat_map(|a| a.subs_modified.iter().cloned())
            .collect();
        subs.sort();
        subs.dedup();
        subs
    }

    /// Lines whose usage went above 1 at some timestep.
    pub fn overflowed_lines(&self) -> Vec<&str> {
        self.flows
            .iter()
            .filter(|(_, series)| series.iter().any(|rho| *rho > 1.0))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Shrinks resident size without changing the value: equal names in
    /// action and alarm records are collapsed onto one shared allocation and
    /// all vectors drop their spare capacity.
    ///
    /// Deterministic, so a reduced artifact still compares equal to the one
    /// that produced its blob.
    pub fn reduce_footprint(&mut self) -> FootprintReport {
        let mut report = FootprintReport::default();
        let mut pool: HashSet<Arc<str>> = HashSet::new();

        for action in &mut self.actions {
            for name in action
                .subs_modified
                .iter_mut()
                .chain(action.lines_modified.iter_mut())
            {
                intern(&mut pool, name, &mut report);
            }
            shrink(&mut action.subs_modified, &mut report);
            shrink(&mut action.lines_modified, &mut report);
        }
        if let Some(alarms) = self.alarms.as_mut() {
            for alarm in alarms.iter_mut() {
                for zone in alarm.zones.iter_mut() {
                    intern(&mut pool, zone, &mut report);
                }
                shrink(&mut alarm.zones, &mut report);
            }
            shrink(alarms, &mut report);
        }

        shrink(&mut self.timestamps, &mut report);
        shrink(&mut self.rewards, &mut report);
        shrink(&mut self.cumulative_rewards, &mut report);
        shrink(&mut self.actions, &mut report);
        for series in self
            .flows
            .values_mut()
            .chain(self.loads.values_mut())
            .chain(self.productions.values_mut())
        {
            shrink(series, &mut report);
        }
        report
    }
}

fn intern(pool: &mut HashSet<Arc<str>>, name: &mut Arc<str>, report: &mut FootprintReport) {
    match pool.get(&**name) {
        Some(existing) if !Arc::ptr_eq(existing, name) => {
            *name = existing.clone();
            report.interned += 1;
        }
        Some(_) => {}
        None => {
            pool.insert(name.clone());
        }
    }
}

fn shrink<T>(v: &mut Vec<T>, report: &mut FootprintReport) {
    if v.capacity() > v.len() {
        v.shrink_to_fit();
        report.shrunk += 1;
    }
}

/// An artifact ready for interactive use: persistable analytics together
/// with the runtime context they were decorated with.
#[derive(Debug, Clone)]
pub struct EpisodeArtifact {
    pub analytics: Arc<EpisodeAnalytics>,
    pub context: RuntimeContext,
}

impl EpisodeArtifact {
    pub fn new(analytics: Arc<EpisodeAnalytics>, context: RuntimeContext) -> Self {
        Self { analytics, context }
    }

    pub fn agent(&self) -> &str {
        &self.analytics.agent
    }

    pub fn scenario(&self) -> &str {
        &self.analytics.scenario
    }
}
