use serde::Serialize;
use std::collections::BTreeMap;

/// Value of a survival cell for an agent that did not run the scenario.
pub const MISSING_SURVIVAL: i64 = -1;

/// Survival percentage per scenario (rows) and agent (columns).
///
/// Dense: every cell holds an integer, [`MISSING_SURVIVAL`] where the agent
/// has no episode for the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurvivalTable {
    scenarios: Vec<String>,
    agents: Vec<String>,
    cells: Vec<i64>,
}

impl SurvivalTable {
    pub fn new(scenarios: Vec<String>, agents: Vec<String>) -> Self {
        let cells = vec![MISSING_SURVIVAL; scenarios.len() * agents.len()];
        Self {
            scenarios,
            agents,
            cells,
        }
    }

    pub fn scenarios(&self) -> &[String] {
        &self.scenarios
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    fn offset(&self, scenario: &str, agent: &str) -> Option<usize> {
        let row = self.scenarios.iter().position(|s| s == scenario)?;
        let col = self.agents.iter().position(|a| a == agent)?;
        Some(row * self.agents.len() + col)
    }

    /// `None` only for a scenario or agent outside the table.
    pub fn get(&self, scenario: &str, agent: &str) -> Option<i64> {
        self.offset(scenario, agent).map(|i| self.cells[i])
    }

    pub(crate) fn set(&mut self, scenario: &str, agent: &str, value: i64) {
        if let Some(i) = self.offset(scenario, agent) {
            self.cells[i] = value;
        }
    }

    pub fn row(&self, scenario: &str) -> Option<&[i64]> {
        let row = self.scenarios.iter().position(|s| s == scenario)?;
        let width = self.agents.len();
        Some(&self.cells[row * width..(row + 1) * width])
    }
}

/// Last recorded attention score per (agent, scenario), rounded to 2
/// decimals. Pairs without a score have no entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttentionTable {
    scores: BTreeMap<String, BTreeMap<String, f64>>,
}

impl AttentionTable {
    pub fn get(&self, scenario: &str, agent: &str) -> Option<f64> {
        self.scores.get(scenario)?.get(agent).copied()
    }

    pub(crate) fn insert(&mut self, scenario: &str, agent: &str, score: f64) {
        self.scores
            .entry(scenario.to_string())
            .or_default()
            .insert(agent.to_string(), round2(score));
    }

    pub fn len(&self) -> usize {
        self.scores.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.scores.iter().flat_map(|(scenario, row)| {
            row.iter()
                .map(move |(agent, score)| (scenario.as_str(), agent.as_str(), *score))
        })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
