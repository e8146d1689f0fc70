use super::{exit_codes, load_index, stores};
use crate::cli::args::StatusArgs;
use gridlens_core::cache::{CacheKey, KeyState};
use gridlens_core::config::GridlensConfig;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PairStatus {
    agent: String,
    scenario: String,
    state: KeyState,
}

pub fn run(args: StatusArgs, cfg: &GridlensConfig) -> anyhow::Result<i32> {
    let index = match load_index(cfg) {
        Ok(index) => index,
        Err(code) => return Ok(code),
    };
    let store = stores(cfg).build();

    let pairs: Vec<PairStatus> = index
        .scenarios_by_agent
        .iter()
        .flat_map(|(agent, scenarios)| {
            scenarios
                .iter()
                .map(move |scenario| CacheKey::new(agent.clone(), scenario.clone()))
        })
        .map(|key| PairStatus {
            state: store.state(&key),
            agent: key.agent,
            scenario: key.scenario,
        })
        .collect();

    let cached = pairs
        .iter()
        .filter(|p| p.state != KeyState::Absent)
        .count();

    if args.format == "json" {
        let out = serde_json::json!({
            "cache_root": store.cache_root(),
            "cached": cached,
            "total": pairs.len(),
            "pairs": pairs,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("cache: {}", store.cache_root().display());
        for p in &pairs {
            let mark = if p.state == KeyState::Absent { "-" } else { "cached" };
            println!("  {:<20} {:<12} {}", p.agent, p.scenario, mark);
        }
        println!("{}/{} episodes cached", cached, pairs.len());
    }
    Ok(exit_codes::OK)
}
