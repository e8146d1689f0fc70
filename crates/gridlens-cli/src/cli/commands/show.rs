use super::{exit_codes, stores};
use crate::cli::args::ShowArgs;
use gridlens_core::analytics::EpisodeArtifact;
use gridlens_core::cache::CacheKey;
use gridlens_core::config::GridlensConfig;
use gridlens_core::errors::StoreError;

pub async fn run(args: ShowArgs, cfg: &GridlensConfig) -> anyhow::Result<i32> {
    let store = stores(cfg).build();
    let key = CacheKey::new(args.agent, args.scenario);
    let lookup = key.clone();
    let result = tokio::task::spawn_blocking(move || store.get(&lookup)).await?;

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) if e.is_not_found() => {
            eprintln!("no data for agent '{}' on scenario '{}'", key.agent, key.scenario);
            return Ok(exit_codes::NO_DATA);
        }
        Err(e @ StoreError::CorruptArtifact { .. }) => {
            eprintln!("error: {e}");
            eprintln!("hint: run `gridlens clear --purge` and warm the cache again");
            return Ok(exit_codes::TASK_FAILED);
        }
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(exit_codes::TASK_FAILED);
        }
    };

    if args.format == "json" {
        let out = serde_json::json!({
            "key": key,
            "analytics": &*artifact.analytics,
            "context": {
                "source": artifact.context.source,
                "n_line": artifact.context.observation_space.n_line(),
                "n_sub": artifact.context.observation_space.n_sub(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", render_text(&artifact));
    }
    Ok(exit_codes::OK)
}

fn render_text(artifact: &EpisodeArtifact) -> String {
    let a = &artifact.analytics;
    let kpis = &a.kpis;
    let alarms = match a.alarm_count() {
        Some(n) => n.to_string(),
        None => "unknown (cached before alarms were recorded)".to_string(),
    };
    let modified = a.substations_modified();
    let subs: Vec<&str> = modified.iter().map(|s| &**s).collect();
    format!(
        "agent:           {}\n\
         scenario:        {}\n\
         steps:           {} / {} ({}% survived)\n\
         total reward:    {:.2}\n\
         actions:         {}\n\
         substations:     {}\n\
         overflowed:      {}\n\
         alarms:          {}\n\
         grid:            {} lines, {} substations ({})\n",
        a.agent,
        a.scenario,
        kpis.steps_played,
        kpis.steps_available,
        kpis.survival_pct(),
        kpis.total_reward,
        kpis.action_count,
        subs.join(", "),
        a.overflowed_lines().join(", "),
        alarms,
        artifact.context.observation_space.n_line(),
        artifact.context.observation_space.n_sub(),
        artifact.context.source.display()
    )
}
