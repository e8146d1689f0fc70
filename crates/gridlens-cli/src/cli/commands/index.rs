use super::{exit_codes, load_index};
use crate::cli::args::IndexArgs;
use gridlens_core::config::GridlensConfig;
use gridlens_core::index::{AgentIndex, MISSING_SURVIVAL};

pub fn run(args: IndexArgs, cfg: &GridlensConfig) -> anyhow::Result<i32> {
    let index = match load_index(cfg) {
        Ok(index) => index,
        Err(code) => return Ok(code),
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&index)?);
    } else {
        print!("{}", render_text(&index));
    }
    Ok(exit_codes::OK)
}

fn render_text(index: &AgentIndex) -> String {
    let mut out = format!(
        "{} agents, {} scenarios\n\n",
        index.agents.len(),
        index.scenarios.len()
    );

    out.push_str("best agent per scenario:\n");
    for (scenario, best) in &index.best_agents {
        out.push_str(&format!(
            "  {:<12} {:<20} {} steps, reward {:.2} (out of {})\n",
            scenario, best.agent, best.steps_played, best.cumulative_reward, best.out_of
        ));
    }

    out.push_str("\nsurvival % (scenario x agent):\n");
    out.push_str(&format!("  {:<12}", ""));
    for agent in index.survival.agents() {
        out.push_str(&format!(" {:>10}", agent));
    }
    out.push('\n');
    for scenario in index.survival.scenarios() {
        out.push_str(&format!("  {:<12}", scenario));
        for cell in index.survival.row(scenario).unwrap_or_default() {
            if *cell == MISSING_SURVIVAL {
                out.push_str(&format!(" {:>10}", "-"));
            } else {
                out.push_str(&format!(" {:>10}", cell));
            }
        }
        out.push('\n');
    }

    if !index.attention.is_empty() {
        out.push_str("\nattention scores:\n");
        for (scenario, agent, score) in index.attention.iter() {
            out.push_str(&format!("  {:<12} {:<20} {:.2}\n", scenario, agent, score));
        }
    }
    out
}
