use super::{exit_codes, load_index, stores};
use crate::cli::args::WarmArgs;
use gridlens_core::config::GridlensConfig;
use gridlens_core::precompute::{BatchReport, FailureKind, Precomputer, WarmOptions};
use std::time::Duration;

pub async fn run(args: WarmArgs, cfg: GridlensConfig) -> anyhow::Result<i32> {
    let index = match load_index(&cfg) {
        Ok(index) => index,
        Err(code) => return Ok(code),
    };

    let options = WarmOptions {
        workers: args.workers.unwrap_or(cfg.workers).max(1),
        task_timeout: args
            .timeout_secs
            .map(Duration::from_secs)
            .or_else(|| cfg.task_timeout()),
    };
    let selection = (!args.agents.is_empty()).then_some(args.agents.as_slice());
    if let Some(sel) = selection {
        for agent in sel.iter().filter(|a| !index.agents.contains(*a)) {
            tracing::warn!(event = "gridlens.warm.unknown_agent", agent = %agent);
        }
    }

    if args.format != "json" {
        println!(
            "warming {} with {} worker(s)",
            cfg.cache_root().display(),
            options.workers
        );
    }
    let report = Precomputer::new(stores(&cfg), options)
        .run(&index.scenarios, &index.agents, selection)
        .await?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&report));
    }

    Ok(if report.is_success() {
        exit_codes::OK
    } else {
        exit_codes::TASK_FAILED
    })
}

fn render_text(report: &BatchReport) -> String {
    let mut out = format!(
        "{} tasks: {} persisted, {} already cached, {} failed ({:.1} s)\n",
        report.total,
        report.persisted,
        report.already_cached,
        report.failures.len(),
        report.elapsed_ms as f64 / 1000.0
    );
    for f in &report.failures {
        let what = match &f.kind {
            FailureKind::Error { message } => message.clone(),
            FailureKind::TimedOut { after_secs } => format!("timed out after {after_secs:.0} s"),
            FailureKind::Panicked { message } => format!("panicked: {message}"),
        };
        out.push_str(&format!("  FAIL {}: {}\n", f.key, what));
    }
    out
}
