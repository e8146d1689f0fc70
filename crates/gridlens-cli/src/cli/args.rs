use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gridlens",
    version,
    about = "Analytics cache for recorded power-grid agent episodes"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// YAML config file (default: ./gridlens.yaml when present)
    #[arg(long, global = true, env = "GRIDLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root of the agent logs; overrides config and GRIDLENS_AGENTS_DIR
    #[arg(long, global = true)]
    pub agents_dir: Option<PathBuf>,

    /// Environment directory holding the fallback space descriptions
    #[arg(long, global = true)]
    pub env_dir: Option<PathBuf>,

    /// Reject unknown config fields
    #[arg(long, global = true, default_value = "false")]
    pub strict: bool,

    /// JSON log lines on stderr
    #[arg(long, global = true, default_value = "false")]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Index the agents tree: best agent, survival and attention tables
    Index(IndexArgs),
    /// Precompute and persist analytics for every (agent, scenario) pair
    Warm(WarmArgs),
    /// Load one episode's analytics through the cache
    Show(ShowArgs),
    /// Cache state of every indexed (agent, scenario) pair
    Status(StatusArgs),
    /// Remove the cache directory
    Clear(ClearArgs),
    /// Write a sample gridlens.yaml
    Init(InitArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct WarmArgs {
    /// Worker pool size; 1 runs in order
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-task deadline in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Only warm these agents (repeatable)
    #[arg(long = "agent")]
    pub agents: Vec<String>,

    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ShowArgs {
    pub agent: String,
    pub scenario: String,

    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ClearArgs {
    /// Delete every blob instead of refusing a populated cache
    #[arg(long, default_value = "false")]
    pub purge: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "gridlens.yaml")]
    pub out: PathBuf,
}
