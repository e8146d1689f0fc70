use super::args::*;
use gridlens_core::analytics::StandardAnalytics;
use gridlens_core::cache::{ArtifactStoreBuilder, MemoryTier};
use gridlens_core::config::{load_config, GridlensConfig};
use gridlens_core::errors::{ConfigError, IndexError};
use gridlens_core::index::{discover_agents, index_agents, AgentIndex};
use gridlens_core::source::JsonlEpisodeReader;
use std::path::Path;
use std::sync::Arc;

pub mod clear;
pub mod index;
pub mod init;
pub mod show;
pub mod status;
pub mod warm;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const TASK_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const NO_DATA: i32 = 3;
}

const DEFAULT_CONFIG_FILE: &str = "gridlens.yaml";

pub async fn dispatch(cli: Cli, cfg: GridlensConfig) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Index(args) => index::run(args, &cfg),
        Command::Warm(args) => warm::run(args, cfg).await,
        Command::Show(args) => show::run(args, &cfg).await,
        Command::Status(args) => status::run(args, &cfg),
        Command::Clear(args) => clear::run(args, &cfg),
        Command::Init(args) => init::run(args, &cli.global),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

/// Config file, then `GRIDLENS_*` environment, then flags.
pub fn resolve_config(global: &GlobalArgs) -> Result<GridlensConfig, ConfigError> {
    let mut cfg = match &global.config {
        Some(path) => load_config(path, global.strict)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            load_config(Path::new(DEFAULT_CONFIG_FILE), global.strict)?
        }
        None => GridlensConfig::default(),
    };
    cfg.apply_env();
    if let Some(dir) = &global.agents_dir {
        cfg.agents_dir = dir.clone();
    }
    if let Some(dir) = &global.env_dir {
        cfg.env_dir = Some(dir.clone());
    }
    cfg.validate()?;
    Ok(cfg)
}

pub(crate) fn stores(cfg: &GridlensConfig) -> ArtifactStoreBuilder {
    ArtifactStoreBuilder::new(
        &cfg.agents_dir,
        Arc::new(JsonlEpisodeReader),
        Arc::new(StandardAnalytics::new(cfg.env_dir.clone())),
    )
    .memory(MemoryTier::with_capacity(cfg.memory_capacity))
}

/// Indexes the configured agents tree. `Err` carries the exit code after the
/// failure has been reported.
pub(crate) fn load_index(cfg: &GridlensConfig) -> Result<AgentIndex, i32> {
    let indexed = discover_agents(&cfg.agents_dir).and_then(|agents| {
        if agents.is_empty() {
            return Ok(None);
        }
        index_agents(&cfg.agents_dir, &agents).map(Some)
    });
    match indexed {
        Ok(Some(index)) => Ok(index),
        Ok(None) => {
            eprintln!("no agents found under {}", cfg.agents_dir.display());
            Err(exit_codes::NO_DATA)
        }
        Err(e @ IndexError::MetadataMissing { .. }) => {
            eprintln!("error: {e}");
            eprintln!("every scenario directory needs an episode_meta.json; remove the directory or re-run the agent");
            Err(exit_codes::CONFIG_ERROR)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Err(exit_codes::CONFIG_ERROR)
        }
    }
}
