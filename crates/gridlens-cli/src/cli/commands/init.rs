use super::exit_codes;
use crate::cli::args::{GlobalArgs, InitArgs};
use gridlens_core::config::write_sample_config;
use std::path::Path;

pub fn run(args: InitArgs, global: &GlobalArgs) -> anyhow::Result<i32> {
    if args.out.exists() {
        println!("{} already exists, leaving it untouched", args.out.display());
        return Ok(exit_codes::OK);
    }
    let agents_dir = global
        .agents_dir
        .as_deref()
        .unwrap_or(Path::new("agents"));
    write_sample_config(&args.out, agents_dir)?;
    println!("created {}", args.out.display());
    Ok(exit_codes::OK)
}
