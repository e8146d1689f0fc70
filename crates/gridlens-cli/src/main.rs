use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::args::Cli;
use cli::commands::{dispatch, exit_codes, resolve_config};

fn init_logging(log_level: &str, json: bool) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    let code = match resolve_config(&cli.global) {
        Ok(cfg) => {
            init_logging(&cfg.log_level, cli.global.log_json);
            tracing::debug!(event = "gridlens.start", config = ?cfg);
            match dispatch(cli, cfg).await {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("fatal: {e:?}");
                    exit_codes::CONFIG_ERROR
                }
            }
        }
        Err(e) => {
            eprintln!("config error: {e}");
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}
