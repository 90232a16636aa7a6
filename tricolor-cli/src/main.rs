mod commands;

use std::path::PathBuf;

use clap::Parser;
use tricolor_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "tricolor")]
#[command(about = "Three terminals trading colored tokens through a bounded black box")]
#[command(version)]
struct Cli {
    /// Console log level; RUST_LOG takes precedence when set
    #[arg(long, global = true, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Directory receiving the full trace of the run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref()) {
        eprintln!("Warning: trace log disabled: {e}");
    }

    commands::run_command(cli.command).await
}
