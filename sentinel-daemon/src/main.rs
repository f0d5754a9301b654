//! sentinel -- scan, watch and configuration entry point.

use clap::Parser;

use sentinel_daemon::cli::{Cli, Commands};
use sentinel_daemon::commands;
use sentinel_daemon::error::CliError;
use sentinel_daemon::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.format);
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Scan(args) => commands::scan::execute(args, &cli.config, log_level, &writer).await,
        Commands::Watch(args) => {
            commands::watch::execute(args, &cli.config, log_level, &writer).await
        }
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
