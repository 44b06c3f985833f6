//! sooners - command-line interface for the schema migration engine.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sooners_cli::cli::{Cli, Command};
use sooners_cli::{commands, output};
use sooners_migrate::error::MigrateResult;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        output::error(&err.to_string());
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> MigrateResult<()> {
    match &cli.command {
        Command::Msforward(args) => commands::msforward::run(&cli.config, args),
        Command::Msbackward(args) => commands::msbackward::run(&cli.config, args),
        Command::Skcontinue(args) => commands::skcontinue::run(&cli.config, args),
        Command::Skwithdraw(args) => commands::skwithdraw::run(&cli.config, args),
        Command::Makeversion(args) => commands::makeversion::run(&cli.config, args),
        Command::Makepatch(args) => commands::makepatch::run(&cli.config, args),
    }
}
