use std::error::Error as _;

use clap::Parser;
use colored::Colorize;
use pickwire_cli::cli::Cli;
use pickwire_cli::error::CliError;
use pickwire_cli::{commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		report(&err);
		std::process::exit(err.exit_code());
	}
}

fn report(err: &CliError) {
	eprintln!("{} {err}", "error:".red().bold());
	let mut source = err.source();
	while let Some(cause) = source {
		eprintln!("  {} {cause}", "caused by:".dimmed());
		source = cause.source();
	}
}
