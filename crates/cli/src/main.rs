use clap::Parser;
use fanout_cli::cli::Cli;
use fanout_cli::{commands, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		error!(target: "fanout", error = %format!("{err:#}"), "command failed");
		std::process::exit(1);
	}
}
