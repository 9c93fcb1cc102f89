use bridge_cli::{cli::Cli, commands, logging};
use clap::Parser;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		tracing::error!(error = %format!("{err:#}"), "bridge-host failed");
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}
