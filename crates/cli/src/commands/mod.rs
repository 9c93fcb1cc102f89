mod serve;

use anyhow::Context;

use crate::cli::{Cli, Commands};
use crate::config::HostConfig;

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
	let config = HostConfig::load(cli.config.as_deref()).context("loading host configuration")?;

	match cli.command {
		Commands::Serve { channel, timeout_ms } => {
			let config = config.with_overrides(channel, timeout_ms);
			serve::execute(config).await.context("serving bridge")
		}
		Commands::Config => {
			println!("{}", serde_json::to_string_pretty(&config)?);
			Ok(())
		}
	}
}
