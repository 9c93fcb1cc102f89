use bridge_runtime::{Bridge, PipeTransport};

use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::services::{self, READY_METHOD, ReadyNotice};

/// Serves the bridge over stdin/stdout until stdin closes.
pub async fn execute(config: HostConfig) -> Result<()> {
	let bridge = Bridge::new(config.bridge.clone());
	services::register(&bridge);

	let (transport, message_rx) = PipeTransport::new(tokio::io::stdout(), tokio::io::stdin());
	let channel = bridge.connect(transport.into_transport_parts(message_rx));

	// held back by the init gate until the remote reports in
	if config.announce_ready {
		bridge.notify_remote(READY_METHOD, &ReadyNotice::current());
	}
	tracing::info!(channel = %config.bridge.channel_name, "Serving bridge over stdio");

	let outcome = channel.await;
	bridge.detach();

	match outcome {
		Ok(result) => result?,
		Err(join) => return Err(HostError::Channel(join.to_string())),
	}
	tracing::info!("Input closed, host exiting");
	Ok(())
}
