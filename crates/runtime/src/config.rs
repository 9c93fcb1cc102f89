//! Bridge configuration: [`BridgeConfig`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Channel name used when none is configured.
pub const DEFAULT_CHANNEL: &str = "bridge/method-channel/default";

fn default_channel_name() -> String {
	DEFAULT_CHANNEL.to_string()
}

/// Settings for one bridge instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
	#[serde(default = "default_channel_name")]
	pub channel_name: String,
	/// Bound on every outbound call and stream-open acknowledgment.
	/// Absent means wait for the remote indefinitely.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub call_timeout_ms: Option<u64>,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self::new()
	}
}

impl BridgeConfig {
	pub fn new() -> Self {
		Self {
			channel_name: default_channel_name(),
			call_timeout_ms: None,
		}
	}

	pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
		self.channel_name = name.into();
		self
	}

	pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
		self.call_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
		self
	}

	pub fn call_timeout(&self) -> Option<Duration> {
		self.call_timeout_ms.map(Duration::from_millis)
	}
}
