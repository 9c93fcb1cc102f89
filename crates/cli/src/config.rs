//! Host configuration: [`HostConfig`].

use std::fs;
use std::path::Path;

use bridge_runtime::BridgeConfig;
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

fn default_true() -> bool {
	true
}

/// Settings read from `--config`, before command-line overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
	#[serde(default)]
	pub bridge: BridgeConfig,
	/// Send `host:ready` once the remote side is initialized.
	#[serde(default = "default_true")]
	pub announce_ready: bool,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			bridge: BridgeConfig::default(),
			announce_ready: true,
		}
	}
}

impl HostConfig {
	/// Reads the config file, or returns defaults when no path is given.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let Some(path) = path else {
			return Ok(Self::default());
		};
		let content = fs::read_to_string(path).map_err(|source| HostError::ConfigRead {
			path: path.to_path_buf(),
			source,
		})?;
		serde_json::from_str(&content).map_err(|source| HostError::ConfigParse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Applies command-line overrides.
	pub fn with_overrides(mut self, channel: Option<String>, timeout_ms: Option<u64>) -> Self {
		if let Some(channel) = channel {
			self.bridge.channel_name = channel;
		}
		if timeout_ms.is_some() {
			self.bridge.call_timeout_ms = timeout_ms;
		}
		self
	}
}
