use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Debug, Error)]
pub enum HostError {
	#[error("failed to read config {path}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {path}")]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("channel stopped: {0}")]
	Channel(String),

	#[error(transparent)]
	Bridge(#[from] bridge_runtime::Error),
}
