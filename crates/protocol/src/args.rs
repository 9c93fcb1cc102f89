//! Argument records carried by the bridge protocol calls.
//!
//! Field names are the wire contract shared with the remote runtime. Stream
//! data and stream-start arguments are embedded JSON values rather than
//! nested encoded strings.

use std::fmt;

use serde::de::{Deserializer, IgnoredAny};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier shared by native and remote streams.
pub type StreamId = u64;

/// The canonical "no payload" value.
///
/// Encodes as `{}` and decodes from anything, including `null` or an absent
/// payload, so calls that carry no meaningful argument or result can use it
/// as their shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Empty;

impl Serialize for Empty {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_map(Some(0))?.end()
	}
}

impl<'de> Deserialize<'de> for Empty {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		IgnoredAny::deserialize(deserializer)?;
		Ok(Empty)
	}
}

impl fmt::Display for Empty {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("{}")
	}
}

/// Reply to `stream:createId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id {
	pub id: StreamId,
}

/// Request to start a stream on the receiving side.
///
/// Used in both directions: `stream:start` carries the remote's raw argument
/// as [`Value`], `flutterStream:start` carries the native caller's argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStart<T = Value> {
	pub id: StreamId,
	/// Name of the stream creator registered on the receiving side.
	pub name: String,
	#[serde(default)]
	pub args: T,
}

/// Reference to a stream by id (stop and completion notices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRef {
	pub id: StreamId,
}

/// A single stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent<T = Value> {
	pub id: StreamId,
	#[serde(default)]
	pub data: T,
}

/// Terminal failure of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFailure {
	pub id: StreamId,
	pub code: String,
	pub message: String,
}
