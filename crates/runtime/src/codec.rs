//! Payload codec.
//!
//! Payloads cross the channel as JSON strings. The shape a payload is decoded
//! as is the Rust type requested by the caller; its type name is recorded in
//! [`Error::Decode`] so failures can be traced back to a registration.

use serde::Serialize;
use serde::de::{Deserialize, DeserializeOwned};
use serde_json::Value;

use crate::error::{Error, Result};

/// Returns the shape name used in decode errors and logs.
pub fn shape_name<T: ?Sized>() -> &'static str {
	std::any::type_name::<T>()
}

/// Encodes a value into its transport string.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
	Ok(serde_json::to_string(value)?)
}

/// Encodes a value for embedding inside another payload.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
	Ok(serde_json::to_value(value)?)
}

/// Decodes a transport string as shape `T`.
///
/// An absent or empty payload is read as JSON `null`: shapes without payload
/// ([`Empty`](bridge_protocol::Empty), `()`, `Option<_>`) accept it, every
/// other shape fails.
pub fn decode<T: DeserializeOwned>(payload: Option<&str>) -> Result<T> {
	let parsed = match payload.filter(|text| !text.trim().is_empty()) {
		Some(text) => serde_json::from_str(text),
		None => T::deserialize(&Value::Null),
	};
	parsed.map_err(|source| Error::Decode {
		payload: payload.unwrap_or_default().to_string(),
		shape: shape_name::<T>(),
		source,
	})
}

/// Decodes an embedded JSON value as shape `T`.
pub fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T> {
	T::deserialize(&value).map_err(|source| Error::Decode {
		payload: value.to_string(),
		shape: shape_name::<T>(),
		source,
	})
}
