//! Error types for the bridge runtime.

use std::any::Any;

use bridge_protocol::StreamId;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Wire code for local handlers and streams that failed without a code of their own.
pub const HANDLER_FAILURE: &str = "HandlerFailure";

/// A failure with an explicit wire code and message.
///
/// This is what crosses the channel in error replies and `onError` stream
/// notices. Handlers can return it directly to choose the code the remote
/// side sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
	pub code: String,
	pub message: String,
}

impl RemoteError {
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			message: message.into(),
		}
	}
}

/// Errors that can occur in the bridge.
#[derive(Debug, Error)]
pub enum Error {
	/// No handler or stream creator is registered under this name.
	#[error("'{0}' is not implemented")]
	NotImplemented(String),

	/// A payload did not match the shape it was decoded as.
	#[error("Failed to decode {shape} from payload {payload:?}: {source}")]
	Decode {
		payload: String,
		shape: &'static str,
		#[source]
		source: serde_json::Error,
	},

	/// A local handler or stream factory failed with an explicit code.
	#[error(transparent)]
	HandlerFailure(#[from] RemoteError),

	/// The remote side resolved a call or stream with an error.
	#[error("{code}: {message}")]
	Remote { code: String, message: String },

	/// No reply arrived within the configured call timeout.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The bridge has no channel attached.
	#[error("Bridge is not attached to a channel")]
	Detached,

	/// Channel closed before the operation could finish.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// A stream id is already bound to a running stream.
	#[error("Stream #{0} is already in use")]
	DuplicateStream(StreamId),

	/// Transport-level error (framing, pipe I/O).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Malformed or unexpected channel traffic.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns the category name used as the wire code for this error.
	pub fn category(&self) -> &'static str {
		match self {
			Error::NotImplemented(_) => "NotImplemented",
			Error::Decode { .. } => "DecodeError",
			Error::HandlerFailure(_) => HANDLER_FAILURE,
			Error::Remote { .. } => "RemoteRejected",
			Error::Timeout(_) => "Timeout",
			Error::Detached => "Detached",
			Error::ChannelClosed => "ChannelClosed",
			Error::DuplicateStream(_) => "DuplicateStream",
			Error::TransportError(_) => "TransportError",
			Error::ProtocolError(_) => "ProtocolError",
			Error::Json(_) => "JsonError",
		}
	}

	/// Converts this error into the code/message pair sent to the remote.
	///
	/// Errors that already carry a code keep it verbatim; all others are
	/// classified by [`category`](Self::category).
	pub fn to_remote_error(&self) -> RemoteError {
		match self {
			Error::HandlerFailure(remote) => remote.clone(),
			Error::Remote { code, message } => RemoteError::new(code.clone(), message.clone()),
			other => RemoteError::new(other.category(), other.to_string()),
		}
	}

	/// Returns the remote-supplied code if the remote rejected the operation.
	pub fn remote_code(&self) -> Option<&str> {
		match self {
			Error::Remote { code, .. } => Some(code),
			_ => None,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	pub fn is_not_implemented(&self) -> bool {
		matches!(self, Error::NotImplemented(_))
	}

	pub fn is_decode(&self) -> bool {
		matches!(self, Error::Decode { .. })
	}
}

/// Classifies an arbitrary failure into a wire code and message.
///
/// A [`RemoteError`], or a bridge [`Error`] that carries one, is used as is.
/// Any other error is coded by its short type name, with its display text as
/// the message (`"Error"` when the text is empty).
pub fn classify<E>(err: &E) -> RemoteError
where
	E: std::error::Error + 'static,
{
	let any: &dyn Any = err;
	if let Some(remote) = any.downcast_ref::<RemoteError>() {
		return remote.clone();
	}
	if let Some(bridge) = any.downcast_ref::<Error>() {
		return bridge.to_remote_error();
	}

	let message = err.to_string();
	let message = if message.is_empty() { "Error".to_string() } else { message };
	RemoteError::new(short_type_name::<E>(), message)
}

/// `a::b::Name<c::D>` → `Name`.
fn short_type_name<T: ?Sized>() -> &'static str {
	let full = std::any::type_name::<T>();
	let base = full.split('<').next().unwrap_or(full);
	base.rsplit("::").next().unwrap_or(base)
}
