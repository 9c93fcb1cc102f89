//! Channel frames.
//!
//! Every message on the channel is one [`Frame`]. A side that wants something
//! from its peer sends [`Frame::Call`]; the peer answers with exactly one of
//! [`Frame::Success`], [`Frame::Error`] or [`Frame::NotImplemented`] carrying
//! the same id. Each side allocates ids for the calls it issues, so a reply
//! always refers to a call made by the side receiving it.

use serde::{Deserialize, Serialize};

/// Correlation id for a call issued by one side of the channel.
pub type CallId = u64;

/// Envelope for everything sent over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
	/// A named invocation with an optional encoded payload.
	Call {
		id: CallId,
		method: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		payload: Option<String>,
	},
	/// Successful resolution of call `id`.
	Success {
		id: CallId,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		payload: Option<String>,
	},
	/// Failed resolution of call `id`.
	Error {
		id: CallId,
		code: String,
		message: String,
	},
	/// The receiving side has no handler for the called method.
	NotImplemented { id: CallId },
}

impl Frame {
	/// Returns the correlation id of this frame.
	pub fn id(&self) -> CallId {
		match self {
			Frame::Call { id, .. }
			| Frame::Success { id, .. }
			| Frame::Error { id, .. }
			| Frame::NotImplemented { id } => *id,
		}
	}

	/// Returns true for frames that resolve a previously issued call.
	pub fn is_reply(&self) -> bool {
		!matches!(self, Frame::Call { .. })
	}
}
