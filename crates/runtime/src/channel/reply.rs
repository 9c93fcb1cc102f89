//! Reply handles for inbound calls and futures for outbound ones.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bridge_protocol::{CallId, Frame};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, RemoteError, Result};

/// Wire code sent when a handler drops its reply without resolving it.
pub const REPLY_DROPPED: &str = "ReplyDropped";

/// How the peer resolved one of our calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
	Success(Option<String>),
	Error(RemoteError),
	NotImplemented,
}

/// Outbound calls awaiting a reply, keyed by call id.
pub(crate) type PendingMap = Arc<Mutex<HashMap<CallId, oneshot::Sender<Reply>>>>;

/// Resolves one inbound call.
///
/// Every resolving method consumes the handle, so a call is answered at most
/// once. A handle dropped without being resolved answers with a
/// [`REPLY_DROPPED`] error so the caller is never left waiting.
pub struct ChannelReply {
	id: CallId,
	method: String,
	outbound: Option<mpsc::UnboundedSender<Frame>>,
}

impl ChannelReply {
	pub(crate) fn new(id: CallId, method: String, outbound: mpsc::UnboundedSender<Frame>) -> Self {
		Self {
			id,
			method,
			outbound: Some(outbound),
		}
	}

	/// Name of the call being answered.
	pub fn method(&self) -> &str {
		&self.method
	}

	/// Call id being answered.
	pub fn id(&self) -> CallId {
		self.id
	}

	pub fn success(mut self, payload: Option<String>) {
		let id = self.id;
		self.resolve(Frame::Success { id, payload });
	}

	pub fn error(mut self, code: impl Into<String>, message: impl Into<String>) {
		let id = self.id;
		self.resolve(Frame::Error {
			id,
			code: code.into(),
			message: message.into(),
		});
	}

	pub fn not_implemented(mut self) {
		let id = self.id;
		self.resolve(Frame::NotImplemented { id });
	}

	fn resolve(&mut self, frame: Frame) {
		let Some(outbound) = self.outbound.take() else {
			return;
		};
		if outbound.send(frame).is_err() {
			tracing::warn!(id = self.id, method = %self.method, "Reply discarded: channel closed");
		}
	}
}

impl Drop for ChannelReply {
	fn drop(&mut self) {
		if self.outbound.is_none() {
			return;
		}
		tracing::warn!(id = self.id, method = %self.method, "Call dropped without a reply");
		let frame = Frame::Error {
			id: self.id,
			code: REPLY_DROPPED.to_string(),
			message: format!("Handler for '{}' finished without replying", self.method),
		};
		self.resolve(frame);
	}
}

impl std::fmt::Debug for ChannelReply {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChannelReply")
			.field("id", &self.id)
			.field("method", &self.method)
			.field("resolved", &self.outbound.is_none())
			.finish()
	}
}

/// A registered call whose frame has not been written yet.
///
/// Produced by [`MethodChannel::begin_call`](super::MethodChannel::begin_call)
/// so the caller can hold the frame back (the init gate does) while the
/// correlation entry already exists.
pub struct OutgoingCall {
	frame: Frame,
	outbound: mpsc::UnboundedSender<Frame>,
	pending: PendingMap,
}

impl OutgoingCall {
	pub(crate) fn new(frame: Frame, outbound: mpsc::UnboundedSender<Frame>, pending: PendingMap) -> Self {
		Self {
			frame,
			outbound,
			pending,
		}
	}

	pub fn id(&self) -> CallId {
		self.frame.id()
	}

	/// Queues the frame for the writer.
	///
	/// If the channel is gone the correlation entry is dropped, failing the
	/// matching [`PendingReply`] with [`Error::ChannelClosed`].
	pub fn send(self) {
		let id = self.frame.id();
		if self.outbound.send(self.frame).is_err() {
			tracing::error!(id, "Failed to queue call: outbound channel closed");
			self.pending.lock().remove(&id);
		}
	}
}

/// Removes the correlation entry if the reply future is dropped early.
struct CancelGuard {
	id: CallId,
	pending: PendingMap,
	completed: bool,
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.pending.lock().remove(&self.id).is_some() {
			tracing::debug!(id = self.id, "CancelGuard: removed orphaned callback");
		}
	}
}

/// Future resolving to the peer's reply to one outbound call.
pub struct PendingReply {
	method: String,
	rx: oneshot::Receiver<Reply>,
	guard: CancelGuard,
}

impl PendingReply {
	pub(crate) fn new(id: CallId, method: String, rx: oneshot::Receiver<Reply>, pending: PendingMap) -> Self {
		Self {
			method,
			rx,
			guard: CancelGuard {
				id,
				pending,
				completed: false,
			},
		}
	}

	pub fn id(&self) -> CallId {
		self.guard.id
	}
}

impl Future for PendingReply {
	type Output = Result<Option<String>>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let reply = match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(reply) => reply,
			Poll::Pending => return Poll::Pending,
		};
		self.guard.completed = true;

		Poll::Ready(match reply {
			Ok(Reply::Success(payload)) => Ok(payload),
			Ok(Reply::Error(RemoteError { code, message })) => Err(Error::Remote { code, message }),
			Ok(Reply::NotImplemented) => Err(Error::NotImplemented(self.method.clone())),
			Err(_) => Err(Error::ChannelClosed),
		})
	}
}
