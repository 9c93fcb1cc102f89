//! Method channel: named calls and their replies over one transport.
//!
//! This module implements the correlation layer on top of the transport.
//! It handles:
//! - Generating unique call ids for outbound calls
//! - Correlating reply frames with pending calls
//! - Handing inbound calls to the installed [`CallHandler`]
//!
//! # Message Flow
//!
//! 1. Caller invokes [`MethodChannel::begin_call`] with a method and payload
//! 2. Channel allocates an id and registers a oneshot sender for it
//! 3. The call frame is queued for the writer task (possibly later, see the
//!    init gate in [`crate::gate`])
//! 4. Caller awaits the returned [`PendingReply`]
//! 5. The dispatch loop receives the reply frame and completes the oneshot
//!
//! Inbound calls travel the other way: the dispatch loop hands each one to
//! the handler together with a [`ChannelReply`] that writes exactly one reply
//! frame. All frames, calls and replies alike, leave through the single writer
//! task, which is the one place results are delivered to the peer.

mod reply;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bridge_protocol::Frame;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use self::reply::{ChannelReply, OutgoingCall, PendingReply, REPLY_DROPPED, Reply};
use self::reply::PendingMap;
use crate::error::{Error, RemoteError, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Receives every inbound call on a channel.
pub trait CallHandler: Send + Sync {
	/// Handles one call. The handler owns `reply` and must resolve it, now or later.
	fn on_call(&self, method: &str, payload: Option<String>, reply: ChannelReply);
}

impl<F> CallHandler for F
where
	F: Fn(&str, Option<String>, ChannelReply) + Send + Sync,
{
	fn on_call(&self, method: &str, payload: Option<String>, reply: ChannelReply) {
		self(method, payload, reply)
	}
}

/// One side of a duplex method channel.
pub struct MethodChannel {
	/// Channel name, used in logs
	name: String,
	/// Sequential call id counter
	last_id: AtomicU64,
	/// Outbound calls awaiting a reply
	pending: PendingMap,
	/// Queue drained by the writer task
	outbound_tx: mpsc::UnboundedSender<Frame>,
	/// Entry point for inbound calls
	handler: RwLock<Option<Arc<dyn CallHandler>>>,
	/// Transport pieces, taken once by run()
	transport_sender: Mutex<Option<Box<dyn Transport>>>,
	transport_receiver: Mutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
}

impl MethodChannel {
	/// Creates a channel over the given transport. Nothing moves until [`run`](Self::run).
	pub fn new(name: impl Into<String>, parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			name: name.into(),
			last_id: AtomicU64::new(0),
			pending: Arc::new(Mutex::new(HashMap::new())),
			outbound_tx,
			handler: RwLock::new(None),
			transport_sender: Mutex::new(Some(sender)),
			transport_receiver: Mutex::new(Some(receiver)),
			message_rx: Mutex::new(Some(message_rx)),
			outbound_rx: Mutex::new(Some(outbound_rx)),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Installs or removes the handler for inbound calls.
	pub fn set_call_handler(&self, handler: Option<Arc<dyn CallHandler>>) {
		*self.handler.write() = handler;
	}

	/// Number of outbound calls still waiting for a reply.
	pub fn pending_calls(&self) -> usize {
		self.pending.lock().len()
	}

	/// Fails every pending outbound call with [`Error::ChannelClosed`].
	///
	/// Returns how many calls were cancelled. Replies that arrive for them
	/// later are discarded.
	pub fn cancel_pending(&self) -> usize {
		let mut pending = self.pending.lock();
		let count = pending.len();
		pending.clear();
		count
	}

	/// Registers an outbound call without sending it yet.
	///
	/// The correlation entry exists as soon as this returns; the frame goes
	/// out when [`OutgoingCall::send`] is called.
	pub fn begin_call(&self, method: &str, payload: Option<String>) -> (OutgoingCall, PendingReply) {
		let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;

		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);

		tracing::debug!(channel = %self.name, id, method, "Registered outbound call");

		let frame = Frame::Call {
			id,
			method: method.to_string(),
			payload,
		};
		(
			OutgoingCall::new(frame, self.outbound_tx.clone(), Arc::clone(&self.pending)),
			PendingReply::new(id, method.to_string(), rx, Arc::clone(&self.pending)),
		)
	}

	/// Sends a call immediately and awaits the reply payload.
	pub async fn invoke(&self, method: &str, payload: Option<String>) -> Result<Option<String>> {
		let (call, reply) = self.begin_call(method, payload);
		call.send();
		reply.await
	}

	/// Spawns [`run`](Self::run) on the current runtime.
	pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<()>> {
		let channel = Arc::clone(self);
		tokio::spawn(async move { channel.run().await })
	}

	/// Runs the channel until the transport closes.
	///
	/// Inbound frames are handled one at a time in arrival order. When the
	/// transport ends, every pending outbound call fails with
	/// [`Error::ChannelClosed`].
	pub async fn run(self: &Arc<Self>) -> Result<()> {
		let parts = (
			self.transport_receiver.lock().take(),
			self.transport_sender.lock().take(),
			self.outbound_rx.lock().take(),
			self.message_rx.lock().take(),
		);
		let (Some(transport_receiver), Some(mut transport_sender), Some(mut outbound_rx), Some(mut message_rx)) =
			parts
		else {
			return Err(Error::ProtocolError(format!(
				"Channel '{}' is already running",
				self.name
			)));
		};

		let reader_handle = tokio::spawn(async move {
			if let Err(e) = transport_receiver.run().await {
				tracing::debug!(error = %e, "Transport reader stopped");
			}
		});

		let writer_handle = tokio::spawn(async move {
			while let Some(frame) = outbound_rx.recv().await {
				let value = match serde_json::to_value(&frame) {
					Ok(value) => value,
					Err(e) => {
						tracing::error!(error = %e, id = frame.id(), "Failed to serialize frame");
						continue;
					}
				};
				if let Err(e) = transport_sender.send(value).await {
					tracing::error!(error = %e, "Transport write error");
					break;
				}
			}
		});

		tracing::debug!(channel = %self.name, "Channel running");

		while let Some(message) = message_rx.recv().await {
			match serde_json::from_value::<Frame>(message) {
				Ok(frame) => self.dispatch_frame(frame),
				Err(e) => tracing::error!(error = %e, "Failed to parse frame"),
			}
		}

		let orphaned = self.cancel_pending();
		if orphaned > 0 {
			tracing::warn!(channel = %self.name, orphaned, "Transport closed with calls still pending");
		}

		writer_handle.abort();
		let _ = reader_handle.await;

		tracing::info!(channel = %self.name, "Channel closed");
		Ok(())
	}

	/// Dispatches a frame as if it had arrived from the transport (test-only).
	#[cfg(test)]
	pub(crate) fn dispatch(&self, frame: Frame) {
		self.dispatch_frame(frame)
	}

	fn dispatch_frame(&self, frame: Frame) {
		match frame {
			Frame::Call { id, method, payload } => {
				let reply = ChannelReply::new(id, method.clone(), self.outbound_tx.clone());
				let handler = self.handler.read().clone();
				match handler {
					Some(handler) => handler.on_call(&method, payload, reply),
					None => {
						tracing::debug!(channel = %self.name, id, method, "No call handler installed");
						reply.not_implemented();
					}
				}
			}
			Frame::Success { id, payload } => self.complete(id, Reply::Success(payload)),
			Frame::Error { id, code, message } => self.complete(id, Reply::Error(RemoteError { code, message })),
			Frame::NotImplemented { id } => self.complete(id, Reply::NotImplemented),
		}
	}

	fn complete(&self, id: u64, reply: Reply) {
		let callback = self.pending.lock().remove(&id);
		match callback {
			Some(callback) => {
				let _ = callback.send(reply);
			}
			None => tracing::debug!(channel = %self.name, id, "Reply for unknown call (ignored)"),
		}
	}
}
