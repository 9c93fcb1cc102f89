//! Streams produced on the remote side and observed natively.
//!
//! [`RemoteStream`] is lazy: the first poll allocates a stream id, registers
//! a [`RemoteStreamRecord`] and asks the remote to start the stream with
//! `flutterStream:start`. Events the remote pushes before acknowledging are
//! buffered and handed out once the acknowledgment arrives.
//!
//! Dropping the stream before it ends removes the record and sends
//! `flutterStream:stop` without waiting for an answer. Notices that arrive for
//! an id after its record is gone are discarded by the bridge.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use bridge_protocol::methods;
use bridge_protocol::{StreamId, StreamRef, StreamStart};
use futures_util::stream::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::bridge::{BridgeInner, ReplyFuture};
use crate::codec;
use crate::error::{Error, Result};

/// What a record forwards to its consumer.
enum RemoteItem<R> {
	Event(R),
	Failed(Error),
	Complete,
}

trait Emitter: Send + Sync {
	fn event(&self, data: Value) -> Result<()>;
	fn fail(&self, err: Error);
	fn complete(&self);
}

struct TypedEmitter<R> {
	tx: mpsc::UnboundedSender<RemoteItem<R>>,
}

impl<R> Emitter for TypedEmitter<R>
where
	R: DeserializeOwned + Send + 'static,
{
	fn event(&self, data: Value) -> Result<()> {
		let event = codec::decode_value::<R>(data)?;
		let _ = self.tx.send(RemoteItem::Event(event));
		Ok(())
	}

	fn fail(&self, err: Error) {
		let _ = self.tx.send(RemoteItem::Failed(err));
	}

	fn complete(&self) {
		let _ = self.tx.send(RemoteItem::Complete);
	}
}

/// One open remote stream: its emitter and the shape events decode as.
pub struct RemoteStreamRecord {
	name: String,
	shape: &'static str,
	emitter: Box<dyn Emitter>,
}

impl RemoteStreamRecord {
	fn new<R>(name: &str, tx: mpsc::UnboundedSender<RemoteItem<R>>) -> Self
	where
		R: DeserializeOwned + Send + 'static,
	{
		Self {
			name: name.to_string(),
			shape: codec::shape_name::<R>(),
			emitter: Box::new(TypedEmitter { tx }),
		}
	}

	/// Remote creator name.
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn shape(&self) -> &'static str {
		self.shape
	}

	/// Decodes and forwards one event. A decode failure forwards nothing.
	pub fn publish(&self, data: Value) -> Result<()> {
		self.emitter.event(data)
	}

	/// Ends the consumer's stream with `err`.
	pub fn fail(&self, err: Error) {
		self.emitter.fail(err)
	}

	/// Ends the consumer's stream normally.
	pub fn complete(&self) {
		self.emitter.complete()
	}
}

enum StreamState<R> {
	Idle {
		name: String,
		args: Result<Value>,
	},
	Starting {
		id: StreamId,
		ack: ReplyFuture,
		events: mpsc::UnboundedReceiver<RemoteItem<R>>,
	},
	Streaming {
		id: StreamId,
		events: mpsc::UnboundedReceiver<RemoteItem<R>>,
	},
	Done,
}

/// Lazy stream of events produced by a remote stream creator.
///
/// Yields `Ok(event)` per decoded event. A remote failure, an undecodable
/// event, or the bridge detaching yields one `Err` and then the stream ends.
#[must_use = "streams do nothing unless polled"]
pub struct RemoteStream<R> {
	bridge: Weak<BridgeInner>,
	state: StreamState<R>,
}

impl<R> Unpin for RemoteStream<R> {}

impl<R> RemoteStream<R> {
	pub(crate) fn new(bridge: Weak<BridgeInner>, name: String, args: Result<Value>) -> Self {
		Self {
			bridge,
			state: StreamState::Idle { name, args },
		}
	}

	/// Stream id, once the stream has been opened.
	pub fn id(&self) -> Option<StreamId> {
		match &self.state {
			StreamState::Starting { id, .. } | StreamState::Streaming { id, .. } => Some(*id),
			StreamState::Idle { .. } | StreamState::Done => None,
		}
	}
}

impl<R> RemoteStream<R>
where
	R: DeserializeOwned + Send + 'static,
{
	fn open(&self, name: String, args: Result<Value>) -> Result<StreamState<R>> {
		let inner = self.bridge.upgrade().ok_or(Error::Detached)?;
		let id = inner.ids.next_id();
		let payload = codec::encode(&StreamStart {
			id,
			name: name.clone(),
			args: args?,
		})?;

		let (tx, events) = mpsc::unbounded_channel();
		let record = Arc::new(RemoteStreamRecord::new::<R>(&name, tx));
		if inner.native.is_running(id) || !inner.remote.insert(id, record) {
			return Err(Error::DuplicateStream(id));
		}

		let ack = inner.begin_remote_call(methods::REMOTE_STREAM_START, Some(payload));
		tracing::debug!(id, stream = %name, "Requested remote stream");
		Ok(StreamState::Starting { id, ack, events })
	}

	/// Drops the record after a failed start; a timed-out start is also stopped remotely.
	fn abandon(&self, id: StreamId, err: &Error) {
		let Some(inner) = self.bridge.upgrade() else {
			return;
		};
		if inner.remote.remove(id).is_some() && err.is_timeout() {
			inner.notify_remote(methods::REMOTE_STREAM_STOP, &StreamRef { id });
		}
	}
}

impl<R> Stream for RemoteStream<R>
where
	R: DeserializeOwned + Send + 'static,
{
	type Item = Result<R>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = &mut *self;
		loop {
			match std::mem::replace(&mut this.state, StreamState::Done) {
				StreamState::Idle { name, args } => match this.open(name, args) {
					Ok(state) => this.state = state,
					Err(err) => return Poll::Ready(Some(Err(err))),
				},
				StreamState::Starting { id, mut ack, events } => match ack.as_mut().poll(cx) {
					Poll::Pending => {
						this.state = StreamState::Starting { id, ack, events };
						return Poll::Pending;
					}
					Poll::Ready(Ok(_)) => {
						tracing::debug!(id, "Remote stream acknowledged");
						this.state = StreamState::Streaming { id, events };
					}
					Poll::Ready(Err(err)) => {
						tracing::warn!(id, error = %err, "Remote stream failed to start");
						this.abandon(id, &err);
						return Poll::Ready(Some(Err(err)));
					}
				},
				StreamState::Streaming { id, mut events } => match events.poll_recv(cx) {
					Poll::Pending => {
						this.state = StreamState::Streaming { id, events };
						return Poll::Pending;
					}
					Poll::Ready(Some(RemoteItem::Event(event))) => {
						this.state = StreamState::Streaming { id, events };
						return Poll::Ready(Some(Ok(event)));
					}
					Poll::Ready(Some(RemoteItem::Failed(err))) => return Poll::Ready(Some(Err(err))),
					Poll::Ready(Some(RemoteItem::Complete)) => return Poll::Ready(None),
					Poll::Ready(None) => return Poll::Ready(Some(Err(Error::ChannelClosed))),
				},
				StreamState::Done => return Poll::Ready(None),
			}
		}
	}
}

impl<R> Drop for RemoteStream<R> {
	fn drop(&mut self) {
		let Some(id) = self.id() else {
			return;
		};
		let Some(inner) = self.bridge.upgrade() else {
			return;
		};
		if inner.remote.remove(id).is_some() {
			tracing::debug!(id, "Remote stream cancelled");
			inner.notify_remote(methods::REMOTE_STREAM_STOP, &StreamRef { id });
		}
	}
}
