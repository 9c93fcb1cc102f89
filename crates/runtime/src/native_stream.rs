//! Streams produced on the native side and observed by the remote.
//!
//! A stream creator is registered by name. When the remote calls
//! `stream:start`, the creator's factory builds a lazy event stream which is
//! then pumped by a spawned task: every item becomes a `stream:onEvent`
//! notice, and the end of the stream becomes exactly one `stream:onComplete`
//! or `stream:onError`. A `stream:stop` from the remote aborts the pump
//! without any terminal notice.
//!
//! The subscription handle in [`NativeStreamRecord`] decides every race
//! between natural termination and stop: whoever takes it out of the record
//! owns the teardown, and only the pump ever sends a terminal notice.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bridge_protocol::methods;
use bridge_protocol::{StreamEvent, StreamFailure, StreamId, StreamRef};
use dashmap::DashMap;
use futures_util::future::AbortHandle;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec;
use crate::error::{Error, HANDLER_FAILURE, RemoteError, Result, classify};
use crate::registry::StreamTable;

/// Events of a created stream, already encoded and classified.
pub type EventStream = BoxStream<'static, std::result::Result<Value, RemoteError>>;

type StreamFactory = Box<dyn Fn(Value) -> Result<EventStream> + Send + Sync>;

/// Sends stream notices to the remote side.
pub trait StreamNotifier: Send + Sync {
	fn notify(&self, method: &'static str, payload: String);
}

impl<F> StreamNotifier for F
where
	F: Fn(&'static str, String) + Send + Sync,
{
	fn notify(&self, method: &'static str, payload: String) {
		self(method, payload)
	}
}

/// A registered stream creator: argument shape and type-erased factory.
pub struct NativeStreamHandlerRecord {
	shape: &'static str,
	create: StreamFactory,
}

impl NativeStreamHandlerRecord {
	pub fn new<A, R, E, S, F>(factory: F) -> Self
	where
		A: DeserializeOwned + 'static,
		R: Serialize + 'static,
		E: std::error::Error + 'static,
		S: Stream<Item = std::result::Result<R, E>> + Send + 'static,
		F: Fn(A) -> S + Send + Sync + 'static,
	{
		let create: StreamFactory = Box::new(move |args: Value| {
			let argument = codec::decode_value::<A>(args)?;
			let events = factory(argument).map(|item| match item {
				Ok(event) => codec::encode_value(&event).map_err(|err| err.to_remote_error()),
				Err(err) => Err(classify(&err)),
			});
			// a panic while polling ends the stream with one failure
			let events = AssertUnwindSafe(events)
				.catch_unwind()
				.map(|polled| polled.unwrap_or_else(|panic| Err(panic_failure(panic))));
			Ok(events.boxed())
		});

		Self {
			shape: codec::shape_name::<A>(),
			create,
		}
	}

	pub fn shape(&self) -> &'static str {
		self.shape
	}

	/// Decodes `args` and builds the event stream. Nothing runs until it is polled.
	pub fn create(&self, args: Value) -> Result<EventStream> {
		(self.create)(args)
	}
}

/// One running native stream.
pub struct NativeStreamRecord {
	name: String,
	subscription: Mutex<Option<AbortHandle>>,
}

impl NativeStreamRecord {
	fn new(name: &str, subscription: AbortHandle) -> Self {
		Self {
			name: name.to_string(),
			subscription: Mutex::new(Some(subscription)),
		}
	}

	/// Creator name this stream was started from.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// False once the stream has finished or been stopped.
	pub fn is_active(&self) -> bool {
		self.subscription.lock().is_some()
	}

	/// Takes the handle and aborts the pump. Returns false if already finished.
	fn cancel(&self) -> bool {
		match self.subscription.lock().take() {
			Some(handle) => {
				handle.abort();
				true
			}
			None => false,
		}
	}

	/// Takes the handle for natural termination. Returns false if stopped first.
	fn finish(&self) -> bool {
		self.subscription.lock().take().is_some()
	}
}

/// Stream creators and the streams currently running from them.
#[derive(Default)]
pub struct NativeStreams {
	creators: DashMap<String, Arc<NativeStreamHandlerRecord>>,
	running: Arc<StreamTable<Arc<NativeStreamRecord>>>,
}

impl NativeStreams {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a stream creator. A later registration under the same name wins.
	pub fn register<A, R, E, S, F>(&self, name: impl Into<String>, factory: F)
	where
		A: DeserializeOwned + 'static,
		R: Serialize + 'static,
		E: std::error::Error + 'static,
		S: Stream<Item = std::result::Result<R, E>> + Send + 'static,
		F: Fn(A) -> S + Send + Sync + 'static,
	{
		let name = name.into();
		let record = Arc::new(NativeStreamHandlerRecord::new(factory));
		tracing::debug!(creator = %name, shape = record.shape(), "Registered stream creator");
		self.creators.insert(name, record);
	}

	pub fn has_creator(&self, name: &str) -> bool {
		self.creators.contains_key(name)
	}

	pub fn is_running(&self, id: StreamId) -> bool {
		self.running.contains(id)
	}

	/// Number of streams currently running.
	pub fn running(&self) -> usize {
		self.running.len()
	}

	/// Starts the stream `name` under `id` and spawns its pump.
	///
	/// Fails without creating any state if the creator is unknown, the
	/// argument does not decode, or `id` is taken.
	pub fn start(&self, id: StreamId, name: &str, args: Value, notifier: Arc<dyn StreamNotifier>) -> Result<()> {
		let creator = self
			.creators
			.get(name)
			.map(|entry| Arc::clone(entry.value()))
			.ok_or_else(|| Error::NotImplemented(name.to_string()))?;

		if self.running.contains(id) {
			return Err(Error::DuplicateStream(id));
		}

		let events = creator.create(args)?;
		let (events, handle) = stream::abortable(events);
		let record = Arc::new(NativeStreamRecord::new(name, handle));
		if !self.running.insert(id, Arc::clone(&record)) {
			return Err(Error::DuplicateStream(id));
		}

		tracing::debug!(id, creator = name, "Native stream subscribed");
		let running = Arc::clone(&self.running);
		tokio::spawn(async move {
			let mut events = events;
			while let Some(item) = events.next().await {
				match item {
					Ok(data) => {
						if !record.is_active() {
							break;
						}
						tracing::debug!(id, event = %data, "Native stream fired event");
						send(notifier.as_ref(), methods::STREAM_ON_EVENT, &StreamEvent { id, data });
					}
					Err(remote) => {
						if record.finish() {
							tracing::warn!(id, code = %remote.code, message = %remote.message, "Native stream failed");
							running.remove(id);
							let failure = StreamFailure {
								id,
								code: remote.code,
								message: remote.message,
							};
							send(notifier.as_ref(), methods::STREAM_ON_ERROR, &failure);
						}
						return;
					}
				}
			}

			if record.finish() {
				tracing::debug!(id, "Native stream completed");
				running.remove(id);
				send(notifier.as_ref(), methods::STREAM_ON_COMPLETE, &StreamRef { id });
			}
		});

		Ok(())
	}

	/// Stops a running stream. Unknown or finished ids are a no-op.
	///
	/// Returns true if this call stopped the stream.
	pub fn stop(&self, id: StreamId) -> bool {
		let Some(record) = self.running.lookup(id) else {
			tracing::debug!(id, "Stop for unknown native stream (ignored)");
			return false;
		};
		if !record.cancel() {
			return false;
		}
		self.running.remove(id);
		tracing::debug!(id, creator = record.name(), "Native stream subscription disposed");
		true
	}

	/// Drops every creator and aborts every running stream without notices.
	pub fn clear(&self) {
		self.creators.clear();
		let mut aborted = 0;
		for record in self.running.drain() {
			if record.cancel() {
				aborted += 1;
			}
		}
		if aborted > 0 {
			tracing::debug!(aborted, "Aborted running native streams");
		}
	}
}

fn panic_failure(panic: Box<dyn Any + Send>) -> RemoteError {
	let message = match panic.downcast::<String>() {
		Ok(message) => *message,
		Err(panic) => match panic.downcast_ref::<&str>() {
			Some(message) => message.to_string(),
			None => "Stream panicked".to_string(),
		},
	};
	tracing::error!(%message, "Native stream panicked");
	RemoteError::new(HANDLER_FAILURE, message)
}

fn send<T: Serialize>(notifier: &dyn StreamNotifier, method: &'static str, args: &T) {
	match codec::encode(args) {
		Ok(payload) => notifier.notify(method, payload),
		Err(err) => tracing::error!(method, error = %err, "Failed to encode stream notice"),
	}
}
