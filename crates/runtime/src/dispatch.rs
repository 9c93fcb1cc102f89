//! Inbound call dispatch.
//!
//! Each registered call name maps to a [`MethodHandlerRecord`]: the argument
//! shape plus a handler that receives the decoded argument and a
//! [`ResultSink`]. The dispatcher never waits for the handler; the sink may
//! be resolved later from any task, and the remote caller stays pending until
//! it is.

use std::future::Future;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bridge_protocol::Empty;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::channel::ChannelReply;
use crate::codec;
use crate::error::classify;

type ErasedInvoke = Box<dyn Fn(Option<String>, ChannelReply) + Send + Sync>;

/// Single-resolution result handle given to call handlers.
///
/// [`success`](Self::success), [`error`](Self::error) and
/// [`fail`](Self::fail) consume the sink, so a call cannot be answered twice.
/// Dropping an unresolved sink answers the remote with a `ReplyDropped` error.
pub struct ResultSink<R> {
	reply: ChannelReply,
	_result: PhantomData<fn(R)>,
}

impl<R: Serialize> ResultSink<R> {
	pub(crate) fn new(reply: ChannelReply) -> Self {
		Self {
			reply,
			_result: PhantomData,
		}
	}

	/// Name of the call this sink answers.
	pub fn method(&self) -> &str {
		self.reply.method()
	}

	/// Resolves the call with `value`.
	pub fn success(self, value: R) {
		match codec::encode(&value) {
			Ok(payload) => {
				tracing::debug!(method = self.reply.method(), payload = %payload, "Sending response to remote");
				self.reply.success(Some(payload));
			}
			Err(err) => {
				tracing::error!(method = self.reply.method(), error = %err, "Failed to encode response");
				let remote = err.to_remote_error();
				self.reply.error(remote.code, remote.message);
			}
		}
	}

	/// Resolves the call with an explicit error code and message.
	pub fn error(self, code: impl Into<String>, message: impl Into<String>) {
		let (code, message) = (code.into(), message.into());
		tracing::debug!(method = self.reply.method(), %code, %message, "Sending error to remote");
		self.reply.error(code, message);
	}

	/// Resolves the call with a classified failure.
	///
	/// See [`classify`](crate::error::classify) for how the code is chosen.
	pub fn fail<E>(self, err: E)
	where
		E: std::error::Error + 'static,
	{
		let remote = classify(&err);
		self.error(remote.code, remote.message);
	}
}

/// A registered call: argument shape and type-erased handler.
pub struct MethodHandlerRecord {
	shape: &'static str,
	invoke: ErasedInvoke,
}

impl MethodHandlerRecord {
	pub fn new<A, R, F>(handler: F) -> Self
	where
		A: DeserializeOwned + 'static,
		R: Serialize + 'static,
		F: Fn(A, ResultSink<R>) + Send + Sync + 'static,
	{
		let invoke: ErasedInvoke = Box::new(move |payload: Option<String>, reply: ChannelReply| {
			match codec::decode::<A>(payload.as_deref()) {
				Ok(argument) => handler(argument, ResultSink::new(reply)),
				Err(err) => {
					tracing::warn!(method = reply.method(), error = %err, "Rejecting call with undecodable argument");
					let remote = err.to_remote_error();
					reply.error(remote.code, remote.message);
				}
			}
		});

		Self {
			shape: codec::shape_name::<A>(),
			invoke,
		}
	}

	/// Name of the argument shape this record decodes.
	pub fn shape(&self) -> &'static str {
		self.shape
	}

	/// Decodes `payload` and runs the handler, or answers with `DecodeError`.
	pub fn invoke(&self, payload: Option<String>, reply: ChannelReply) {
		(self.invoke)(payload, reply)
	}
}

/// Call-name → handler table plus the dispatch entry point.
#[derive(Default)]
pub struct Dispatcher {
	methods: DashMap<String, Arc<MethodHandlerRecord>>,
}

impl Dispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a raw handler. A later registration under the same name wins.
	pub fn register<A, R, F>(&self, name: impl Into<String>, handler: F)
	where
		A: DeserializeOwned + 'static,
		R: Serialize + 'static,
		F: Fn(A, ResultSink<R>) + Send + Sync + 'static,
	{
		let name = name.into();
		let record = Arc::new(MethodHandlerRecord::new(handler));
		tracing::debug!(method = %name, shape = record.shape(), "Registered call handler");
		if self.methods.insert(name.clone(), record).is_some() {
			tracing::debug!(method = %name, "Replaced existing call handler");
		}
	}

	/// Registers a one-shot async producer; its value or failure answers the call.
	pub fn register_single<A, R, E, F, Fut>(&self, name: impl Into<String>, producer: F)
	where
		A: DeserializeOwned + 'static,
		R: Serialize + Send + 'static,
		E: std::error::Error + Send + 'static,
		F: Fn(A) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<R, E>> + Send + 'static,
	{
		self.register(name, move |argument: A, sink: ResultSink<R>| {
			let pending = producer(argument);
			tokio::spawn(async move {
				match pending.await {
					Ok(value) => sink.success(value),
					Err(err) => sink.fail(err),
				}
			});
		});
	}

	/// Registers an async action whose completion answers the call with [`Empty`].
	pub fn register_completion<A, E, F, Fut>(&self, name: impl Into<String>, action: F)
	where
		A: DeserializeOwned + 'static,
		E: std::error::Error + Send + 'static,
		F: Fn(A) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<(), E>> + Send + 'static,
	{
		self.register(name, move |argument: A, sink: ResultSink<Empty>| {
			let pending = action(argument);
			tokio::spawn(async move {
				match pending.await {
					Ok(()) => sink.success(Empty),
					Err(err) => sink.fail(err),
				}
			});
		});
	}

	pub fn unregister(&self, name: &str) -> bool {
		self.methods.remove(name).is_some()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.methods.contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.methods.len()
	}

	pub fn is_empty(&self) -> bool {
		self.methods.is_empty()
	}

	pub fn clear(&self) {
		self.methods.clear();
	}

	/// Routes one inbound call.
	///
	/// Unknown names answer `not_implemented`. A handler that panics before
	/// resolving its sink is contained here; the dropped sink answers the
	/// remote with an error.
	pub fn dispatch(&self, method: &str, payload: Option<String>, reply: ChannelReply) {
		let record = self.methods.get(method).map(|entry| Arc::clone(entry.value()));
		let Some(record) = record else {
			tracing::debug!(method, "No handler registered for call");
			reply.not_implemented();
			return;
		};

		tracing::debug!(method, payload = ?payload, "Got call from remote");
		if panic::catch_unwind(AssertUnwindSafe(|| record.invoke(payload, reply))).is_err() {
			tracing::error!(method, "Call handler panicked");
		}
	}
}
