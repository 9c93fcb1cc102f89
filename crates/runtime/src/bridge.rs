//! The bridge facade.
//!
//! [`Bridge`] owns the registration tables, the stream id sequence, the init
//! gate and the attached [`MethodChannel`]. Collaborators register call
//! handlers and stream creators on it, and use it to call into the remote
//! side.
//!
//! # Lifecycle
//!
//! 1. Create a bridge and register handlers (this may happen before attaching)
//! 2. [`attach`](Bridge::attach) a channel: the bridge installs its dispatch
//!    entry point and its own protocol calls
//! 3. Outbound traffic, including calls made before the first attach, is
//!    held back until the remote calls `onFlutterInitialized`, then released
//!    in the order it was issued
//! 4. [`detach`](Bridge::detach) drops every registration and open stream;
//!    handlers still running are not interrupted, their late results are
//!    discarded

use std::future::Future;
use std::sync::{Arc, Weak};

use bridge_protocol::methods;
use bridge_protocol::{Empty, Id, StreamEvent, StreamFailure, StreamId, StreamRef, StreamStart};
use futures_util::future::BoxFuture;
use futures_util::stream::Stream;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::channel::{ChannelReply, MethodChannel, PendingReply};
use crate::codec;
use crate::config::BridgeConfig;
use crate::dispatch::{Dispatcher, ResultSink};
use crate::error::{Error, Result};
use crate::gate::InitGate;
use crate::native_stream::{NativeStreams, StreamNotifier};
use crate::registry::{IdSequence, StreamTable};
use crate::remote_stream::{RemoteStream, RemoteStreamRecord};
use crate::transport::TransportParts;

/// Reply to an outbound call, bounded by the configured call timeout.
pub(crate) type ReplyFuture = BoxFuture<'static, Result<Option<String>>>;

/// Shared state behind every [`Bridge`] handle.
pub(crate) struct BridgeInner {
	config: BridgeConfig,
	pub(crate) ids: IdSequence,
	gate: InitGate,
	dispatcher: Dispatcher,
	pub(crate) native: NativeStreams,
	pub(crate) remote: StreamTable<Arc<RemoteStreamRecord>>,
	channel: RwLock<Option<Arc<MethodChannel>>>,
}

impl BridgeInner {
	fn channel(&self) -> Result<Arc<MethodChannel>> {
		self.channel.read().clone().ok_or(Error::Detached)
	}

	/// Issues an outbound call through the init gate.
	///
	/// While the gate is closed the whole call waits in the gate queue,
	/// channel lookup included, so calls made before the first attach go out
	/// once the remote side initializes. Once the gate is open a detached
	/// bridge fails the call with [`Error::Detached`].
	pub(crate) fn begin_remote_call(self: &Arc<Self>, method: &str, payload: Option<String>) -> ReplyFuture {
		tracing::debug!(method, payload = ?payload, "Calling remote method");

		let (issued_tx, issued_rx) = oneshot::channel();
		let bridge = Arc::downgrade(self);
		let name = method.to_string();
		self.gate.run_or_defer(move || {
			let issued = match bridge.upgrade() {
				Some(inner) => inner.issue(&name, payload),
				None => Err(Error::Detached),
			};
			let _ = issued_tx.send(issued);
		});

		let reply = async move {
			match issued_rx.await {
				Ok(Ok(pending)) => pending.await,
				Ok(Err(err)) => Err(err),
				Err(_) => Err(Error::ChannelClosed),
			}
		};
		let Some(limit) = self.config.call_timeout() else {
			return Box::pin(reply);
		};
		let method = method.to_string();
		Box::pin(async move {
			match tokio::time::timeout(limit, reply).await {
				Ok(result) => result,
				Err(_) => Err(Error::Timeout(format!(
					"'{method}' got no reply within {}ms",
					limit.as_millis()
				))),
			}
		})
	}

	fn issue(&self, method: &str, payload: Option<String>) -> Result<PendingReply> {
		let channel = self.channel()?;
		let (call, reply) = channel.begin_call(method, payload);
		call.send();
		Ok(reply)
	}

	/// Fire-and-forget call. Failures are logged, never returned.
	pub(crate) fn notify_remote<T: Serialize + ?Sized>(self: &Arc<Self>, method: &str, argument: &T) {
		match codec::encode(argument) {
			Ok(payload) => self.notify_encoded(method, payload),
			Err(err) => tracing::error!(method, error = %err, "Failed to encode notification"),
		}
	}

	fn notify_encoded(self: &Arc<Self>, method: &str, payload: String) {
		let reply = self.begin_remote_call(method, Some(payload));
		let method = method.to_string();
		match tokio::runtime::Handle::try_current() {
			Ok(runtime) => {
				runtime.spawn(async move {
					if let Err(err) = reply.await {
						tracing::error!(method = %method, error = %err, "Error invoking remote method");
					}
				});
			}
			Err(_) => tracing::debug!(method = %method, "No runtime to await the reply; not waiting for it"),
		}
	}

	fn start_native_stream(self: &Arc<Self>, start: StreamStart) -> Result<Empty> {
		if self.remote.contains(start.id) {
			return Err(Error::DuplicateStream(start.id));
		}
		let notifier: Arc<dyn StreamNotifier> = Arc::new(Notifier(Arc::downgrade(self)));
		self.native.start(start.id, &start.name, start.args, notifier)?;
		Ok(Empty)
	}

	fn on_remote_event(self: &Arc<Self>, event: StreamEvent) {
		let id = event.id;
		let Some(record) = self.remote.lookup(id) else {
			tracing::debug!(id, "Event for unknown remote stream (ignored)");
			return;
		};
		if let Err(err) = record.publish(event.data) {
			tracing::warn!(id, stream = record.name(), error = %err, "Remote stream event failed to decode");
			if self.remote.remove(id).is_some() {
				record.fail(err);
				self.notify_remote(methods::REMOTE_STREAM_STOP, &StreamRef { id });
			}
		}
	}

	fn on_remote_error(&self, failure: StreamFailure) {
		let StreamFailure { id, code, message } = failure;
		match self.remote.remove(id) {
			Some(record) => {
				tracing::debug!(id, %code, %message, "Remote stream failed");
				record.fail(Error::Remote { code, message });
			}
			None => tracing::debug!(id, "Error for unknown remote stream (ignored)"),
		}
	}

	fn on_remote_complete(&self, id: StreamId) {
		match self.remote.remove(id) {
			Some(record) => {
				tracing::debug!(id, stream = record.name(), "Remote stream completed");
				record.complete();
			}
			None => tracing::debug!(id, "Completion for unknown remote stream (ignored)"),
		}
	}
}

/// Sends native stream notices through a bridge that may already be gone.
struct Notifier(Weak<BridgeInner>);

impl StreamNotifier for Notifier {
	fn notify(&self, method: &'static str, payload: String) {
		match self.0.upgrade() {
			Some(inner) => inner.notify_encoded(method, payload),
			None => tracing::debug!(method, "Bridge dropped; stream notice discarded"),
		}
	}
}

/// Registers one of the bridge's own protocol calls.
fn protocol_call<A, R, F>(inner: &Arc<BridgeInner>, name: &'static str, handler: F)
where
	A: DeserializeOwned + 'static,
	R: Serialize + 'static,
	F: Fn(&Arc<BridgeInner>, A) -> Result<R> + Send + Sync + 'static,
{
	let bridge = Arc::downgrade(inner);
	inner.dispatcher.register(name, move |argument: A, sink: ResultSink<R>| {
		let Some(inner) = bridge.upgrade() else {
			sink.fail(Error::Detached);
			return;
		};
		match handler(&inner, argument) {
			Ok(value) => sink.success(value),
			Err(err) => sink.fail(err),
		}
	});
}

fn register_protocol(inner: &Arc<BridgeInner>) {
	protocol_call(inner, methods::STREAM_START, |inner, start: StreamStart| {
		inner.start_native_stream(start)
	});
	protocol_call(inner, methods::STREAM_STOP, |inner, stop: StreamRef| {
		inner.native.stop(stop.id);
		Ok(Empty)
	});
	protocol_call(inner, methods::REMOTE_STREAM_ON_EVENT, |inner, event: StreamEvent| {
		inner.on_remote_event(event);
		Ok(Empty)
	});
	protocol_call(inner, methods::REMOTE_STREAM_ON_ERROR, |inner, failure: StreamFailure| {
		inner.on_remote_error(failure);
		Ok(Empty)
	});
	protocol_call(inner, methods::REMOTE_STREAM_ON_COMPLETE, |inner, done: StreamRef| {
		inner.on_remote_complete(done.id);
		Ok(Empty)
	});
	protocol_call(inner, methods::STREAM_CREATE_ID, |inner, _: Empty| {
		Ok(Id {
			id: inner.ids.next_id(),
		})
	});
	protocol_call(inner, methods::ON_REMOTE_INITIALIZED, |inner, _: Empty| {
		if inner.gate.open() {
			tracing::info!("Remote side initialized");
		}
		Ok(Empty)
	});
}

/// Bidirectional call and stream bridge over one method channel.
///
/// Cloning is cheap; clones share the same tables and channel.
#[derive(Clone)]
pub struct Bridge {
	inner: Arc<BridgeInner>,
}

impl Default for Bridge {
	fn default() -> Self {
		Self::new(BridgeConfig::default())
	}
}

impl std::fmt::Debug for Bridge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Bridge")
			.field("channel", &self.inner.config.channel_name)
			.field("attached", &self.is_attached())
			.field("initialized", &self.is_initialized())
			.finish()
	}
}

impl Bridge {
	pub fn new(config: BridgeConfig) -> Self {
		Self {
			inner: Arc::new(BridgeInner {
				config,
				ids: IdSequence::new(),
				gate: InitGate::new(),
				dispatcher: Dispatcher::new(),
				native: NativeStreams::new(),
				remote: StreamTable::new(),
				channel: RwLock::new(None),
			}),
		}
	}

	pub fn config(&self) -> &BridgeConfig {
		&self.inner.config
	}

	/// Attaches a channel, detaching the current one first.
	///
	/// Installs the dispatch entry point, then registers the protocol calls.
	/// The caller remains responsible for running the channel.
	pub fn attach(&self, channel: Arc<MethodChannel>) {
		if self.is_attached() {
			self.detach();
		}

		let bridge = Arc::downgrade(&self.inner);
		channel.set_call_handler(Some(Arc::new(
			move |method: &str, payload: Option<String>, reply: ChannelReply| match bridge.upgrade() {
				Some(inner) => inner.dispatcher.dispatch(method, payload, reply),
				None => reply.not_implemented(),
			},
		)));
		register_protocol(&self.inner);

		tracing::info!(channel = channel.name(), "Bridge attached");
		*self.inner.channel.write() = Some(channel);
	}

	/// Wraps `parts` in a channel named after the config, attaches it and runs it.
	pub fn connect(&self, parts: TransportParts) -> JoinHandle<Result<()>> {
		let channel = Arc::new(MethodChannel::new(self.inner.config.channel_name.clone(), parts));
		self.attach(Arc::clone(&channel));
		channel.spawn()
	}

	/// Detaches the channel and clears every table.
	///
	/// Call handlers, stream creators and protocol calls are unregistered,
	/// running native streams are aborted without notices, open remote
	/// streams end with [`Error::ChannelClosed`] and pending outbound calls
	/// fail the same way. Does nothing when no channel is attached.
	pub fn detach(&self) -> Option<Arc<MethodChannel>> {
		let channel = self.inner.channel.write().take()?;
		channel.set_call_handler(None);
		let cancelled = channel.cancel_pending();

		self.inner.dispatcher.clear();
		self.inner.native.clear();
		let closed = self.inner.remote.drain().len();

		tracing::info!(channel = channel.name(), cancelled, closed, "Bridge detached");
		Some(channel)
	}

	pub fn is_attached(&self) -> bool {
		self.inner.channel.read().is_some()
	}

	/// True once the remote side has reported that it is listening.
	pub fn is_initialized(&self) -> bool {
		self.inner.gate.is_open()
	}

	/// Allocates a stream id from the bridge's sequence.
	pub fn next_stream_id(&self) -> StreamId {
		self.inner.ids.next_id()
	}

	pub fn active_native_streams(&self) -> usize {
		self.inner.native.running()
	}

	pub fn active_remote_streams(&self) -> usize {
		self.inner.remote.len()
	}

	pub fn has_call(&self, name: &str) -> bool {
		self.inner.dispatcher.contains(name)
	}

	pub fn has_stream_creator(&self, name: &str) -> bool {
		self.inner.native.has_creator(name)
	}

	/// Registers a call handler. The handler must resolve its sink exactly once.
	pub fn register_call<A, R, F>(&self, name: impl Into<String>, handler: F)
	where
		A: DeserializeOwned + 'static,
		R: Serialize + 'static,
		F: Fn(A, ResultSink<R>) + Send + Sync + 'static,
	{
		let name = checked_name(name);
		self.inner.dispatcher.register(name, handler);
	}

	/// Registers an async producer whose result answers the call.
	pub fn register_single_call<A, R, E, F, Fut>(&self, name: impl Into<String>, producer: F)
	where
		A: DeserializeOwned + 'static,
		R: Serialize + Send + 'static,
		E: std::error::Error + Send + 'static,
		F: Fn(A) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
	{
		let name = checked_name(name);
		self.inner.dispatcher.register_single(name, producer);
	}

	/// Registers an async action; the call is answered with `{}` once it completes.
	pub fn register_completion_call<A, E, F, Fut>(&self, name: impl Into<String>, action: F)
	where
		A: DeserializeOwned + 'static,
		E: std::error::Error + Send + 'static,
		F: Fn(A) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
	{
		let name = checked_name(name);
		self.inner.dispatcher.register_completion(name, action);
	}

	/// Registers a stream creator the remote can start with `stream:start`.
	pub fn register_stream_creator<A, R, E, S, F>(&self, name: impl Into<String>, factory: F)
	where
		A: DeserializeOwned + 'static,
		R: Serialize + 'static,
		E: std::error::Error + 'static,
		S: Stream<Item = std::result::Result<R, E>> + Send + 'static,
		F: Fn(A) -> S + Send + Sync + 'static,
	{
		let name = checked_name(name);
		self.inner.native.register(name, factory);
	}

	/// Calls `name` on the remote side and decodes the reply as `R`.
	///
	/// The call is issued immediately (or queued behind the init gate); the
	/// returned future only waits for the reply.
	pub fn invoke_remote_call<A, R>(&self, name: &str, argument: &A) -> BoxFuture<'static, Result<R>>
	where
		A: Serialize + ?Sized,
		R: DeserializeOwned + 'static,
	{
		let reply = codec::encode(argument).map(|payload| self.inner.begin_remote_call(name, Some(payload)));
		Box::pin(async move {
			let payload = reply?.await?;
			codec::decode::<R>(payload.as_deref())
		})
	}

	/// Opens a stream produced by the remote creator `name`.
	///
	/// Nothing is sent until the stream is first polled.
	pub fn invoke_remote_stream<A, R>(&self, name: impl Into<String>, argument: &A) -> RemoteStream<R>
	where
		A: Serialize + ?Sized,
		R: DeserializeOwned + Send + 'static,
	{
		RemoteStream::new(Arc::downgrade(&self.inner), name.into(), codec::encode_value(argument))
	}

	/// Calls `name` on the remote side without waiting for the outcome.
	///
	/// Failures, including a detached bridge, are logged and not returned.
	pub fn notify_remote<A: Serialize + ?Sized>(&self, name: &str, argument: &A) {
		self.inner.notify_remote(name, argument);
	}
}

fn checked_name(name: impl Into<String>) -> String {
	let name = name.into();
	if methods::is_reserved(&name) {
		tracing::warn!(method = %name, "Registering under a reserved protocol name");
	}
	name
}
