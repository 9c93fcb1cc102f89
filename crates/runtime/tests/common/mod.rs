//! A scripted remote side for driving a real bridge over an in-memory pipe.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bridge_runtime::protocol::methods;
use bridge_runtime::{Bridge, ChannelReply, MethodChannel, memory_pair};
use serde_json::Value;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// A call the remote received and has not answered yet.
pub struct Held {
	pub method: String,
	pub payload: Value,
	pub reply: ChannelReply,
}

impl Held {
	pub fn ack(self) {
		self.reply.success(Some("{}".to_string()));
	}
}

/// The remote end of a bridge.
///
/// Calls from the bridge are acknowledged with `{}` and recorded as notices,
/// except for methods listed as held, which are handed to the test unanswered.
pub struct Remote {
	pub channel: Arc<MethodChannel>,
	notices: mpsc::UnboundedReceiver<(String, Value)>,
	held: mpsc::UnboundedReceiver<Held>,
}

impl Remote {
	/// Connects `bridge` to a fresh remote.
	pub fn connect(bridge: &Bridge, held: &[&str]) -> Self {
		init_tracing();
		let (native, remote) = memory_pair(256 * 1024);
		bridge.connect(native);

		let channel = Arc::new(MethodChannel::new("remote", remote));
		let held_methods: HashSet<String> = held.iter().map(|name| name.to_string()).collect();
		let (notice_tx, notices) = mpsc::unbounded_channel();
		let (held_tx, held) = mpsc::unbounded_channel();

		channel.set_call_handler(Some(Arc::new(
			move |method: &str, payload: Option<String>, reply: ChannelReply| {
				let payload = payload
					.map(|text| serde_json::from_str(&text).expect("bridge sent invalid JSON"))
					.unwrap_or(Value::Null);
				if held_methods.contains(method) {
					let _ = held_tx.send(Held {
						method: method.to_string(),
						payload,
						reply,
					});
				} else {
					let _ = notice_tx.send((method.to_string(), payload));
					reply.success(Some("{}".to_string()));
				}
			},
		)));
		channel.spawn();

		Self {
			channel,
			notices,
			held,
		}
	}

	/// Connects and trips the bridge's init gate.
	pub async fn ready(bridge: &Bridge, held: &[&str]) -> Self {
		let remote = Self::connect(bridge, held);
		remote.init().await;
		remote
	}

	pub async fn init(&self) {
		self.channel
			.invoke(methods::ON_REMOTE_INITIALIZED, None)
			.await
			.expect("onFlutterInitialized failed");
	}

	/// Calls the bridge and parses the reply payload.
	pub async fn call(&self, method: &str, payload: Value) -> bridge_runtime::Result<Value> {
		let payload = (!payload.is_null()).then(|| payload.to_string());
		let reply = tokio::time::timeout(WAIT, self.channel.invoke(method, payload))
			.await
			.expect("bridge did not answer")?;
		Ok(reply
			.map(|text| serde_json::from_str(&text).expect("reply is not JSON"))
			.unwrap_or(Value::Null))
	}

	pub async fn next_notice(&mut self) -> (String, Value) {
		tokio::time::timeout(WAIT, self.notices.recv())
			.await
			.expect("no notice from the bridge")
			.expect("remote channel closed")
	}

	pub async fn next_held(&mut self) -> Held {
		tokio::time::timeout(WAIT, self.held.recv())
			.await
			.expect("no held call from the bridge")
			.expect("remote channel closed")
	}

	/// Asserts nothing arrives for a short while.
	pub async fn expect_quiet(&mut self) {
		if let Ok(Some(notice)) = tokio::time::timeout(Duration::from_millis(100), self.notices.recv()).await {
			panic!("unexpected notice {notice:?}");
		}
	}
}
