//! Built-in collaborators served by the host.

use std::convert::Infallible;
use std::time::Duration;

use bridge_runtime::{Bridge, RemoteError, ResultSink};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method announced once the remote side is initialized.
pub const READY_METHOD: &str = "host:ready";

#[derive(Debug, Serialize)]
pub struct ReadyNotice {
	pub version: &'static str,
}

impl ReadyNotice {
	pub fn current() -> Self {
		Self {
			version: env!("CARGO_PKG_VERSION"),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct SumArgs {
	#[serde(default)]
	pub values: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SleepArgs {
	pub ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountArgs {
	pub from: i64,
	pub to: i64,
	#[serde(default)]
	pub interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct RelayArgs {
	pub name: String,
	#[serde(default)]
	pub args: Value,
}

/// Registers every built-in call and stream creator on `bridge`.
pub fn register(bridge: &Bridge) {
	bridge.register_call("echo", |text: String, sink: ResultSink<String>| sink.success(text));
	bridge.register_single_call("sum", |args: SumArgs| async move { sum(&args.values) });
	bridge.register_completion_call("sleep", |args: SleepArgs| async move {
		tokio::time::sleep(Duration::from_millis(args.ms)).await;
		Ok::<(), Infallible>(())
	});
	bridge.register_stream_creator("count", count);

	// The bridge keeps the creator alive and the creator keeps the bridge;
	// detach clears the creator table, which breaks the cycle.
	let relay_bridge = bridge.clone();
	bridge.register_stream_creator("relay", move |args: RelayArgs| {
		relay_bridge.invoke_remote_stream::<_, Value>(args.name, &args.args)
	});

	tracing::debug!("Registered built-in services");
}

pub fn sum(values: &[i64]) -> Result<i64, RemoteError> {
	values.iter().try_fold(0i64, |total, value| {
		total
			.checked_add(*value)
			.ok_or_else(|| RemoteError::new("Overflow", "sum does not fit in a 64-bit integer"))
	})
}

/// Integers `from..=to`, one every `interval_ms`.
pub fn count(args: CountArgs) -> BoxStream<'static, Result<i64, Infallible>> {
	let interval = Duration::from_millis(args.interval_ms);
	stream::unfold(args.from, move |next| async move {
		if next > args.to {
			return None;
		}
		if !interval.is_zero() {
			tokio::time::sleep(interval).await;
		}
		Some((Ok(next), next + 1))
	})
	.boxed()
}
