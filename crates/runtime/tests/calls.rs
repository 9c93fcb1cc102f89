mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bridge_runtime::protocol::{Empty, methods};
use bridge_runtime::{Bridge, BridgeConfig, Error, RemoteError, ResultSink};
use common::Remote;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[tokio::test]
async fn echo_round_trip() {
	let bridge = Bridge::default();
	bridge.register_call("echo", |text: String, sink: ResultSink<String>| sink.success(text));
	let remote = Remote::ready(&bridge, &[]).await;

	assert_eq!(remote.call("echo", json!("hi")).await.unwrap(), json!("hi"));
}

#[tokio::test]
async fn unregistered_call_is_not_implemented() {
	let bridge = Bridge::default();
	let remote = Remote::ready(&bridge, &[]).await;

	let err = remote.call("missing", json!({})).await.unwrap_err();
	assert!(err.is_not_implemented(), "got {err:?}");
}

#[tokio::test]
async fn mismatched_payload_never_reaches_handler() {
	let bridge = Bridge::default();
	let invoked = Arc::new(AtomicBool::new(false));
	let flag = invoked.clone();
	bridge.register_call("echo", move |text: String, sink: ResultSink<String>| {
		flag.store(true, Ordering::SeqCst);
		sink.success(text);
	});
	let remote = Remote::ready(&bridge, &[]).await;

	let err = remote.call("echo", json!(42)).await.unwrap_err();
	assert_eq!(err.remote_code(), Some("DecodeError"));
	assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn deferred_resolution_keeps_the_call_open() {
	let bridge = Bridge::default();
	bridge.register_call("later", |delay: u64, sink: ResultSink<&'static str>| {
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(delay)).await;
			sink.success("done");
		});
	});
	let remote = Remote::ready(&bridge, &[]).await;

	assert_eq!(remote.call("later", json!(20)).await.unwrap(), json!("done"));
}

#[derive(Debug, Deserialize)]
struct Operands {
	values: Vec<i64>,
}

#[tokio::test]
async fn single_adapter_answers_value_or_classified_failure() {
	let bridge = Bridge::default();
	bridge.register_single_call("sum", |args: Operands| async move {
		if args.values.is_empty() {
			Err(RemoteError::new("EmptyInput", "nothing to add"))
		} else {
			Ok(args.values.iter().sum::<i64>())
		}
	});
	bridge.register_single_call("parse", |text: String| async move { text.parse::<i64>() });
	let remote = Remote::ready(&bridge, &[]).await;

	assert_eq!(remote.call("sum", json!({"values": [1, 2, 3]})).await.unwrap(), json!(6));

	let err = remote.call("sum", json!({"values": []})).await.unwrap_err();
	assert_eq!(err.remote_code(), Some("EmptyInput"));
	assert_eq!(err.to_string(), "EmptyInput: nothing to add");

	let err = remote.call("parse", json!("abc")).await.unwrap_err();
	assert_eq!(err.remote_code(), Some("ParseIntError"));
	assert_eq!(err.to_string(), "ParseIntError: invalid digit found in string");
}

#[tokio::test]
async fn completion_adapter_answers_empty() {
	let bridge = Bridge::default();
	bridge.register_completion_call("reset", |_: Empty| async { Ok::<(), std::io::Error>(()) });
	bridge.register_completion_call("fail", |_: Empty| async {
		Err(std::io::Error::other("disk unplugged"))
	});
	let remote = Remote::ready(&bridge, &[]).await;

	assert_eq!(remote.call("reset", json!(null)).await.unwrap(), json!({}));

	let err = remote.call("fail", json!(null)).await.unwrap_err();
	assert_eq!(err.remote_code(), Some("Error"));
	assert_eq!(err.to_string(), "Error: disk unplugged");
}

#[derive(Debug, Serialize)]
struct Lookup<'a> {
	key: &'a str,
}

#[derive(Debug, PartialEq, Deserialize)]
struct Entry {
	value: u32,
}

#[tokio::test]
async fn remote_call_decodes_reply_by_shape() {
	let bridge = Bridge::default();
	let mut remote = Remote::ready(&bridge, &["lookup"]).await;

	let pending = bridge.invoke_remote_call::<_, Entry>("lookup", &Lookup { key: "answer" });
	let held = remote.next_held().await;
	assert_eq!(held.method, "lookup");
	assert_eq!(held.payload, json!({"key": "answer"}));
	held.reply.success(Some(r#"{"value": 42}"#.to_string()));

	assert_eq!(pending.await.unwrap(), Entry { value: 42 });
}

#[tokio::test]
async fn remote_rejection_and_missing_handler_surface_once() {
	let bridge = Bridge::default();
	let mut remote = Remote::ready(&bridge, &["save", "unknown"]).await;

	let save = bridge.invoke_remote_call::<_, Empty>("save", &Empty);
	remote.next_held().await.reply.error("DiskFull", "no space left");
	let err = save.await.unwrap_err();
	assert_eq!(err.category(), "RemoteRejected");
	assert_eq!(err.remote_code(), Some("DiskFull"));

	let unknown = bridge.invoke_remote_call::<_, Empty>("unknown", &Empty);
	remote.next_held().await.reply.not_implemented();
	assert!(unknown.await.unwrap_err().is_not_implemented());
}

#[tokio::test]
async fn stalled_call_times_out_when_configured() {
	let bridge = Bridge::new(BridgeConfig::new().with_call_timeout(Duration::from_millis(100)));
	let mut remote = Remote::ready(&bridge, &["stall"]).await;

	let pending = bridge.invoke_remote_call::<_, Empty>("stall", &Empty);
	let _held = remote.next_held().await;

	let err = pending.await.unwrap_err();
	assert!(err.is_timeout(), "got {err:?}");
}

#[tokio::test]
async fn outbound_traffic_waits_for_init_and_keeps_order() {
	let bridge = Bridge::default();
	let mut remote = Remote::connect(&bridge, &[]);

	bridge.notify_remote("first", &json!(1));
	bridge.notify_remote("second", &json!(2));
	let third = bridge.invoke_remote_call::<_, Empty>("third", &json!(3));
	remote.expect_quiet().await;
	assert!(!bridge.is_initialized());

	remote.init().await;
	assert!(bridge.is_initialized());
	assert_eq!(remote.next_notice().await, ("first".to_string(), json!(1)));
	assert_eq!(remote.next_notice().await, ("second".to_string(), json!(2)));
	assert_eq!(remote.next_notice().await, ("third".to_string(), json!(3)));
	third.await.unwrap();

	bridge.notify_remote("fourth", &json!(4));
	assert_eq!(remote.next_notice().await, ("fourth".to_string(), json!(4)));

	// a second init signal changes nothing
	remote.init().await;
	remote.expect_quiet().await;
}

#[tokio::test]
async fn traffic_issued_before_connect_is_delivered_after_init() {
	let bridge = Bridge::default();
	let early = bridge.invoke_remote_call::<_, Empty>("early", &json!({"n": 1}));
	bridge.notify_remote("early:notice", &json!({"n": 2}));
	assert!(!bridge.is_attached());

	let mut remote = Remote::ready(&bridge, &[]).await;

	assert!(early.await.is_ok());
	assert_eq!(remote.next_notice().await, ("early".to_string(), json!({"n": 1})));
	assert_eq!(remote.next_notice().await, ("early:notice".to_string(), json!({"n": 2})));
}

#[tokio::test]
async fn created_ids_increase_and_share_the_stream_sequence() {
	let bridge = Bridge::default();
	let remote = Remote::ready(&bridge, &[]).await;

	let first = remote.call(methods::STREAM_CREATE_ID, json!(null)).await.unwrap();
	let local = bridge.next_stream_id();
	let second = remote.call(methods::STREAM_CREATE_ID, json!(null)).await.unwrap();

	let first = first["id"].as_u64().unwrap();
	let second = second["id"].as_u64().unwrap();
	assert!(first > 0);
	assert!(local > first);
	assert!(second > local);
}

#[tokio::test]
async fn detach_clears_registrations_and_fails_outbound_calls() {
	let bridge = Bridge::default();
	bridge.register_call("echo", |text: String, sink: ResultSink<String>| sink.success(text));
	let mut remote = Remote::ready(&bridge, &["slow"]).await;

	let slow = bridge.invoke_remote_call::<_, Empty>("slow", &Empty);
	let _held = remote.next_held().await;

	assert!(bridge.detach().is_some());
	assert!(!bridge.is_attached());
	assert!(!bridge.has_call("echo"));
	assert!(bridge.detach().is_none());

	assert!(matches!(slow.await, Err(Error::ChannelClosed)));

	let err = remote.call("echo", json!("hi")).await.unwrap_err();
	assert!(err.is_not_implemented(), "got {err:?}");

	let err = bridge.invoke_remote_call::<_, Empty>("echo", &Empty).await.unwrap_err();
	assert!(matches!(err, Error::Detached), "got {err:?}");
}

#[tokio::test]
async fn reattach_registers_protocol_calls_again() {
	let bridge = Bridge::default();
	let first = Remote::ready(&bridge, &[]).await;
	assert!(bridge.has_call(methods::STREAM_START));

	let second = Remote::connect(&bridge, &[]);
	assert!(bridge.is_attached());
	assert!(bridge.has_call(methods::STREAM_START));

	// the gate stays open across reattach
	assert!(bridge.is_initialized());
	let id = second.call(methods::STREAM_CREATE_ID, json!(null)).await.unwrap();
	assert!(id["id"].as_u64().unwrap() > 0);

	let err = first.call(methods::STREAM_CREATE_ID, json!(null)).await.unwrap_err();
	assert!(err.is_not_implemented(), "got {err:?}");
}
