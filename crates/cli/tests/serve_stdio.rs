use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

const WAIT: Duration = Duration::from_secs(10);

struct Host {
	child: Child,
	stdin: Option<ChildStdin>,
	frames: mpsc::Receiver<Value>,
	next_id: u64,
}

impl Host {
	fn spawn() -> Self {
		let mut child = Command::new(env!("CARGO_BIN_EXE_bridge-host"))
			.arg("serve")
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::null())
			.spawn()
			.expect("spawn bridge-host");

		let stdin = child.stdin.take();
		let mut stdout = child.stdout.take().expect("stdout");
		let (tx, frames) = mpsc::channel();
		thread::spawn(move || {
			loop {
				let mut len = [0u8; 4];
				if stdout.read_exact(&mut len).is_err() {
					return;
				}
				let mut body = vec![0u8; u32::from_le_bytes(len) as usize];
				if stdout.read_exact(&mut body).is_err() {
					return;
				}
				let frame: Value = serde_json::from_slice(&body).expect("json frame");
				if tx.send(frame).is_err() {
					return;
				}
			}
		});

		Self {
			child,
			stdin,
			frames,
			next_id: 0,
		}
	}

	fn write(&mut self, frame: Value) {
		let bytes = serde_json::to_vec(&frame).unwrap();
		let stdin = self.stdin.as_mut().expect("stdin open");
		stdin.write_all(&(bytes.len() as u32).to_le_bytes()).unwrap();
		stdin.write_all(&bytes).unwrap();
		stdin.flush().unwrap();
	}

	fn call(&mut self, method: &str, payload: Option<Value>) -> u64 {
		self.next_id += 1;
		let mut frame = json!({"type": "call", "id": self.next_id, "method": method});
		if let Some(payload) = payload {
			frame["payload"] = Value::String(payload.to_string());
		}
		self.write(frame);
		self.next_id
	}

	fn ack(&mut self, id: &Value) {
		self.write(json!({"type": "success", "id": id, "payload": "{}"}));
	}

	fn next(&self) -> Value {
		self.frames.recv_timeout(WAIT).expect("frame from host")
	}

	/// Next frame that is not a call, acknowledging calls on the way.
	fn reply(&mut self) -> (Value, Vec<Value>) {
		let mut calls = Vec::new();
		loop {
			let frame = self.next();
			if frame["type"] == "call" {
				self.ack(&frame["id"]);
				calls.push(frame);
			} else {
				return (frame, calls);
			}
		}
	}

	fn finish(mut self) -> std::process::ExitStatus {
		drop(self.stdin.take());
		self.child.wait().expect("wait for host")
	}
}

fn payload(frame: &Value) -> Value {
	serde_json::from_str(frame["payload"].as_str().expect("payload string")).unwrap()
}

#[test]
fn serves_calls_and_streams_over_stdio() {
	let mut host = Host::spawn();

	let init = host.call("onFlutterInitialized", None);
	let (reply, mut calls) = host.reply();
	assert_eq!(reply["id"], init);
	assert_eq!(reply["type"], "success");

	let echo = host.call("echo", Some(json!("ping")));
	let (reply, more) = host.reply();
	calls.extend(more);
	assert_eq!(reply["id"], echo);
	assert_eq!(payload(&reply), json!("ping"));

	let sum = host.call("sum", Some(json!({"values": [2, 3, 4]})));
	let (reply, more) = host.reply();
	calls.extend(more);
	assert_eq!(reply["id"], sum);
	assert_eq!(payload(&reply), json!(9));

	let ready = calls
		.iter()
		.find(|frame| frame["method"] == "host:ready")
		.expect("ready announcement after init");
	assert!(payload(ready)["version"].is_string());

	let start = host.call(
		"stream:start",
		Some(json!({"id": 1, "name": "count", "args": {"from": 1, "to": 3}})),
	);
	let mut events = Vec::new();
	let mut started = false;
	loop {
		let frame = host.next();
		if frame["type"] == "success" && frame["id"] == start {
			started = true;
			continue;
		}
		assert_eq!(frame["type"], "call");
		host.ack(&frame["id"]);
		let body = payload(&frame);
		match frame["method"].as_str() {
			Some("stream:onEvent") => {
				assert_eq!(body["id"], 1);
				events.push(body["data"].clone());
			}
			Some("stream:onComplete") => {
				assert_eq!(body["id"], 1);
				break;
			}
			other => panic!("unexpected call {other:?}"),
		}
	}
	assert!(started);
	assert_eq!(events, vec![json!(1), json!(2), json!(3)]);

	let status = host.finish();
	assert!(status.success(), "host exited with {status}");
}

#[test]
fn unknown_calls_are_not_implemented() {
	let mut host = Host::spawn();
	let id = host.call("nope", None);
	let (reply, _) = host.reply();
	assert_eq!(reply, json!({"type": "not_implemented", "id": id}));
	assert!(host.finish().success());
}

#[test]
fn config_command_prints_effective_config() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("host.json");
	std::fs::write(
		&path,
		r#"{"bridge": {"channelName": "demo/channel", "callTimeoutMs": 250}, "announceReady": false}"#,
	)
	.unwrap();

	let output = Command::new(env!("CARGO_BIN_EXE_bridge-host"))
		.args(["--config", path.to_str().unwrap(), "config"])
		.output()
		.expect("run bridge-host config");
	assert!(output.status.success());

	let printed: Value = serde_json::from_slice(&output.stdout).unwrap();
	assert_eq!(printed["bridge"]["channelName"], "demo/channel");
	assert_eq!(printed["bridge"]["callTimeoutMs"], 250);
	assert_eq!(printed["announceReady"], false);
}

#[test]
fn invalid_config_fails() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("host.json");
	std::fs::write(&path, "{ not json").unwrap();

	let output = Command::new(env!("CARGO_BIN_EXE_bridge-host"))
		.args(["--config", path.to_str().unwrap(), "config"])
		.output()
		.expect("run bridge-host config");
	assert!(!output.status.success());
	assert!(String::from_utf8_lossy(&output.stderr).contains("error"));
}
