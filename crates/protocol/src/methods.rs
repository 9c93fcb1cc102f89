//! Names of the calls the bridge reserves for its own protocol.
//!
//! Application calls may use any other name. The `stream:*` family concerns
//! streams produced on the native side; the `flutterStream:*` family concerns
//! streams produced on the remote side.

/// remote → native: start a native stream (`StreamStart`).
pub const STREAM_START: &str = "stream:start";
/// remote → native: stop a native stream (`StreamRef`).
pub const STREAM_STOP: &str = "stream:stop";
/// native → remote: native stream event (`StreamEvent`).
pub const STREAM_ON_EVENT: &str = "stream:onEvent";
/// native → remote: native stream completion (`StreamRef`).
pub const STREAM_ON_COMPLETE: &str = "stream:onComplete";
/// native → remote: native stream failure (`StreamFailure`).
pub const STREAM_ON_ERROR: &str = "stream:onError";
/// remote → native: allocate a fresh stream id, replies `Id`.
pub const STREAM_CREATE_ID: &str = "stream:createId";

/// native → remote: request a remote stream (`StreamStart`).
pub const REMOTE_STREAM_START: &str = "flutterStream:start";
/// native → remote: cancel a remote stream (`StreamRef`).
pub const REMOTE_STREAM_STOP: &str = "flutterStream:stop";
/// remote → native: remote stream event (`StreamEvent`).
pub const REMOTE_STREAM_ON_EVENT: &str = "flutterStream:onEvent";
/// remote → native: remote stream failure (`StreamFailure`).
pub const REMOTE_STREAM_ON_ERROR: &str = "flutterStream:onError";
/// remote → native: remote stream completion (`StreamRef`).
pub const REMOTE_STREAM_ON_COMPLETE: &str = "flutterStream:onComplete";

/// remote → native: the remote side is listening; opens the init gate.
pub const ON_REMOTE_INITIALIZED: &str = "onFlutterInitialized";

/// Every name reserved by the bridge protocol.
pub const RESERVED: &[&str] = &[
	STREAM_START,
	STREAM_STOP,
	STREAM_ON_EVENT,
	STREAM_ON_COMPLETE,
	STREAM_ON_ERROR,
	STREAM_CREATE_ID,
	REMOTE_STREAM_START,
	REMOTE_STREAM_STOP,
	REMOTE_STREAM_ON_EVENT,
	REMOTE_STREAM_ON_ERROR,
	REMOTE_STREAM_ON_COMPLETE,
	ON_REMOTE_INITIALIZED,
];

/// Returns true if `name` belongs to the bridge protocol.
pub fn is_reserved(name: &str) -> bool {
	RESERVED.contains(&name)
}
