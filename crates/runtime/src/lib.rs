//! Bridge Runtime - calls and event streams over one method channel
//!
//! This crate turns a single duplex message channel into many concurrent
//! named calls and long-lived event streams flowing in both directions:
//!
//! - **Transport**: length-prefixed JSON frames over any async pipe
//! - **Channel**: call/reply correlation and the single outbound writer
//! - **Dispatch**: name → handler routing with single-resolution result sinks
//! - **Streams**: native streams pushed to the remote, remote streams observed
//!   natively, both keyed by ids from one shared sequence
//! - **Bridge**: the facade that owns all of the above
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │            Bridge            │  registration + invocation API
//! │ ┌──────────┐ ┌─────────────┐ │
//! │ │Dispatcher│ │NativeStreams│ │  inbound calls, stream:start/stop
//! │ └──────────┘ └─────────────┘ │
//! │ ┌────────────┐ ┌──────────┐  │
//! │ │RemoteStream│ │ InitGate │  │  flutterStream:*, outbound ordering
//! │ └────────────┘ └──────────┘  │
//! └──────────────┬───────────────┘
//! ┌──────────────▼───────────────┐
//! │        MethodChannel         │  call ids, pending replies
//! └──────────────┬───────────────┘
//! ┌──────────────▼───────────────┐
//! │          Transport           │  pipe / in-memory pair
//! └──────────────────────────────┘
//! ```

pub mod bridge;
pub mod channel;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod native_stream;
pub mod registry;
pub mod remote_stream;
pub mod transport;

// Re-export key types at crate root
pub use bridge::Bridge;
pub use bridge_protocol as protocol;
pub use channel::{CallHandler, ChannelReply, MethodChannel, PendingReply};
pub use config::{BridgeConfig, DEFAULT_CHANNEL};
pub use dispatch::{Dispatcher, MethodHandlerRecord, ResultSink};
pub use error::{Error, HANDLER_FAILURE, RemoteError, Result, classify};
pub use native_stream::{NativeStreamHandlerRecord, NativeStreamRecord, NativeStreams};
pub use registry::{IdSequence, StreamTable};
pub use remote_stream::{RemoteStream, RemoteStreamRecord};
pub use transport::{
	PipeTransport, PipeTransportReceiver, PipeTransportSender, Transport, TransportParts, TransportReceiver,
	memory_pair,
};
