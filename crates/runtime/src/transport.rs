//! Length-prefixed JSON transport.
//!
//! Each message is written as a 4-byte little-endian length followed by the
//! UTF-8 JSON bytes. [`PipeTransport`] works over any async byte pipe: process
//! stdio, a socket, or the in-process pair returned by [`memory_pair`].

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Upper bound for a single frame; larger prefixes are treated as corruption.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Sending half of a transport.
pub trait Transport: Send {
	/// Writes one message.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads messages until the pipe closes, forwarding them to the message queue.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// The pieces a [`MethodChannel`](crate::channel::MethodChannel) needs from a transport.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Transport over an async writer/reader pair.
pub struct PipeTransport<W, R> {
	writer: W,
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport and the queue its read loop feeds.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(
			Self {
				writer,
				reader,
				message_tx,
			},
			message_rx,
		)
	}

	/// Writes one framed message.
	pub async fn send(&mut self, message: Value) -> Result<()> {
		write_frame(&mut self.writer, &message).await
	}

	/// Reads framed messages until EOF or until the message queue is dropped.
	pub async fn run(&mut self) -> Result<()> {
		read_frames(&mut self.reader, &self.message_tx).await
	}

	/// Splits into independently owned send and receive halves.
	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(
			PipeTransportSender { writer: self.writer },
			PipeTransportReceiver {
				reader: self.reader,
				message_tx: self.message_tx,
			},
		)
	}

	/// Boxes both halves together with the message queue.
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

/// Send half of a [`PipeTransport`].
pub struct PipeTransportSender<W> {
	writer: W,
}

impl<W> Transport for PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send + 'static,
{
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move { write_frame(&mut self.writer, &message).await })
	}
}

/// Receive half of a [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R> TransportReceiver for PipeTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		let PipeTransportReceiver { mut reader, message_tx } = *self;
		Box::pin(async move { read_frames(&mut reader, &message_tx).await })
	}
}

/// Returns two connected transports backed by in-process pipes.
///
/// Whatever one side sends, the other side receives. Useful when both
/// runtimes live in the same process.
pub fn memory_pair(buffer: usize) -> (TransportParts, TransportParts) {
	let (left_read, right_write) = tokio::io::duplex(buffer);
	let (right_read, left_write) = tokio::io::duplex(buffer);

	let (left, left_rx) = PipeTransport::new(left_write, left_read);
	let (right, right_rx) = PipeTransport::new(right_write, right_read);

	(left.into_transport_parts(left_rx), right.into_transport_parts(right_rx))
}

async fn write_frame<W>(writer: &mut W, message: &Value) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let bytes = serde_json::to_vec(message)?;
	let length = u32::try_from(bytes.len())
		.map_err(|_| Error::TransportError(format!("Message too large: {} bytes", bytes.len())))?;

	writer
		.write_all(&length.to_le_bytes())
		.await
		.map_err(|e| Error::TransportError(format!("Failed to write length prefix: {e}")))?;
	writer
		.write_all(&bytes)
		.await
		.map_err(|e| Error::TransportError(format!("Failed to write message: {e}")))?;
	writer
		.flush()
		.await
		.map_err(|e| Error::TransportError(format!("Failed to flush message: {e}")))?;
	Ok(())
}

async fn read_frames<R>(reader: &mut R, message_tx: &mpsc::UnboundedSender<Value>) -> Result<()>
where
	R: AsyncRead + Unpin,
{
	loop {
		let mut len_buf = [0u8; 4];
		reader
			.read_exact(&mut len_buf)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read length prefix: {e}")))?;

		let length = u32::from_le_bytes(len_buf) as usize;
		if length > MAX_FRAME_LEN {
			return Err(Error::TransportError(format!(
				"Frame length {length} exceeds limit of {MAX_FRAME_LEN} bytes"
			)));
		}

		let mut body = vec![0u8; length];
		reader
			.read_exact(&mut body)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read message body: {e}")))?;

		let message: Value = match serde_json::from_slice(&body) {
			Ok(message) => message,
			Err(e) => {
				tracing::error!(error = %e, length, "Discarding frame with invalid JSON");
				continue;
			}
		};

		if message_tx.send(message).is_err() {
			tracing::debug!("Message queue closed, stopping transport reader");
			return Ok(());
		}
	}
}
