//! WebSocket connection adapter.
//!
//! Wraps a [`WebSocketStream`] as a [`Connection`]. The stream is split so
//! the receive loop can wait on the read half while broadcasts write through
//! the other half.
//!
//! # Framing
//!
//! | Direction | Frame | Payload |
//! |-----------|-------|---------|
//! | Inbound | Text / Binary | Raw bytes |
//! | Inbound | Ping / Pong / raw | Skipped |
//! | Inbound | Close, end of stream | Clean closure (`Ok(None)`) |
//! | Outbound | Valid UTF-8 | Text |
//! | Outbound | Anything else | Binary |
//!
//! # Closing
//!
//! [`Connection::close`] aborts any write still pending on a peer that has
//! stopped reading, then tries to send a close frame for at most
//! [`CLOSE_TIMEOUT`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the close handshake.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// WsConnection
// ============================================================================

/// [`Connection`] over a WebSocket stream.
///
/// Reads and writes use separate halves behind separate locks, so one read
/// may be pending while writes proceed. Writes are serialized.
pub struct WsConnection<S> {
    /// Read half, used only by the receive loop.
    reader: Mutex<SplitStream<WebSocketStream<S>>>,
    /// Write half, shared by broadcast, unicast and close.
    writer: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    /// Set once a close frame was sent or received.
    closed: AtomicBool,
    /// Canceled by `close`; aborts pending writes.
    closing: CancellationToken,
}

impl<S> WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Creates an adapter from an established WebSocket stream.
    #[must_use]
    pub fn new(ws_stream: WebSocketStream<S>) -> Self {
        let (writer, reader) = ws_stream.split();

        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            closing: CancellationToken::new(),
        }
    }

    /// Encodes an outbound payload as a text frame when possible.
    fn encode(payload: Bytes) -> Message {
        match String::from_utf8(payload.to_vec()) {
            Ok(text) => Message::text(text),
            Err(_) => Message::binary(payload),
        }
    }
}

#[async_trait]
impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_message(&self) -> Result<Option<Bytes>> {
        let mut reader = self.reader.lock().await;

        loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Bytes::copy_from_slice(text.as_str().as_bytes())));
                }

                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data));
                }

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    self.closed.store(true, Ordering::SeqCst);
                    return Ok(None);
                }

                Some(Err(e)) => {
                    self.closed.store(true, Ordering::SeqCst);
                    return Err(Error::WebSocket(e));
                }

                None => {
                    debug!("WebSocket stream ended");
                    self.closed.store(true, Ordering::SeqCst);
                    return Ok(None);
                }

                // Ignore Ping, Pong, raw frames
                Some(Ok(_)) => {
                    trace!("Skipping control frame");
                }
            }
        }
    }

    async fn write_message(&self, payload: Bytes) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || self.closing.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        tokio::select! {
            biased;
            _ = self.closing.cancelled() => {
                trace!("Pending write aborted by close");
                Err(Error::ConnectionClosed)
            }

            sent = async {
                let mut writer = self.writer.lock().await;
                writer.send(Self::encode(payload)).await
            } => Ok(sent?),
        }
    }

    async fn close(&self) -> Result<()> {
        // Releases the writer held by any stalled write.
        self.closing.cancel();

        if self.closed.swap(true, Ordering::SeqCst) {
            // Remote already closed; tungstenite replies to the close frame itself.
            return Ok(());
        }

        let handshake = async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        };

        match timeout(CLOSE_TIMEOUT, handshake).await {
            Ok(result) => result?,
            Err(_) => debug!("Close handshake timed out, dropping frame"),
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================
