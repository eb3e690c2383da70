//! In-memory connection pair.
//!
//! [`MemoryConnection`] implements [`Connection`] over unbounded channels and
//! is handed to the hub. Its [`MemoryPeer`] plays the remote end: it can push
//! inbound messages, observe outbound ones, hang up, inject read failures,
//! and make writes fail or stall.
//!
//! # Example
//!
//! ```ignore
//! let (conn, mut peer) = MemoryConnection::pair();
//! let client = hub.admit(conn, "room1", "").await?;
//!
//! peer.send("hello");
//! let outbound = peer.recv().await;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

use super::Connection;

// ============================================================================
// Types
// ============================================================================

/// Inbound item: a message, or a read failure to surface.
type Inbound = std::result::Result<Bytes, String>;

/// State shared by both ends.
#[derive(Default)]
struct Shared {
    /// Fires once the adapter is closed from either side.
    closed: CancellationToken,
    /// Number of times [`Connection::close`] was called.
    close_calls: AtomicUsize,
    /// Makes every subsequent write fail.
    fail_writes: AtomicBool,
    /// Makes every subsequent write hang until the adapter is closed.
    stall_writes: AtomicBool,
    /// Number of write attempts, successful or not.
    write_attempts: AtomicUsize,
}

// ============================================================================
// MemoryConnection
// ============================================================================

/// Channel-backed [`Connection`] implementation.
pub struct MemoryConnection {
    inbound: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    shared: Arc<Shared>,
}

impl MemoryConnection {
    /// Creates a connected adapter/peer pair.
    #[must_use]
    pub fn pair() -> (Self, MemoryPeer) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let connection = Self {
            inbound: Mutex::new(inbound_rx),
            outbound: outbound_tx,
            shared: Arc::clone(&shared),
        };

        let peer = MemoryPeer {
            inbound: Some(inbound_tx),
            outbound: outbound_rx,
            shared,
        };

        (connection, peer)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn read_message(&self) -> Result<Option<Bytes>> {
        let mut inbound = self.inbound.lock().await;

        tokio::select! {
            _ = self.shared.closed.cancelled() => Ok(None),

            item = inbound.recv() => match item {
                Some(Ok(payload)) => Ok(Some(payload)),
                Some(Err(reason)) => Err(Error::connection(reason)),
                None => Ok(None),
            },
        }
    }

    async fn write_message(&self, payload: Bytes) -> Result<()> {
        self.shared.write_attempts.fetch_add(1, Ordering::SeqCst);

        if self.shared.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::connection("write rejected by peer"));
        }

        if self.shared.stall_writes.load(Ordering::SeqCst) {
            self.shared.closed.cancelled().await;
            return Err(Error::ConnectionClosed);
        }

        self.outbound
            .send(payload)
            .map_err(|_| Error::connection("peer dropped"))
    }

    async fn close(&self) -> Result<()> {
        let calls = self.shared.close_calls.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(calls, "Memory connection closed");
        self.shared.closed.cancel();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.shared.closed.is_cancelled()
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Remote end of a [`MemoryConnection`].
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
    shared: Arc<Shared>,
}

impl MemoryPeer {
    /// Sends a message that the adapter will read.
    ///
    /// Returns `false` if the peer already hung up or the adapter is gone.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(payload.into())).is_ok())
    }

    /// Makes the adapter's next read fail with `reason`.
    pub fn fail_read(&self, reason: impl Into<String>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Err(reason.into())).is_ok())
    }

    /// Closes the peer's sending side; the adapter reads a clean closure.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Makes every subsequent write on the adapter fail.
    pub fn fail_writes(&self) {
        self.shared.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent write hang until the adapter is closed, like a
    /// remote that stopped reading.
    pub fn stall_writes(&self) {
        self.shared.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Receives the next message the adapter wrote.
    ///
    /// Returns `None` once the adapter is dropped and drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Returns the next written message without waiting.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }

    /// Waits until the adapter has been closed.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await;
    }

    /// Returns `true` if the adapter has been closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Returns how many times the adapter's `close` was called.
    #[inline]
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    /// Returns how many writes were attempted on the adapter.
    #[inline]
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.shared.write_attempts.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_what_peer_sent() {
        let (conn, peer) = MemoryConnection::pair();
        assert!(peer.send("hello"));

        let msg = conn.read_message().await.expect("read");
        assert_eq!(msg, Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn test_hang_up_reads_clean_close() {
        let (conn, mut peer) = MemoryConnection::pair();
        peer.hang_up();

        assert!(conn.read_message().await.expect("read").is_none());
        assert!(!peer.send("late"));
    }

    #[tokio::test]
    async fn test_fail_read() {
        let (conn, peer) = MemoryConnection::pair();
        peer.fail_read("reset by peer");

        let err = conn.read_message().await.unwrap_err();
        assert!(err.to_string().contains("reset by peer"));
    }

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let (conn, mut peer) = MemoryConnection::pair();
        conn.write_message(Bytes::from_static(b"out")).await.expect("write");

        assert_eq!(peer.recv().await, Some(Bytes::from_static(b"out")));
        assert_eq!(peer.write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let (conn, peer) = MemoryConnection::pair();
        peer.fail_writes();

        let err = conn.write_message(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(peer.write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (conn, peer) = MemoryConnection::pair();
        let conn = Arc::new(conn);

        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.read_message().await })
        };

        conn.close().await.expect("close");
        let read = reader.await.expect("join").expect("read");
        assert!(read.is_none());
        assert!(peer.is_closed());
        assert!(!conn.is_open());
        assert_eq!(peer.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_write_after_close() {
        let (conn, _peer) = MemoryConnection::pair();
        conn.close().await.expect("close");

        let err = conn.write_message(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_stalled_write_released_by_close() {
        let (conn, peer) = MemoryConnection::pair();
        let conn = Arc::new(conn);
        peer.stall_writes();

        let writer = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.write_message(Bytes::from_static(b"x")).await })
        };

        tokio::task::yield_now().await;
        assert!(!writer.is_finished());

        conn.close().await.expect("close");
        let err = writer.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(peer.write_attempts(), 1);
    }
}
