//! Transport-agnostic connection capability.
//!
//! The hub never touches sockets directly. Everything it needs from a live
//! connection is expressed by the [`Connection`] trait: read one message,
//! write one message, close, and a cheap liveness check used at admission.
//!
//! # Concurrency Contract
//!
//! A client's receive loop is the only caller of [`Connection::read_message`].
//! Broadcast and unicast call [`Connection::write_message`] from other tasks,
//! possibly while a read is pending. Implementations must therefore allow one
//! read concurrently with writes, and must serialize concurrent writes
//! themselves.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// ============================================================================
// Connection
// ============================================================================

/// Read/write/close capability over an arbitrary transport.
///
/// Payloads are opaque byte sequences; framing and encoding belong to the
/// implementation.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Reads the next inbound message.
    ///
    /// Returns `Ok(None)` when the remote end closed the connection cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport failed.
    async fn read_message(&self) -> Result<Option<Bytes>>;

    /// Writes one outbound message.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if already closed
    /// - [`Error::Connection`](crate::Error::Connection) or a transport error if the write failed
    async fn write_message(&self, payload: Bytes) -> Result<()>;

    /// Closes the connection.
    ///
    /// The owning client calls this exactly once, at teardown.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport could not send its close frame.
    /// The connection is considered closed either way.
    async fn close(&self) -> Result<()>;

    /// Returns `true` if the connection can still carry messages.
    fn is_open(&self) -> bool;
}
