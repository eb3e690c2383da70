//! One live connection and its receive loop.
//!
//! # State Machine
//!
//! ```text
//!   admit            start_receiving         read failure / peer close
//!  ───────► NEW ───────────────────► ACTIVE ──────────────────────────┐
//!            │                         │   disconnect / cancellation  │
//!            │ disconnect / shutdown   └──────────────────────────────┤
//!            └────────────────────────────────────────────────► CLOSED
//! ```
//!
//! CLOSED is terminal. The adapter is closed exactly once, on the transition
//! into CLOSED, and never read from or written to afterwards.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, GroupId};
use crate::transport::Connection;

use super::events::{ClientEvents, Completion, LostConnection};

// ============================================================================
// ClientState
// ============================================================================

/// Lifecycle state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Registered; receive loop not started.
    New,
    /// Receive loop running.
    Active,
    /// Torn down; adapter closed.
    Closed,
}

// ============================================================================
// Types
// ============================================================================

/// Why the receive loop stopped.
enum LoopExit {
    Cancelled,
    Lost(LostConnection),
}

/// Internal shared state for a client.
struct ClientInner {
    connection_id: ConnectionId,
    group_id: GroupId,
    /// Exclusively owned adapter.
    connection: Arc<dyn Connection>,
    state: Mutex<ClientState>,
    /// Child of the hub's lifecycle token.
    cancel: CancellationToken,
    /// Hub-wide tracker the receive loop is spawned on.
    tracker: TaskTracker,
    /// Capacity of the message and error queues.
    event_capacity: usize,
}

// ============================================================================
// Client
// ============================================================================

/// A member of a group.
///
/// Cheap to clone; clones refer to the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("connection_id", &self.inner.connection_id)
            .field("group_id", &self.inner.group_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Constructor
// ============================================================================

impl Client {
    /// Creates a client in state NEW.
    pub(crate) fn new(
        connection_id: ConnectionId,
        group_id: GroupId,
        connection: Arc<dyn Connection>,
        cancel: CancellationToken,
        tracker: TaskTracker,
        event_capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                connection_id,
                group_id,
                connection,
                state: Mutex::new(ClientState::New),
                cancel,
                tracker,
                event_capacity,
            }),
        }
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Returns the connection ID, unique within the group.
    #[inline]
    #[must_use]
    pub fn connection_id(&self) -> &ConnectionId {
        &self.inner.connection_id
    }

    /// Returns the ID of the owning group.
    #[inline]
    #[must_use]
    pub fn group_id(&self) -> &GroupId {
        &self.inner.group_id
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.inner.state.lock()
    }

    /// Returns `true` once the client is torn down.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == ClientState::Closed
    }

    /// Returns `true` if both handles refer to the same client.
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &Client) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Starts the receive loop (NEW → ACTIVE).
    ///
    /// The loop stops when `token` is canceled, when the client is
    /// disconnected, when the hub shuts down, or when the connection is
    /// lost. Must be called from within a tokio runtime.
    ///
    /// # Returns
    ///
    /// The client's event queues and a [`Completion`] that fires once the
    /// loop has exited and the adapter is closed.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the client is already closed
    /// - [`Error::AlreadyReceiving`] if the loop was already started
    pub fn start_receiving(&self, token: CancellationToken) -> Result<(ClientEvents, Completion)> {
        let mut state = self.inner.state.lock();

        match *state {
            ClientState::Closed => return Err(Error::ConnectionClosed),
            ClientState::Active => {
                return Err(Error::already_receiving(self.inner.connection_id.clone()));
            }
            ClientState::New => {}
        }

        let (messages_tx, messages_rx) = mpsc::channel(self.inner.event_capacity);
        let (errors_tx, errors_rx) = mpsc::channel(self.inner.event_capacity);
        let (lost_tx, lost_rx) = oneshot::channel();
        let done = CancellationToken::new();

        // Spawned under the state lock so teardown observes either NEW or a
        // tracked loop, never an untracked one.
        let client = self.clone();
        let loop_done = done.clone();
        self.inner.tracker.spawn(async move {
            client
                .receive_loop(token, messages_tx, errors_tx, lost_tx)
                .await;
            loop_done.cancel();
        });

        *state = ClientState::Active;
        drop(state);

        info!(
            group_id = %self.inner.group_id,
            connection_id = %self.inner.connection_id,
            "Client listening for messages"
        );

        Ok((
            ClientEvents::new(messages_rx, errors_rx, lost_rx),
            Completion::new(done),
        ))
    }
}

// ============================================================================
// Client - Internal
// ============================================================================

impl Client {
    /// Writes one payload to the adapter.
    pub(crate) async fn send(&self, payload: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        self.inner.connection.write_message(payload).await
    }

    /// Tears the client down (→ CLOSED).
    ///
    /// Stops the receive loop and closes the adapter. Returns `false` if the
    /// client was already closed.
    pub(crate) async fn close(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if *state == ClientState::Closed {
                return false;
            }
            *state = ClientState::Closed;
        }

        self.inner.cancel.cancel();

        if let Err(e) = self.inner.connection.close().await {
            debug!(
                connection_id = %self.inner.connection_id,
                error = %e,
                "Error closing connection"
            );
        }

        debug!(
            group_id = %self.inner.group_id,
            connection_id = %self.inner.connection_id,
            "Client closed"
        );

        true
    }

    /// Reads until canceled or the connection is lost.
    async fn receive_loop(
        self,
        token: CancellationToken,
        messages: mpsc::Sender<Bytes>,
        errors: mpsc::Sender<Error>,
        lost: oneshot::Sender<LostConnection>,
    ) {
        let cancel = self.inner.cancel.clone();
        let connection_id = &self.inner.connection_id;

        let exit = loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break LoopExit::Cancelled,
                _ = token.cancelled() => break LoopExit::Cancelled,
                read = self.inner.connection.read_message() => read,
            };

            match read {
                Ok(Some(payload)) => {
                    trace!(%connection_id, len = payload.len(), "Message received");

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break LoopExit::Cancelled,
                        _ = token.cancelled() => break LoopExit::Cancelled,
                        sent = messages.send(payload) => {
                            if sent.is_err() {
                                trace!(%connection_id, "Message consumer dropped");
                            }
                        }
                    }
                }

                Ok(None) => break LoopExit::Lost(LostConnection::ClosedByPeer),

                Err(e) => {
                    let reason = e.to_string();
                    if errors.try_send(e).is_err() {
                        warn!(%connection_id, %reason, "Error queue unavailable, dropping error");
                    }
                    break LoopExit::Lost(LostConnection::ReadFailed { reason });
                }
            }
        };

        self.close().await;

        match exit {
            LoopExit::Cancelled => {
                debug!(%connection_id, "Receive loop canceled");
            }
            LoopExit::Lost(reason) => {
                warn!(%connection_id, ?reason, "Connection lost");
                let _ = lost.send(reason);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
