//! Outward event surfaces of a client.
//!
//! A started receive loop reports through three queues, bundled in
//! [`ClientEvents`]:
//!
//! | Queue | Carries | Closes when |
//! |-------|---------|-------------|
//! | messages | Inbound payloads, in read order | Loop exits |
//! | errors | Read failures | Loop exits |
//! | lost | One [`LostConnection`] | Fired once, or dropped on cancellation |
//!
//! Each queue has exactly one producer (the loop) and one consumer (the
//! collaborator). [`ClientEvents::next`] merges them for the common case.
//!
//! Completion of a loop (or of the whole hub) is reported by [`Completion`].

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::Error;

// ============================================================================
// LostConnection
// ============================================================================

/// Why a receive loop lost its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LostConnection {
    /// The remote end closed the connection cleanly.
    ClosedByPeer,
    /// A read failed; the error itself went to the error queue.
    ReadFailed {
        /// Rendered read error.
        reason: String,
    },
}

// ============================================================================
// ClientEvent
// ============================================================================

/// One item from [`ClientEvents::next`].
#[derive(Debug)]
pub enum ClientEvent {
    /// Inbound payload.
    Message(Bytes),
    /// Read failure reported by the loop.
    Error(Error),
    /// Connection lost; no further messages follow.
    Lost(LostConnection),
}

// ============================================================================
// ClientEvents
// ============================================================================

/// Consumer side of a client's event queues.
#[derive(Debug)]
pub struct ClientEvents {
    messages: mpsc::Receiver<Bytes>,
    errors: mpsc::Receiver<Error>,
    lost: oneshot::Receiver<LostConnection>,
    messages_done: bool,
    errors_done: bool,
    lost_done: bool,
}

impl ClientEvents {
    /// Wraps the receiving ends created by the receive loop.
    pub(crate) fn new(
        messages: mpsc::Receiver<Bytes>,
        errors: mpsc::Receiver<Error>,
        lost: oneshot::Receiver<LostConnection>,
    ) -> Self {
        Self {
            messages,
            errors,
            lost,
            messages_done: false,
            errors_done: false,
            lost_done: false,
        }
    }

    /// Waits for the next event from any queue.
    ///
    /// Pending messages are yielded before errors, and errors before the
    /// lost-connection signal. Returns `None` once the loop has exited and
    /// every queue is drained.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        loop {
            if self.messages_done && self.errors_done && self.lost_done {
                return None;
            }

            tokio::select! {
                biased;

                message = self.messages.recv(), if !self.messages_done => match message {
                    Some(payload) => return Some(ClientEvent::Message(payload)),
                    None => self.messages_done = true,
                },

                error = self.errors.recv(), if !self.errors_done => match error {
                    Some(error) => return Some(ClientEvent::Error(error)),
                    None => self.errors_done = true,
                },

                lost = &mut self.lost, if !self.lost_done => {
                    self.lost_done = true;
                    if let Ok(reason) = lost {
                        return Some(ClientEvent::Lost(reason));
                    }
                }
            }
        }
    }

    /// Splits into the raw queues for callers that consume them separately.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<Bytes>,
        mpsc::Receiver<Error>,
        oneshot::Receiver<LostConnection>,
    ) {
        (self.messages, self.errors, self.lost)
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Signal that fires exactly once when a task has fully stopped.
///
/// Cloneable; every clone observes the same completion.
#[derive(Debug, Clone)]
pub struct Completion {
    done: CancellationToken,
}

impl Completion {
    /// Creates a completion driven by `done`; cancel it to fire.
    pub(crate) fn new(done: CancellationToken) -> Self {
        Self { done }
    }

    /// Waits until the task has stopped.
    pub async fn wait(&self) {
        self.done.cancelled().await;
    }

    /// Returns `true` if the task has already stopped.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.done.is_cancelled()
    }
}

// ============================================================================
// Tests
// ============================================================================
