//! Error types for the group hub.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use group_hub::{Hub, Result};
//!
//! async fn greet(hub: &Hub, group: &str, id: &str) -> Result<()> {
//!     hub.unicast(group, id, "welcome").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Admission | [`Error::InvalidConnection`], [`Error::DuplicateConnectionId`], [`Error::ShuttingDown`] |
//! | Delivery | [`Error::RecipientNotFound`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::AlreadyReceiving`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Errors from direct calls (`admit`, `unicast`) are returned to the caller.
//! Errors raised inside a receive loop are delivered through the client's
//! error queue instead. None of them are fatal to the process.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{ConnectionId, GroupId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a builder is given settings it cannot honor.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to a hub operation.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Admission Errors
    // ========================================================================
    /// Connection adapter is unusable at admission time.
    #[error("Invalid connection: {reason}")]
    InvalidConnection {
        /// Why the adapter was rejected.
        reason: String,
    },

    /// Requested connection ID is already taken in the group.
    #[error("Connection ID {connection_id} already in use in group {group_id}")]
    DuplicateConnectionId {
        /// Group that was joined.
        group_id: GroupId,
        /// The conflicting connection ID.
        connection_id: ConnectionId,
    },

    /// Hub is shutting down and no longer admits connections.
    #[error("Hub is shutting down")]
    ShuttingDown,

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// Unicast target does not exist.
    ///
    /// Either the group or the connection within it is absent.
    #[error("Recipient not found: group={group_id}, connection={connection_id}")]
    RecipientNotFound {
        /// Target group.
        group_id: GroupId,
        /// Target connection.
        connection_id: ConnectionId,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport-level failure while reading or writing.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Operation attempted on a closed client or adapter.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Receive loop was already started for this client.
    #[error("Client {connection_id} is already receiving")]
    AlreadyReceiving {
        /// The client's connection ID.
        connection_id: ConnectionId,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid connection error.
    #[inline]
    pub fn invalid_connection(reason: impl Into<String>) -> Self {
        Self::InvalidConnection {
            reason: reason.into(),
        }
    }

    /// Creates a duplicate connection ID error.
    #[inline]
    pub fn duplicate_connection_id(group_id: GroupId, connection_id: ConnectionId) -> Self {
        Self::DuplicateConnectionId {
            group_id,
            connection_id,
        }
    }

    /// Creates a recipient not found error.
    #[inline]
    pub fn recipient_not_found(group_id: GroupId, connection_id: ConnectionId) -> Self {
        Self::RecipientNotFound {
            group_id,
            connection_id,
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an already receiving error.
    #[inline]
    pub fn already_receiving(connection_id: ConnectionId) -> Self {
        Self::AlreadyReceiving { connection_id }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::InvalidConnection { .. }
                | Self::WebSocket(_)
                | Self::Io(_)
        )
    }

    /// Returns `true` if the target of the operation did not exist.
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecipientNotFound { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors leave the hub untouched; the caller can report
    /// them and continue, or retry with different input.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RecipientNotFound { .. }
                | Self::DuplicateConnectionId { .. }
                | Self::InvalidArgument { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
