//! Group Hub - real-time group messaging core.
//!
//! This library keeps a registry of named groups, each holding live
//! bidirectional connections, and delivers messages to one member or to
//! every member of a group.
//!
//! # Architecture
//!
//! The hub never touches sockets directly:
//!
//! - **Hub**: registry of groups; admission, broadcast, unicast, shutdown
//! - **Client**: one admitted connection plus its receive loop
//! - **Connection**: capability trait implemented by transports
//!
//! Key design principles:
//!
//! - Locks are never held across connection I/O
//! - Inbound traffic is surfaced as events; the consumer decides what to do
//! - Canceling one root token stops every client, then the hub
//!
//! # Quick Start
//!
//! ```no_run
//! use group_hub::{ClientEvent, Hub, Result};
//! use group_hub::transport::MemoryConnection;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let hub = Hub::new();
//!     let root = CancellationToken::new();
//!     let finished = hub.run_lifecycle(root.clone());
//!
//!     let (conn, mut peer) = MemoryConnection::pair();
//!     let client = hub.admit(conn, "room1", "c1")?;
//!     let (mut events, _done) = client.start_receiving(root.child_token())?;
//!
//!     peer.send("hi");
//!     if let Some(ClientEvent::Message(payload)) = events.next().await {
//!         hub.broadcast("room1", payload).await;
//!     }
//!
//!     root.cancel();
//!     finished.wait().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`hub`] | Registry, clients, events and snapshots |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Group and connection ID wrappers |
//! | [`transport`] | Connection trait, adapters and WebSocket server |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Group registry and client lifecycle.
///
/// Use [`Hub::new()`] or [`Hub::builder()`] to create a registry.
pub mod hub;

/// Type-safe identifiers for groups and connections.
pub mod identifiers;

/// Connection capability and transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Hub types
pub use hub::{
    Client, ClientEvent, ClientEvents, ClientState, Completion, Delivery, Hub, HubBuilder,
    HubConfig, LostConnection, Snapshot,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, GroupId};

// Transport types
pub use transport::Connection;
