//! Connection adapters and the WebSocket endpoint.
//!
//! The hub talks to connections only through the [`Connection`] trait.
//! This module provides that trait, two implementations, and a server that
//! feeds WebSocket connections into a hub.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  GET /ws/{group}   ┌──────────────┐  admit   ┌─────────┐
//! │  Browser     │───────────────────►│ GroupServer  │─────────►│   Hub   │
//! │  WebSocket   │◄───────────────────│ WsConnection │◄─────────│ (groups)│
//! └──────────────┘   text frames      └──────────────┘ broadcast└─────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | The [`Connection`] capability trait |
//! | `memory` | In-memory adapter pair |
//! | `websocket` | Adapter over a tungstenite stream |
//! | `server` | WebSocket accept loop bound to a hub |

// ============================================================================
// Submodules
// ============================================================================

/// Connection capability trait.
pub mod connection;

/// In-memory connection pair.
pub mod memory;

/// WebSocket server that admits connections into a hub.
pub mod server;

/// WebSocket connection adapter.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use memory::{MemoryConnection, MemoryPeer};
pub use server::{GroupServer, ServerBuilder, ServerConfig};
pub use websocket::WsConnection;
