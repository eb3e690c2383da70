//! Group registry, clients and their lifecycle.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Hub`] | Registry of groups; admission, delivery, shutdown |
//! | [`HubBuilder`] | Fluent configuration builder |
//! | [`Group`] | Named set of clients |
//! | [`Client`] | One connection plus its receive loop |
//! | [`ClientEvents`] | Inbound messages, errors, lost-connection signal |
//! | [`Completion`] | Fires once a loop (or the hub) has stopped |
//! | [`Snapshot`] | Detached `group → members` view |
//!
//! # Cancellation
//!
//! ```text
//! root token (collaborator)
//!   └─ Hub::run_lifecycle ──► hub shutdown token
//!                               ├─ client c1 token ──► receive loop
//!                               └─ client c2 token ──► receive loop
//! ```
//!
//! Canceling the root cascades to every client. Canceling one client's
//! token stops only that client.

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for hub configuration.
pub mod builder;

/// Client state machine and receive loop.
pub mod client;

/// Core hub implementation.
pub mod core;

/// Client event queues and completion signals.
pub mod events;

/// Group membership and fan-out.
pub mod group;

/// Read-only registry snapshots.
pub mod snapshot;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{HubBuilder, HubConfig};
pub use client::{Client, ClientState};
pub use self::core::Hub;
pub use events::{ClientEvent, ClientEvents, Completion, LostConnection};
pub use group::{Delivery, Group};
pub use snapshot::Snapshot;
