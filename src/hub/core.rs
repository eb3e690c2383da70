//! Process-wide registry of groups.
//!
//! The [`Hub`] is the entry point for collaborators: admit connections,
//! deliver payloads, disconnect members, and shut everything down.
//!
//! # Example
//!
//! ```no_run
//! use group_hub::Hub;
//! use group_hub::transport::MemoryConnection;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> group_hub::Result<()> {
//! let hub = Hub::new();
//! let root = CancellationToken::new();
//! let finished = hub.run_lifecycle(root.clone());
//!
//! let (conn, _peer) = MemoryConnection::pair();
//! let client = hub.admit(conn, "room1", "")?;
//! let (_events, _done) = client.start_receiving(root.child_token())?;
//!
//! hub.broadcast("room1", "hello").await;
//!
//! root.cancel();
//! finished.wait().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Locking
//!
//! | Lock | Guards | Order |
//! |------|--------|-------|
//! | `HubInner::groups` | group registry | first |
//! | `Group::clients` | one group's members | second |
//!
//! Neither lock is held across adapter I/O.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::join_all;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, GroupId};
use crate::transport::Connection;

use super::builder::{HubBuilder, HubConfig};
use super::client::Client;
use super::events::Completion;
use super::group::{Delivery, Group};
use super::snapshot::Snapshot;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the hub.
struct HubInner {
    config: HubConfig,

    /// Groups by ID. A key exists only while its group has members.
    groups: RwLock<FxHashMap<GroupId, Arc<Group>>>,

    /// Root of every client's cancellation token.
    shutdown: CancellationToken,

    /// Tracks every receive loop.
    tracker: TaskTracker,
}

// ============================================================================
// Hub
// ============================================================================

/// Registry of groups and their connected clients.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

// ============================================================================
// Hub - Display
// ============================================================================

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("group_count", &self.group_count())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Hub - Constructors
// ============================================================================

impl Hub {
    /// Creates a hub with default settings and no groups.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Creates a configuration builder for the hub.
    #[inline]
    #[must_use]
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    /// Creates a hub from validated settings.
    pub(crate) fn with_config(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                groups: RwLock::new(FxHashMap::default()),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }
}

// ============================================================================
// Hub - Membership
// ============================================================================

impl Hub {
    /// Admits a connection into a group.
    ///
    /// Creates the group if it does not exist. An empty `requested_id` gets a
    /// generated ID that is unique in the group. The returned client is in
    /// state NEW; call [`Client::start_receiving`] to start its loop.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `group_id` is blank
    /// - [`Error::InvalidConnection`] if the adapter is already closed
    /// - [`Error::DuplicateConnectionId`] if `requested_id` is taken
    /// - [`Error::ShuttingDown`] if shutdown has begun
    pub fn admit<C>(
        &self,
        connection: C,
        group_id: impl Into<GroupId>,
        requested_id: impl Into<ConnectionId>,
    ) -> Result<Client>
    where
        C: Connection + 'static,
    {
        let group_id = group_id.into();
        if group_id.is_blank() {
            return Err(Error::invalid_argument("group id must not be empty"));
        }

        if !connection.is_open() {
            return Err(Error::invalid_connection("connection is not open"));
        }

        let connection: Arc<dyn Connection> = Arc::new(connection);
        let requested = requested_id.into();

        let mut groups = self.inner.groups.write();

        if self.inner.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let group = Arc::clone(
            groups
                .entry(group_id.clone())
                .or_insert_with(|| Arc::new(Group::new(group_id.clone()))),
        );

        let result = group.admit(requested, self.inner.config.id_attempts, |connection_id| {
            Client::new(
                connection_id,
                group_id.clone(),
                connection,
                self.inner.shutdown.child_token(),
                self.inner.tracker.clone(),
                self.inner.config.event_capacity,
            )
        });

        match &result {
            Ok(client) => {
                info!(
                    group_id = %group_id,
                    connection_id = %client.connection_id(),
                    "Client admitted"
                );
            }
            Err(e) => {
                if group.is_empty() {
                    groups.remove(&group_id);
                }
                debug!(group_id = %group_id, error = %e, "Admission rejected");
            }
        }

        result
    }

    /// Removes a member and closes its connection.
    ///
    /// Idempotent: an absent group or member is a no-op. Removes the group
    /// once its last member leaves. Returns `true` if a member was removed.
    pub async fn disconnect(&self, group_id: &str, connection_id: &str) -> bool {
        match self.detach(group_id, connection_id, None) {
            Some(client) => {
                client.close().await;
                info!(group_id, connection_id, "Client disconnected");
                true
            }
            None => {
                trace!(group_id, connection_id, "Disconnect target already gone");
                false
            }
        }
    }

    /// Removes `client` if it is still the registered member under its ID.
    async fn evict(&self, client: &Client) {
        let detached = self.detach(
            client.group_id().as_str(),
            client.connection_id().as_str(),
            Some(client),
        );

        if let Some(client) = detached {
            client.close().await;
            info!(
                group_id = %client.group_id(),
                connection_id = %client.connection_id(),
                "Client evicted after failed write"
            );
        }
    }

    /// Unregisters a member, dropping the group if it became empty.
    fn detach(
        &self,
        group_id: &str,
        connection_id: &str,
        expected: Option<&Client>,
    ) -> Option<Client> {
        let mut groups = self.inner.groups.write();
        let group = Arc::clone(groups.get(group_id)?);

        let removed = group.remove(connection_id, expected);

        if group.is_empty() {
            groups.remove(group_id);
            debug!(group_id, "Group removed");
        }

        removed
    }
}

// ============================================================================
// Hub - Delivery
// ============================================================================

impl Hub {
    /// Sends `payload` to every current member of a group.
    ///
    /// Writes run concurrently outside any lock. A member whose write fails
    /// is disconnected; the others still receive the payload. A missing
    /// group is a no-op.
    pub async fn broadcast(&self, group_id: &str, payload: impl Into<Bytes>) -> Delivery {
        let Some(group) = self.group(group_id) else {
            trace!(group_id, "Broadcast to missing group");
            return Delivery::default();
        };

        let payload = payload.into();
        let (attempted, failed) = group.broadcast(&payload).await;

        let mut delivery = Delivery {
            attempted,
            failed: Vec::with_capacity(failed.len()),
        };

        for client in failed {
            self.evict(&client).await;
            delivery.failed.push(client.connection_id().clone());
        }

        delivery
    }

    /// Sends `payload` to one member.
    ///
    /// A member whose write fails is disconnected.
    ///
    /// # Errors
    ///
    /// - [`Error::RecipientNotFound`] if the group or member does not exist
    /// - [`Error::ConnectionClosed`] or a transport error if the write failed
    pub async fn unicast(
        &self,
        group_id: &str,
        connection_id: &str,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let client = self
            .group(group_id)
            .and_then(|group| group.get(connection_id))
            .ok_or_else(|| {
                Error::recipient_not_found(GroupId::from(group_id), ConnectionId::from(connection_id))
            })?;

        if let Err(e) = client.send(payload.into()).await {
            warn!(group_id, connection_id, error = %e, "Unicast delivery failed");
            self.evict(&client).await;
            return Err(e);
        }

        Ok(())
    }

    /// Returns the group with the given ID.
    fn group(&self, group_id: &str) -> Option<Arc<Group>> {
        self.inner.groups.read().get(group_id).cloned()
    }
}

// ============================================================================
// Hub - Introspection
// ============================================================================

impl Hub {
    /// Returns a detached copy of the registry.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let groups = self.inner.groups.read();
        groups
            .values()
            .map(|group| (group.id().clone(), group.member_ids()))
            .collect()
    }

    /// Returns the number of groups.
    #[inline]
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.inner.groups.read().len()
    }

    /// Returns the number of connections across all groups.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.groups.read().values().map(|group| group.len()).sum()
    }

    /// Returns `true` once shutdown has begun.
    #[inline]
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Returns the active settings.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }
}

// ============================================================================
// Hub - Lifecycle
// ============================================================================

impl Hub {
    /// Ties the hub's lifetime to `root`.
    ///
    /// When `root` is canceled (or [`Hub::shutdown`] is called) the hub shuts
    /// down. The returned [`Completion`] fires once every receive loop has
    /// exited and the registry is empty. Must be called from within a tokio
    /// runtime.
    pub fn run_lifecycle(&self, root: CancellationToken) -> Completion {
        let done = CancellationToken::new();
        let completion = Completion::new(done.clone());
        let hub = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = root.cancelled() => debug!("Root token canceled"),
                _ = hub.inner.shutdown.cancelled() => debug!("Hub shutdown requested"),
            }

            hub.shutdown().await;
            done.cancel();
        });

        completion
    }

    /// Shuts the hub down and waits for every receive loop to exit.
    ///
    /// Rejects further admissions, cancels every client, closes every
    /// connection, and empties the registry. Safe to call more than once.
    pub async fn shutdown(&self) {
        info!("Hub shutting down");

        self.inner.shutdown.cancel();

        let clients: Vec<Client> = {
            let mut groups = self.inner.groups.write();
            groups
                .drain()
                .flat_map(|(_, group)| group.drain())
                .collect()
        };

        let count = clients.len();
        join_all(clients.iter().map(|client| client.close())).await;

        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        info!(count, "Hub shutdown complete");
    }
}

// ============================================================================
// Tests
// ============================================================================
