//! Named set of clients sharing broadcasts.
//!
//! A [`Group`] guards its member map with its own lock. The hub always takes
//! its registry lock before a group lock, never the reverse, and no group
//! lock is held while writing to a connection: writers first copy the member
//! list, release the lock, then perform I/O.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use bytes::Bytes;
use futures_util::future::join_all;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, GroupId};

use super::client::Client;

// ============================================================================
// Delivery
// ============================================================================

/// Outcome of a broadcast.
///
/// Every member registered when the broadcast started was attempted exactly
/// once; `failed` lists those whose write errored (they have been
/// disconnected).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Number of members a write was attempted on.
    pub attempted: usize,
    /// Members whose write failed.
    pub failed: Vec<ConnectionId>,
}

impl Delivery {
    /// Returns the number of successful writes.
    #[inline]
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed.len()
    }

    /// Returns `true` if every attempted write succeeded.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// Group
// ============================================================================

/// One communication channel and its members.
pub struct Group {
    id: GroupId,
    clients: RwLock<FxHashMap<ConnectionId, Client>>,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Group - Read Access
// ============================================================================

impl Group {
    /// Creates an empty group.
    pub(crate) fn new(id: GroupId) -> Self {
        Self {
            id,
            clients: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the group ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// Returns the number of members.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Returns `true` if the group has no members.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Returns the IDs of all current members.
    #[must_use]
    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.clients.read().keys().cloned().collect()
    }

    /// Returns the member with the given ID.
    pub(crate) fn get(&self, connection_id: &str) -> Option<Client> {
        self.clients.read().get(connection_id).cloned()
    }

    /// Returns a point-in-time copy of the members.
    pub(crate) fn members(&self) -> Vec<Client> {
        self.clients.read().values().cloned().collect()
    }
}

// ============================================================================
// Group - Membership
// ============================================================================

impl Group {
    /// Resolves a connection ID and registers the client built for it.
    ///
    /// An empty `requested` ID is replaced by a generated one. ID resolution
    /// and insertion happen under one write lock, so the ID is unique at
    /// assignment time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateConnectionId`] if `requested` is taken, or
    /// if `id_attempts` generated IDs all collided.
    pub(crate) fn admit(
        &self,
        requested: ConnectionId,
        id_attempts: u32,
        build: impl FnOnce(ConnectionId) -> Client,
    ) -> Result<Client> {
        let mut clients = self.clients.write();

        let connection_id = if requested.is_empty() {
            ConnectionId::generate_unique(id_attempts, |id| clients.contains_key(id))
                .ok_or_else(|| {
                    Error::duplicate_connection_id(self.id.clone(), ConnectionId::new(""))
                })?
        } else if clients.contains_key(&requested) {
            return Err(Error::duplicate_connection_id(self.id.clone(), requested));
        } else {
            requested
        };

        let client = build(connection_id.clone());
        clients.insert(connection_id, client.clone());

        Ok(client)
    }

    /// Removes a member by ID.
    ///
    /// With `expected` set, removes only if the registered member is that
    /// same client.
    pub(crate) fn remove(&self, connection_id: &str, expected: Option<&Client>) -> Option<Client> {
        let mut clients = self.clients.write();

        if let Some(expected) = expected
            && !clients
                .get(connection_id)
                .is_some_and(|current| current.same_as(expected))
        {
            return None;
        }

        clients.remove(connection_id)
    }

    /// Removes and returns every member.
    pub(crate) fn drain(&self) -> Vec<Client> {
        self.clients.write().drain().map(|(_, client)| client).collect()
    }
}

// ============================================================================
// Group - Delivery
// ============================================================================

impl Group {
    /// Writes `payload` to every current member, concurrently.
    ///
    /// Returns the number of members attempted and the clients whose write
    /// failed. A failing member does not affect the others.
    pub(crate) async fn broadcast(&self, payload: &Bytes) -> (usize, Vec<Client>) {
        let members = self.members();
        let attempted = members.len();

        let writes = members.into_iter().map(|client| async move {
            match client.send(payload.clone()).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        group_id = %self.id,
                        connection_id = %client.connection_id(),
                        error = %e,
                        "Broadcast delivery failed"
                    );
                    Some(client)
                }
            }
        });

        let failed: Vec<Client> = join_all(writes).await.into_iter().flatten().collect();

        trace!(group_id = %self.id, attempted, failed = failed.len(), "Broadcast finished");

        (attempted, failed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;

    use crate::transport::{MemoryConnection, MemoryPeer};

    fn build(group: &Group) -> (impl FnOnce(ConnectionId) -> Client, MemoryPeer) {
        let (conn, peer) = MemoryConnection::pair();
        let group_id = group.id().clone();
        let build = move |id| {
            Client::new(
                id,
                group_id,
                Arc::new(conn),
                CancellationToken::new(),
                TaskTracker::new(),
                8,
            )
        };
        (build, peer)
    }

    #[tokio::test]
    async fn test_admit_with_requested_id() {
        let group = Group::new(GroupId::new("room1"));
        let (make, _peer) = build(&group);

        let client = group.admit(ConnectionId::new("c1"), 8, make).expect("admit");
        assert_eq!(client.connection_id().as_str(), "c1");
        assert_eq!(client.group_id(), group.id());
        assert_eq!(group.len(), 1);
    }

    #[tokio::test]
    async fn test_admit_generates_id() {
        let group = Group::new(GroupId::new("room1"));
        let (make, _peer) = build(&group);

        let client = group.admit(ConnectionId::new(""), 8, make).expect("admit");
        assert!(!client.connection_id().is_empty());
    }

    #[tokio::test]
    async fn test_admit_duplicate_rejected() {
        let group = Group::new(GroupId::new("room1"));
        let (first, _p1) = build(&group);
        let (second, _p2) = build(&group);

        group.admit(ConnectionId::new("c1"), 8, first).expect("admit");
        let err = group.admit(ConnectionId::new("c1"), 8, second).unwrap_err();
        assert!(matches!(err, Error::DuplicateConnectionId { .. }));
        assert_eq!(group.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_checks_identity() {
        let group = Group::new(GroupId::new("room1"));
        let (first, _p1) = build(&group);
        let (second, _p2) = build(&group);

        let old = group.admit(ConnectionId::new("c1"), 8, first).expect("admit");
        group.remove("c1", None).expect("removed");
        group.admit(ConnectionId::new("c1"), 8, second).expect("re-admit");

        // Stale handle must not evict the newer member with the same ID.
        assert!(group.remove("c1", Some(&old)).is_none());
        assert_eq!(group.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failures() {
        let group = Group::new(GroupId::new("room1"));
        let (a, mut peer_a) = build(&group);
        let (b, peer_b) = build(&group);
        let (c, mut peer_c) = build(&group);
        group.admit(ConnectionId::new("a"), 8, a).expect("admit");
        group.admit(ConnectionId::new("b"), 8, b).expect("admit");
        group.admit(ConnectionId::new("c"), 8, c).expect("admit");
        peer_b.fail_writes();

        let (attempted, failed) = group.broadcast(&Bytes::from_static(b"hello")).await;

        assert_eq!(attempted, 3);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].connection_id().as_str(), "b");
        assert_eq!(peer_a.try_recv(), Some(Bytes::from_static(b"hello")));
        assert_eq!(peer_c.try_recv(), Some(Bytes::from_static(b"hello")));
        assert_eq!(peer_b.write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_drain_empties_group() {
        let group = Group::new(GroupId::new("room1"));
        let (make, _peer) = build(&group);
        group.admit(ConnectionId::new("c1"), 8, make).expect("admit");

        assert_eq!(group.drain().len(), 1);
        assert!(group.is_empty());
    }

    #[test]
    fn test_delivery_counts() {
        let delivery = Delivery {
            attempted: 3,
            failed: vec![ConnectionId::new("b")],
        };
        assert_eq!(delivery.delivered(), 2);
        assert!(!delivery.is_complete());
        assert!(Delivery::default().is_complete());
    }
}
