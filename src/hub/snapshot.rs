//! Read-only copy of the hub registry.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::identifiers::{ConnectionId, GroupId};

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time `group → member IDs` view.
///
/// Built under the hub and group locks, then detached: later joins and
/// disconnects do not affect it. Groups and members are sorted.
///
/// Serializes as a JSON object:
///
/// ```json
/// { "room1": ["c1", "c2"], "room2": ["c3"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    groups: BTreeMap<GroupId, Vec<ConnectionId>>,
}

impl Snapshot {
    /// Returns the members of a group, or `None` if the group does not exist.
    #[must_use]
    pub fn members(&self, group_id: &str) -> Option<&[ConnectionId]> {
        self.groups.get(group_id).map(Vec::as_slice)
    }

    /// Returns `true` if `connection_id` is a member of `group_id`.
    #[must_use]
    pub fn contains(&self, group_id: &str, connection_id: &str) -> bool {
        self.members(group_id)
            .is_some_and(|members| members.iter().any(|id| id.as_str() == connection_id))
    }

    /// Iterates over groups and their members.
    pub fn groups(&self) -> impl Iterator<Item = (&GroupId, &[ConnectionId])> {
        self.groups.iter().map(|(id, members)| (id, members.as_slice()))
    }

    /// Returns the number of groups.
    #[inline]
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Returns the number of connections across all groups.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Returns `true` if there are no groups.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Renders the snapshot as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FromIterator<(GroupId, Vec<ConnectionId>)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (GroupId, Vec<ConnectionId>)>>(iter: I) -> Self {
        let groups = iter
            .into_iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(id, mut members)| {
                members.sort();
                (id, members)
            })
            .collect();

        Self { groups }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        [
            (
                GroupId::new("room1"),
                vec![ConnectionId::new("c2"), ConnectionId::new("c1")],
            ),
            (GroupId::new("room2"), vec![ConnectionId::new("c3")]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_members_sorted() {
        let snapshot = sample();
        let members = snapshot.members("room1").expect("room1");
        assert_eq!(members, &[ConnectionId::new("c1"), ConnectionId::new("c2")]);
        assert!(snapshot.members("missing").is_none());
    }

    #[test]
    fn test_counts() {
        let snapshot = sample();
        assert_eq!(snapshot.group_count(), 2);
        assert_eq!(snapshot.connection_count(), 3);
        assert!(snapshot.contains("room2", "c3"));
        assert!(!snapshot.contains("room2", "c1"));
    }

    #[test]
    fn test_empty_groups_skipped() {
        let snapshot: Snapshot = [(GroupId::new("empty"), Vec::new())].into_iter().collect();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_to_json() {
        let json = sample().to_json().expect("json");
        assert_eq!(json, r#"{"room1":["c1","c2"],"room2":["c3"]}"#);
    }
}
