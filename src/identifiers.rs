//! Type-safe identifiers for hub entities.
//!
//! Newtype wrappers keep group names and connection IDs from being mixed up
//! at call sites that take both.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`GroupId`] | Name of a group, chosen by the collaborator |
//! | [`ConnectionId`] | Member ID, unique within its group |
//!
//! Connection IDs are either supplied by the caller or produced by
//! [`ConnectionId::generate_unique`], which retries until the candidate is
//! free in the target group.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// GroupId
// ============================================================================

/// Name of a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Creates a group ID from any string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the ID is empty or whitespace only.
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// ID of one member within a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a connection ID from any string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random ID (UUID v4).
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Generates an ID for which `is_taken` returns `false`.
    ///
    /// Tries at most `attempts` candidates and returns `None` if every one
    /// collided. The caller must hold whatever lock makes `is_taken`
    /// authoritative until the ID is registered.
    pub fn generate_unique(attempts: u32, mut is_taken: impl FnMut(&Self) -> bool) -> Option<Self> {
        (0..attempts)
            .map(|_| Self::generate())
            .find(|candidate| !is_taken(candidate))
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the ID is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Shared Impls
// ============================================================================

macro_rules! impl_string_id {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            #[inline]
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $ty {
            #[inline]
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&$ty> for $ty {
            #[inline]
            fn from(id: &$ty) -> Self {
                id.clone()
            }
        }

        impl From<$ty> for String {
            #[inline]
            fn from(id: $ty) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $ty {
            #[inline]
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $ty {
            #[inline]
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_id!(GroupId);
impl_string_id!(ConnectionId);

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashSet;

    #[test]
    fn test_display_and_as_str() {
        let group = GroupId::new("room1");
        assert_eq!(group.to_string(), "room1");
        assert_eq!(group.as_str(), "room1");

        let conn = ConnectionId::from("c1");
        assert_eq!(conn.to_string(), "c1");
    }

    #[test]
    fn test_blank_group() {
        assert!(GroupId::new("").is_blank());
        assert!(GroupId::new("  ").is_blank());
        assert!(!GroupId::new("room").is_blank());
    }

    #[test]
    fn test_generate_is_uuid() {
        let id = ConnectionId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_generate_many_distinct() {
        let ids: FxHashSet<_> = (0..1000).map(|_| ConnectionId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generate_unique_retries_on_collision() {
        let mut calls = 0;
        let id = ConnectionId::generate_unique(5, |_| {
            calls += 1;
            calls < 3
        });
        assert!(id.is_some());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_generate_unique_gives_up() {
        let id = ConnectionId::generate_unique(4, |_| true);
        assert!(id.is_none());
    }

    #[test]
    fn test_borrow_lookup() {
        let mut set = FxHashSet::default();
        set.insert(ConnectionId::new("c1"));
        assert!(set.contains("c1"));
        assert!(!set.contains("c2"));
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&GroupId::new("room1")).unwrap();
        assert_eq!(json, "\"room1\"");
    }
}
