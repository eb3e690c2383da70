//! Builder pattern for hub configuration.
//!
//! # Example
//!
//! ```
//! use group_hub::Hub;
//!
//! # fn example() -> group_hub::Result<()> {
//! let hub = Hub::builder()
//!     .event_capacity(256)
//!     .id_attempts(4)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::core::Hub;

// ============================================================================
// Constants
// ============================================================================

/// Default capacity of each client's message and error queues.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default number of generated IDs tried before giving up.
pub const DEFAULT_ID_ATTEMPTS: u32 = 8;

// ============================================================================
// HubConfig
// ============================================================================

/// Validated hub settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of each client's message and error queues.
    ///
    /// A full message queue pauses that client's receive loop until the
    /// consumer catches up.
    pub event_capacity: usize,

    /// Generated-ID collisions tolerated per admission.
    pub id_attempts: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            id_attempts: DEFAULT_ID_ATTEMPTS,
        }
    }
}

// ============================================================================
// HubBuilder
// ============================================================================

/// Builder for configuring a [`Hub`] instance.
///
/// Use [`Hub::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct HubBuilder {
    event_capacity: Option<usize>,
    id_attempts: Option<u32>,
}

impl HubBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity of each client's event queues.
    #[inline]
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Sets how many generated IDs are tried per admission.
    #[inline]
    #[must_use]
    pub fn id_attempts(mut self, attempts: u32) -> Self {
        self.id_attempts = Some(attempts);
        self
    }

    /// Builds the hub with validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a setting is zero.
    pub fn build(self) -> Result<Hub> {
        Ok(Hub::with_config(self.validate()?))
    }

    /// Validates settings and fills in defaults.
    fn validate(&self) -> Result<HubConfig> {
        let defaults = HubConfig::default();

        let event_capacity = self.event_capacity.unwrap_or(defaults.event_capacity);
        if event_capacity == 0 {
            return Err(Error::config(
                "event capacity must be greater than 0. Use .event_capacity(64)",
            ));
        }

        let id_attempts = self.id_attempts.unwrap_or(defaults.id_attempts);
        if id_attempts == 0 {
            return Err(Error::config(
                "id attempts must be greater than 0. Use .id_attempts(8)",
            ));
        }

        Ok(HubConfig {
            event_capacity,
            id_attempts,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
