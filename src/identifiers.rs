//! Type-safe identifiers for bridge entities.
//!
//! Newtype wrappers prevent mixing a message id with an endpoint's source id
//! at compile time, even though both travel as plain strings on the wire.
//!
//! | Type | Wire field | Generated by |
//! |------|------------|--------------|
//! | [`SourceId`] | `sourceId` | each endpoint, once, at construction |
//! | [`MessageId`] | `id` | each outbound call |
//! | [`WindowId`] | (none) | the host's window handles |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// SourceId
// ============================================================================

/// Process-unique token identifying one bridge endpoint.
///
/// Used for anti-echo filtering and as the id of the endpoint's handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Generates a fresh random source id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the message id under which this endpoint's handshake travels.
    #[inline]
    #[must_use]
    pub fn handshake_id(&self) -> MessageId {
        MessageId(self.0.clone())
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// MessageId
// ============================================================================

/// Correlation id of one call, shared by its `event`, `resolve` and `reject` replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generates a fresh random message id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// WindowId
// ============================================================================

/// Counter for [`WindowId::next`].
static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a host window, compared against a message's source window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    /// Allocates the next process-unique window id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a host-assigned window id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
