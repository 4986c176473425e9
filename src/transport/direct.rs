//! Direct in-process delivery.
//!
//! Delivery is a synchronous handoff into the peer's inbound path. The
//! peer is held through a [`Weak`] handle so paired endpoints never keep
//! each other alive.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Weak;

use serde_json::Value;

use crate::error::{Error, Result};

use super::{Inbox, Transport};

// ============================================================================
// DirectTransport
// ============================================================================

/// Transport delivering straight into a paired endpoint.
pub struct DirectTransport {
    /// Non-owning handle to the peer.
    peer: Weak<dyn Inbox>,
}

impl DirectTransport {
    /// Creates a transport delivering into `peer`.
    #[inline]
    #[must_use]
    pub fn new(peer: Weak<dyn Inbox>) -> Self {
        Self { peer }
    }

    /// Returns `true` if the peer endpoint is still alive.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.peer.strong_count() > 0
    }
}

impl fmt::Debug for DirectTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectTransport")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Transport for DirectTransport {
    fn deliver(&self, message: Value) -> Result<()> {
        let peer = self.peer.upgrade().ok_or(Error::PeerGone)?;
        peer.receive(message)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

// ============================================================================
// Tests
// ============================================================================
