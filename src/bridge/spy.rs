//! Diagnostic observers of inbound envelopes.
//!
//! Spies see every envelope that survives anti-echo filtering, before it
//! is dispatched. A failing spy is logged and skipped.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::Result;
use crate::protocol::Envelope;

use super::core::BridgeInner;

// ============================================================================
// Types
// ============================================================================

/// Spy callback. Returning an error only produces a log entry.
pub type Spy = Arc<dyn Fn(&Envelope) -> Result<()> + Send + Sync>;

// ============================================================================
// SpySet
// ============================================================================

/// Registered spies in registration order.
#[derive(Default)]
pub(crate) struct SpySet {
    next_id: u64,
    spies: Vec<(u64, Spy)>,
}

impl SpySet {
    /// Adds a spy and returns its removal key.
    pub(crate) fn add(&mut self, spy: Spy) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.spies.push((id, spy));
        id
    }

    /// Removes a spy, returning `true` if it was present.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.spies.len();
        self.spies.retain(|(key, _)| *key != id);
        self.spies.len() != before
    }

    /// Copies the current spies so they can run without the lock held.
    pub(crate) fn snapshot(&self) -> Vec<Spy> {
        self.spies.iter().map(|(_, spy)| Arc::clone(spy)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.spies.len()
    }
}

// ============================================================================
// SpyGuard
// ============================================================================

/// Removal handle returned by `Bridge::spy`.
///
/// Dropping the guard keeps the spy installed; call [`SpyGuard::remove`].
#[must_use = "keep the guard to be able to remove the spy"]
pub struct SpyGuard {
    bridge: Weak<BridgeInner>,
    id: u64,
}

impl SpyGuard {
    pub(crate) fn new(bridge: Weak<BridgeInner>, id: u64) -> Self {
        Self { bridge, id }
    }

    /// Uninstalls the spy. Returns `false` if it was already gone.
    pub fn remove(self) -> bool {
        self.bridge
            .upgrade()
            .is_some_and(|bridge| bridge.remove_spy(self.id))
    }
}

impl fmt::Debug for SpyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpyGuard").field("id", &self.id).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
