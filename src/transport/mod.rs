//! Envelope transport layer.
//!
//! This module moves opaque structured messages between the two endpoints
//! of a bridge. It knows nothing about envelope kinds or correlation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Bridge (A)     │   Direct: Weak<dyn Inbox>    │  Bridge (B)     │
//! │                 │◄────────────────────────────►│                 │
//! │  Transport ─────┼──── Windowed: postMessage ──►│  Inbox          │
//! │  Inbox ◄────────┼──── origin/source filter ────┤  Transport      │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `direct` | Synchronous in-process handoff to a paired endpoint |
//! | `window` | Cross-window delivery with origin filtering |
//! | `local` | In-process simulation of two window contexts |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Direct in-process delivery.
pub mod direct;

/// In-process window simulation.
pub mod local;

/// Cross-window delivery.
pub mod window;

// ============================================================================
// Re-exports
// ============================================================================

pub use direct::DirectTransport;
pub use local::{LocalEnd, LocalWindow};
pub use window::{ANY_ORIGIN, MessageWindow, WindowMessage, WindowTarget, WindowedTransport};

// ============================================================================
// Traits
// ============================================================================

/// Outbound half: delivers an encoded envelope to the paired endpoint.
pub trait Transport: Send + Sync {
    /// Delivers one structured message.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer can no longer be reached.
    fn deliver(&self, message: Value) -> Result<()>;

    /// Short transport name for logging.
    fn name(&self) -> &'static str;
}

/// Inbound half: accepts raw messages for an endpoint.
///
/// Implemented by the bridge endpoint; transports only ever hold it
/// through a non-owning handle.
pub trait Inbox: Send + Sync {
    /// Processes one raw inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Protocol`] for malformed envelopes.
    fn receive(&self, message: Value) -> Result<()>;
}
