//! Bridge wire protocol.
//!
//! This module defines the envelope exchanged between the two endpoints of
//! a bridge and the version rule applied during the handshake.
//!
//! # Protocol Overview
//!
//! | Kind | Direction | Purpose |
//! |------|-----------|---------|
//! | `handshake` | both | Announce protocol version, gate outbound calls |
//! | `command` | caller → callee | Invoke a built-in command |
//! | `customCommand` | caller → callee | Invoke a dynamically registered command |
//! | `event` | callee → caller | Interim push to the call's listener |
//! | `resolve` | callee → caller | Terminal success |
//! | `reject` | callee → caller | Terminal failure |
//!
//! Every envelope carries `id`, `sourceId`, `type` and `isLivery: true`.
//! Replies reuse the id of the call they answer.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Envelope and message kinds |
//! | `version` | Protocol version and compatibility rule |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope and message kinds.
pub mod envelope;

/// Protocol version and compatibility rule.
pub mod version;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, Message, is_envelope};
pub use version::{PROTOCOL_VERSION, check_compatible, is_compatible};
