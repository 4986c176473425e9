//! Livery Bridge - RPC between a player page and an embedded interactive page.
//!
//! This library implements the bridge protocol two browsing contexts use to
//! call each other: a handshake gating all calls, promise-style request
//! correlation, and per-call event streams.
//!
//! # Architecture
//!
//! The bridge is symmetric; each side runs one [`Bridge`] endpoint:
//!
//! - **Player**: the embedding page, typically answering built-in commands
//! - **Interactive**: the embedded page, typically calling them
//!
//! Key design principles:
//!
//! - Every outbound call waits for a version-compatible handshake
//! - Replies (`event`, `resolve`, `reject`) reuse the id of the call
//! - Envelopes carrying the receiver's own `sourceId` are discarded
//! - Transport is pluggable: direct in-process pairing or cross-window posting
//!
//! # Quick Start
//!
//! ```no_run
//! use livery_bridge::{Bridge, Result, sync_handler};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let player = Bridge::builder()
//!         .command("getPlayback", sync_handler(|_, _| Ok(json!({"position": 12.5}))))
//!         .build()?;
//!
//!     let interactive = Bridge::builder().direct_target(&player).build()?;
//!
//!     let playback = interactive.send_command("getPlayback", None, None).await?;
//!     println!("playback: {playback}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Endpoint, builder, handlers, spies |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Envelope types and version rule |
//! | [`transport`] | Direct and windowed delivery |

// ============================================================================
// Modules
// ============================================================================

/// Bridge endpoint.
///
/// - [`Bridge`] - One side of the RPC relationship
/// - [`BridgeBuilder`] - Endpoint configuration
pub mod bridge;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for endpoints, calls and windows.
pub mod identifiers;

/// Bridge wire protocol.
///
/// Envelope structures and the handshake version rule.
pub mod protocol;

/// Envelope transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{
    Bridge, BridgeBuilder, CommandTable, EventSink, Handler, HandlerFuture, HandshakeState,
    Listener, Spy, SpyGuard, handler, listener, sync_handler,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{MessageId, SourceId, WindowId};

// Protocol types
pub use protocol::{Envelope, Message, PROTOCOL_VERSION};

// Transport types
pub use transport::{
    ANY_ORIGIN, LocalEnd, LocalWindow, MessageWindow, WindowMessage, WindowTarget,
};
