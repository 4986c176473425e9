//! Bridge endpoint module.
//!
//! This module provides one side of the two-party RPC relationship.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Bridge`] | Endpoint: calls, handlers, handshake, spies |
//! | [`BridgeBuilder`] | Fluent configuration builder |
//! | [`CommandTable`] | Built-in command handlers |
//! | [`EventSink`] | Pushes `event` envelopes for an inbound call |
//! | [`SpyGuard`] | Removal handle for a spy |
//!
//! # Example
//!
//! ```ignore
//! use livery_bridge::{Bridge, Result, listener, sync_handler};
//! use serde_json::json;
//!
//! # async fn example() -> Result<()> {
//! let player = Bridge::builder()
//!     .command("subscribeQuality", sync_handler(|_, events| {
//!         events.push(json!("hd"))?;
//!         Ok(json!("sd"))
//!     }))
//!     .build()?;
//! let interactive = Bridge::builder().direct_target(&player).build()?;
//!
//! let current = interactive
//!     .send_command("subscribeQuality", None, Some(listener(|q| println!("quality: {q}"))))
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for endpoint configuration.
pub mod builder;

/// Endpoint implementation.
pub mod core;

/// Handlers, event sinks and listeners.
pub mod handler;

/// Inbound envelope observers.
pub mod spy;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::BridgeBuilder;
pub use self::core::{Bridge, HandshakeState};
pub use handler::{
    CommandTable, EventSink, Handler, HandlerFuture, Listener, handler, listener, sync_handler,
};
pub use spy::{Spy, SpyGuard};
