//! Builder pattern for bridge configuration.
//!
//! Provides a fluent API for configuring and creating [`Bridge`] endpoints.
//!
//! # Example
//!
//! ```ignore
//! use livery_bridge::{Bridge, WindowTarget, sync_handler};
//! use serde_json::json;
//!
//! let target = WindowTarget::new(frame_window, "https://interactive.example")?;
//! let player = Bridge::builder()
//!     .version("1.4.0")
//!     .command("getLatency", sync_handler(|_, _| Ok(json!(1200))))
//!     .window_target(target)
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::Result;
use crate::protocol::PROTOCOL_VERSION;
use crate::protocol::version::parse_version;
use crate::transport::WindowTarget;

use super::core::Bridge;
use super::handler::{CommandTable, Handler};

// ============================================================================
// Target
// ============================================================================

/// Peer selected at construction.
#[derive(Clone)]
enum Target {
    /// Another endpoint in this process.
    Direct(Bridge),
    /// A peer window.
    Window(WindowTarget),
}

// ============================================================================
// BridgeBuilder
// ============================================================================

/// Builder for configuring a [`Bridge`] endpoint.
///
/// Use [`Bridge::builder()`] to create a new builder.
#[derive(Clone)]
pub struct BridgeBuilder {
    /// Protocol version announced in handshakes.
    version: String,
    /// Built-in command table.
    commands: CommandTable,
    /// Peer, if known up front.
    target: Option<Target>,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            commands: CommandTable::new(),
            target: None,
        }
    }
}

impl fmt::Debug for BridgeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.target {
            Some(Target::Direct(peer)) => format!("direct({})", peer.source_id()),
            Some(Target::Window(target)) => format!("window({})", target.origin()),
            None => "none".to_string(),
        };

        f.debug_struct("BridgeBuilder")
            .field("version", &self.version)
            .field("commands", &self.commands)
            .field("target", &target)
            .finish()
    }
}

// ============================================================================
// BridgeBuilder Implementation
// ============================================================================

impl BridgeBuilder {
    /// Creates a new builder announcing [`PROTOCOL_VERSION`].
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the protocol version announced in handshakes.
    #[inline]
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Installs a built-in command.
    ///
    /// Built-in commands are fixed once the endpoint is built; use
    /// `Bridge::register_custom_command` for runtime registration.
    #[inline]
    #[must_use]
    pub fn command(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.commands.insert(name, handler);
        self
    }

    /// Replaces the whole built-in command table.
    #[inline]
    #[must_use]
    pub fn commands(mut self, commands: CommandTable) -> Self {
        self.commands = commands;
        self
    }

    /// Pairs the endpoint with another endpoint in this process.
    #[inline]
    #[must_use]
    pub fn direct_target(mut self, peer: &Bridge) -> Self {
        self.target = Some(Target::Direct(peer.clone()));
        self
    }

    /// Targets a peer window.
    #[inline]
    #[must_use]
    pub fn window_target(mut self, target: WindowTarget) -> Self {
        self.target = Some(Target::Window(target));
        self
    }

    /// Builds the endpoint, attaching the target and sending the handshake
    /// when one was configured.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::InvalidVersion`] if the version is not valid semver
    /// - transport errors if the handshake cannot be delivered
    pub fn build(self) -> Result<Bridge> {
        parse_version(&self.version)?;

        let bridge = Bridge::new(self.version, self.commands);

        match self.target {
            Some(Target::Direct(peer)) => bridge.connect_direct(&peer)?,
            Some(Target::Window(target)) => bridge.attach_window(target)?,
            None => {}
        }

        Ok(bridge)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let bridge = BridgeBuilder::new().build().expect("build");
        assert_eq!(bridge.version(), PROTOCOL_VERSION);
        assert!(!bridge.has_target());
        assert!(!bridge.is_ready());
    }

    #[test]
    fn test_invalid_version() {
        let err = BridgeBuilder::new().version("one").build().unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { .. }));
    }

    #[test]
    fn test_source_ids_are_unique() {
        let a = BridgeBuilder::new().build().expect("a");
        let b = BridgeBuilder::new().build().expect("b");
        assert_ne!(a.source_id(), b.source_id());
    }

    #[test]
    fn test_debug_lists_target() {
        let peer = BridgeBuilder::new().build().expect("peer");
        let builder = BridgeBuilder::new().direct_target(&peer);
        assert!(format!("{builder:?}").contains("direct("));
    }
}
