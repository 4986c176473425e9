//! Cross-window delivery with origin filtering.
//!
//! Outbound envelopes are posted to the target window with the configured
//! origin as the allowed destination. Inbound messages are accepted only
//! when they come from the expected window and origin and carry the base
//! envelope shape; everything else is dropped without error.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::WindowId;
use crate::protocol::is_envelope;

use super::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Origin wildcard: posts to any origin and disables the inbound origin check.
pub const ANY_ORIGIN: &str = "*";

// ============================================================================
// MessageWindow
// ============================================================================

/// Host cross-window messaging primitive.
///
/// A handle to another browsing context that messages can be posted to.
pub trait MessageWindow: Send + Sync {
    /// Identity of the window this handle points to.
    fn id(&self) -> WindowId;

    /// Posts `message` to the window if its origin matches `target_origin`.
    ///
    /// # Errors
    ///
    /// Returns an error if the window can no longer receive messages.
    fn post_message(&self, message: Value, target_origin: &str) -> Result<()>;
}

// ============================================================================
// WindowMessage
// ============================================================================

/// One inbound cross-window message as seen by the receiving context.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    /// Structured message payload.
    pub data: Value,
    /// Serialized origin of the sending context.
    pub origin: String,
    /// Sending window, when the host exposes it.
    pub source: Option<WindowId>,
}

impl WindowMessage {
    /// Creates a new inbound message.
    #[inline]
    #[must_use]
    pub fn new(data: Value, origin: impl Into<String>, source: Option<WindowId>) -> Self {
        Self {
            data,
            origin: origin.into(),
            source,
        }
    }
}

// ============================================================================
// WindowTarget
// ============================================================================

/// Peer window plus the origin it is expected to have.
#[derive(Clone)]
pub struct WindowTarget {
    /// Handle to the peer window.
    window: Arc<dyn MessageWindow>,
    /// Normalized expected origin, or [`ANY_ORIGIN`].
    origin: String,
    /// Whether inbound messages must come from `window`.
    check_source: bool,
}

impl WindowTarget {
    /// Creates a target for `window` at `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `origin` is neither `*` nor a valid
    /// scheme/host/port origin.
    pub fn new(window: Arc<dyn MessageWindow>, origin: &str) -> Result<Self> {
        Ok(Self {
            window,
            origin: normalize_origin(origin)?,
            check_source: true,
        })
    }

    /// Accepts inbound messages regardless of their source window.
    #[inline]
    #[must_use]
    pub fn without_source_check(mut self) -> Self {
        self.check_source = false;
        self
    }

    /// Returns the expected origin.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the peer window handle.
    #[inline]
    #[must_use]
    pub fn window(&self) -> &Arc<dyn MessageWindow> {
        &self.window
    }

    /// Returns `true` if `message` should be forwarded to the endpoint.
    #[must_use]
    pub fn accepts(&self, message: &WindowMessage) -> bool {
        if self.check_source && message.source != Some(self.window.id()) {
            trace!(source = ?message.source, expected = %self.window.id(), "Dropping message from unexpected window");
            return false;
        }

        if self.origin != ANY_ORIGIN && message.origin != self.origin {
            trace!(origin = %message.origin, expected = %self.origin, "Dropping message from unexpected origin");
            return false;
        }

        is_envelope(&message.data)
    }
}

impl fmt::Debug for WindowTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowTarget")
            .field("window", &self.window.id())
            .field("origin", &self.origin)
            .field("check_source", &self.check_source)
            .finish()
    }
}

/// Normalizes an origin string to its ASCII serialization.
///
/// # Errors
///
/// Returns [`Error::Config`] for unparsable or opaque origins.
pub fn normalize_origin(origin: &str) -> Result<String> {
    if origin == ANY_ORIGIN {
        return Ok(ANY_ORIGIN.to_string());
    }

    let url = Url::parse(origin)
        .map_err(|e| Error::config(format!("Invalid origin '{origin}': {e}")))?;
    let parsed = url.origin();

    if !parsed.is_tuple() {
        return Err(Error::config(format!("Opaque origin '{origin}'")));
    }

    Ok(parsed.ascii_serialization())
}

// ============================================================================
// WindowedTransport
// ============================================================================

/// Transport posting envelopes to a [`WindowTarget`].
#[derive(Debug, Clone)]
pub struct WindowedTransport {
    target: WindowTarget,
}

impl WindowedTransport {
    /// Creates a transport for `target`.
    #[inline]
    #[must_use]
    pub fn new(target: WindowTarget) -> Self {
        Self { target }
    }
}

impl Transport for WindowedTransport {
    fn deliver(&self, message: Value) -> Result<()> {
        self.target
            .window
            .post_message(message, &self.target.origin)
    }

    fn name(&self) -> &'static str {
        "window"
    }
}

// ============================================================================
// Tests
// ============================================================================
