//! Error types for the Livery bridge.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use livery_bridge::{Bridge, Result};
//!
//! async fn example(bridge: &Bridge) -> Result<()> {
//!     let value = bridge.send_command("getLatency", None, None).await?;
//!     println!("latency: {value}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidVersion`] |
//! | Connection | [`Error::NoTarget`], [`Error::PeerGone`], [`Error::EndpointClosed`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::IncompatibleVersion`], [`Error::HandshakeRejected`] |
//! | Dispatch | [`Error::UnsupportedCommand`], [`Error::UnregisteredCommand`], [`Error::Handler`] |
//! | Remote | [`Error::Rejected`], [`Error::HandshakeTimeout`], [`Error::RequestTimeout`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;

use crate::identifiers::MessageId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// The `Display` form of dispatch and handler errors is what crosses the
/// wire in a `reject` envelope, so those variants render plain messages.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a bridge or window target is configured incorrectly.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Version string is not a valid semantic version.
    #[error("Invalid version: {version}")]
    InvalidVersion {
        /// The offending version string.
        version: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// No peer has been attached to this endpoint yet.
    #[error("Bridge has no target")]
    NoTarget,

    /// The directly paired peer endpoint has been dropped.
    #[error("Peer endpoint is gone")]
    PeerGone,

    /// The local endpoint was dropped while a handle still referenced it.
    #[error("Bridge endpoint closed")]
    EndpointClosed,

    /// The settle channel for a pending call was dropped.
    #[error("Connection closed")]
    ConnectionClosed(#[from] RecvError),

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or malformed envelope.
    ///
    /// Raised when an inbound envelope passes the base shape check but a
    /// kind-specific field is missing, mistyped, or the `type` is unknown.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Peer announced a version this endpoint cannot talk to.
    #[error("Incompatible version: local {local}, remote {remote}")]
    IncompatibleVersion {
        /// Version of this endpoint.
        local: String,
        /// Version announced by the peer.
        remote: String,
    },

    /// Peer rejected this endpoint's handshake.
    #[error("Handshake rejected: {message}")]
    HandshakeRejected {
        /// Rejection message from the peer.
        message: String,
    },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// Built-in command name is not in the endpoint's command table.
    #[error("Unsupported command: {name}")]
    UnsupportedCommand {
        /// The unrecognized command name.
        name: String,
    },

    /// Custom command name has no registered handler.
    #[error("Unregistered custom command: {name}")]
    UnregisteredCommand {
        /// The unregistered command name.
        name: String,
    },

    /// Command handler failed.
    #[error("{message}")]
    Handler {
        /// Error message produced by the handler.
        message: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// Peer settled the call with a `reject` envelope.
    #[error("{message}")]
    Rejected {
        /// The peer's error string, verbatim.
        message: String,
    },

    /// Handshake did not complete within the caller-provided timeout.
    ///
    /// No call was sent, so there is no call id to report.
    #[error("Handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Call did not settle within the caller-provided timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The call id that timed out.
        request_id: MessageId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid version error.
    #[inline]
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an incompatible version error.
    #[inline]
    pub fn incompatible_version(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self::IncompatibleVersion {
            local: local.into(),
            remote: remote.into(),
        }
    }

    /// Creates a handshake rejected error.
    #[inline]
    pub fn handshake_rejected(message: impl Into<String>) -> Self {
        Self::HandshakeRejected {
            message: message.into(),
        }
    }

    /// Creates an unsupported command error.
    #[inline]
    pub fn unsupported_command(name: impl Into<String>) -> Self {
        Self::UnsupportedCommand { name: name.into() }
    }

    /// Creates an unregistered custom command error.
    #[inline]
    pub fn unregistered_command(name: impl Into<String>) -> Self {
        Self::UnregisteredCommand { name: name.into() }
    }

    /// Creates a handler error.
    ///
    /// Command handlers return this to reject a call with `message`.
    #[inline]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Creates a remote rejection error.
    #[inline]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Creates a handshake timeout error.
    #[inline]
    pub fn handshake_timeout(timeout_ms: u64) -> Self {
        Self::HandshakeTimeout { timeout_ms }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: MessageId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this error was produced by the remote endpoint.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::HandshakeRejected { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NoTarget | Self::PeerGone | Self::EndpointClosed | Self::ConnectionClosed(_)
        )
    }

    /// Returns `true` if this is a local dispatch failure.
    #[inline]
    #[must_use]
    pub fn is_dispatch_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCommand { .. } | Self::UnregisteredCommand { .. } | Self::Handler { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unsupported_command("unknown");
        assert_eq!(err.to_string(), "Unsupported command: unknown");
    }

    #[test]
    fn test_handler_and_rejected_display_verbatim() {
        assert_eq!(Error::handler("boom").to_string(), "boom");
        assert_eq!(Error::rejected("nope").to_string(), "nope");
    }

    #[test]
    fn test_incompatible_version_display() {
        let err = Error::incompatible_version("1.0.0", "2.0.0");
        assert_eq!(
            err.to_string(),
            "Incompatible version: local 1.0.0, remote 2.0.0"
        );
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::request_timeout(MessageId::generate(), 5000);
        let other_err = Error::NoTarget;

        assert!(timeout_err.is_timeout());
        assert!(Error::handshake_timeout(5000).is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_handshake_timeout_display() {
        assert_eq!(
            Error::handshake_timeout(200).to_string(),
            "Handshake timed out after 200ms"
        );
    }

    #[test]
    fn test_is_remote() {
        assert!(Error::rejected("x").is_remote());
        assert!(Error::handshake_rejected("x").is_remote());
        assert!(!Error::handler("x").is_remote());
    }

    #[test]
    fn test_is_dispatch_error() {
        assert!(Error::unregistered_command("x").is_dispatch_error());
        assert!(!Error::PeerGone.is_dispatch_error());
        assert!(Error::PeerGone.is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
