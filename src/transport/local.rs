//! In-process simulation of two window contexts.
//!
//! [`LocalWindow::pair`] creates two browsing contexts (for example a
//! player page and its embedded interactive frame), each with its own
//! origin and inbox. Posting follows the browser rule: a message whose
//! target origin does not match the receiving context is discarded.
//!
//! # Example
//!
//! ```ignore
//! let (player, interactive) = LocalWindow::pair("https://player.example", "https://interactive.example");
//!
//! let target = WindowTarget::new(player.window.clone(), "https://interactive.example")?;
//! let bridge = Bridge::builder().window_target(target).build()?;
//! bridge.listen(player.inbox);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::WindowId;

use super::window::{ANY_ORIGIN, MessageWindow, WindowMessage};

// ============================================================================
// LocalWindow
// ============================================================================

/// Handle to a simulated browsing context, held by the other context.
pub struct LocalWindow {
    /// Identity of the context this handle points to.
    id: WindowId,
    /// Origin of the context this handle points to.
    origin: String,
    /// Inbox of the context this handle points to.
    inbox: mpsc::UnboundedSender<WindowMessage>,
    /// Identity of the context holding this handle.
    owner_id: WindowId,
    /// Origin of the context holding this handle.
    owner_origin: String,
}

impl LocalWindow {
    /// Creates two contexts that can post to each other.
    ///
    /// The first returned end lives at `origin_a` and its `window` points
    /// at the second context; the second end is the mirror image.
    #[must_use]
    pub fn pair(origin_a: &str, origin_b: &str) -> (LocalEnd, LocalEnd) {
        let id_a = WindowId::next();
        let id_b = WindowId::next();
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let to_b = Arc::new(Self {
            id: id_b,
            origin: origin_b.to_string(),
            inbox: tx_b.clone(),
            owner_id: id_a,
            owner_origin: origin_a.to_string(),
        });

        let to_a = Arc::new(Self {
            id: id_a,
            origin: origin_a.to_string(),
            inbox: tx_a.clone(),
            owner_id: id_b,
            owner_origin: origin_b.to_string(),
        });

        let end_a = LocalEnd {
            id: id_a,
            origin: origin_a.to_string(),
            window: to_b,
            inbox: rx_a,
            injector: tx_a,
        };

        let end_b = LocalEnd {
            id: id_b,
            origin: origin_b.to_string(),
            window: to_a,
            inbox: rx_b,
            injector: tx_b,
        };

        (end_a, end_b)
    }

    /// Returns the origin of the context this handle points to.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl fmt::Debug for LocalWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWindow")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("owner_id", &self.owner_id)
            .finish_non_exhaustive()
    }
}

impl MessageWindow for LocalWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn post_message(&self, message: Value, target_origin: &str) -> Result<()> {
        if target_origin != ANY_ORIGIN && target_origin != self.origin {
            trace!(target_origin, actual = %self.origin, "Target origin mismatch, message discarded");
            return Ok(());
        }

        self.inbox
            .send(WindowMessage::new(
                message,
                self.owner_origin.clone(),
                Some(self.owner_id),
            ))
            .map_err(|_| Error::PeerGone)
    }
}

// ============================================================================
// LocalEnd
// ============================================================================

/// One simulated browsing context.
pub struct LocalEnd {
    /// Identity of this context.
    pub id: WindowId,
    /// Origin of this context.
    pub origin: String,
    /// Handle for posting to the other context.
    pub window: Arc<LocalWindow>,
    /// Messages posted to this context.
    pub inbox: mpsc::UnboundedReceiver<WindowMessage>,
    /// Sender into this context's inbox, for injecting arbitrary traffic.
    pub injector: mpsc::UnboundedSender<WindowMessage>,
}

impl fmt::Debug for LocalEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEnd")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_post_carries_sender_origin() {
        let (mut player, interactive) =
            LocalWindow::pair("https://player.example", "https://interactive.example");

        interactive
            .window
            .post_message(json!({"n": 1}), "https://player.example")
            .expect("post");

        let message = player.inbox.recv().await.expect("message");
        assert_eq!(message.data, json!({"n": 1}));
        assert_eq!(message.origin, "https://interactive.example");
        assert_eq!(message.source, Some(interactive.id));
    }

    #[tokio::test]
    async fn test_target_origin_mismatch_discards() {
        let (mut player, interactive) =
            LocalWindow::pair("https://player.example", "https://interactive.example");

        interactive
            .window
            .post_message(json!({"n": 1}), "https://other.example")
            .expect("post");
        interactive
            .window
            .post_message(json!({"n": 2}), ANY_ORIGIN)
            .expect("post");

        let message = player.inbox.recv().await.expect("message");
        assert_eq!(message.data, json!({"n": 2}));
    }

    #[test]
    fn test_window_ids() {
        let (player, interactive) = LocalWindow::pair("https://a.example", "https://b.example");
        assert_eq!(player.window.id(), interactive.id);
        assert_eq!(interactive.window.id(), player.id);
    }
}
