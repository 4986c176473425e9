//! Command handlers, event sinks and listeners.
//!
//! A handler receives the call argument and an [`EventSink`] and returns a
//! future settling the call. The sink may be cloned and kept, so events can
//! be pushed long after the handler has returned.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::{Future, ready};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::{Envelope, Message};

use super::core::BridgeInner;

// ============================================================================
// Types
// ============================================================================

/// Future returned by a command handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

/// Command handler: `(arg, events) -> value | deferred value`.
pub type Handler = Arc<dyn Fn(Value, EventSink) -> HandlerFuture + Send + Sync>;

/// Caller-side callback receiving a call's `event` values.
pub type Listener = Arc<dyn Fn(Value) + Send + Sync>;

// ============================================================================
// Constructors
// ============================================================================

/// Wraps an async closure as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Value, EventSink) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |arg, events| f(arg, events).boxed())
}

/// Wraps a synchronous closure as a [`Handler`].
///
/// Calls dispatched to it settle before the inbound envelope is done
/// processing.
pub fn sync_handler<F>(f: F) -> Handler
where
    F: Fn(Value, &EventSink) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |arg, events| ready(f(arg, &events)).boxed())
}

/// Wraps a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================================================
// EventSink
// ============================================================================

/// Pushes `event` envelopes for one inbound call.
#[derive(Clone)]
pub struct EventSink {
    /// Endpoint that received the call.
    bridge: Weak<BridgeInner>,
    /// Id of the call the events belong to.
    id: MessageId,
}

impl EventSink {
    pub(crate) fn new(bridge: Weak<BridgeInner>, id: MessageId) -> Self {
        Self { bridge, id }
    }

    /// Returns the id of the call these events belong to.
    #[inline]
    #[must_use]
    pub fn call_id(&self) -> &MessageId {
        &self.id
    }

    /// Sends `value` to the caller's listener.
    ///
    /// # Errors
    ///
    /// - [`Error::EndpointClosed`] if the endpoint was dropped
    /// - any transport error from delivery
    pub fn push(&self, value: Value) -> Result<()> {
        let bridge = self.bridge.upgrade().ok_or(Error::EndpointClosed)?;
        let envelope = Envelope::new(
            self.id.clone(),
            bridge.source_id().clone(),
            Message::Event { value },
        );
        bridge.transmit(&envelope)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("id", &self.id)
            .field("open", &(self.bridge.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// CommandTable
// ============================================================================

/// Fixed name → handler table for an endpoint's built-in commands.
#[derive(Clone, Default)]
pub struct CommandTable {
    handlers: FxHashMap<String, Handler>,
}

impl CommandTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    /// Looks up the handler for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCommand`] if `name` is not in the table.
    pub fn resolve(&self, name: &str) -> Result<Handler> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unsupported_command(name))
    }

    /// Returns `true` if `name` is in the table.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Returns the number of built-in commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if the table is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("CommandTable").field("names", &names).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
