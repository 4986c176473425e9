//! Bridge endpoint.
//!
//! This module owns the correlation state of one side of a bridge:
//! pending calls, listeners, command handlers and spies. It encodes
//! outbound calls, decodes inbound envelopes and gates every outbound call
//! behind the handshake.
//!
//! # Inbound Processing
//!
//! 1. Drop values without the base envelope shape (silently)
//! 2. Drop envelopes carrying this endpoint's own `sourceId` (anti-echo)
//! 3. Decode the envelope, failing loudly on malformed kinds
//! 4. Notify spies
//! 5. Dispatch by kind
//!
//! Locks are never held across a transport delivery or a user callback, so
//! a direct peer may re-enter this endpoint synchronously.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{MessageId, SourceId};
use crate::protocol::envelope::peek_source_id;
use crate::protocol::{Envelope, Message, check_compatible, is_envelope};
use crate::transport::{DirectTransport, Inbox, Transport, WindowMessage, WindowTarget, WindowedTransport};

use super::builder::BridgeBuilder;
use super::handler::{CommandTable, EventSink, Handler, Listener};
use super::spy::{SpyGuard, SpySet};

// ============================================================================
// Types
// ============================================================================

/// Sender-side record awaiting a terminal `resolve`/`reject`.
enum PendingCall {
    /// The endpoint's own handshake, keyed by its source id.
    Handshake,
    /// An outbound command.
    Call(oneshot::Sender<Result<Value>>),
}

/// Map of call ids to pending records.
type PendingMap = FxHashMap<MessageId, PendingCall>;

fn handler_panicked() -> Error {
    error!("Command handler panicked");
    Error::handler("Command handler panicked")
}

/// Readiness of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// No compatible handshake exchanged yet.
    Pending,
    /// Handshake completed.
    Ready {
        /// Version announced by the peer, when known.
        peer_version: Option<String>,
    },
    /// Peer rejected this endpoint's handshake.
    Failed {
        /// Rejection message from the peer.
        message: String,
    },
}

impl HandshakeState {
    /// Returns `true` once the handshake completed.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

// ============================================================================
// BridgeInner
// ============================================================================

/// Shared state of one endpoint.
pub(crate) struct BridgeInner {
    /// Handle to this allocation, for sinks, guards and spawned tasks.
    self_ref: Weak<BridgeInner>,
    /// Constant identity of this endpoint.
    source_id: SourceId,
    /// Protocol version announced in handshakes.
    version: String,
    /// Outbound transport, once a target is known.
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Expected peer window, for inbound filtering.
    window: RwLock<Option<WindowTarget>>,
    /// Outstanding calls by id.
    pending: Mutex<PendingMap>,
    /// Call listeners by id. Outlive the call's settle.
    listeners: Mutex<FxHashMap<MessageId, Listener>>,
    /// Built-in commands, fixed at construction.
    commands: CommandTable,
    /// Custom commands, registered at runtime.
    custom_commands: RwLock<FxHashMap<String, Handler>>,
    /// Inbound envelope observers.
    spies: Mutex<SpySet>,
    /// Readiness broadcast.
    handshake: watch::Sender<HandshakeState>,
}

impl BridgeInner {
    fn new(version: String, commands: CommandTable) -> Arc<Self> {
        let source_id = SourceId::generate();
        let mut pending = PendingMap::default();
        pending.insert(source_id.handshake_id(), PendingCall::Handshake);
        let (handshake, _) = watch::channel(HandshakeState::Pending);

        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            source_id,
            version,
            transport: RwLock::new(None),
            window: RwLock::new(None),
            pending: Mutex::new(pending),
            listeners: Mutex::new(FxHashMap::default()),
            commands,
            custom_commands: RwLock::new(FxHashMap::default()),
            spies: Mutex::new(SpySet::default()),
            handshake,
        })
    }

    #[inline]
    pub(crate) fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    /// Installs `transport` unless one is already set. Returns `true` if installed.
    fn set_transport_if_absent(&self, transport: Arc<dyn Transport>) -> bool {
        let mut guard = self.transport.write();
        if guard.is_some() {
            return false;
        }
        *guard = Some(transport);
        true
    }

    /// Encodes and delivers one envelope to the peer.
    pub(crate) fn transmit(&self, envelope: &Envelope) -> Result<()> {
        let transport = self.transport.read().clone().ok_or(Error::NoTarget)?;
        let message = envelope.to_value()?;

        trace!(
            id = %envelope.id,
            kind = envelope.kind(),
            transport = transport.name(),
            "Envelope sent"
        );

        transport.deliver(message)
    }

    /// Delivers a reply; failures are logged since no caller is waiting on them.
    fn reply(&self, id: MessageId, message: Message) {
        let envelope = Envelope::new(id, self.source_id.clone(), message);
        if let Err(e) = self.transmit(&envelope) {
            warn!(id = %envelope.id, kind = envelope.kind(), error = %e, "Failed to send reply");
        }
    }

    /// Converts a handler outcome into exactly one terminal reply.
    fn reply_settle(&self, id: MessageId, result: Result<Value>) {
        let message = match result {
            Ok(value) => Message::Resolve { value },
            Err(e) => {
                debug!(id = %id, error = %e, "Command failed");
                Message::Reject {
                    error: e.to_string(),
                }
            }
        };
        self.reply(id, message);
    }

    fn send_handshake(&self) -> Result<()> {
        debug!(source_id = %self.source_id, version = %self.version, "Sending handshake");
        let envelope = Envelope::new(
            self.source_id.handshake_id(),
            self.source_id.clone(),
            Message::Handshake {
                version: self.version.clone(),
            },
        );
        self.transmit(&envelope)
    }

    /// Removes the pending record for `id` and settles it.
    fn settle(&self, id: &MessageId, result: Result<Value>) {
        let entry = self.pending.lock().remove(id);

        match entry {
            Some(PendingCall::Call(tx)) => {
                let _ = tx.send(result);
            }
            Some(PendingCall::Handshake) => {
                let state = match result {
                    Ok(value) => HandshakeState::Ready {
                        peer_version: value.as_str().map(str::to_string),
                    },
                    Err(e) => HandshakeState::Failed {
                        message: e.to_string(),
                    },
                };
                debug!(source_id = %self.source_id, ?state, "Handshake settled");
                self.handshake.send_replace(state);
            }
            None => {
                trace!(id = %id, "Settle for unknown call ignored");
            }
        }
    }

    /// Drops the pending record and listener of an abandoned call.
    fn forget(&self, id: &MessageId) {
        self.pending.lock().remove(id);
        self.listeners.lock().remove(id);
    }

    pub(crate) fn remove_spy(&self, id: u64) -> bool {
        self.spies.lock().remove(id)
    }

    fn notify_spies(&self, envelope: &Envelope) {
        let spies = self.spies.lock().snapshot();
        for spy in spies {
            if let Err(e) = spy(envelope) {
                warn!(id = %envelope.id, error = %e, "Spy callback failed");
            }
        }
    }

    fn handle_handshake(&self, id: MessageId, version: &str) {
        match check_compatible(&self.version, version) {
            Ok(()) => {
                self.settle(
                    &self.source_id.handshake_id(),
                    Ok(Value::String(version.to_string())),
                );
                self.reply(
                    id,
                    Message::Resolve {
                        value: Value::String(self.version.clone()),
                    },
                );
            }
            Err(e) => {
                warn!(local = %self.version, remote = %version, "Rejecting handshake");
                self.reply(
                    id,
                    Message::Reject {
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    fn handle_event(&self, id: &MessageId, value: Value) {
        let listener = self.listeners.lock().get(id).cloned();

        match listener {
            Some(listener) => listener(value),
            None => trace!(id = %id, "Event for unknown listener ignored"),
        }
    }

    /// Runs a handler and replies with its outcome.
    ///
    /// Futures that complete on first poll settle immediately; the rest are
    /// driven on the current tokio runtime. A panicking handler rejects the
    /// call instead of unwinding into the caller.
    fn run_handler(&self, id: MessageId, handler: Result<Handler>, arg: Value) {
        let handler = match handler {
            Ok(handler) => handler,
            Err(e) => {
                self.reply_settle(id, Err(e));
                return;
            }
        };

        let events = EventSink::new(self.self_ref.clone(), id.clone());
        let future = match panic::catch_unwind(AssertUnwindSafe(|| handler(arg, events))) {
            Ok(future) => future,
            Err(_) => {
                self.reply_settle(id, Err(handler_panicked()));
                return;
            }
        };

        let mut future = AssertUnwindSafe(future)
            .catch_unwind()
            .map(|outcome| outcome.unwrap_or_else(|_| Err(handler_panicked())));

        if let Some(result) = (&mut future).now_or_never() {
            self.reply_settle(id, result);
            return;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                let bridge = self.self_ref.clone();
                runtime.spawn(async move {
                    let result = future.await;
                    if let Some(bridge) = bridge.upgrade() {
                        bridge.reply_settle(id, result);
                    }
                });
            }
            Err(_) => {
                self.reply_settle(
                    id,
                    Err(Error::handler("No async runtime available to run command handler")),
                );
            }
        }
    }

    fn dispatch(&self, envelope: Envelope) {
        let Envelope { id, message, .. } = envelope;

        match message {
            Message::Handshake { version } => self.handle_handshake(id, &version),
            Message::Command { name, arg } => {
                let handler = self.commands.resolve(&name);
                self.run_handler(id, handler, arg);
            }
            Message::CustomCommand { name, arg } => {
                let handler = self
                    .custom_commands
                    .read()
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| Error::unregistered_command(&name));
                self.run_handler(id, handler, arg);
            }
            Message::Event { value } => self.handle_event(&id, value),
            Message::Resolve { value } => self.settle(&id, Ok(value)),
            Message::Reject { error } => self.settle(&id, Err(Error::rejected(error))),
        }
    }

    fn handle_window_message(&self, message: WindowMessage) -> Result<()> {
        let accepted = match self.window.read().as_ref() {
            Some(target) => target.accepts(&message),
            None => false,
        };

        if !accepted {
            return Ok(());
        }

        self.receive(message.data)
    }
}

impl Inbox for BridgeInner {
    fn receive(&self, message: Value) -> Result<()> {
        if !is_envelope(&message) {
            trace!("Ignoring non-bridge message");
            return Ok(());
        }

        if peek_source_id(&message) == Some(self.source_id.as_str()) {
            trace!("Ignoring own envelope");
            return Ok(());
        }

        let envelope = Envelope::from_value(message)?;
        trace!(id = %envelope.id, kind = envelope.kind(), "Envelope received");

        self.notify_spies(&envelope);
        self.dispatch(envelope);
        Ok(())
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// One endpoint of a bridge.
///
/// Cheap to clone; clones share the same correlation state and identity.
///
/// # Example
///
/// ```ignore
/// use livery_bridge::{Bridge, sync_handler};
/// use serde_json::json;
///
/// let player = Bridge::builder()
///     .command("ping", sync_handler(|_, _| Ok(json!("pong"))))
///     .build()?;
/// let interactive = Bridge::builder().direct_target(&player).build()?;
///
/// let value = interactive.send_command("ping", None, None).await?;
/// assert_eq!(value, json!("pong"));
/// ```
#[derive(Clone)]
pub struct Bridge {
    /// Shared endpoint state.
    pub(crate) inner: Arc<BridgeInner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("source_id", &self.inner.source_id)
            .field("version", &self.inner.version)
            .field("ready", &self.is_ready())
            .field("commands", &self.inner.commands)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Bridge - Constructor
// ============================================================================

impl Bridge {
    /// Returns a builder for configuring a new endpoint.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Creates an endpoint without a target.
    pub(crate) fn new(version: String, commands: CommandTable) -> Self {
        let inner = BridgeInner::new(version, commands);
        debug!(source_id = %inner.source_id, version = %inner.version, "Bridge created");
        Self { inner }
    }
}

// ============================================================================
// Bridge - Targets
// ============================================================================

impl Bridge {
    /// Pairs this endpoint with `peer` for direct in-process delivery.
    ///
    /// `peer` is paired back to this endpoint if it has no target yet.
    /// Neither endpoint keeps the other alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake cannot be delivered.
    pub fn connect_direct(&self, peer: &Bridge) -> Result<()> {
        let to_peer: Weak<dyn Inbox> = Arc::downgrade(&peer.inner) as Weak<dyn Inbox>;
        *self.inner.transport.write() = Some(Arc::new(DirectTransport::new(to_peer)));

        let to_self: Weak<dyn Inbox> = Arc::downgrade(&self.inner) as Weak<dyn Inbox>;
        if peer
            .inner
            .set_transport_if_absent(Arc::new(DirectTransport::new(to_self)))
        {
            debug!(source_id = %peer.inner.source_id, "Paired peer back to initiator");
        }

        debug!(
            source_id = %self.inner.source_id,
            peer = %peer.inner.source_id,
            "Direct target attached"
        );

        self.inner.send_handshake()
    }

    /// Targets a peer window and sends the handshake.
    ///
    /// Inbound messages are filtered against `target`; feed them through
    /// [`Bridge::listen`] or [`Bridge::handle_window_message`].
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake cannot be posted.
    pub fn attach_window(&self, target: WindowTarget) -> Result<()> {
        debug!(
            source_id = %self.inner.source_id,
            window = %target.window().id(),
            origin = target.origin(),
            "Window target attached"
        );

        *self.inner.window.write() = Some(target.clone());
        *self.inner.transport.write() = Some(Arc::new(WindowedTransport::new(target)));

        self.inner.send_handshake()
    }

    /// Spawns the inbound loop for a windowed endpoint.
    ///
    /// The task ends when `inbox` closes or the endpoint is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn listen(&self, mut inbox: mpsc::UnboundedReceiver<WindowMessage>) -> JoinHandle<()> {
        let bridge = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                let Some(bridge) = bridge.upgrade() else {
                    break;
                };

                if let Err(e) = bridge.handle_window_message(message) {
                    error!(error = %e, "Failed to handle window message");
                }
            }

            debug!("Window message loop terminated");
        })
    }

    /// Filters one cross-window message and processes it if accepted.
    ///
    /// Messages from an unexpected window or origin, and messages without
    /// the base envelope shape, are dropped without error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for accepted but malformed envelopes.
    pub fn handle_window_message(&self, message: WindowMessage) -> Result<()> {
        self.inner.handle_window_message(message)
    }

    /// Processes one raw inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for malformed envelopes.
    pub fn receive(&self, message: Value) -> Result<()> {
        self.inner.receive(message)
    }
}

// ============================================================================
// Bridge - Calls
// ============================================================================

impl Bridge {
    /// Invokes a built-in command on the peer.
    ///
    /// Waits for the handshake, then resolves with the peer handler's value.
    /// `listener` receives every `event` the peer pushes for this call, even
    /// after it settles.
    ///
    /// # Errors
    ///
    /// - [`Error::HandshakeRejected`] if the peer rejected the handshake
    /// - [`Error::Rejected`] with the peer's message if the call failed
    /// - transport errors if the call could not be delivered
    pub async fn send_command(
        &self,
        name: impl Into<String>,
        arg: Option<Value>,
        listener: Option<Listener>,
    ) -> Result<Value> {
        let (_, rx) = self.start_call(name.into(), arg, listener, false).await?;
        rx.await?
    }

    /// Invokes a custom command on the peer.
    ///
    /// # Errors
    ///
    /// Same as [`Bridge::send_command`].
    pub async fn send_custom_command(
        &self,
        name: impl Into<String>,
        arg: Option<Value>,
        listener: Option<Listener>,
    ) -> Result<Value> {
        let (_, rx) = self.start_call(name.into(), arg, listener, true).await?;
        rx.await?
    }

    /// Invokes a built-in command, giving up after `call_timeout`.
    ///
    /// One deadline covers the handshake wait and the call itself. On expiry
    /// the call's pending record and listener are removed, so late replies
    /// are ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::HandshakeTimeout`] if the handshake did not complete in time
    /// - [`Error::RequestTimeout`] if the call did not settle in time
    /// - otherwise as [`Bridge::send_command`]
    pub async fn send_command_with_timeout(
        &self,
        name: impl Into<String>,
        arg: Option<Value>,
        listener: Option<Listener>,
        call_timeout: Duration,
    ) -> Result<Value> {
        let timeout_ms = call_timeout.as_millis() as u64;
        let deadline = Instant::now() + call_timeout;

        let started = timeout_at(
            deadline,
            self.start_call(name.into(), arg, listener, false),
        )
        .await;

        let (id, rx) = match started {
            Ok(result) => result?,
            Err(_) => {
                debug!(timeout_ms, "Handshake wait timed out");
                return Err(Error::handshake_timeout(timeout_ms));
            }
        };

        match timeout_at(deadline, rx).await {
            Ok(result) => result?,
            Err(_) => {
                self.inner.forget(&id);
                debug!(id = %id, timeout_ms, "Call timed out");
                Err(Error::request_timeout(id, timeout_ms))
            }
        }
    }

    /// Registers the pending record and sends the call envelope.
    async fn start_call(
        &self,
        name: String,
        arg: Option<Value>,
        listener: Option<Listener>,
        custom: bool,
    ) -> Result<(MessageId, oneshot::Receiver<Result<Value>>)> {
        self.wait_for_handshake().await?;

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut pending = self.inner.pending.lock();
            let mut id = MessageId::generate();
            while pending.contains_key(&id) {
                id = MessageId::generate();
            }
            pending.insert(id.clone(), PendingCall::Call(tx));
            id
        };

        if let Some(listener) = listener {
            self.inner.listeners.lock().insert(id.clone(), listener);
        }

        let arg = arg.unwrap_or(Value::Null);
        let message = if custom {
            Message::CustomCommand { name, arg }
        } else {
            Message::Command { name, arg }
        };

        let envelope = Envelope::new(id.clone(), self.inner.source_id.clone(), message);
        if let Err(e) = self.inner.transmit(&envelope) {
            self.inner.forget(&id);
            return Err(e);
        }

        Ok((id, rx))
    }
}

// ============================================================================
// Bridge - Handshake
// ============================================================================

impl Bridge {
    /// Waits until the handshake completes.
    ///
    /// Returns the peer's announced version when known.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeRejected`] if the peer rejected this
    /// endpoint's handshake.
    pub async fn wait_for_handshake(&self) -> Result<Option<String>> {
        let mut rx = self.inner.handshake.subscribe();
        let state = rx
            .wait_for(|state| *state != HandshakeState::Pending)
            .await
            .map_err(|_| Error::EndpointClosed)?
            .clone();

        match state {
            HandshakeState::Ready { peer_version } => Ok(peer_version),
            HandshakeState::Failed { message } => Err(Error::handshake_rejected(message)),
            HandshakeState::Pending => Err(Error::protocol("Handshake still pending")),
        }
    }

    /// Returns the current handshake state.
    #[inline]
    #[must_use]
    pub fn handshake_state(&self) -> HandshakeState {
        self.inner.handshake.borrow().clone()
    }

    /// Returns `true` once the handshake completed.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.handshake.borrow().is_ready()
    }
}

// ============================================================================
// Bridge - Handlers
// ============================================================================

impl Bridge {
    /// Installs the handler for custom command `name`, replacing any previous one.
    pub fn register_custom_command(&self, name: impl Into<String>, handler: Handler) {
        let name = name.into();
        debug!(name = %name, "Custom command registered");
        self.inner.custom_commands.write().insert(name, handler);
    }

    /// Removes the handler for custom command `name`. No-op if absent.
    pub fn unregister_custom_command(&self, name: &str) {
        if self.inner.custom_commands.write().remove(name).is_some() {
            debug!(name, "Custom command unregistered");
        }
    }

    /// Observes every inbound envelope before dispatch.
    pub fn spy<F>(&self, spy: F) -> SpyGuard
    where
        F: Fn(&Envelope) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.spies.lock().add(Arc::new(spy));
        SpyGuard::new(Arc::downgrade(&self.inner), id)
    }
}

// ============================================================================
// Bridge - Accessors
// ============================================================================

impl Bridge {
    /// Returns this endpoint's source id.
    #[inline]
    #[must_use]
    pub fn source_id(&self) -> &SourceId {
        &self.inner.source_id
    }

    /// Returns the protocol version this endpoint announces.
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.inner.version
    }

    /// Returns `true` if a target is attached.
    #[inline]
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.inner.transport.read().is_some()
    }

    /// Returns the number of outbound calls awaiting a settle.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .pending
            .lock()
            .values()
            .filter(|entry| matches!(entry, PendingCall::Call(_)))
            .count()
    }

    /// Returns the number of registered call listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Returns the number of installed spies.
    #[inline]
    #[must_use]
    pub fn spy_count(&self) -> usize {
        self.inner.spies.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::bridge::handler::{handler, listener, sync_handler};
    use crate::transport::LocalWindow;

    fn pair() -> (Bridge, Bridge) {
        let player = Bridge::builder()
            .command("ping", sync_handler(|_, _| Ok(json!("pong"))))
            .build()
            .expect("player");
        let interactive = Bridge::builder()
            .direct_target(&player)
            .build()
            .expect("interactive");
        (player, interactive)
    }

    #[tokio::test]
    async fn test_direct_pairing_is_mutual() {
        let (player, interactive) = pair();

        assert!(player.has_target());
        assert!(interactive.has_target());
        assert!(player.is_ready());
        assert!(interactive.is_ready());
        assert_eq!(
            interactive.wait_for_handshake().await.expect("ready"),
            Some(player.version().to_string())
        );
    }

    #[tokio::test]
    async fn test_send_command_resolves() {
        let (_player, interactive) = pair();

        let value = interactive
            .send_command("ping", None, None)
            .await
            .expect("ping");
        assert_eq!(value, json!("pong"));
        assert_eq!(interactive.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_command_rejects() {
        let (_player, interactive) = pair();

        let err = interactive
            .send_command("unknown", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rejected { .. }));
        assert!(err.to_string().contains("Unsupported command: unknown"));
    }

    #[tokio::test]
    async fn test_handler_error_rejects_with_message() {
        let player = Bridge::builder()
            .command("fail", sync_handler(|_, _| Err(Error::handler("quality unavailable"))))
            .build()
            .expect("player");
        let interactive = Bridge::builder().direct_target(&player).build().expect("interactive");

        let err = interactive.send_command("fail", None, None).await.unwrap_err();
        assert_eq!(err.to_string(), "quality unavailable");
    }

    #[tokio::test]
    async fn test_command_argument_round_trip() {
        let player = Bridge::builder()
            .command("double", sync_handler(|arg, _| Ok(json!(arg.as_i64().unwrap_or(0) * 2))))
            .build()
            .expect("player");
        let interactive = Bridge::builder().direct_target(&player).build().expect("interactive");

        let value = interactive
            .send_command("double", Some(json!(21)), None)
            .await
            .expect("double");
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn test_events_precede_resolve() {
        let player = Bridge::builder()
            .command(
                "count",
                sync_handler(|_, events| {
                    events.push(json!(1))?;
                    events.push(json!(2))?;
                    Ok(json!(3))
                }),
            )
            .build()
            .expect("player");
        let interactive = Bridge::builder().direct_target(&player).build().expect("interactive");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let value = interactive
            .send_command(
                "count",
                None,
                Some(listener(move |value| sink.lock().push(value))),
            )
            .await
            .expect("count");

        assert_eq!(value, json!(3));
        assert_eq!(*seen.lock(), vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_async_handler_events_and_resolve() {
        let player = Bridge::builder()
            .command(
                "slow",
                handler(|_, events| async move {
                    tokio::task::yield_now().await;
                    events.push(json!("halfway"))?;
                    tokio::task::yield_now().await;
                    Ok(json!("done"))
                }),
            )
            .build()
            .expect("player");
        let interactive = Bridge::builder().direct_target(&player).build().expect("interactive");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let value = interactive
            .send_command("slow", None, Some(listener(move |v| sink.lock().push(v))))
            .await
            .expect("slow");

        assert_eq!(value, json!("done"));
        assert_eq!(*seen.lock(), vec![json!("halfway")]);
    }

    #[tokio::test]
    async fn test_async_handler_panic_rejects() {
        let player = Bridge::builder()
            .command(
                "explode",
                handler(|_, _| async move {
                    tokio::task::yield_now().await;
                    let missing: Option<Value> = None;
                    Ok(missing.expect("handler blew up"))
                }),
            )
            .build()
            .expect("player");
        let interactive = Bridge::builder().direct_target(&player).build().expect("interactive");

        let err = interactive
            .send_command_with_timeout("explode", None, None, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Rejected { .. }));
        assert_eq!(err.to_string(), "Command handler panicked");
        assert_eq!(interactive.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_handler_panic_rejects() {
        let player = Bridge::builder()
            .command("explode", sync_handler(|_, _| panic!("handler blew up")))
            .build()
            .expect("player");
        let interactive = Bridge::builder().direct_target(&player).build().expect("interactive");

        let err = interactive.send_command("explode", None, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Command handler panicked");

        let err = interactive.send_command("ping", None, None).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported command: ping"));
    }

    #[tokio::test]
    async fn test_events_after_settle_reach_listener() {
        let kept: Arc<Mutex<Option<EventSink>>> = Arc::new(Mutex::new(None));
        let store = Arc::clone(&kept);

        let player = Bridge::builder()
            .command(
                "subscribeFullscreen",
                sync_handler(move |_, events| {
                    *store.lock() = Some(events.clone());
                    Ok(json!(false))
                }),
            )
            .build()
            .expect("player");
        let interactive = Bridge::builder().direct_target(&player).build().expect("interactive");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let initial = interactive
            .send_command(
                "subscribeFullscreen",
                None,
                Some(listener(move |v| sink.lock().push(v))),
            )
            .await
            .expect("subscribe");
        assert_eq!(initial, json!(false));

        let events = kept.lock().clone().expect("sink stored");
        events.push(json!(true)).expect("push");
        events.push(json!(false)).expect("push");

        assert_eq!(*seen.lock(), vec![json!(true), json!(false)]);
        assert_eq!(interactive.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_custom_command_lifecycle() {
        let (player, interactive) = pair();

        player.register_custom_command("vote", sync_handler(|arg, _| Ok(json!({"voted": arg}))));
        let value = interactive
            .send_custom_command("vote", Some(json!("a")), None)
            .await
            .expect("vote");
        assert_eq!(value, json!({"voted": "a"}));

        player.register_custom_command("vote", sync_handler(|_, _| Ok(json!("replaced"))));
        let value = interactive
            .send_custom_command("vote", None, None)
            .await
            .expect("vote");
        assert_eq!(value, json!("replaced"));

        player.unregister_custom_command("vote");
        let err = interactive
            .send_custom_command("vote", None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unregistered custom command: vote"));
    }

    #[tokio::test]
    async fn test_custom_and_builtin_namespaces_are_separate() {
        let (player, interactive) = pair();
        player.register_custom_command("custom", sync_handler(|_, _| Ok(json!(1))));

        let err = interactive.send_command("custom", None, None).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported command: custom"));

        let err = interactive.send_custom_command("ping", None, None).await.unwrap_err();
        assert!(err.to_string().contains("Unregistered custom command: ping"));
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let (player, _interactive) = pair();
        player.unregister_custom_command("never-registered");
    }

    #[tokio::test]
    async fn test_concurrent_calls_get_distinct_ids() {
        let (_player, interactive) = pair();

        let ids = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ids);
        let _guard = interactive.spy(move |envelope| {
            seen.lock().push(envelope.id.clone());
            Ok(())
        });

        let (a, b) = tokio::join!(
            interactive.send_command("ping", None, None),
            interactive.send_command("ping", None, None)
        );
        assert_eq!(a.expect("a"), json!("pong"));
        assert_eq!(b.expect("b"), json!("pong"));

        let ids = ids.lock();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_anti_echo() {
        let (player, _interactive) = pair();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _guard = player.spy(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let own = Envelope::new(
            MessageId::from("c1"),
            player.source_id().clone(),
            Message::Command {
                name: "ping".into(),
                arg: Value::Null,
            },
        );
        player.receive(own.to_value().expect("encode")).expect("ignored");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_foreign_values_ignored_and_malformed_raise() {
        let (player, _interactive) = pair();

        player.receive(json!({"hello": "world"})).expect("ignored");
        player.receive(json!("text")).expect("ignored");

        let malformed = json!({
            "id": "c1",
            "sourceId": "someone",
            "isLivery": true,
            "type": "command"
        });
        assert!(matches!(player.receive(malformed), Err(Error::Protocol { .. })));

        let unknown = json!({
            "id": "c1",
            "sourceId": "someone",
            "isLivery": true,
            "type": "teleport"
        });
        assert!(matches!(player.receive(unknown), Err(Error::Protocol { .. })));
    }

    #[test]
    fn test_unmatched_settles_and_events_ignored() {
        let (player, _interactive) = pair();

        for message in [
            json!({"id": "zz", "sourceId": "x", "isLivery": true, "type": "resolve", "value": 1}),
            json!({"id": "zz", "sourceId": "x", "isLivery": true, "type": "reject", "error": "e"}),
            json!({"id": "zz", "sourceId": "x", "isLivery": true, "type": "event", "value": 1}),
        ] {
            player.receive(message).expect("ignored");
        }
    }

    #[tokio::test]
    async fn test_failing_spy_does_not_block_dispatch() {
        let (_player, interactive) = pair();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _failing = interactive.spy(|_| Err(Error::handler("spy exploded")));
        let _counting = interactive.spy(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let value = interactive.send_command("ping", None, None).await.expect("ping");
        assert_eq!(value, json!("pong"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spies_run_before_dispatch() {
        let (_player, interactive) = pair();

        let endpoint = Arc::downgrade(&interactive.inner);
        let observed = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&observed);
        let _guard = interactive.spy(move |envelope| {
            if let (Message::Resolve { .. }, Some(inner)) = (&envelope.message, endpoint.upgrade()) {
                record.lock().push(Bridge { inner }.pending_count());
            }
            Ok(())
        });

        interactive.send_command("ping", None, None).await.expect("ping");

        assert_eq!(*observed.lock(), vec![1]);
        assert_eq!(interactive.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_spy_removal() {
        let (_player, interactive) = pair();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let guard = interactive.spy(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(interactive.spy_count(), 1);

        assert!(guard.remove());
        assert_eq!(interactive.spy_count(), 0);

        interactive.send_command("ping", None, None).await.expect("ping");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_handshake_is_idempotent() {
        let (player, interactive) = pair();

        let replies = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&replies);
        let _guard = interactive.spy(move |envelope| {
            seen.lock().push(envelope.message.clone());
            Ok(())
        });

        let state_rx = player.inner.handshake.subscribe();

        let handshake = Envelope::new(
            interactive.source_id().handshake_id(),
            interactive.source_id().clone(),
            Message::Handshake {
                version: interactive.version().to_string(),
            },
        );
        player.receive(handshake.to_value().expect("encode")).expect("handshake");

        assert!(!state_rx.has_changed().expect("open"));
        assert!(player.is_ready());
        assert_eq!(
            *replies.lock(),
            vec![Message::Resolve {
                value: json!(player.version())
            }]
        );
    }

    #[tokio::test]
    async fn test_incompatible_handshake() {
        let player = Bridge::builder().version("1.0.0").build().expect("player");
        let interactive = Bridge::builder()
            .version("2.0.0")
            .direct_target(&player)
            .build()
            .expect("interactive");

        assert!(!player.is_ready());
        let err = interactive.wait_for_handshake().await.unwrap_err();
        assert!(matches!(err, Error::HandshakeRejected { .. }));
        assert!(err.to_string().contains("Incompatible version"));

        let err = interactive.send_command("ping", None, None).await.unwrap_err();
        assert!(matches!(err, Error::HandshakeRejected { .. }));
    }

    #[tokio::test]
    async fn test_calls_wait_for_handshake() {
        let player = Bridge::builder()
            .command("ping", sync_handler(|_, _| Ok(json!("pong"))))
            .build()
            .expect("player");
        let interactive = Bridge::builder().build().expect("interactive");
        assert!(!interactive.is_ready());

        let caller = interactive.clone();
        let call = tokio::spawn(async move { caller.send_command("ping", None, None).await });
        tokio::task::yield_now().await;
        assert!(!call.is_finished());

        player.connect_direct(&interactive).expect("connect");

        let value = call.await.expect("join").expect("ping");
        assert_eq!(value, json!("pong"));
    }

    #[tokio::test]
    async fn test_timeout_forgets_call() {
        let player = Bridge::builder()
            .command("hang", handler(|_, _| std::future::pending()))
            .build()
            .expect("player");
        let interactive = Bridge::builder().direct_target(&player).build().expect("interactive");

        let err = interactive
            .send_command_with_timeout(
                "hang",
                None,
                Some(listener(|_| {})),
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(interactive.pending_count(), 0);
        assert_eq!(interactive.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_deadline_spans_handshake() {
        let player = Bridge::builder()
            .command("hang", handler(|_, _| std::future::pending()))
            .build()
            .expect("player");
        let interactive = Bridge::builder().build().expect("interactive");

        let peer = interactive.clone();
        let connect = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            player.connect_direct(&peer).expect("connect");
            player
        });

        let started = Instant::now();
        let err = interactive
            .send_command_with_timeout("hang", None, None, Duration::from_millis(200))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::RequestTimeout { timeout_ms: 200, .. }));
        assert!(elapsed < Duration::from_millis(300), "waited {elapsed:?}");
        assert_eq!(interactive.pending_count(), 0);

        drop(connect.await.expect("join"));
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let interactive = Bridge::builder().build().expect("interactive");

        let err = interactive
            .send_command_with_timeout("ping", None, None, Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HandshakeTimeout { timeout_ms: 20 }));
        assert!(err.is_timeout());
        assert_eq!(interactive.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_dropped() {
        let (player, interactive) = pair();
        drop(player);

        let err = interactive.send_command("ping", None, None).await.unwrap_err();
        assert!(matches!(err, Error::PeerGone));
        assert_eq!(interactive.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_windowed_round_trip() {
        let (player_end, interactive_end) =
            LocalWindow::pair("https://player.example", "https://interactive.example");

        let player = Bridge::builder()
            .command("ping", sync_handler(|_, _| Ok(json!("pong"))))
            .window_target(
                WindowTarget::new(player_end.window.clone(), "https://interactive.example")
                    .expect("target"),
            )
            .build()
            .expect("player");
        let interactive = Bridge::builder()
            .window_target(
                WindowTarget::new(interactive_end.window.clone(), "https://player.example")
                    .expect("target"),
            )
            .build()
            .expect("interactive");

        let _player_loop = player.listen(player_end.inbox);
        let _interactive_loop = interactive.listen(interactive_end.inbox);

        interactive.wait_for_handshake().await.expect("interactive ready");
        player.wait_for_handshake().await.expect("player ready");

        let value = interactive.send_command("ping", None, None).await.expect("ping");
        assert_eq!(value, json!("pong"));
    }

    #[tokio::test]
    async fn test_windowed_drops_untrusted_origin() {
        let (player_end, interactive_end) =
            LocalWindow::pair("https://player.example", "https://trusted.example");

        let player = Bridge::builder()
            .window_target(
                WindowTarget::new(player_end.window.clone(), "https://trusted.example")
                    .expect("target"),
            )
            .build()
            .expect("player");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _guard = player.spy(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let envelope = json!({
            "id": "c1",
            "sourceId": "evil",
            "isLivery": true,
            "type": "command",
            "name": "ping",
            "arg": null
        });

        player
            .handle_window_message(WindowMessage::new(
                envelope.clone(),
                "https://evil.example",
                Some(interactive_end.id),
            ))
            .expect("dropped");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        player
            .handle_window_message(WindowMessage::new(
                envelope,
                "https://trusted.example",
                Some(interactive_end.id),
            ))
            .expect("accepted");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
