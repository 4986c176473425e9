//! Envelope and message kinds.
//!
//! The envelope is a structured JSON object, never a string. Its base
//! shape (`isLivery: true` plus string `id`, `sourceId` and `type`) is
//! what separates bridge traffic from unrelated messages sharing the
//! same channel.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{MessageId, SourceId};

// ============================================================================
// Envelope
// ============================================================================

/// One protocol message.
///
/// # Format
///
/// ```json
/// {
///   "id": "c1",
///   "sourceId": "a1",
///   "isLivery": true,
///   "type": "command",
///   "name": "ping",
///   "arg": null
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Call id, or the sender's source id for handshakes.
    pub id: MessageId,

    /// Source id of the sending endpoint.
    #[serde(rename = "sourceId")]
    pub source_id: SourceId,

    /// Protocol marker, always `true` on the wire.
    #[serde(rename = "isLivery")]
    pub is_livery: bool,

    /// Kind-specific payload, tagged by `type`.
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    /// Creates a new envelope.
    #[inline]
    #[must_use]
    pub fn new(id: MessageId, source_id: SourceId, message: Message) -> Self {
        Self {
            id,
            source_id,
            is_livery: true,
            message,
        }
    }

    /// Decodes an envelope from a structured message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if a required field is missing or
    /// mistyped, or the `type` is unknown.
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("Malformed {kind} envelope: {e}")))
    }

    /// Encodes the envelope into a structured message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a payload value fails to serialize.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Returns the wire name of the envelope kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.message.kind()
    }
}

// ============================================================================
// Message
// ============================================================================

/// Kind-specific envelope payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// Version announcement.
    Handshake {
        /// Sender's protocol version.
        version: String,
    },

    /// Built-in command invocation.
    Command {
        /// Command name.
        name: String,
        /// Command argument (`null` when absent).
        #[serde(default)]
        arg: Value,
    },

    /// Custom command invocation.
    CustomCommand {
        /// Command name.
        name: String,
        /// Command argument (`null` when absent).
        #[serde(default)]
        arg: Value,
    },

    /// Interim push to the call's listener.
    Event {
        /// Pushed value.
        #[serde(default)]
        value: Value,
    },

    /// Terminal success.
    Resolve {
        /// Result value.
        #[serde(default)]
        value: Value,
    },

    /// Terminal failure.
    Reject {
        /// Error message.
        error: String,
    },
}

impl Message {
    /// Returns the wire name of this kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::Command { .. } => "command",
            Self::CustomCommand { .. } => "customCommand",
            Self::Event { .. } => "event",
            Self::Resolve { .. } => "resolve",
            Self::Reject { .. } => "reject",
        }
    }
}

// ============================================================================
// Shape Check
// ============================================================================

/// Returns `true` if `value` has the base envelope shape.
///
/// Anything failing this check is foreign traffic and is ignored without
/// error by transports and endpoints.
#[must_use]
pub fn is_envelope(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    object.get("isLivery").and_then(Value::as_bool) == Some(true)
        && ["id", "sourceId", "type"]
            .iter()
            .all(|field| object.get(*field).is_some_and(Value::is_string))
}

/// Returns the `sourceId` of a value that passed [`is_envelope`].
#[inline]
#[must_use]
pub(crate) fn peek_source_id(value: &Value) -> Option<&str> {
    value.get("sourceId").and_then(Value::as_str)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let envelope = Envelope::new(
            MessageId::from("c1"),
            SourceId::from("a1"),
            Message::Command {
                name: "ping".into(),
                arg: Value::Null,
            },
        );

        let value = envelope.to_value().expect("serialize");
        assert_eq!(
            value,
            json!({
                "id": "c1",
                "sourceId": "a1",
                "isLivery": true,
                "type": "command",
                "name": "ping",
                "arg": null
            })
        );
    }

    #[test]
    fn test_custom_command_tag() {
        let value = json!({
            "id": "c2",
            "sourceId": "a1",
            "isLivery": true,
            "type": "customCommand",
            "name": "vote",
            "arg": {"option": 2}
        });

        let envelope = Envelope::from_value(value).expect("parse");
        assert_eq!(envelope.kind(), "customCommand");
        assert_eq!(
            envelope.message,
            Message::CustomCommand {
                name: "vote".into(),
                arg: json!({"option": 2}),
            }
        );
    }

    #[test]
    fn test_missing_arg_defaults_to_null() {
        let value = json!({
            "id": "c3",
            "sourceId": "a1",
            "isLivery": true,
            "type": "command",
            "name": "unknown"
        });

        let envelope = Envelope::from_value(value).expect("parse");
        assert!(matches!(envelope.message, Message::Command { arg: Value::Null, .. }));
    }

    #[test]
    fn test_unknown_type_is_protocol_error() {
        let value = json!({
            "id": "c4",
            "sourceId": "a1",
            "isLivery": true,
            "type": "teleport"
        });

        let err = Envelope::from_value(value).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_mistyped_field_is_protocol_error() {
        let value = json!({
            "id": "c5",
            "sourceId": "a1",
            "isLivery": true,
            "type": "reject",
            "error": 42
        });

        let err = Envelope::from_value(value).unwrap_err();
        assert!(err.to_string().contains("reject"));
    }

    #[test]
    fn test_is_envelope() {
        let valid = json!({"id": "x", "sourceId": "s", "type": "event", "isLivery": true});
        assert!(is_envelope(&valid));

        let not_livery = json!({"id": "x", "sourceId": "s", "type": "event", "isLivery": "yes"});
        assert!(!is_envelope(&not_livery));

        let numeric_id = json!({"id": 1, "sourceId": "s", "type": "event", "isLivery": true});
        assert!(!is_envelope(&numeric_id));

        assert!(!is_envelope(&json!("hello")));
        assert!(!is_envelope(&json!({"type": "event"})));
    }

    #[test]
    fn test_peek_source_id() {
        let value = json!({"id": "x", "sourceId": "s", "type": "event", "isLivery": true});
        assert_eq!(peek_source_id(&value), Some("s"));
    }
}
