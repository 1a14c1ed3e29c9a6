//! Control messages posted to the worker.

use serde_json::{json, Value as JsonValue};
use tokio::sync::{mpsc, oneshot};

use crate::WorkerError;

/// Message type requesting immediate activation.
pub const SKIP_WAITING: &str = "SKIP_WAITING";

/// Single-use reply channel attached to a message.
///
/// Sending consumes the port, so a message can be answered at most once.
#[derive(Debug)]
pub struct ReplyPort {
    tx: oneshot::Sender<JsonValue>,
}

impl ReplyPort {
    /// Create a port and the receiving end the caller awaits.
    pub fn channel() -> (Self, oneshot::Receiver<JsonValue>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Post the reply.
    pub fn post_message(self, reply: JsonValue) -> Result<(), WorkerError> {
        self.tx
            .send(reply)
            .map_err(|_| WorkerError::MessageError("reply port closed".to_string()))
    }
}

/// Long-lived channel back to the client that sent a message.
#[derive(Debug, Clone)]
pub struct ClientPort {
    tx: mpsc::UnboundedSender<JsonValue>,
}

impl ClientPort {
    /// Create a port and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JsonValue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Post a message to the client.
    pub fn post_message(&self, message: JsonValue) -> Result<(), WorkerError> {
        self.tx
            .send(message)
            .map_err(|_| WorkerError::MessageError("client went away".to_string()))
    }
}

/// A message delivered to the worker.
#[derive(Debug)]
pub struct WorkerMessage {
    /// Message payload.
    pub data: JsonValue,

    /// Reply channel, answered exactly once when present.
    pub reply: Option<ReplyPort>,

    /// Sender of the message.
    pub source: Option<ClientPort>,
}

impl WorkerMessage {
    /// Message without reply channel or source.
    pub fn new(data: JsonValue) -> Self {
        Self {
            data,
            reply: None,
            source: None,
        }
    }

    /// Attach a reply port.
    pub fn with_reply(mut self, port: ReplyPort) -> Self {
        self.reply = Some(port);
        self
    }

    /// Attach the sending client.
    pub fn with_source(mut self, port: ClientPort) -> Self {
        self.source = Some(port);
        self
    }

    /// Convenience constructor for `{"type": "SKIP_WAITING"}`.
    pub fn skip_waiting() -> Self {
        Self::new(json!({ "type": SKIP_WAITING }))
    }

    /// The `type` field, if present.
    pub fn message_type(&self) -> Option<&str> {
        self.data.get("type").and_then(JsonValue::as_str)
    }

    pub fn is_skip_waiting(&self) -> bool {
        self.message_type() == Some(SKIP_WAITING)
    }

    /// Whether the message came from a browser extension.
    pub fn is_from_extension(&self) -> bool {
        self.data.get("source").and_then(JsonValue::as_str) == Some("extension")
    }

    /// Acknowledgement sent on the reply port.
    pub(crate) fn acknowledgement(&self, timestamp: u64) -> JsonValue {
        let kind = if self.message_type().is_some() {
            "acknowledged"
        } else {
            "response"
        };
        json!({ "success": true, "type": kind, "timestamp": timestamp })
    }
}

/// What the worker did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageReport {
    /// A reply was delivered on the reply port.
    pub replied: bool,
    /// The client port received an extension acknowledgement.
    pub notified_source: bool,
    /// The message requested skip-waiting.
    pub skip_waiting: bool,
}
