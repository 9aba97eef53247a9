//! Merges the two message sources a client sees — the REST history fetch and
//! the live gateway stream — into one duplicate-free view. A client receives
//! its own sends back from the room broadcast, and history and live events
//! can overlap or arrive out of relative order, so rendering must be
//! idempotent rather than trust any total order from the wire.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use parley_types::api::MessageResponse;
use parley_types::events::GatewayEvent;

/// Placeholder shown when an envelope has no readable text. Malformed input
/// renders this; it never fails.
pub const ENCRYPTED_PLACEHOLDER: &str = "[encrypted]";

/// A message as seen by the reconciler, from either source. The store's
/// integer id is deliberately absent: the two transports may disagree on it
/// at render time, so it cannot anchor identity.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: String,
    pub content_encrypted: Value,
    pub timestamp: Option<DateTime<Utc>>,
    pub client_token: Option<Uuid>,
}

impl From<MessageResponse> for InboundMessage {
    fn from(m: MessageResponse) -> Self {
        Self {
            sender: m.sender,
            content_encrypted: m.content_encrypted,
            timestamp: Some(m.timestamp),
            client_token: m.client_token,
        }
    }
}

impl InboundMessage {
    /// Live-stream side of the merge. Non-message events carry nothing to
    /// render.
    pub fn from_event(event: GatewayEvent) -> Option<Self> {
        match event {
            GatewayEvent::Message {
                sender,
                content_encrypted,
                timestamp,
                client_token,
                ..
            } => Some(Self {
                sender,
                content_encrypted,
                timestamp: Some(timestamp),
                client_token,
            }),
            _ => None,
        }
    }
}

/// What a rendered entry looks like to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Consumes ordered, duplicate-free message entries. Rendering itself is not
/// specified here.
pub trait PresentationSink {
    fn present(&mut self, message: RenderedMessage);
}

impl PresentationSink for Vec<RenderedMessage> {
    fn present(&mut self, message: RenderedMessage) {
        self.push(message);
    }
}

/// Identity of a logical message. The idempotency token wins when the sender
/// supplied one; the heuristic tuple covers token-less messages.
#[derive(Debug, PartialEq, Eq, Hash)]
enum MessageIdentity {
    Token(Uuid),
    Heuristic {
        sender: String,
        timestamp_ms: Option<i64>,
        text: String,
    },
}

pub struct Reconciler<S> {
    seen: HashSet<MessageIdentity>,
    sink: S,
}

impl<S: PresentationSink> Reconciler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            seen: HashSet::new(),
            sink,
        }
    }

    /// Emit the message to the sink unless its identity was already
    /// rendered. Returns whether anything was emitted. Duplicates are
    /// absorbed silently; this never errors.
    pub fn render(&mut self, message: InboundMessage) -> bool {
        let text = decode_text(&message.content_encrypted);

        let identity = match message.client_token {
            Some(token) => MessageIdentity::Token(token),
            None => MessageIdentity::Heuristic {
                sender: message.sender.clone(),
                timestamp_ms: message.timestamp.map(|t| t.timestamp_millis()),
                text: text.clone(),
            },
        };

        if !self.seen.insert(identity) {
            return false;
        }

        self.sink.present(RenderedMessage {
            sender: message.sender,
            text,
            timestamp: message.timestamp,
        });
        true
    }

    /// Forget everything rendered so far, e.g. before replaying history into
    /// a cleared view.
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Redacted decode: the envelope is opaque, but a `ct` text field is used as
/// display text when present, the fixed placeholder otherwise.
fn decode_text(envelope: &Value) -> String {
    envelope
        .get("ct")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| ENCRYPTED_PLACEHOLDER.to_string())
}
