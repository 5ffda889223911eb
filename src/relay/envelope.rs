//! Upstream event parsing.
//!
//! The receiver process emits one JSON object per line. Only the slice of
//! the wire format the relay consumes is modeled here: the `envelope` with
//! its routing metadata and the two payload shapes that can carry message
//! text. Everything else is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Which payload shape carried the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `envelope.dataMessage` — a message delivered to us.
    Data,
    /// `envelope.syncMessage.sentMessage` — a message synced from one of
    /// our own linked devices.
    Sync,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::Data => f.write_str("data"),
            MessageKind::Sync => f.write_str("sync"),
        }
    }
}

/// The addressable message payload extracted from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    /// Message text; may be empty when only a group id is present.
    pub text: String,
    pub group_id: Option<String>,
    pub kind: MessageKind,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GroupInfo {
    group_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DataMessage {
    message: Option<String>,
    group_info: Option<GroupInfo>,
}

impl DataMessage {
    fn body(&self, kind: MessageKind) -> Option<MessageBody> {
        let text = self.message.clone().unwrap_or_default();
        let group_id = self
            .group_info
            .as_ref()
            .and_then(|g| g.group_id.clone());
        if text.is_empty() && group_id.is_none() {
            return None;
        }
        Some(MessageBody {
            text,
            group_id,
            kind,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SyncMessage {
    sent_message: Option<DataMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Envelope {
    source: Option<String>,
    timestamp: Option<i64>,
    data_message: Option<DataMessage>,
    sync_message: Option<SyncMessage>,
}

/// One decoded line of the receive stream.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReceivedEvent {
    envelope: Envelope,
}

impl ReceivedEvent {
    /// Decode one raw line. Anything that is not a JSON object yields
    /// `None` — a malformed line is never fatal.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    /// Dedup key: `source:timestamp`, with empty/zero defaults. Not
    /// globally unique, but unique enough within the dedup TTL window.
    pub fn message_id(&self) -> String {
        format!(
            "{}:{}",
            self.envelope.source.as_deref().unwrap_or(""),
            self.envelope.timestamp.unwrap_or(0)
        )
    }

    pub fn source(&self) -> &str {
        self.envelope.source.as_deref().unwrap_or("")
    }

    /// True when the envelope originated from `addr` (our own address).
    pub fn is_from(&self, addr: &str) -> bool {
        self.source() == addr
    }

    /// Envelope timestamp as UTC wall-clock time, for log display.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.envelope
            .timestamp
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Extract the addressable message payload, if any.
    ///
    /// A direct `dataMessage` wins over a synced `sentMessage`; either
    /// counts as a message only if it carries text or a group id. Events
    /// matching neither shape (receipts, typing indicators) yield `None`.
    pub fn message(&self) -> Option<MessageBody> {
        if let Some(dm) = &self.envelope.data_message {
            if let Some(body) = dm.body(MessageKind::Data) {
                return Some(body);
            }
        }
        if let Some(sent) = self
            .envelope
            .sync_message
            .as_ref()
            .and_then(|s| s.sent_message.as_ref())
        {
            if let Some(body) = sent.body(MessageKind::Sync) {
                return Some(body);
            }
        }
        None
    }
}
