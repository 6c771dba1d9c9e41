//! Realtime protocol message types
//!
//! Phoenix-channel frames exchanged with the realtime server as JSON text:
//!
//! ```text
//! {"topic": "...", "event": "...", "payload": {...}, "ref": "1"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::BackendResult;
use crate::models::{Bookmark, BookmarkId, ChangeEvent};

use super::subscription::OwnerFilter;

/// Channel topic used for bookmark changes
pub const BOOKMARKS_TOPIC: &str = "realtime:bookmarks-changes";

/// Topic for connection-level heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

/// One Phoenix-channel frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

/// What an incoming frame means to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Reply to one of our frames (join, heartbeat, leave)
    Reply {
        msg_ref: Option<String>,
        ok: bool,
        message: Option<String>,
    },
    /// A row change
    Change(ChangeEvent),
    /// Server-side status report about the channel
    System { ok: bool, message: Option<String> },
    /// The channel crashed on the server
    ChannelError,
    /// The server closed the channel
    ChannelClosed,
    /// Anything else (presence, broadcast, ...)
    Ignored,
}

impl ChannelMessage {
    /// Join the bookmarks channel, listening to all row events for one owner
    pub fn join(filter: &OwnerFilter, access_token: Option<&str>, msg_ref: &str) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": true },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": "bookmarks",
                    "filter": filter.to_filter_string(),
                }],
                "private": false,
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }

        Self {
            topic: BOOKMARKS_TOPIC.to_string(),
            event: "phx_join".to_string(),
            payload,
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    /// Leave the bookmarks channel
    pub fn leave(msg_ref: &str) -> Self {
        Self {
            topic: BOOKMARKS_TOPIC.to_string(),
            event: "phx_leave".to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    /// Connection keep-alive
    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
        }
    }

    /// Encode to JSON text
    pub fn encode(&self) -> BackendResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON text
    pub fn decode(text: &str) -> BackendResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Interpret the frame
    pub fn into_server_event(self) -> BackendResult<ServerEvent> {
        let event = match self.event.as_str() {
            "phx_reply" => {
                let reply: ReplyPayload = serde_json::from_value(self.payload)?;
                ServerEvent::Reply {
                    msg_ref: self.msg_ref,
                    ok: reply.status == "ok",
                    message: reply.response.and_then(|r| r.reason),
                }
            }
            "postgres_changes" => {
                let change: ChangePayload = serde_json::from_value(self.payload)?;
                ServerEvent::Change(change.data.into_change_event())
            }
            "system" => {
                let system: SystemPayload = serde_json::from_value(self.payload)?;
                ServerEvent::System {
                    ok: system.status == "ok",
                    message: system.message,
                }
            }
            "phx_error" => ServerEvent::ChannelError,
            "phx_close" => ServerEvent::ChannelClosed,
            _ => ServerEvent::Ignored,
        };
        Ok(event)
    }
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    status: String,
    #[serde(default)]
    response: Option<ReplyResponse>,
}

#[derive(Debug, Deserialize)]
struct ReplyResponse {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SystemPayload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    data: RowChange,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum RowChange {
    Insert { record: Bookmark },
    Update { record: Bookmark },
    Delete { old_record: DeletedRow },
}

#[derive(Debug, Deserialize)]
struct DeletedRow {
    id: BookmarkId,
}

impl RowChange {
    fn into_change_event(self) -> ChangeEvent {
        match self {
            RowChange::Insert { record } => ChangeEvent::Insert(record),
            RowChange::Update { record } => ChangeEvent::Update(record),
            RowChange::Delete { old_record } => ChangeEvent::Delete(old_record.id),
        }
    }
}
