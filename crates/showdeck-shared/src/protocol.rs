//! Messages exchanged with the real-time control surfaces.
//!
//! WebSocket traffic uses a `{ "event": name, "data": payload }` envelope.
//! Inbound events are a closed set ([`ClientEvent`]); outbound events are
//! open-ended because conversation and read-receipt channels embed ids in
//! their names ([`ServerEvent`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::UserRole;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "auth")]
    Auth(AuthPayload),

    #[serde(rename = "logo:change")]
    LogoChange(LogoChangePayload),

    #[serde(rename = "timer:start")]
    TimerStart(TimerStartPayload),

    #[serde(rename = "timer:stop")]
    TimerStop,

    #[serde(rename = "timer:reset")]
    TimerReset,

    #[serde(rename = "sync:trigger")]
    SyncTrigger,

    #[serde(rename = "sync:offline")]
    SyncOffline(OfflinePayload),

    #[serde(rename = "message:send")]
    MessageSend(MessageSendPayload),

    #[serde(rename = "message:read")]
    MessageRead(MessageReadPayload),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub name: String,
    pub role: UserRole,
    /// Identity from an earlier session.  A fresh id is assigned when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoChangePayload {
    pub logo_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerStartPayload {
    /// Countdown length in milliseconds.
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflinePayload {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendPayload {
    pub conversation_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub message_id: String,
    pub conversation_id: String,
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

pub const EVENT_AUTH_SUCCESS: &str = "auth:success";
pub const EVENT_USERS_STATUS: &str = "users:status";
pub const EVENT_LOGO_UPDATED: &str = "logo:updated";
pub const EVENT_TIMER_STARTED: &str = "timer:started";
pub const EVENT_TIMER_STOPPED: &str = "timer:stopped";
pub const EVENT_TIMER_RESET: &str = "timer:reset";
pub const EVENT_TIMER_ENDED: &str = "timer:ended";
pub const EVENT_SYNC_STATUS: &str = "sync:status";
pub const EVENT_ERROR: &str = "error";

/// Channel a conversation's new messages are delivered on.
pub fn conversation_channel(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

/// Channel a message's read receipt is delivered on.
pub fn read_receipt_channel(message_id: &str) -> String {
    format!("message:{message_id}:read")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    pub event: String,
    pub data: Value,
}

impl ServerEvent {
    pub fn new<T: Serialize>(event: impl Into<String>, data: &T) -> Self {
        Self {
            event: event.into(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Outcome of a command as reported back to a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Ended,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
            Status::Ended => "ended",
        }
    }
}

/// `{target, status, message}` reply sent on the originating channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub target: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusPayload {
    pub fn error(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            status: Status::Error,
            message: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// OSC address map
// ---------------------------------------------------------------------------

pub mod osc {
    pub const LOGO_CHANGE: &str = "/logo/change";
    pub const TIMER_START: &str = "/timer/start";
    pub const TIMER_STOP: &str = "/timer/stop";
    pub const TIMER_RESET: &str = "/timer/reset";
    pub const SYNC_TRIGGER: &str = "/sync/trigger";
    pub const SYNC_OFFLINE: &str = "/sync/offline";

    pub const LOGO_STATUS: &str = "/logo/status";
    pub const TIMER_STATUS: &str = "/timer/status";
    pub const SYNC_STATUS: &str = "/sync/status";

    pub const LOGO_UPDATE: &str = "/logo/update";
    pub const TIMER_UPDATE: &str = "/timer/update";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_logo_change() {
        let ev = ClientEvent::parse(r#"{"event":"logo:change","data":{"logoId":"L1"}}"#).unwrap();
        assert_eq!(
            ev,
            ClientEvent::LogoChange(LogoChangePayload {
                logo_id: "L1".into()
            })
        );
    }

    #[test]
    fn parses_unit_events_without_data() {
        let ev = ClientEvent::parse(r#"{"event":"timer:stop"}"#).unwrap();
        assert_eq!(ev, ClientEvent::TimerStop);
    }

    #[test]
    fn parses_auth_with_role() {
        let ev = ClientEvent::parse(r#"{"event":"auth","data":{"name":"Ana","role":"VJ"}}"#)
            .unwrap();
        match ev {
            ClientEvent::Auth(auth) => {
                assert_eq!(auth.name, "Ana");
                assert_eq!(auth.role, UserRole::Vj);
                assert_eq!(auth.user_id, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_event() {
        assert!(ClientEvent::parse(r#"{"event":"logo:explode","data":{}}"#).is_err());
    }

    #[test]
    fn error_status_serializes_message() {
        let payload = StatusPayload::error("logo", "Logo not found: X");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["target"], "logo");
        assert_eq!(json["message"], "Logo not found: X");
    }

    #[test]
    fn channels_embed_ids() {
        assert_eq!(conversation_channel("c1"), "conversation:c1");
        assert_eq!(read_receipt_channel("m1"), "message:m1:read");
    }
}
