//! Real-time channel frames.
//!
//! Every frame is a JSON envelope `{"event": <name>, "data": <payload>}`.
//! Connect and disconnect are transport signals and have no frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::announcement::{Announcement, LanguageCode, Priority, Variant};
use crate::errors::ProtocolError;
use crate::ids::AnnouncementId;

/// Frames the hub sends to publishers, subscribers and history browsers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    ConnectionStatus(ConnectionStatus),
    BroadcastSuccess(BroadcastAck),
    Error(HubErrorPayload),
    NewAnnouncement(NewAnnouncement),
}

impl HubEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ConnectionStatus(_) => "connection_status",
            Self::BroadcastSuccess(_) => "broadcast_success",
            Self::Error(_) => "error",
            Self::NewAnnouncement(_) => "new_announcement",
        }
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(HubErrorPayload {
            message: message.into(),
        })
    }
}

/// Frames clients send to the hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    BroadcastAnnouncement(BroadcastRequest),
    ReplayAnnouncement(ReplayRequest),
}

impl ClientRequest {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::BroadcastAnnouncement(_) => "broadcast_announcement",
            Self::ReplayAnnouncement(_) => "replay_announcement",
        }
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn replay(id: AnnouncementId) -> Self {
        Self::ReplayAnnouncement(ReplayRequest { id })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Newest announcement the hub has published, sent so a late joiner
    /// converges on the same current announcement as everyone else.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<NewAnnouncement>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub text: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub languages: Vec<LanguageCode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAck {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubErrorPayload {
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRequest {
    pub id: AnnouncementId,
}

/// Payload of `new_announcement`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnnouncement {
    pub id: AnnouncementId,
    #[serde(rename = "announcements")]
    pub variants: Vec<Variant>,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub is_replay: bool,
}

impl From<&Announcement> for NewAnnouncement {
    fn from(a: &Announcement) -> Self {
        Self {
            id: a.id(),
            variants: a.variants().to_vec(),
            priority: a.priority(),
            timestamp: a.timestamp(),
            original_text: a.original_text().to_owned(),
            is_replay: a.is_replay(),
        }
    }
}

impl TryFrom<NewAnnouncement> for Announcement {
    type Error = ProtocolError;

    fn try_from(p: NewAnnouncement) -> Result<Self, Self::Error> {
        let original = if p.original_text.is_empty() {
            p.variants
                .first()
                .map(|v| v.text.clone())
                .unwrap_or_default()
        } else {
            p.original_text
        };
        Announcement::new(p.id, p.timestamp, p.priority, original, p.variants)
            .map(|a| a.with_replay_flag(p.is_replay))
    }
}
