use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::announcement::{Announcement, LanguageCode, Priority, Variant};
use crate::ids::AnnouncementId;

/// One row of the hub's persisted announcement log, as served by
/// `GET /api/history`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: AnnouncementId,
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    pub original_text: String,
    pub languages: Vec<LanguageCode>,
    #[serde(rename = "announcements")]
    pub variants: Vec<Variant>,
}

impl HistoryEntry {
    pub fn from_announcement(announcement: &Announcement) -> Self {
        Self {
            id: announcement.id(),
            timestamp: announcement.timestamp(),
            priority: announcement.priority(),
            original_text: announcement.original_text().to_owned(),
            languages: announcement.language_codes(),
            variants: announcement.variants().to_vec(),
        }
    }

    /// The audio clip recorded for `language`, if that variant has one.
    pub fn clip(&self, language: &LanguageCode) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| &v.language_code == language)
            .and_then(|v| v.audio_reference.as_deref())
    }
}

/// Body of `POST /api/clear-history`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: String,
}

impl ClearHistoryResponse {
    pub fn cleared() -> Self {
        Self {
            success: true,
            message: "History cleared successfully".into(),
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
