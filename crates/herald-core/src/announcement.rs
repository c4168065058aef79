use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::ids::AnnouncementId;

/// Urgency of an announcement. Closed set: anything else fails to decode.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    Warning,
    Emergency,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Normal, Priority::Warning, Priority::Emergency];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Emergency => "emergency",
        }
    }

    /// Headline shown above the displayed variant.
    pub fn headline(self) -> &'static str {
        match self {
            Self::Normal => "🟢 NORMAL ANNOUNCEMENT",
            Self::Warning => "🟡 WARNING",
            Self::Emergency => "🔴 EMERGENCY ALERT",
        }
    }

    /// Short marker used in list views.
    pub fn badge(self) -> &'static str {
        match self {
            Self::Normal => "🟢",
            Self::Warning => "🟡",
            Self::Emergency => "🔴",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "warning" => Ok(Self::Warning),
            "emergency" => Ok(Self::Emergency),
            other => Err(ProtocolError::Malformed(format!("unknown priority: {other}"))),
        }
    }
}

/// ISO-639-1 style language code such as `en` or `hi`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for LanguageCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for LanguageCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One language's rendering of an announcement.
///
/// Field names on the wire follow the hub's JSON (`language`, `flag`,
/// `audio_url`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(rename = "language")]
    pub language_code: LanguageCode,
    pub language_name: String,
    #[serde(rename = "flag")]
    pub icon: String,
    pub text: String,
    #[serde(rename = "audio_url", default, skip_serializing_if = "Option::is_none")]
    pub audio_reference: Option<String>,
}

impl Variant {
    pub fn new(
        language_code: impl Into<LanguageCode>,
        language_name: impl Into<String>,
        icon: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            language_code: language_code.into(),
            language_name: language_name.into(),
            icon: icon.into(),
            text: text.into(),
            audio_reference: None,
        }
    }

    pub fn with_audio(mut self, reference: impl Into<String>) -> Self {
        self.audio_reference = Some(reference.into());
        self
    }
}

/// A published announcement. Immutable once constructed: the variant set is
/// validated here and only exposed through shared borrows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    id: AnnouncementId,
    timestamp: DateTime<Utc>,
    priority: Priority,
    original_text: String,
    variants: Vec<Variant>,
    is_replay: bool,
}

impl Announcement {
    pub fn new(
        id: AnnouncementId,
        timestamp: DateTime<Utc>,
        priority: Priority,
        original_text: impl Into<String>,
        variants: Vec<Variant>,
    ) -> Result<Self, ProtocolError> {
        validate_variants(&variants)?;
        Ok(Self {
            id,
            timestamp,
            priority,
            original_text: original_text.into(),
            variants,
            is_replay: false,
        })
    }

    pub fn id(&self) -> AnnouncementId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn is_replay(&self) -> bool {
        self.is_replay
    }

    /// First variant; always present.
    pub fn fallback_variant(&self) -> &Variant {
        &self.variants[0]
    }

    /// The variant in the preferred language, or the fallback when the
    /// announcement was not rendered in that language.
    pub fn displayed_variant(&self, preference: &LanguageCode) -> &Variant {
        self.variants
            .iter()
            .find(|v| &v.language_code == preference)
            .unwrap_or_else(|| self.fallback_variant())
    }

    pub fn language_codes(&self) -> Vec<LanguageCode> {
        self.variants.iter().map(|v| v.language_code.clone()).collect()
    }

    /// Same content re-delivered at `delivered_at`. Never a new id.
    pub fn replayed_at(&self, delivered_at: DateTime<Utc>) -> Self {
        Self {
            timestamp: delivered_at,
            is_replay: true,
            ..self.clone()
        }
    }

    pub(crate) fn with_replay_flag(mut self, is_replay: bool) -> Self {
        self.is_replay = is_replay;
        self
    }
}

/// At least one variant, and no language code twice.
pub fn validate_variants(variants: &[Variant]) -> Result<(), ProtocolError> {
    if variants.is_empty() {
        return Err(ProtocolError::NoVariants);
    }
    let mut seen = HashSet::with_capacity(variants.len());
    for variant in variants {
        if !seen.insert(variant.language_code.as_str()) {
            return Err(ProtocolError::DuplicateLanguage(
                variant.language_code.to_string(),
            ));
        }
    }
    Ok(())
}
