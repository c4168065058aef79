//! Text rendering of announcements for terminal views.

use chrono::{DateTime, Utc};
use herald_core::{Announcement, LanguageCode, Priority, Variant};

use crate::session::Connectivity;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The variant a subscriber sees in its preferred language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayedVariant {
    pub priority: Priority,
    pub language_code: LanguageCode,
    pub language_name: String,
    pub icon: String,
    pub text: String,
}

/// One row of the all-languages panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelLine {
    pub icon: String,
    pub language_name: String,
    pub text: String,
}

impl From<&Variant> for PanelLine {
    fn from(v: &Variant) -> Self {
        Self {
            icon: v.icon.clone(),
            language_name: v.language_name.clone(),
            text: v.text.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rendering {
    pub displayed: DisplayedVariant,
    pub panel: Vec<PanelLine>,
}

impl Rendering {
    pub fn of(announcement: &Announcement, preference: &LanguageCode) -> Self {
        let variant = announcement.displayed_variant(preference);
        Self {
            displayed: DisplayedVariant {
                priority: announcement.priority(),
                language_code: variant.language_code.clone(),
                language_name: variant.language_name.clone(),
                icon: variant.icon.clone(),
                text: variant.text.clone(),
            },
            panel: announcement.variants().iter().map(PanelLine::from).collect(),
        }
    }
}

impl std::fmt::Display for Rendering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.displayed.priority.headline())?;
        writeln!(f, "{}", self.displayed.text)?;
        for line in &self.panel {
            writeln!(f, "  {} {}: {}", line.icon, line.language_name, line.text)?;
        }
        Ok(())
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Status line after an announcement was delivered.
pub fn update_status(announcement: &Announcement) -> String {
    let mut line = format!(
        "Connected - Last update: {}",
        format_timestamp(announcement.timestamp())
    );
    if announcement.is_replay() {
        line.push_str(" (Replay)");
    }
    line
}

/// Status line for a bare connectivity change.
pub fn connectivity_status(connectivity: Connectivity) -> String {
    match connectivity {
        Connectivity::Connecting => "Connecting...".to_owned(),
        Connectivity::Connected => "Connected - Waiting for announcements".to_owned(),
        Connectivity::Disconnected => "Disconnected - Reconnecting...".to_owned(),
    }
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
