//! Per-connection client state.
//!
//! A [`SessionContext`] is owned by the runtime and lives as long as the
//! client does. Transport signals only move [`Connectivity`]; preferences and
//! cached content survive reconnects and are cleared by [`SessionContext::reset`]
//! alone.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use herald_core::{Announcement, LanguageCode, Priority};

/// Number of summaries kept in the recent history.
pub const RECENT_CAPACITY: usize = 5;

/// Characters of summary text shown in list views.
pub const SUMMARY_PREVIEW_CHARS: usize = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Connectivity {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

impl Connectivity {
    pub fn indicator(self) -> &'static str {
        match self {
            Self::Connecting => "🟡",
            Self::Connected => "🟢",
            Self::Disconnected => "🔴",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        }
    }
}

/// Compact record of a received announcement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecentSummary {
    pub timestamp: DateTime<Utc>,
    pub priority: Priority,
    /// Text of the first variant, untruncated.
    pub text: String,
    pub variant_count: usize,
}

impl RecentSummary {
    pub fn of(announcement: &Announcement) -> Self {
        Self {
            timestamp: announcement.timestamp(),
            priority: announcement.priority(),
            text: announcement.fallback_variant().text.clone(),
            variant_count: announcement.variants().len(),
        }
    }

    /// Summary text cut to [`SUMMARY_PREVIEW_CHARS`] for display.
    pub fn preview(&self) -> String {
        crate::render::preview(&self.text, SUMMARY_PREVIEW_CHARS)
    }
}

impl std::fmt::Display for RecentSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}  {} ({} languages)",
            self.priority.badge(),
            crate::render::format_timestamp(self.timestamp),
            self.preview(),
            self.variant_count
        )
    }
}

/// Bounded, most-recent-first. Eviction follows receipt order only.
#[derive(Clone, Debug, Default)]
pub struct RecentHistory {
    items: VecDeque<RecentSummary>,
}

impl RecentHistory {
    pub fn push(&mut self, summary: RecentSummary) {
        self.items.push_front(summary);
        self.items.truncate(RECENT_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecentSummary> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<RecentSummary> {
        self.items.iter().cloned().collect()
    }

    fn clear(&mut self) {
        self.items.clear();
    }
}

/// Local-only choices. Never sent to the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preferences {
    pub language: LanguageCode,
    pub sound_enabled: bool,
}

impl Preferences {
    pub fn new(language: impl Into<LanguageCode>, sound_enabled: bool) -> Self {
        Self {
            language: language.into(),
            sound_enabled,
        }
    }
}

#[derive(Debug)]
pub struct SessionContext {
    connectivity: Connectivity,
    preferences: Preferences,
    last_announcement: Option<Announcement>,
    recent: RecentHistory,
}

impl SessionContext {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            connectivity: Connectivity::Connecting,
            preferences,
            last_announcement: None,
            recent: RecentHistory::default(),
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn set_connectivity(&mut self, connectivity: Connectivity) {
        self.connectivity = connectivity;
    }

    pub fn language(&self) -> &LanguageCode {
        &self.preferences.language
    }

    /// Returns whether the preference actually changed.
    pub fn set_language(&mut self, language: LanguageCode) -> bool {
        if self.preferences.language == language {
            return false;
        }
        self.preferences.language = language;
        true
    }

    pub fn sound_enabled(&self) -> bool {
        self.preferences.sound_enabled
    }

    /// Returns whether the flag actually changed.
    pub fn set_sound_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.preferences.sound_enabled != enabled;
        self.preferences.sound_enabled = enabled;
        changed
    }

    pub fn last_announcement(&self) -> Option<&Announcement> {
        self.last_announcement.as_ref()
    }

    pub fn recent(&self) -> &RecentHistory {
        &self.recent
    }

    /// A delivered announcement: becomes current and enters recent history.
    pub fn record(&mut self, announcement: Announcement) {
        self.recent.push(RecentSummary::of(&announcement));
        self.last_announcement = Some(announcement);
    }

    /// Take `announcement` as current without counting it as received.
    /// Used when the hub tells a late joiner what is already on air.
    pub fn adopt(&mut self, announcement: Announcement) {
        self.last_announcement = Some(announcement);
    }

    /// Drop cached content. Preferences and connectivity are kept.
    pub fn reset(&mut self) {
        self.last_announcement = None;
        self.recent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use herald_core::{AnnouncementId, Variant};

    fn announcement(id: u64, text: &str) -> Announcement {
        Announcement::new(
            AnnouncementId::new(id),
            Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
            Priority::Normal,
            text,
            vec![
                Variant::new("en", "English", "🇬🇧", text),
                Variant::new("fr", "Français (French)", "🇫🇷", format!("fr: {text}")),
            ],
        )
        .unwrap()
    }

    fn session() -> SessionContext {
        SessionContext::new(Preferences::new("en", true))
    }

    #[test]
    fn summary_line_shows_time_badge_and_variant_count() {
        let summary = RecentSummary::of(&announcement(1, "Platform 4 now boarding"));
        assert_eq!(
            summary.to_string(),
            "🟢 2023-11-14 22:13:21  Platform 4 now boarding (2 languages)"
        );
    }

    #[test]
    fn recent_history_is_bounded_and_most_recent_first() {
        let mut s = session();
        for i in 1..=7 {
            s.record(announcement(i, &format!("msg {i}")));
            assert_eq!(s.recent().len(), (i as usize).min(RECENT_CAPACITY));
        }
        let texts: Vec<_> = s.recent().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, ["msg 7", "msg 6", "msg 5", "msg 4", "msg 3"]);
    }

    #[test]
    fn recency_follows_arrival_not_id() {
        let mut s = session();
        s.record(announcement(9, "later id"));
        s.record(announcement(3, "earlier id"));
        assert_eq!(s.last_announcement().unwrap().id(), AnnouncementId::new(3));
        assert_eq!(s.recent().iter().next().unwrap().text, "earlier id");
    }

    #[test]
    fn summary_uses_first_variant() {
        let summary = RecentSummary::of(&announcement(1, "Platform 2"));
        assert_eq!(summary.text, "Platform 2");
        assert_eq!(summary.variant_count, 2);
    }

    #[test]
    fn summary_preview_truncates() {
        let long = "x".repeat(80);
        let summary = RecentSummary::of(&announcement(1, &long));
        assert_eq!(summary.preview().chars().count(), SUMMARY_PREVIEW_CHARS + 3);
        assert!(summary.preview().ends_with("..."));
    }

    #[test]
    fn connectivity_changes_keep_content() {
        let mut s = session();
        s.record(announcement(1, "a"));
        s.set_connectivity(Connectivity::Disconnected);
        s.set_connectivity(Connectivity::Connected);
        assert!(s.last_announcement().is_some());
        assert_eq!(s.recent().len(), 1);
        assert_eq!(s.language().as_str(), "en");
    }

    #[test]
    fn adopt_does_not_touch_recent_history() {
        let mut s = session();
        s.adopt(announcement(4, "already on air"));
        assert!(s.recent().is_empty());
        assert_eq!(s.last_announcement().unwrap().id(), AnnouncementId::new(4));
    }

    #[test]
    fn reset_clears_content_but_not_preferences() {
        let mut s = session();
        s.set_language("ta".into());
        s.set_sound_enabled(false);
        s.record(announcement(1, "a"));
        s.reset();
        assert!(s.last_announcement().is_none());
        assert!(s.recent().is_empty());
        assert_eq!(s.language().as_str(), "ta");
        assert!(!s.sound_enabled());
    }

    #[test]
    fn setters_report_change() {
        let mut s = session();
        assert!(!s.set_language("en".into()));
        assert!(s.set_language("hi".into()));
        assert!(!s.set_sound_enabled(true));
        assert!(s.set_sound_enabled(false));
    }
}
