//! In-memory announcement log, newest first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use herald_core::{Announcement, AnnouncementId, HistoryEntry, Priority, ProtocolError, Variant};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug)]
pub struct AnnouncementLog {
    entries: VecDeque<Announcement>,
    next_id: AnnouncementId,
    limit: usize,
}

impl Default for AnnouncementLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl AnnouncementLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: AnnouncementId::FIRST,
            limit: limit.max(1),
        }
    }

    /// Assign the next id and record the announcement. Ids keep increasing
    /// across evictions and clears.
    pub fn publish(
        &mut self,
        timestamp: DateTime<Utc>,
        priority: Priority,
        original_text: &str,
        variants: Vec<Variant>,
    ) -> Result<Announcement, ProtocolError> {
        let announcement =
            Announcement::new(self.next_id, timestamp, priority, original_text, variants)?;
        self.next_id = self.next_id.next();
        self.entries.push_front(announcement.clone());
        self.entries.truncate(self.limit);
        Ok(announcement)
    }

    pub fn get(&self, id: AnnouncementId) -> Option<&Announcement> {
        self.entries.iter().find(|a| a.id() == id)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.entries.iter().map(HistoryEntry::from_announcement).collect()
    }

    /// Returns how many entries were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
