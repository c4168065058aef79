use chrono::Utc;
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;

/// Slot used by the publisher's announcement text field.
pub const ANNOUNCEMENT_SLOT: &str = "announcement";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DraftRow {
    pub body: String,
    pub updated_at: String,
}

/// Durable storage for unsent publisher text.
#[derive(Clone)]
pub struct DraftRepo {
    db: Database,
    slot: String,
}

impl DraftRepo {
    pub fn new(db: Database) -> Self {
        Self::for_slot(db, ANNOUNCEMENT_SLOT)
    }

    pub fn for_slot(db: Database, slot: impl Into<String>) -> Self {
        Self {
            db,
            slot: slot.into(),
        }
    }

    /// Overwrite the stored draft.
    #[instrument(skip(self, body), fields(slot = %self.slot, chars = body.chars().count()))]
    pub fn save(&self, body: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO drafts (slot, body, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(slot) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                rusqlite::params![self.slot, body, now],
            )?;
            Ok(())
        })
    }

    pub fn load(&self) -> Result<Option<DraftRow>, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn.query_row(
                "SELECT body, updated_at FROM drafts WHERE slot = ?1",
                [&self.slot],
                |row| {
                    Ok(DraftRow {
                        body: row.get(0)?,
                        updated_at: row.get(1)?,
                    })
                },
            );
            match row {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    #[instrument(skip(self), fields(slot = %self.slot))]
    pub fn clear(&self) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM drafts WHERE slot = ?1", [&self.slot])?;
            Ok(())
        })
    }
}
