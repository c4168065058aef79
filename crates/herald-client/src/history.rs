//! History browser: the hub's announcement log, replay and clear.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_core::{
    AnnouncementId, ClearHistoryResponse, ClientRequest, HistoryEntry, LanguageCode, QueryError,
};
use tracing::{info, warn};

/// Delay between a replay (or a new announcement) and the history refresh.
pub const REFRESH_DELAY: Duration = Duration::from_secs(1);

/// The hub's query surface.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// Most recent first.
    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, QueryError>;
    async fn clear_history(&self) -> Result<ClearHistoryResponse, QueryError>;
}

pub struct HistoryBrowser {
    api: Arc<dyn HistoryApi>,
    entries: Vec<HistoryEntry>,
}

impl HistoryBrowser {
    pub fn new(api: Arc<dyn HistoryApi>) -> Self {
        Self {
            api,
            entries: Vec::new(),
        }
    }

    pub fn api(&self) -> Arc<dyn HistoryApi> {
        Arc::clone(&self.api)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Clip for one variant of a loaded entry.
    pub fn clip(&self, id: AnnouncementId, language: &LanguageCode) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.clip(language))
    }

    pub async fn load_history(&mut self) -> Result<&[HistoryEntry], QueryError> {
        let result = self.api().fetch_history().await;
        self.apply_load(result)
    }

    /// Take a fetch result. Failures leave the current list as it was.
    pub fn apply_load(
        &mut self,
        result: Result<Vec<HistoryEntry>, QueryError>,
    ) -> Result<&[HistoryEntry], QueryError> {
        match result {
            Ok(entries) => {
                self.entries = entries;
                Ok(&self.entries)
            }
            Err(err) => {
                warn!(kind = err.error_kind(), error = %err, "history load failed");
                Err(err)
            }
        }
    }

    /// Request for the hub to re-deliver `id`. Touches no local state.
    pub fn replay(&self, id: AnnouncementId) -> ClientRequest {
        info!(%id, "replay requested");
        ClientRequest::replay(id)
    }

    /// Clear the hub's log after `confirm` agrees. A declined confirmation
    /// sends nothing and yields [`QueryError::Cancelled`].
    pub async fn clear_history(
        &mut self,
        confirm: impl FnOnce() -> bool,
    ) -> Result<ClearHistoryResponse, QueryError> {
        if !confirm() {
            return Err(QueryError::Cancelled);
        }
        let result = self.api().clear_history().await;
        self.apply_clear(result)
    }

    /// The local view empties only once the hub confirms.
    pub fn apply_clear(
        &mut self,
        result: Result<ClearHistoryResponse, QueryError>,
    ) -> Result<ClearHistoryResponse, QueryError> {
        let outcome = match result {
            Ok(resp) if resp.success => {
                self.entries.clear();
                info!(message = %resp.message, "history cleared");
                return Ok(resp);
            }
            Ok(resp) => QueryError::Refused(resp.message),
            Err(err) => err,
        };
        warn!(kind = outcome.error_kind(), error = %outcome, "history clear failed");
        Err(outcome)
    }
}

impl std::fmt::Debug for HistoryBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryBrowser")
            .field("entries", &self.entries.len())
            .finish()
    }
}
