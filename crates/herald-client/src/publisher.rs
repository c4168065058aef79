//! Publisher submission controller.
//!
//! Holds the text field, validates submissions, tracks the single in-flight
//! broadcast and owns the success/error banner. Banner expiry is scheduled
//! by the runtime; this type only says how long a banner lives.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_core::wire::BroadcastRequest;
use herald_core::{ClientRequest, LanguageCode, Priority, ValidationError};
use herald_store::{DraftRepo, StoreError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub const SUCCESS_BANNER_TTL: Duration = Duration::from_secs(3);
pub const ERROR_BANNER_TTL: Duration = Duration::from_secs(5);
/// Drafts longer than this are flagged in the counter but still sendable.
pub const CHAR_WARNING_LIMIT: usize = 500;

/// Durable home of the unsent text. The controller is its only writer.
pub trait DraftStore: Send {
    fn load(&self) -> Result<Option<String>, StoreError>;
    fn save(&self, text: &str) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

impl DraftStore for DraftRepo {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(DraftRepo::load(self)?.map(|row| row.body))
    }

    fn save(&self, text: &str) -> Result<(), StoreError> {
        DraftRepo::save(self, text)
    }

    fn clear(&self) -> Result<(), StoreError> {
        DraftRepo::clear(self)
    }
}

/// Process-local store. Clones share contents, which lets tests simulate a
/// restart by building a second controller on a clone.
#[derive(Clone, Debug, Default)]
pub struct MemoryDraftStore {
    text: Arc<Mutex<Option<String>>>,
}

impl DraftStore for MemoryDraftStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.text.lock().clone())
    }

    fn save(&self, text: &str) -> Result<(), StoreError> {
        *self.text.lock() = Some(text.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.text.lock() = None;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

impl Banner {
    pub fn ttl(&self) -> Duration {
        match self.kind {
            BannerKind::Success => SUCCESS_BANNER_TTL,
            BannerKind::Error => ERROR_BANNER_TTL,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Ready to go out on the real-time channel.
    Send(ClientRequest),
    /// A broadcast is already awaiting its answer; nothing happened.
    InFlight,
}

/// Counter line under the text field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DraftStatus {
    pub chars: usize,
    pub over_limit: bool,
    /// Target languages currently selected.
    pub languages: usize,
}

pub struct SubmissionController {
    store: Box<dyn DraftStore>,
    text: String,
    selected: Vec<LanguageCode>,
    in_flight: bool,
    validation: Option<ValidationError>,
    banner: Option<Banner>,
    broadcast_count: u64,
    last_broadcast: Option<DateTime<Utc>>,
}

impl SubmissionController {
    /// Build a controller, restoring any saved draft verbatim.
    pub fn load(store: Box<dyn DraftStore>) -> Self {
        let text = match store.load() {
            Ok(Some(text)) => {
                debug!(chars = text.chars().count(), "draft restored");
                text
            }
            Ok(None) => String::new(),
            Err(err) => {
                warn!(error = %err, "failed to load draft");
                String::new()
            }
        };
        Self {
            store,
            text,
            selected: Vec::new(),
            in_flight: false,
            validation: None,
            banner: None,
            broadcast_count: 0,
            last_broadcast: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Unicode scalar count of the field.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn selected_languages(&self) -> &[LanguageCode] {
        &self.selected
    }

    pub fn status(&self) -> DraftStatus {
        let chars = self.char_count();
        DraftStatus {
            chars,
            over_limit: chars > CHAR_WARNING_LIMIT,
            languages: self.selected.len(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        self.validation.as_ref()
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn broadcast_count(&self) -> u64 {
        self.broadcast_count
    }

    pub fn last_broadcast(&self) -> Option<DateTime<Utc>> {
        self.last_broadcast
    }

    /// Replace the field contents. Persisted even while in flight.
    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.validation = None;
        self.persist();
    }

    /// Replace the target selection. Duplicates collapse, order is kept.
    pub fn select_languages(&mut self, languages: Vec<LanguageCode>) {
        let mut selected: Vec<LanguageCode> = Vec::with_capacity(languages.len());
        for code in languages {
            if !selected.contains(&code) {
                selected.push(code);
            }
        }
        self.selected = selected;
        self.validation = None;
    }

    pub fn submit(
        &mut self,
        text: &str,
        priority: Option<Priority>,
        languages: &[LanguageCode],
    ) -> Result<SubmitOutcome, ValidationError> {
        if self.in_flight {
            debug!("submit ignored, broadcast in flight");
            return Ok(SubmitOutcome::InFlight);
        }
        if text != self.text {
            self.edit(text);
        }
        if languages != self.selected.as_slice() {
            self.select_languages(languages.to_vec());
        }

        let trimmed = self.text.trim();
        let rejected = if trimmed.is_empty() {
            Some(ValidationError::EmptyText)
        } else if self.selected.is_empty() {
            Some(ValidationError::NoLanguages)
        } else {
            None
        };
        if let Some(err) = rejected {
            self.validation = Some(err.clone());
            return Err(err);
        }

        self.validation = None;
        self.in_flight = true;
        let request = ClientRequest::BroadcastAnnouncement(BroadcastRequest {
            text: trimmed.to_owned(),
            priority: priority.unwrap_or_default(),
            languages: self.selected.clone(),
        });
        info!(
            priority = %priority.unwrap_or_default(),
            languages = self.selected.len(),
            "broadcast submitted"
        );
        Ok(SubmitOutcome::Send(request))
    }

    /// Hub acknowledged the broadcast. Returns the banner to schedule, or
    /// `None` when no broadcast was pending.
    pub fn on_success(&mut self, message: String, at: DateTime<Utc>) -> Option<&Banner> {
        if !self.in_flight {
            debug!("broadcast_success with nothing in flight, ignoring");
            return None;
        }
        self.in_flight = false;
        self.text.clear();
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "failed to clear draft");
        }
        self.broadcast_count += 1;
        self.last_broadcast = Some(at);
        self.banner = Some(Banner {
            kind: BannerKind::Success,
            message,
        });
        self.banner.as_ref()
    }

    /// Hub refused or the send failed. The message is shown verbatim.
    pub fn on_error(&mut self, message: String) -> &Banner {
        self.in_flight = false;
        self.banner.insert(Banner {
            kind: BannerKind::Error,
            message,
        })
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.text) {
            warn!(error = %err, "failed to save draft");
        }
    }
}

impl std::fmt::Debug for SubmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionController")
            .field("chars", &self.char_count())
            .field("in_flight", &self.in_flight)
            .field("validation", &self.validation)
            .field("banner", &self.banner)
            .field("broadcast_count", &self.broadcast_count)
            .finish()
    }
}
