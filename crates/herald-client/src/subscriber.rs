//! Subscriber state machine: `idle -> receiving -> displaying`.

use herald_core::{Announcement, LanguageCode};
use tracing::{debug, info};

use crate::audio::{AudioCoordinator, PlayOutcome};
use crate::render::{self, Rendering};
use crate::session::{Connectivity, SessionContext};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubscriberState {
    #[default]
    Idle,
    Receiving,
    Displaying,
}

/// What handling one announcement produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub rendering: Rendering,
    pub status_line: String,
    /// `None` when sound is off or the variant has no clip.
    pub audio: Option<PlayOutcome>,
}

#[derive(Debug)]
pub struct SubscriberStateMachine {
    state: SubscriberState,
    rendering: Option<Rendering>,
    status_line: String,
    audio: AudioCoordinator,
}

impl SubscriberStateMachine {
    pub fn new(audio: AudioCoordinator) -> Self {
        Self {
            state: SubscriberState::Idle,
            rendering: None,
            status_line: render::connectivity_status(Connectivity::Connecting),
            audio,
        }
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn rendering(&self) -> Option<&Rendering> {
        self.rendering.as_ref()
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn audio(&self) -> &AudioCoordinator {
        &self.audio
    }

    pub fn unlock_audio(&mut self) {
        self.audio.unlock();
    }

    /// Explicit play of a stored clip. Ignores the sound preference.
    pub fn play_clip(&mut self, reference: &str) -> PlayOutcome {
        self.audio.play_requested(reference)
    }

    pub fn on_connectivity(&mut self, session: &SessionContext) -> &str {
        self.status_line = match (session.connectivity(), session.last_announcement()) {
            (Connectivity::Connected, Some(last)) => render::update_status(last),
            (connectivity, _) => render::connectivity_status(connectivity),
        };
        &self.status_line
    }

    pub fn on_new_announcement(
        &mut self,
        session: &mut SessionContext,
        announcement: Announcement,
    ) -> Delivery {
        self.state = SubscriberState::Receiving;
        info!(
            id = %announcement.id(),
            priority = %announcement.priority(),
            variants = announcement.variants().len(),
            replay = announcement.is_replay(),
            "announcement received"
        );

        let rendering = Rendering::of(&announcement, session.language());
        let clip = announcement
            .displayed_variant(session.language())
            .audio_reference
            .clone();
        self.status_line = render::update_status(&announcement);
        session.record(announcement);

        let audio = match clip {
            Some(reference) if session.sound_enabled() => Some(self.audio.play(&reference)),
            _ => None,
        };

        self.rendering = Some(rendering.clone());
        self.state = SubscriberState::Displaying;
        Delivery {
            rendering,
            status_line: self.status_line.clone(),
            audio,
        }
    }

    /// Converge on what the hub reports as current when joining. Renders
    /// without audio and without a recent-history entry. Returns `None` when
    /// the announcement is already the cached one.
    pub fn on_sync(
        &mut self,
        session: &mut SessionContext,
        announcement: Announcement,
    ) -> Option<Rendering> {
        if session
            .last_announcement()
            .is_some_and(|last| last.id() == announcement.id())
        {
            return None;
        }
        debug!(id = %announcement.id(), "adopting hub's current announcement");
        let rendering = Rendering::of(&announcement, session.language());
        self.status_line = render::update_status(&announcement);
        session.adopt(announcement);
        self.rendering = Some(rendering.clone());
        self.state = SubscriberState::Displaying;
        Some(rendering)
    }

    /// Re-render the cached announcement. `None` when nothing is cached or
    /// the preference did not change.
    pub fn set_language_preference(
        &mut self,
        session: &mut SessionContext,
        language: LanguageCode,
    ) -> Option<Rendering> {
        if !session.set_language(language) {
            return None;
        }
        let rendering = Rendering::of(session.last_announcement()?, session.language());
        self.rendering = Some(rendering.clone());
        Some(rendering)
    }

    pub fn set_sound_enabled(&mut self, session: &mut SessionContext, enabled: bool) {
        session.set_sound_enabled(enabled);
        if !enabled {
            self.audio.stop();
        }
    }

    pub fn reset(&mut self, session: &mut SessionContext) {
        session.reset();
        self.audio.stop();
        self.rendering = None;
        self.state = SubscriberState::Idle;
        self.on_connectivity(session);
    }
}
