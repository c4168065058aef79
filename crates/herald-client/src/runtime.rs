//! The client event loop.
//!
//! Transport signals, operator commands, timer expiries and query
//! completions all arrive as [`ClientEvent`]s on one channel and are handled
//! one at a time by [`ClientRuntime::handle`]. Network calls run in spawned
//! tasks and report back with another event, so no handler ever awaits.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;

use herald_core::wire::{BroadcastAck, ConnectionStatus, NewAnnouncement};
use herald_core::{
    Announcement, AnnouncementId, ClearHistoryResponse, ClientRequest, HistoryEntry, HubEvent,
    LanguageCode, PlaybackError, Priority, QueryError, TransportError, ValidationError,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::{AudioCoordinator, PlayOutcome};
use crate::connection::InboundEvent;
use crate::history::{HistoryApi, HistoryBrowser, REFRESH_DELAY};
use crate::publisher::{Banner, DraftStatus, SubmissionController, SubmitOutcome};
use crate::render::{self, Rendering};
use crate::session::{Connectivity, Preferences, RecentSummary, SessionContext};
use crate::subscriber::SubscriberStateMachine;
use crate::timer::TimerSlot;

#[derive(Debug)]
pub enum ClientEvent {
    Inbound(InboundEvent),
    Command(Command),
    Timer(TimerEvent),
    HistoryLoaded(Result<Vec<HistoryEntry>, QueryError>),
    HistoryCleared(Result<ClearHistoryResponse, QueryError>),
}

/// Operator input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// First explicit interaction; allows audio from here on.
    Unlock,
    SetLanguage(LanguageCode),
    SetSound(bool),
    ToggleSound,
    EditDraft(String),
    SelectLanguages(Vec<LanguageCode>),
    Submit {
        text: String,
        priority: Option<Priority>,
        languages: Vec<LanguageCode>,
    },
    LoadHistory,
    Replay(AnnouncementId),
    /// Play one variant's clip from the loaded history.
    PlayHistoryEntry {
        id: AnnouncementId,
        language: LanguageCode,
    },
    ClearHistory { confirmed: bool },
    /// Drop cached announcements and recent history.
    ResetSession,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    BannerExpired(u64),
    HistoryRefresh(u64),
}

/// Blocking notices for the operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    QueryFailed(QueryError),
    HistoryCleared(String),
    ReplayRequested(AnnouncementId),
    /// Hub error that is not about a pending broadcast.
    Rejected(String),
    /// An explicit history play could not start.
    PlaybackFailed(PlaybackError),
}

/// What the view layer should redraw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiUpdate {
    Connectivity {
        state: Connectivity,
        status_line: String,
    },
    Announcement {
        rendering: Rendering,
        status_line: String,
    },
    Rerendered(Rendering),
    RecentHistory(Vec<RecentSummary>),
    Banner(Option<Banner>),
    Validation(Option<ValidationError>),
    Draft { text: String, status: DraftStatus },
    History(Vec<HistoryEntry>),
    Notice(Notice),
}

/// Request sent on the real-time channel whose answer has not arrived yet.
/// The hub answers in request order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Awaiting {
    Broadcast,
    Replay(AnnouncementId),
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub preferences: Preferences,
}

impl RuntimeConfig {
    pub fn new(language: impl Into<LanguageCode>, sound_enabled: bool) -> Self {
        Self {
            preferences: Preferences::new(language, sound_enabled),
        }
    }
}

pub struct ClientRuntime {
    session: SessionContext,
    subscriber: Option<SubscriberStateMachine>,
    publisher: Option<SubmissionController>,
    history: Option<HistoryBrowser>,
    /// History playback when there is no subscriber.
    player: Option<AudioCoordinator>,
    awaiting: VecDeque<Awaiting>,
    banner_timer: TimerSlot,
    refresh_timer: TimerSlot,
    loading: bool,
    reload_pending: bool,
    clearing: bool,
    loaded_once: bool,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: mpsc::UnboundedReceiver<ClientEvent>,
    outbound: mpsc::UnboundedSender<ClientRequest>,
    ui: mpsc::UnboundedSender<UiUpdate>,
}

impl ClientRuntime {
    /// A runtime with no roles. `outbound` feeds the connection task; `ui`
    /// receives redraw instructions.
    pub fn new(
        config: RuntimeConfig,
        outbound: mpsc::UnboundedSender<ClientRequest>,
        ui: mpsc::UnboundedSender<UiUpdate>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session: SessionContext::new(config.preferences),
            subscriber: None,
            publisher: None,
            history: None,
            player: None,
            awaiting: VecDeque::new(),
            banner_timer: TimerSlot::new("banner"),
            refresh_timer: TimerSlot::new("history_refresh"),
            loading: false,
            reload_pending: false,
            clearing: false,
            loaded_once: false,
            events_tx,
            events_rx,
            outbound,
            ui,
        }
    }

    pub fn with_subscriber(mut self, audio: AudioCoordinator) -> Self {
        self.subscriber = Some(SubscriberStateMachine::new(audio));
        self
    }

    pub fn with_publisher(mut self, controller: SubmissionController) -> Self {
        self.publisher = Some(controller);
        self
    }

    pub fn with_history(mut self, api: Arc<dyn HistoryApi>) -> Self {
        self.history = Some(HistoryBrowser::new(api));
        self
    }

    /// Audio for history playback in a runtime without a subscriber role.
    pub fn with_history_player(mut self, audio: AudioCoordinator) -> Self {
        self.player = Some(audio);
        self
    }

    /// Handle for feeding events from other tasks.
    pub fn events(&self) -> mpsc::UnboundedSender<ClientEvent> {
        self.events_tx.clone()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn subscriber(&self) -> Option<&SubscriberStateMachine> {
        self.subscriber.as_ref()
    }

    pub fn publisher(&self) -> Option<&SubmissionController> {
        self.publisher.as_ref()
    }

    pub fn history(&self) -> Option<&HistoryBrowser> {
        self.history.as_ref()
    }

    pub async fn run(mut self) {
        if let Some(publisher) = &self.publisher {
            if !publisher.text().is_empty() {
                self.emit(draft_update(publisher));
            }
        }
        while self.step().await {}
        info!("client runtime stopped");
    }

    /// Wait for and handle one event. `false` once the loop should stop.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle(event).is_continue(),
            None => false,
        }
    }

    pub fn handle(&mut self, event: ClientEvent) -> ControlFlow<()> {
        match event {
            ClientEvent::Inbound(inbound) => self.on_inbound(inbound),
            ClientEvent::Command(Command::Shutdown) => {
                debug!("shutdown requested");
                return ControlFlow::Break(());
            }
            ClientEvent::Command(command) => self.on_command(command),
            ClientEvent::Timer(TimerEvent::BannerExpired(generation)) => {
                if self.banner_timer.fire(generation) {
                    if let Some(publisher) = &mut self.publisher {
                        publisher.dismiss_banner();
                    }
                    self.emit(UiUpdate::Banner(None));
                }
            }
            ClientEvent::Timer(TimerEvent::HistoryRefresh(generation)) => {
                if self.refresh_timer.fire(generation) {
                    self.start_load();
                }
            }
            ClientEvent::HistoryLoaded(result) => self.on_history_loaded(result),
            ClientEvent::HistoryCleared(result) => self.on_history_cleared(result),
        }
        ControlFlow::Continue(())
    }

    // ── Transport ───────────────────────────────────────────────────

    fn on_inbound(&mut self, inbound: InboundEvent) {
        match inbound {
            InboundEvent::Connected => {
                self.set_connectivity(Connectivity::Connected);
                if self.history.is_some() && !self.loaded_once {
                    self.start_load();
                }
            }
            InboundEvent::Disconnected { reason } => {
                debug!(%reason, "transport disconnected");
                // Replay answers die with the socket. A broadcast stays
                // pending until the publisher hears back.
                self.awaiting.retain(|a| *a == Awaiting::Broadcast);
                self.set_connectivity(Connectivity::Disconnected);
            }
            InboundEvent::Frame(event) => self.on_hub_event(event),
            InboundEvent::SendFailed { request, error } => {
                warn!(event = request.event_name(), kind = error.error_kind(), error = %error, "request not delivered");
                match request {
                    ClientRequest::BroadcastAnnouncement(_) => {
                        self.settle(Awaiting::Broadcast);
                        self.broadcast_failed(error);
                    }
                    ClientRequest::ReplayAnnouncement(replay) => {
                        self.settle(Awaiting::Replay(replay.id));
                        self.emit(UiUpdate::Notice(Notice::Rejected(error.to_string())));
                    }
                }
            }
        }
    }

    fn set_connectivity(&mut self, connectivity: Connectivity) {
        if self.session.connectivity() == connectivity {
            return;
        }
        self.session.set_connectivity(connectivity);
        let status_line = match &mut self.subscriber {
            Some(subscriber) => subscriber.on_connectivity(&self.session).to_owned(),
            None => render::connectivity_status(connectivity),
        };
        self.emit(UiUpdate::Connectivity {
            state: connectivity,
            status_line,
        });
    }

    fn on_hub_event(&mut self, event: HubEvent) {
        debug!(event = event.event_name(), "hub event");
        match event {
            HubEvent::ConnectionStatus(status) => self.on_connection_status(status),
            HubEvent::BroadcastSuccess(ack) => self.on_broadcast_success(ack),
            HubEvent::Error(payload) => self.on_hub_error(payload.message),
            HubEvent::NewAnnouncement(payload) => self.on_new_announcement(payload),
        }
    }

    fn on_connection_status(&mut self, status: ConnectionStatus) {
        info!(status = %status.status, message = %status.message, "hub status");
        let (Some(subscriber), Some(latest)) = (&mut self.subscriber, status.latest) else {
            return;
        };
        let announcement = match Announcement::try_from(latest) {
            Ok(a) => a,
            Err(err) => {
                warn!(kind = "protocol", error = %err, "dropping invalid current announcement");
                return;
            }
        };
        if let Some(rendering) = subscriber.on_sync(&mut self.session, announcement) {
            let status_line = subscriber.status_line().to_owned();
            self.emit(UiUpdate::Announcement {
                rendering,
                status_line,
            });
        }
    }

    fn on_broadcast_success(&mut self, ack: BroadcastAck) {
        self.settle(Awaiting::Broadcast);
        let Some(publisher) = &mut self.publisher else {
            return;
        };
        let Some(banner) = publisher.on_success(ack.message, ack.timestamp).cloned() else {
            return;
        };
        info!(count = publisher.broadcast_count(), "broadcast acknowledged");
        let draft = draft_update(publisher);
        self.arm_banner(&banner);
        self.emit(draft);
        self.emit(UiUpdate::Banner(Some(banner)));
    }

    /// Errors carry no request id; the oldest unanswered request owns it.
    fn on_hub_error(&mut self, message: String) {
        match self.awaiting.pop_front() {
            Some(Awaiting::Broadcast) => self.broadcast_failed(TransportError::Rejected(message)),
            Some(Awaiting::Replay(id)) => {
                warn!(%id, message = %message, "replay refused");
                self.emit(UiUpdate::Notice(Notice::Rejected(message)));
            }
            None => {
                warn!(message = %message, "hub reported an error");
                self.emit(UiUpdate::Notice(Notice::Rejected(message)));
            }
        }
    }

    fn broadcast_failed(&mut self, error: TransportError) {
        warn!(kind = error.error_kind(), error = %error, "broadcast failed");
        let Some(publisher) = &mut self.publisher else {
            self.emit(UiUpdate::Notice(Notice::Rejected(error.to_string())));
            return;
        };
        let banner = publisher.on_error(error.to_string()).clone();
        self.arm_banner(&banner);
        self.emit(UiUpdate::Banner(Some(banner)));
    }

    /// Drop the oldest pending entry equal to `answered`.
    fn settle(&mut self, answered: Awaiting) {
        if let Some(pos) = self.awaiting.iter().position(|a| *a == answered) {
            let _ = self.awaiting.remove(pos);
        }
    }

    fn arm_banner(&mut self, banner: &Banner) {
        let _ = self.banner_timer.arm(banner.ttl(), &self.events_tx, |generation| {
            ClientEvent::Timer(TimerEvent::BannerExpired(generation))
        });
    }

    fn on_new_announcement(&mut self, payload: NewAnnouncement) {
        if payload.is_replay {
            self.settle(Awaiting::Replay(payload.id));
        }
        let announcement = match Announcement::try_from(payload) {
            Ok(a) => a,
            Err(err) => {
                warn!(kind = "protocol", error = %err, "dropping invalid announcement");
                return;
            }
        };

        if self.history.is_some() {
            self.schedule_refresh();
        }

        let Some(subscriber) = &mut self.subscriber else {
            return;
        };
        let delivery = subscriber.on_new_announcement(&mut self.session, announcement);
        self.emit(UiUpdate::Announcement {
            rendering: delivery.rendering,
            status_line: delivery.status_line,
        });
        self.emit(UiUpdate::RecentHistory(self.session.recent().to_vec()));
    }

    // ── Commands ────────────────────────────────────────────────────

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Unlock => {
                if let Some(subscriber) = &mut self.subscriber {
                    subscriber.unlock_audio();
                }
            }
            Command::SetLanguage(language) => match &mut self.subscriber {
                Some(subscriber) => {
                    if let Some(rendering) =
                        subscriber.set_language_preference(&mut self.session, language)
                    {
                        self.emit(UiUpdate::Rerendered(rendering));
                    }
                }
                None => {
                    let _ = self.session.set_language(language);
                }
            },
            Command::SetSound(enabled) => self.set_sound(enabled),
            Command::ToggleSound => self.set_sound(!self.session.sound_enabled()),
            Command::EditDraft(text) => {
                if let Some(publisher) = &mut self.publisher {
                    publisher.edit(text);
                    let update = draft_update(publisher);
                    self.emit(update);
                    self.emit(UiUpdate::Validation(None));
                }
            }
            Command::SelectLanguages(languages) => {
                if let Some(publisher) = &mut self.publisher {
                    publisher.select_languages(languages);
                    let update = draft_update(publisher);
                    self.emit(update);
                }
            }
            Command::Submit {
                text,
                priority,
                languages,
            } => self.submit(&text, priority, &languages),
            Command::LoadHistory => self.start_load(),
            Command::Replay(id) => {
                let Some(history) = &self.history else {
                    return;
                };
                let request = history.replay(id);
                if self.outbound.send(request).is_err() {
                    warn!(%id, "connection task gone, replay not sent");
                    self.emit(UiUpdate::Notice(Notice::Rejected(
                        TransportError::NotConnected.to_string(),
                    )));
                    return;
                }
                self.awaiting.push_back(Awaiting::Replay(id));
                self.schedule_refresh();
                self.emit(UiUpdate::Notice(Notice::ReplayRequested(id)));
            }
            Command::PlayHistoryEntry { id, language } => self.play_history_entry(id, &language),
            Command::ClearHistory { confirmed } => self.start_clear(confirmed),
            Command::ResetSession => {
                match &mut self.subscriber {
                    Some(subscriber) => subscriber.reset(&mut self.session),
                    None => self.session.reset(),
                }
                self.emit(UiUpdate::RecentHistory(Vec::new()));
            }
            Command::Shutdown => {}
        }
    }

    fn set_sound(&mut self, enabled: bool) {
        match &mut self.subscriber {
            Some(subscriber) => subscriber.set_sound_enabled(&mut self.session, enabled),
            None => {
                let _ = self.session.set_sound_enabled(enabled);
            }
        }
        debug!(enabled, "sound preference changed");
    }

    fn submit(&mut self, text: &str, priority: Option<Priority>, languages: &[LanguageCode]) {
        let Some(publisher) = &mut self.publisher else {
            return;
        };
        match publisher.submit(text, priority, languages) {
            Ok(SubmitOutcome::Send(request)) => {
                self.emit(UiUpdate::Validation(None));
                if self.outbound.send(request).is_err() {
                    self.broadcast_failed(TransportError::NotConnected);
                } else {
                    self.awaiting.push_back(Awaiting::Broadcast);
                }
            }
            Ok(SubmitOutcome::InFlight) => {}
            Err(err) => self.emit(UiUpdate::Validation(Some(err))),
        }
    }

    fn play_history_entry(&mut self, id: AnnouncementId, language: &LanguageCode) {
        let Some(history) = &self.history else {
            return;
        };
        let Some(reference) = history.clip(id, language).map(str::to_owned) else {
            debug!(%id, %language, "no clip to play");
            self.emit(UiUpdate::Notice(Notice::PlaybackFailed(PlaybackError::NoClip {
                id: id.to_string(),
                language: language.to_string(),
            })));
            return;
        };
        let outcome = match (&mut self.subscriber, &mut self.player) {
            (Some(subscriber), _) => subscriber.play_clip(&reference),
            (None, Some(player)) => player.play_requested(&reference),
            (None, None) => PlayOutcome::Failed(PlaybackError::Unavailable(
                "no audio player configured".into(),
            )),
        };
        match outcome {
            PlayOutcome::Started(reference) => {
                info!(%id, %language, %reference, "history clip playing");
            }
            PlayOutcome::Failed(err) => self.emit(UiUpdate::Notice(Notice::PlaybackFailed(err))),
            PlayOutcome::Locked => {}
        }
    }

    // ── History queries ─────────────────────────────────────────────

    fn schedule_refresh(&mut self) {
        let _ = self
            .refresh_timer
            .arm_if_idle(REFRESH_DELAY, &self.events_tx, |generation| {
                ClientEvent::Timer(TimerEvent::HistoryRefresh(generation))
            });
    }

    fn start_load(&mut self) {
        let Some(history) = &self.history else {
            return;
        };
        if self.loading {
            self.reload_pending = true;
            return;
        }
        self.loading = true;
        let api = history.api();
        let tx = self.events_tx.clone();
        let _ = tokio::spawn(async move {
            let result = api.fetch_history().await;
            let _ = tx.send(ClientEvent::HistoryLoaded(result));
        });
    }

    fn on_history_loaded(&mut self, result: Result<Vec<HistoryEntry>, QueryError>) {
        self.loading = false;
        let Some(history) = &mut self.history else {
            return;
        };
        let update = match history.apply_load(result) {
            Ok(entries) => {
                self.loaded_once = true;
                UiUpdate::History(entries.to_vec())
            }
            Err(err) => UiUpdate::Notice(Notice::QueryFailed(err)),
        };
        self.emit(update);
        if std::mem::take(&mut self.reload_pending) {
            self.start_load();
        }
    }

    fn start_clear(&mut self, confirmed: bool) {
        let Some(history) = &self.history else {
            return;
        };
        if !confirmed {
            debug!("clear declined");
            self.emit(UiUpdate::Notice(Notice::QueryFailed(QueryError::Cancelled)));
            return;
        }
        if self.clearing {
            return;
        }
        self.clearing = true;
        let api = history.api();
        let tx = self.events_tx.clone();
        let _ = tokio::spawn(async move {
            let result = api.clear_history().await;
            let _ = tx.send(ClientEvent::HistoryCleared(result));
        });
    }

    fn on_history_cleared(&mut self, result: Result<ClearHistoryResponse, QueryError>) {
        self.clearing = false;
        let Some(history) = &mut self.history else {
            return;
        };
        match history.apply_clear(result) {
            Ok(resp) => {
                self.emit(UiUpdate::History(Vec::new()));
                self.emit(UiUpdate::Notice(Notice::HistoryCleared(resp.message)));
            }
            Err(err) => self.emit(UiUpdate::Notice(Notice::QueryFailed(err))),
        }
    }

    fn emit(&self, update: UiUpdate) {
        if self.ui.send(update).is_err() {
            debug!("view closed, dropping update");
        }
    }
}

fn draft_update(publisher: &SubmissionController) -> UiUpdate {
    UiUpdate::Draft {
        text: publisher.text().to_owned(),
        status: publisher.status(),
    }
}

impl std::fmt::Debug for ClientRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRuntime")
            .field("session", &self.session)
            .field("subscriber", &self.subscriber.is_some())
            .field("publisher", &self.publisher.is_some())
            .field("history", &self.history.is_some())
            .field("awaiting", &self.awaiting)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingSink;
    use crate::history::tests::{entry, ScriptedApi};
    use crate::publisher::{BannerKind, MemoryDraftStore};
    use chrono::{TimeZone, Utc};
    use herald_core::wire::HubErrorPayload;
    use herald_core::Variant;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Harness {
        rt: ClientRuntime,
        outbound: mpsc::UnboundedReceiver<ClientRequest>,
        ui: mpsc::UnboundedReceiver<UiUpdate>,
        sink: RecordingSink,
        api: Arc<ScriptedApi>,
    }

    impl Harness {
        fn new(sound: bool) -> Self {
            let (out_tx, outbound) = mpsc::unbounded_channel();
            let (ui_tx, ui) = mpsc::unbounded_channel();
            let sink = RecordingSink::new();
            let api = Arc::new(ScriptedApi::default());
            let rt = ClientRuntime::new(RuntimeConfig::new("en", sound), out_tx, ui_tx)
                .with_subscriber(AudioCoordinator::new(Box::new(sink.clone())))
                .with_publisher(SubmissionController::load(Box::new(MemoryDraftStore::default())))
                .with_history(api.clone());
            Self {
                rt,
                outbound,
                ui,
                sink,
                api,
            }
        }

        fn command(&mut self, command: Command) {
            let _ = self.rt.handle(ClientEvent::Command(command));
        }

        fn frame(&mut self, event: HubEvent) {
            let _ = self.rt.handle(ClientEvent::Inbound(InboundEvent::Frame(event)));
        }

        fn drain_ui(&mut self) -> Vec<UiUpdate> {
            let mut updates = Vec::new();
            while let Ok(update) = self.ui.try_recv() {
                updates.push(update);
            }
            updates
        }

        fn submit(&mut self, text: &str) {
            self.command(Command::Submit {
                text: text.into(),
                priority: None,
                languages: vec!["en".into()],
            });
        }

        fn ack(&mut self) {
            self.frame(HubEvent::BroadcastSuccess(BroadcastAck {
                message: "Announcement broadcasted to 1 languages".into(),
                timestamp: Utc::now(),
            }));
        }
    }

    fn announcement(id: u64) -> NewAnnouncement {
        NewAnnouncement {
            id: AnnouncementId::new(id),
            variants: vec![
                Variant::new("en", "English", "🇬🇧", format!("Notice {id}"))
                    .with_audio(format!("/static/audio/announcement_en_{id}.mp3")),
                Variant::new("fr", "Français (French)", "🇫🇷", format!("Avis {id}")),
            ],
            priority: Priority::Warning,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            original_text: format!("Notice {id}"),
            is_replay: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_banner_clears_after_three_seconds() {
        let mut h = Harness::new(true);
        h.submit("Gate 3 closing");
        assert!(h.outbound.try_recv().is_ok());
        h.ack();
        assert_eq!(
            h.rt.publisher().unwrap().banner().map(|b| b.kind),
            Some(BannerKind::Success)
        );

        let start = Instant::now();
        assert!(h.rt.step().await);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(h.rt.publisher().unwrap().banner().is_none());
        assert_eq!(h.drain_ui().last(), Some(&UiUpdate::Banner(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_banner_cancels_older_auto_clear() {
        let mut h = Harness::new(true);
        let start = Instant::now();
        h.submit("first");
        h.ack();
        tokio::time::advance(Duration::from_secs(2)).await;
        h.submit("second");
        h.frame(HubEvent::Error(HubErrorPayload {
            message: "Unsupported language: xx".into(),
        }));

        assert!(h.rt.step().await);
        // Only the error banner's expiry is delivered, 5 s after it appeared.
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert!(h.rt.publisher().unwrap().banner().is_none());
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_sends_nothing() {
        let mut h = Harness::new(true);
        h.submit("Platform change");
        h.submit("Platform change");
        assert!(h.outbound.try_recv().is_ok());
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn validation_error_is_reported_and_nothing_sent() {
        let mut h = Harness::new(true);
        h.command(Command::Submit {
            text: "hello".into(),
            priority: Some(Priority::Emergency),
            languages: vec![],
        });
        assert!(h.outbound.try_recv().is_err());
        assert!(h
            .drain_ui()
            .contains(&UiUpdate::Validation(Some(ValidationError::NoLanguages))));
    }

    #[tokio::test]
    async fn sound_off_renders_without_playback() {
        let mut h = Harness::new(false);
        h.command(Command::Unlock);
        h.frame(HubEvent::NewAnnouncement(announcement(1)));
        assert!(h.sink.calls().is_empty());
        let rendering = h.rt.subscriber().unwrap().rendering().unwrap();
        assert_eq!(rendering.displayed.text, "Notice 1");
        assert_eq!(rendering.displayed.priority, Priority::Warning);
    }

    #[tokio::test]
    async fn playback_waits_for_unlock() {
        let mut h = Harness::new(true);
        h.frame(HubEvent::NewAnnouncement(announcement(1)));
        assert!(h.sink.calls().is_empty());
        h.command(Command::Unlock);
        h.frame(HubEvent::NewAnnouncement(announcement(2)));
        assert_eq!(
            h.sink.starts(),
            vec!["/static/audio/announcement_en_2.mp3".to_string()]
        );
    }

    #[tokio::test]
    async fn language_change_without_cache_emits_nothing() {
        let mut h = Harness::new(true);
        h.command(Command::SetLanguage("fr".into()));
        assert!(h.drain_ui().is_empty());
        assert_eq!(h.rt.session().language().as_str(), "fr");
    }

    #[tokio::test]
    async fn language_change_rerenders_cached() {
        let mut h = Harness::new(true);
        h.frame(HubEvent::NewAnnouncement(announcement(1)));
        let _ = h.drain_ui();
        h.command(Command::SetLanguage("fr".into()));
        let updates = h.drain_ui();
        assert_eq!(updates.len(), 1);
        let UiUpdate::Rerendered(r) = &updates[0] else {
            panic!("expected a re-render");
        };
        assert_eq!(r.displayed.text, "Avis 1");
        assert_eq!(h.rt.session().recent().len(), 1);
    }

    #[tokio::test]
    async fn invalid_announcement_is_dropped() {
        let mut h = Harness::new(true);
        let mut bad = announcement(1);
        bad.variants.push(bad.variants[0].clone());
        h.frame(HubEvent::NewAnnouncement(bad));
        assert!(h.rt.session().last_announcement().is_none());
        assert!(h.drain_ui().is_empty());
    }

    #[tokio::test]
    async fn reconnect_keeps_cached_content() {
        let mut h = Harness::new(true);
        h.frame(HubEvent::NewAnnouncement(announcement(1)));
        let _ = h.rt.handle(ClientEvent::Inbound(InboundEvent::Disconnected {
            reason: "reset".into(),
        }));
        let _ = h.rt.handle(ClientEvent::Inbound(InboundEvent::Connected));
        assert_eq!(h.rt.session().connectivity(), Connectivity::Connected);
        assert!(h.rt.session().last_announcement().is_some());
        assert_eq!(h.rt.session().recent().len(), 1);
    }

    #[tokio::test]
    async fn connection_status_latest_converges_without_history_entry() {
        let mut h = Harness::new(true);
        h.command(Command::Unlock);
        h.frame(HubEvent::ConnectionStatus(ConnectionStatus {
            status: "connected".into(),
            message: "Connected to PA System".into(),
            timestamp: Utc::now(),
            latest: Some(announcement(4)),
        }));
        assert_eq!(
            h.rt.session().last_announcement().map(Announcement::id),
            Some(AnnouncementId::new(4))
        );
        assert!(h.rt.session().recent().is_empty());
        assert!(h.sink.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_announcements_schedule_one_refresh() {
        let mut h = Harness::new(true);
        h.api.loads.lock().push(Ok(vec![entry(2), entry(1)]));
        let start = Instant::now();
        h.frame(HubEvent::NewAnnouncement(announcement(1)));
        h.frame(HubEvent::NewAnnouncement(announcement(2)));

        assert!(h.rt.step().await); // refresh timer
        assert!(start.elapsed() >= REFRESH_DELAY);
        assert!(h.rt.step().await); // load completion
        assert_eq!(h.api.load_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.rt.history().unwrap().entries().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_sends_request_and_refreshes() {
        let mut h = Harness::new(true);
        h.command(Command::Replay(AnnouncementId::new(7)));
        assert_eq!(
            h.outbound.try_recv().unwrap(),
            ClientRequest::replay(AnnouncementId::new(7))
        );
        assert!(h.rt.history().unwrap().entries().is_empty());
        assert!(h.rt.step().await);
        assert!(h.rt.step().await);
        assert_eq!(h.api.load_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_keeps_entries_and_notifies() {
        let mut h = Harness::new(true);
        h.api
            .loads
            .lock()
            .push(Err(QueryError::Network("connection refused".into())));
        h.api.loads.lock().push(Ok(vec![entry(1)]));
        h.command(Command::LoadHistory);
        assert!(h.rt.step().await);
        h.command(Command::LoadHistory);
        assert!(h.rt.step().await);
        assert_eq!(h.rt.history().unwrap().entries().len(), 1);
        assert!(h.drain_ui().iter().any(|u| matches!(
            u,
            UiUpdate::Notice(Notice::QueryFailed(QueryError::Network(_)))
        )));
    }

    #[tokio::test]
    async fn declined_clear_sends_nothing() {
        let mut h = Harness::new(true);
        h.command(Command::ClearHistory { confirmed: false });
        tokio::task::yield_now().await;
        assert_eq!(h.api.clear_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.drain_ui(),
            vec![UiUpdate::Notice(Notice::QueryFailed(QueryError::Cancelled))]
        );
    }

    #[tokio::test]
    async fn confirmed_clear_empties_after_hub_confirms() {
        let mut h = Harness::new(true);
        h.api.loads.lock().push(Ok(vec![entry(1)]));
        h.command(Command::LoadHistory);
        assert!(h.rt.step().await);
        h.command(Command::ClearHistory { confirmed: true });
        assert_eq!(h.rt.history().unwrap().entries().len(), 1);
        assert!(h.rt.step().await);
        assert!(h.rt.history().unwrap().entries().is_empty());
    }

    #[tokio::test]
    async fn hub_error_without_publisher_becomes_notice() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let mut rt = ClientRuntime::new(RuntimeConfig::new("en", true), out_tx, ui_tx);
        let _ = rt.handle(ClientEvent::Inbound(InboundEvent::Frame(HubEvent::error(
            "Announcement not found",
        ))));
        assert_eq!(
            ui_rx.try_recv().unwrap(),
            UiUpdate::Notice(Notice::Rejected("Announcement not found".into()))
        );
    }

    fn sent(h: &mut Harness) -> Vec<ClientRequest> {
        std::iter::from_fn(|| h.outbound.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn refused_replay_leaves_pending_broadcast_alone() {
        let mut h = Harness::new(true);
        h.command(Command::Replay(AnnouncementId::new(7)));
        h.submit("first");
        let _ = h.drain_ui();
        h.frame(HubEvent::error("Announcement not found"));

        let publisher = h.rt.publisher().unwrap();
        assert!(publisher.is_in_flight());
        assert!(publisher.banner().is_none());
        assert!(h.drain_ui().contains(&UiUpdate::Notice(Notice::Rejected(
            "Announcement not found".into()
        ))));

        h.submit("second");
        let requests = sent(&mut h);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], ClientRequest::replay(AnnouncementId::new(7)));
        assert!(matches!(requests[1], ClientRequest::BroadcastAnnouncement(_)));

        h.ack();
        assert_eq!(h.rt.publisher().unwrap().broadcast_count(), 1);
    }

    #[tokio::test]
    async fn error_goes_to_whichever_request_came_first() {
        let mut h = Harness::new(true);
        h.submit("Unsupported");
        h.command(Command::Replay(AnnouncementId::new(7)));
        h.frame(HubEvent::error("Unsupported language: xx"));
        let banner = h.rt.publisher().unwrap().banner().cloned().unwrap();
        assert_eq!(banner.kind, BannerKind::Error);
        assert_eq!(banner.message, "Unsupported language: xx");

        // The replay was answered by a fan-out, so a later error is unowned.
        let mut replayed = announcement(7);
        replayed.is_replay = true;
        h.frame(HubEvent::NewAnnouncement(replayed));
        let _ = h.drain_ui();
        h.frame(HubEvent::error("Invalid JSON format"));
        assert_eq!(
            h.drain_ui(),
            vec![UiUpdate::Notice(Notice::Rejected("Invalid JSON format".into()))]
        );
        assert_eq!(
            h.rt.publisher().unwrap().banner().map(|b| b.message.as_str()),
            Some("Unsupported language: xx")
        );
    }

    #[tokio::test]
    async fn draft_updates_carry_counter_state() {
        let mut h = Harness::new(true);
        h.command(Command::SelectLanguages(vec!["en".into(), "hi".into()]));
        h.command(Command::EditDraft("x".repeat(501)));
        let updates = h.drain_ui();
        let statuses: Vec<_> = updates
            .iter()
            .filter_map(|u| match u {
                UiUpdate::Draft { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                DraftStatus {
                    chars: 0,
                    over_limit: false,
                    languages: 2
                },
                DraftStatus {
                    chars: 501,
                    over_limit: true,
                    languages: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn history_clip_plays_even_with_sound_off() {
        let mut h = Harness::new(false);
        h.api.loads.lock().push(Ok(vec![entry(3)]));
        h.command(Command::LoadHistory);
        assert!(h.rt.step().await);
        h.command(Command::PlayHistoryEntry {
            id: AnnouncementId::new(3),
            language: "en".into(),
        });
        assert_eq!(
            h.sink.starts(),
            vec!["/static/audio/announcement_en_3.mp3".to_string()]
        );
    }

    #[tokio::test]
    async fn history_variant_without_audio_is_reported() {
        let mut h = Harness::new(true);
        h.api.loads.lock().push(Ok(vec![entry(3)]));
        h.command(Command::LoadHistory);
        assert!(h.rt.step().await);
        let _ = h.drain_ui();
        h.command(Command::PlayHistoryEntry {
            id: AnnouncementId::new(3),
            language: "ta".into(),
        });
        assert!(h.sink.calls().is_empty());
        assert_eq!(
            h.drain_ui(),
            vec![UiUpdate::Notice(Notice::PlaybackFailed(PlaybackError::NoClip {
                id: "#3".into(),
                language: "ta".into(),
            }))]
        );
    }

    #[tokio::test]
    async fn history_player_failure_is_reported_without_subscriber() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
        let api = Arc::new(ScriptedApi::default());
        api.loads.lock().push(Ok(vec![entry(3)]));
        let mut rt = ClientRuntime::new(RuntimeConfig::new("en", true), out_tx, ui_tx)
            .with_history(api)
            .with_history_player(AudioCoordinator::new(Box::new(RecordingSink::failing())));
        let _ = rt.handle(ClientEvent::Command(Command::LoadHistory));
        assert!(rt.step().await);
        let _ = ui_rx.try_recv();
        let _ = rt.handle(ClientEvent::Command(Command::PlayHistoryEntry {
            id: AnnouncementId::new(3),
            language: "en".into(),
        }));
        assert!(matches!(
            ui_rx.try_recv().unwrap(),
            UiUpdate::Notice(Notice::PlaybackFailed(PlaybackError::Failed { .. }))
        ));
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let mut h = Harness::new(true);
        h.rt.events()
            .send(ClientEvent::Command(Command::Shutdown))
            .unwrap();
        assert!(!h.rt.step().await);
    }
}
