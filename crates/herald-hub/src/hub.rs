//! Request handling: publish, replay, fan-out.

use std::sync::Arc;

use chrono::Utc;
use herald_core::languages::{self, DEFAULT_LANGUAGE};
use herald_core::wire::{BroadcastAck, BroadcastRequest, ConnectionStatus, NewAnnouncement};
use herald_core::{Announcement, AnnouncementId, ClientRequest, HistoryEntry, HubEvent, LanguageCode};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::client::{ClientId, ClientRegistry};
use crate::composer::VariantComposer;
use crate::log::AnnouncementLog;

pub struct Hub {
    log: RwLock<AnnouncementLog>,
    /// Last announcement fanned out, fresh or replayed. Survives a log clear
    /// since subscribers keep displaying it.
    on_air: RwLock<Option<Announcement>>,
    registry: Arc<ClientRegistry>,
    composer: Box<dyn VariantComposer>,
}

impl Hub {
    pub fn new(
        registry: Arc<ClientRegistry>,
        composer: Box<dyn VariantComposer>,
        history_limit: usize,
    ) -> Self {
        Self {
            log: RwLock::new(AnnouncementLog::new(history_limit)),
            on_air: RwLock::new(None),
            registry,
            composer,
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Greeting for a new connection, carrying what is currently on air.
    pub fn greet(&self, client_id: &ClientId) {
        let latest = self.on_air.read().as_ref().map(NewAnnouncement::from);
        self.send(
            client_id,
            &HubEvent::ConnectionStatus(ConnectionStatus {
                status: "connected".into(),
                message: "Connected to PA System".into(),
                timestamp: Utc::now(),
                latest,
            }),
        );
    }

    /// Handle one raw frame from `client_id`.
    pub fn handle_message(&self, client_id: &ClientId, raw: &str) {
        match ClientRequest::decode(raw) {
            Ok(request) => self.handle_request(client_id, request),
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "malformed request");
                self.send(client_id, &HubEvent::error("Malformed request"));
            }
        }
    }

    pub fn handle_request(&self, client_id: &ClientId, request: ClientRequest) {
        match request {
            ClientRequest::BroadcastAnnouncement(body) => match self.publish(body) {
                Ok(announcement) => {
                    let reached = self.fan_out(&announcement);
                    info!(
                        client_id = %client_id,
                        announcement_id = %announcement.id(),
                        priority = %announcement.priority(),
                        reached,
                        "announcement published"
                    );
                    self.send(
                        client_id,
                        &HubEvent::BroadcastSuccess(BroadcastAck {
                            message: format!(
                                "Announcement broadcasted to {} languages",
                                announcement.variants().len()
                            ),
                            timestamp: announcement.timestamp(),
                        }),
                    );
                }
                Err(message) => {
                    debug!(client_id = %client_id, %message, "broadcast rejected");
                    self.send(client_id, &HubEvent::error(message));
                }
            },
            ClientRequest::ReplayAnnouncement(body) => match self.replay(body.id) {
                Some(replayed) => {
                    let reached = self.fan_out(&replayed);
                    info!(client_id = %client_id, announcement_id = %body.id, reached, "announcement replayed");
                }
                None => self.send(client_id, &HubEvent::error("Announcement not found")),
            },
        }
    }

    /// Validate, compose and record. The error is the operator-facing message.
    pub fn publish(&self, request: BroadcastRequest) -> Result<Announcement, String> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err("Announcement text cannot be empty".into());
        }

        let mut codes: Vec<LanguageCode> = Vec::with_capacity(request.languages.len());
        for code in request.languages {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        if codes.is_empty() {
            codes.push(LanguageCode::from(DEFAULT_LANGUAGE));
        }

        let mut variants = Vec::with_capacity(codes.len());
        for code in &codes {
            let language = languages::lookup(code.as_str())
                .ok_or_else(|| format!("Unsupported language: {code}"))?;
            variants.push(self.composer.compose(text, language));
        }

        self.log
            .write()
            .publish(Utc::now(), request.priority, text, variants)
            .map_err(|e| e.to_string())
    }

    /// The logged announcement re-stamped for delivery now.
    pub fn replay(&self, id: AnnouncementId) -> Option<Announcement> {
        self.log.read().get(id).map(|a| a.replayed_at(Utc::now()))
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.log.read().history()
    }

    pub fn clear(&self) -> usize {
        self.log.write().clear()
    }

    pub fn announcement_count(&self) -> usize {
        self.log.read().len()
    }

    pub fn on_air(&self) -> Option<Announcement> {
        self.on_air.read().clone()
    }

    fn fan_out(&self, announcement: &Announcement) -> usize {
        // Set before sending: a client greeted in between then receives the
        // same announcement twice, never an older one.
        *self.on_air.write() = Some(announcement.clone());
        let event = HubEvent::NewAnnouncement(NewAnnouncement::from(announcement));
        match event.encode() {
            Ok(json) => self.registry.broadcast(&json),
            Err(err) => {
                warn!(error = %err, "failed to encode announcement");
                0
            }
        }
    }

    fn send(&self, client_id: &ClientId, event: &HubEvent) {
        match event.encode() {
            Ok(json) => {
                let _ = self.registry.send_to(client_id, json);
            }
            Err(err) => warn!(event = event.event_name(), error = %err, "failed to encode event"),
        }
    }
}
