//! End-to-end tests against a real hub on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use herald_client::{
    spawn_connection, AudioCoordinator, ClientEvent, ClientRuntime, Command, ConnectionConfig,
    HistoryBrowser, HttpHistoryApi, MemoryDraftStore, RecordingSink, RuntimeConfig,
    SubmissionController, UiUpdate,
};
use herald_core::wire::{BroadcastRequest, NewAnnouncement};
use herald_core::{AnnouncementId, ClientRequest, HubEvent, LanguageCode, Priority, QueryError};
use herald_hub::{start, ServerConfig, ServerHandle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN: &str = "test-admin-token";

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_hub() -> ServerHandle {
    start(ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        admin_token: Some(TOKEN.into()),
        ..ServerConfig::default()
    })
    .await
    .unwrap()
}

/// Connect and consume the greeting, so the socket is registered for fan-out.
async fn connect(hub: &ServerHandle) -> WsStream {
    let (mut ws, _) = connect_async(hub.ws_url()).await.unwrap();
    let greeting = read_event(&mut ws).await;
    assert_eq!(greeting.event_name(), "connection_status");
    ws
}

async fn read_event(ws: &mut WsStream) -> HubEvent {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return HubEvent::decode(text.as_str()).unwrap();
        }
    }
}

async fn send(ws: &mut WsStream, request: ClientRequest) {
    ws.send(Message::text(request.encode().unwrap())).await.unwrap();
}

fn broadcast(text: &str, languages: &[&str]) -> ClientRequest {
    ClientRequest::BroadcastAnnouncement(BroadcastRequest {
        text: text.into(),
        priority: Priority::Warning,
        languages: languages.iter().map(|c| LanguageCode::from(*c)).collect(),
    })
}

/// Publish and return the fanned-out payload as seen by the publisher.
async fn publish(ws: &mut WsStream, text: &str) -> NewAnnouncement {
    send(ws, broadcast(text, &["en", "hi"])).await;
    let HubEvent::NewAnnouncement(payload) = read_event(ws).await else {
        panic!("expected new_announcement");
    };
    let HubEvent::BroadcastSuccess(_) = read_event(ws).await else {
        panic!("expected broadcast_success");
    };
    payload
}

#[tokio::test]
async fn broadcast_reaches_every_subscriber_and_acks_publisher() {
    let hub = boot_hub().await;
    let mut publisher = connect(&hub).await;
    let mut sub_a = connect(&hub).await;
    let mut sub_b = connect(&hub).await;

    send(&mut publisher, broadcast("  Platform 9 closed  ", &["en", "fr", "ta"])).await;

    for ws in [&mut sub_a, &mut sub_b] {
        let HubEvent::NewAnnouncement(p) = read_event(ws).await else {
            panic!("expected new_announcement");
        };
        assert_eq!(p.id, AnnouncementId::FIRST);
        assert_eq!(p.original_text, "Platform 9 closed");
        assert_eq!(p.variants.len(), 3);
        assert!(!p.is_replay);
    }

    assert!(matches!(read_event(&mut publisher).await, HubEvent::NewAnnouncement(_)));
    let HubEvent::BroadcastSuccess(ack) = read_event(&mut publisher).await else {
        panic!("expected broadcast_success");
    };
    assert_eq!(ack.message, "Announcement broadcasted to 3 languages");
    hub.shutdown();
}

#[tokio::test]
async fn rejected_broadcasts_only_reach_sender() {
    let hub = boot_hub().await;
    let mut publisher = connect(&hub).await;

    send(&mut publisher, broadcast("   ", &["en"])).await;
    assert_eq!(
        read_event(&mut publisher).await,
        HubEvent::error("Announcement text cannot be empty")
    );

    send(&mut publisher, broadcast("Hola", &["xx"])).await;
    assert_eq!(
        read_event(&mut publisher).await,
        HubEvent::error("Unsupported language: xx")
    );
    assert_eq!(hub.hub().announcement_count(), 0);
    hub.shutdown();
}

#[tokio::test]
async fn replay_redelivers_identical_variants() {
    let hub = boot_hub().await;
    let mut publisher = connect(&hub).await;
    let mut originals = Vec::new();
    for i in 1..=7 {
        originals.push(publish(&mut publisher, &format!("Announcement {i}")).await);
    }
    let original = originals.pop().unwrap();
    assert_eq!(original.id, AnnouncementId::new(7));

    let mut browser = connect(&hub).await;
    send(&mut browser, ClientRequest::replay(AnnouncementId::new(7))).await;
    let HubEvent::NewAnnouncement(replayed) = read_event(&mut browser).await else {
        panic!("expected new_announcement");
    };
    assert_eq!(replayed.id, original.id);
    assert_eq!(replayed.variants, original.variants);
    assert_eq!(replayed.priority, original.priority);
    assert!(replayed.is_replay);
    assert!(replayed.timestamp >= original.timestamp);

    // Replays never enter the log.
    assert_eq!(hub.hub().announcement_count(), 7);
    hub.shutdown();
}

#[tokio::test]
async fn replay_of_unknown_id_is_an_error() {
    let hub = boot_hub().await;
    let mut browser = connect(&hub).await;
    send(&mut browser, ClientRequest::replay(AnnouncementId::new(42))).await;
    assert_eq!(
        read_event(&mut browser).await,
        HubEvent::error("Announcement not found")
    );
    hub.shutdown();
}

#[tokio::test]
async fn late_joiner_receives_current_announcement() {
    let hub = boot_hub().await;
    let mut publisher = connect(&hub).await;
    let published = publish(&mut publisher, "Doors closing").await;

    let (mut late, _) = connect_async(hub.ws_url()).await.unwrap();
    let HubEvent::ConnectionStatus(status) = read_event(&mut late).await else {
        panic!("expected connection_status");
    };
    assert_eq!(status.status, "connected");
    assert_eq!(status.latest, Some(published));
    hub.shutdown();
}

#[tokio::test]
async fn late_joiner_after_replay_converges_on_the_replay() {
    let hub = boot_hub().await;
    let mut publisher = connect(&hub).await;
    let first = publish(&mut publisher, "first").await;
    publish(&mut publisher, "second").await;

    send(&mut publisher, ClientRequest::replay(first.id)).await;
    let HubEvent::NewAnnouncement(on_air) = read_event(&mut publisher).await else {
        panic!("expected new_announcement");
    };
    assert_eq!(on_air.id, first.id);
    assert!(on_air.is_replay);

    let (mut late, _) = connect_async(hub.ws_url()).await.unwrap();
    let HubEvent::ConnectionStatus(status) = read_event(&mut late).await else {
        panic!("expected connection_status");
    };
    assert_eq!(status.latest, Some(on_air));
    hub.shutdown();
}

#[tokio::test]
async fn clear_requires_authorization() {
    let hub = boot_hub().await;
    let mut publisher = connect(&hub).await;
    publish(&mut publisher, "first").await;
    publish(&mut publisher, "second").await;

    let mut anonymous = HistoryBrowser::new(Arc::new(HttpHistoryApi::new(hub.base_url(), None)));
    let loaded = anonymous.load_history().await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].original_text, "second");

    let err = anonymous.clear_history(|| true).await.unwrap_err();
    assert!(matches!(err, QueryError::Unauthorized(_)));
    assert_eq!(anonymous.entries().len(), 2);
    assert_eq!(anonymous.load_history().await.unwrap().len(), 2);

    let mut admin = HistoryBrowser::new(Arc::new(HttpHistoryApi::new(
        hub.base_url(),
        Some(TOKEN.into()),
    )));
    admin.load_history().await.unwrap();
    let resp = admin.clear_history(|| true).await.unwrap();
    assert_eq!(resp.message, "History cleared successfully");
    assert!(admin.entries().is_empty());
    assert!(admin.load_history().await.unwrap().is_empty());
    hub.shutdown();
}

struct RunningClient {
    events: mpsc::UnboundedSender<ClientEvent>,
    ui: mpsc::UnboundedReceiver<UiUpdate>,
    _runtime: JoinHandle<()>,
    _connection: JoinHandle<()>,
}

impl RunningClient {
    fn spawn(hub: &ServerHandle, build: impl FnOnce(ClientRuntime) -> ClientRuntime) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui) = mpsc::unbounded_channel();
        let runtime = build(ClientRuntime::new(RuntimeConfig::new("hi", true), out_tx, ui_tx));
        let events = runtime.events();
        let connection = spawn_connection(
            ConnectionConfig {
                ws_url: hub.ws_url(),
                reconnect_delay: Duration::from_millis(100),
            },
            runtime.events(),
            out_rx,
            CancellationToken::new(),
        );
        Self {
            events,
            ui,
            _runtime: tokio::spawn(runtime.run()),
            _connection: connection,
        }
    }

    fn command(&self, command: Command) {
        self.events.send(ClientEvent::Command(command)).unwrap();
    }

    async fn wait_for(&mut self, mut matches: impl FnMut(&UiUpdate) -> bool) -> UiUpdate {
        loop {
            let update = timeout(TIMEOUT, self.ui.recv())
                .await
                .expect("timeout waiting for ui update")
                .expect("runtime stopped");
            if matches(&update) {
                return update;
            }
        }
    }
}

#[tokio::test]
async fn client_runtimes_publish_and_display() {
    let hub = boot_hub().await;
    let sink = RecordingSink::new();

    let audio_sink = sink.clone();
    let mut subscriber = RunningClient::spawn(&hub, move |rt| {
        rt.with_subscriber(AudioCoordinator::new(Box::new(audio_sink)))
    });
    let mut publisher = RunningClient::spawn(&hub, |rt| {
        rt.with_publisher(SubmissionController::load(Box::new(MemoryDraftStore::default())))
    });

    for client in [&mut subscriber, &mut publisher] {
        client
            .wait_for(|u| matches!(u, UiUpdate::Connectivity { .. }))
            .await;
    }
    // The transport reports connected before the hub registers the socket.
    timeout(TIMEOUT, async {
        while hub.hub().registry().count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("clients never registered");
    subscriber.command(Command::Unlock);

    publisher.command(Command::Submit {
        text: "Evacuate building now".into(),
        priority: Some(Priority::Emergency),
        languages: vec!["en".into(), "hi".into()],
    });

    let UiUpdate::Announcement { rendering, status_line } = subscriber
        .wait_for(|u| matches!(u, UiUpdate::Announcement { .. }))
        .await
    else {
        unreachable!()
    };
    assert_eq!(rendering.displayed.language_code.as_str(), "hi");
    assert_eq!(rendering.displayed.priority, Priority::Emergency);
    assert_eq!(rendering.panel.len(), 2);
    assert!(status_line.starts_with("Connected - Last update:"));

    let UiUpdate::Banner(Some(banner)) = publisher
        .wait_for(|u| matches!(u, UiUpdate::Banner(Some(_))))
        .await
    else {
        unreachable!()
    };
    assert_eq!(banner.message, "Announcement broadcasted to 2 languages");

    // The identity composer produces no clips, so nothing plays.
    assert!(sink.calls().is_empty());
    hub.shutdown();
}
