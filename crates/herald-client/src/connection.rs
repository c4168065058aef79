//! Real-time channel to the hub.
//!
//! One task owns the socket: it reconnects after a fixed delay, forwards
//! decoded frames to the event loop and writes queued requests. Requests
//! queued while disconnected go out after the next connect.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use herald_core::{ClientRequest, HubEvent, TransportError};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::runtime::ClientEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the transport reports to the event loop.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    Connected,
    Disconnected { reason: String },
    Frame(HubEvent),
    /// A request could not be written; the socket is being re-established.
    SendFailed {
        request: ClientRequest,
        error: TransportError,
    },
}

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub ws_url: String,
    pub reconnect_delay: Duration,
}

enum PumpExit {
    Shutdown,
    Lost(String),
}

/// Spawn the connection task. It stops when `cancel` fires, when the event
/// loop goes away, or when the request channel closes.
pub fn spawn_connection(
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<ClientEvent>,
    outbound: mpsc::UnboundedReceiver<ClientRequest>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(connection_loop(config, events, outbound, cancel))
}

async fn connection_loop(
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<ClientEvent>,
    mut outbound: mpsc::UnboundedReceiver<ClientRequest>,
    cancel: CancellationToken,
) {
    let notify = |event: InboundEvent| events.send(ClientEvent::Inbound(event)).is_ok();

    loop {
        let attempt = tokio::select! {
            () = cancel.cancelled() => return,
            attempt = connect_async(config.ws_url.as_str()) => attempt,
        };

        match attempt {
            Ok((ws, _)) => {
                info!(url = %config.ws_url, "connected to hub");
                if !notify(InboundEvent::Connected) {
                    return;
                }
                match pump(ws, &events, &mut outbound, &cancel).await {
                    PumpExit::Shutdown => return,
                    PumpExit::Lost(reason) => {
                        warn!(%reason, "connection to hub lost");
                        if !notify(InboundEvent::Disconnected { reason }) {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                debug!(url = %config.ws_url, error = %e, "connect failed");
                if !notify(InboundEvent::Disconnected {
                    reason: e.to_string(),
                }) {
                    return;
                }
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
}

async fn pump(
    ws: WsStream,
    events: &mpsc::UnboundedSender<ClientEvent>,
    outbound: &mut mpsc::UnboundedReceiver<ClientRequest>,
    cancel: &CancellationToken,
) -> PumpExit {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return PumpExit::Shutdown;
            }
            request = outbound.recv() => {
                let Some(request) = request else {
                    let _ = ws_tx.close().await;
                    return PumpExit::Shutdown;
                };
                let text = match request.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(event = request.event_name(), error = %err, "failed to encode request");
                        continue;
                    }
                };
                debug!(event = request.event_name(), "sending request");
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    let error = TransportError::Socket(e.to_string());
                    let _ = events.send(ClientEvent::Inbound(InboundEvent::SendFailed {
                        request,
                        error,
                    }));
                    return PumpExit::Lost(e.to_string());
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => match HubEvent::decode(text.as_str()) {
                    Ok(event) => {
                        if events.send(ClientEvent::Inbound(InboundEvent::Frame(event))).is_err() {
                            return PumpExit::Shutdown;
                        }
                    }
                    Err(err) => warn!(kind = "protocol", error = %err, "dropping malformed frame"),
                },
                Some(Ok(Message::Close(_))) => return PumpExit::Lost("closed by hub".into()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpExit::Lost(e.to_string()),
                None => return PumpExit::Lost("stream ended".into()),
            }
        }
    }
}
