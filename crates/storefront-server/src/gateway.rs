use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use storefront_messaging::composer::SendOutcome;
use storefront_messaging::surface::{MessagingSurface, Update};
use storefront_types::events::{GatewayCommand, GatewayEvent};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

type Sender = SplitSink<WebSocket, Message>;

/// Drive one messaging surface over an authenticated WebSocket until either
/// side goes away. The surface is closed on exit.
pub async fn handle_connection(socket: WebSocket, mut surface: MessagingSurface) {
    let (mut sender, mut receiver) = socket.split();
    let uid = surface.viewer().uid.clone();

    info!("{} ({:?}) connected to gateway", uid, surface.viewer().role);

    let ready = GatewayEvent::Ready {
        uid: uid.clone(),
        role: surface.viewer().role,
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    surface.open();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            update = surface.next_update() => {
                let Some(update) = update else { continue };
                let event = match update {
                    Update::Inbox => inbox_event(&surface),
                    Update::Transcript => transcript_event(&surface),
                };
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let cmd = match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                            Ok(cmd) => cmd,
                            Err(e) => {
                                warn!("Invalid command from {}: {}", uid, e);
                                continue;
                            }
                        };
                        if handle_command(&mut surface, &mut sender, cmd).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => pong_received = true,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if std::mem::replace(&mut pong_received, false) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }

    surface.close();
    info!("{} disconnected from gateway", uid);
}

async fn handle_command(surface: &mut MessagingSurface, sender: &mut Sender, cmd: GatewayCommand) -> Result<(), axum::Error> {
    match cmd {
        GatewayCommand::SelectConversation { other_party_id } => {
            if surface.select_conversation(&other_party_id) {
                // Show the loading state right away
                send_event(sender, &transcript_event(surface)).await?;
            }
        }
        GatewayCommand::SendMessage { text } => {
            surface.set_input(text);
            // Store failures stay silent; the client sees the message once
            // the transcript subscription picks it up.
            if let SendOutcome::Skipped(reason) = surface.send().await {
                send_event(sender, &GatewayEvent::SendRejected { reason }).await?;
            }
        }
    }
    Ok(())
}

fn inbox_event(surface: &MessagingSurface) -> GatewayEvent {
    GatewayEvent::InboxUpdate {
        conversations: surface.inbox().to_vec(),
    }
}

fn transcript_event(surface: &MessagingSurface) -> GatewayEvent {
    let transcript = surface.transcript();
    GatewayEvent::TranscriptUpdate {
        other_party_id: surface.conversation_party().map(str::to_string),
        loading: transcript.loading,
        messages: transcript.messages.clone(),
        error: transcript.error.clone(),
    }
}

async fn send_event(sender: &mut Sender, event: &GatewayEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}
