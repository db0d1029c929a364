//! WebSocket channel for the browser control surfaces.
//!
//! Each connection gets its own reader loop and writer task.  The writer
//! merges replies meant for this connection with the bridge's broadcast.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use showdeck_shared::protocol::{
    ClientEvent, ServerEvent, StatusPayload, EVENT_AUTH_SUCCESS, EVENT_ERROR,
};

use crate::api::AppState;
use crate::bridge::{Command, ControlBridge, Origin};
use crate::error::ServerError;
use crate::presence::ConnectionId;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Per-connection state.
#[derive(Debug, Default)]
struct Session {
    user_id: Option<String>,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.bridge))
}

async fn handle_socket(socket: WebSocket, bridge: Arc<ControlBridge>) {
    let connection = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
    let (mut sink, mut stream) = socket.split();
    let mut broadcasts = bridge.subscribe();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<ServerEvent>();

    debug!(connection, "WebSocket connected");

    let writer = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(event) = direct_rx.recv() => event,
                received = broadcasts.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(connection, skipped = n, "WebSocket client lagging");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if sink.send(WsMessage::Text(event.to_json())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::default();
    while let Some(received) = stream.next().await {
        match received {
            Ok(WsMessage::Text(text)) => {
                handle_text(&bridge, connection, &mut session, &direct_tx, &text).await;
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(connection, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    if let Some(user_id) = session.user_id.take() {
        bridge.user_disconnected(&user_id, connection).await;
    }
    writer.abort();
    debug!(connection, "WebSocket closed");
}

fn reply(direct: &mpsc::UnboundedSender<ServerEvent>, event: ServerEvent) {
    // The writer is gone once the socket closes.
    let _ = direct.send(event);
}

fn reply_error(direct: &mpsc::UnboundedSender<ServerEvent>, target: &str, err: &ServerError) {
    reply(
        direct,
        ServerEvent::new(EVENT_ERROR, &StatusPayload::error(target, err.to_string())),
    );
}

async fn handle_text(
    bridge: &ControlBridge,
    connection: ConnectionId,
    session: &mut Session,
    direct: &mpsc::UnboundedSender<ServerEvent>,
    text: &str,
) {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(connection, error = %e, "Unparseable WebSocket message");
            reply_error(
                direct,
                "request",
                &ServerError::Validation(format!("malformed message: {e}")),
            );
            return;
        }
    };

    if let ClientEvent::Auth(profile) = &event {
        if let Some(previous) = session.user_id.take() {
            bridge.user_disconnected(&previous, connection).await;
        }
        match bridge.user_connected(connection, profile).await {
            Ok(user_id) => {
                info!(connection, %user_id, role = %profile.role, "Surface authenticated");
                reply(
                    direct,
                    ServerEvent::new(EVENT_AUTH_SUCCESS, &serde_json::json!({ "userId": user_id })),
                );
                session.user_id = Some(user_id);
            }
            Err(e) => {
                warn!(connection, error = %e, "Presence unavailable for this connection");
                reply_error(direct, "auth", &e);
            }
        }
        return;
    }

    let command = match to_command(event, session) {
        Ok(command) => command,
        Err((target, e)) => {
            reply_error(direct, target, &e);
            return;
        }
    };
    let target = command.target();
    if let Err(e) = bridge.execute(Origin::WebSocket(connection), command).await {
        reply_error(direct, target, &e);
    }
}

fn to_command(event: ClientEvent, session: &Session) -> Result<Command, (&'static str, ServerError)> {
    let sender = || {
        session.user_id.clone().ok_or((
            "message",
            ServerError::Validation("authenticate before messaging".into()),
        ))
    };

    Ok(match event {
        ClientEvent::LogoChange(p) => Command::ChangeLogo { logo_id: p.logo_id },
        ClientEvent::TimerStart(p) => Command::StartTimer {
            duration_ms: p.duration,
        },
        ClientEvent::TimerStop => Command::Stop,
        ClientEvent::TimerReset => Command::ResetTimer,
        ClientEvent::SyncTrigger => Command::TriggerSync,
        ClientEvent::SyncOffline(p) => Command::SetOffline { enabled: p.enabled },
        ClientEvent::MessageSend(p) => Command::SendMessage {
            sender_id: sender()?,
            conversation_id: p.conversation_id,
            content: p.content,
        },
        ClientEvent::MessageRead(p) => {
            sender()?;
            Command::MarkRead {
                message_id: p.message_id,
                conversation_id: p.conversation_id,
            }
        }
        ClientEvent::Auth(_) => {
            return Err((
                "auth",
                ServerError::Internal("auth must be handled before dispatch".into()),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services, TestServices};

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn auth_then_message_flow() {
        let TestServices { _dir, bridge, .. } = services(&[]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Seed the other participant through its own session.
        let mut vj = Session::default();
        handle_text(
            &bridge,
            2,
            &mut vj,
            &tx,
            r#"{"event":"auth","data":{"name":"Vee","role":"VJ","userId":"vj"}}"#,
        )
        .await;
        drain(&mut rx);

        let mut dj = Session::default();
        handle_text(
            &bridge,
            1,
            &mut dj,
            &tx,
            r#"{"event":"auth","data":{"name":"Dee","role":"DJ"}}"#,
        )
        .await;
        let replies = drain(&mut rx);
        assert_eq!(replies[0].event, EVENT_AUTH_SUCCESS);
        let dj_id = dj.user_id.clone().unwrap();
        assert_eq!(replies[0].data["userId"], dj_id.as_str());

        let conversation = bridge
            .services()
            .messaging
            .create_conversation(&dj_id, "vj")
            .await
            .unwrap();
        let mut broadcasts = bridge.subscribe();
        let send = format!(
            r#"{{"event":"message:send","data":{{"conversationId":"{}","content":"hi"}}}}"#,
            conversation.id
        );
        handle_text(&bridge, 1, &mut dj, &tx, &send).await;

        assert!(drain(&mut rx).is_empty());
        let delivered = broadcasts.try_recv().unwrap();
        assert_eq!(delivered.event, format!("conversation:{}", conversation.id));
        assert_eq!(delivered.data["sender_id"], dj_id.as_str());
    }

    #[tokio::test]
    async fn unauthenticated_message_is_rejected() {
        let TestServices { _dir, bridge, .. } = services(&[]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = Session::default();

        handle_text(
            &bridge,
            1,
            &mut session,
            &tx,
            r#"{"event":"message:send","data":{"conversationId":"c1","content":"hi"}}"#,
        )
        .await;

        let replies = drain(&mut rx);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].event, EVENT_ERROR);
        assert_eq!(replies[0].data["target"], "message");
        assert_eq!(replies[0].data["status"], "error");
    }

    #[tokio::test]
    async fn command_errors_go_back_to_sender_only() {
        let TestServices { _dir, bridge, .. } = services(&[]).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut broadcasts = bridge.subscribe();
        let mut session = Session::default();

        handle_text(
            &bridge,
            1,
            &mut session,
            &tx,
            r#"{"event":"timer:start","data":{"duration":0}}"#,
        )
        .await;
        handle_text(&bridge, 1, &mut session, &tx, "not json").await;

        let replies = drain(&mut rx);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].data["target"], "timer");
        assert_eq!(replies[1].data["target"], "request");
        assert!(broadcasts.try_recv().is_err());
    }
}
