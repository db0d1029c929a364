//! Routes commands from every transport to the components and fans results
//! back out.
//!
//! Successful mutations are announced to all WebSocket clients and, when the
//! `osc` capability is on, to the OSC client.  Failures are reported only on
//! the channel the command came from.

use std::sync::Arc;

use rosc::{OscMessage, OscType};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use showdeck_shared::protocol::{
    self, osc, AuthPayload, ServerEvent, Status, EVENT_LOGO_UPDATED, EVENT_SYNC_STATUS,
    EVENT_TIMER_ENDED, EVENT_TIMER_RESET, EVENT_TIMER_STARTED, EVENT_TIMER_STOPPED,
    EVENT_USERS_STATUS,
};
use showdeck_shared::types::SyncMode;
use showdeck_store::Message;

use crate::capabilities::{self, Capabilities};
use crate::error::ServerError;
use crate::messaging::{Messaging, ReadReceipt};
use crate::playback::{LogoChange, PlaybackController, PlaybackNotice};
use crate::presence::{ConnectionId, PresenceRegistry};
use crate::sync::{SyncEngine, SyncReport};

/// Where a command came from, and so where its errors go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Osc,
    WebSocket(ConnectionId),
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ChangeLogo { logo_id: String },
    StartTimer { duration_ms: i64 },
    StartEventTimer { event_id: String },
    Stop,
    ResetTimer,
    TriggerSync,
    SetOffline { enabled: bool },
    SendMessage {
        conversation_id: String,
        sender_id: String,
        content: String,
    },
    MarkRead {
        message_id: String,
        conversation_id: String,
    },
}

impl Command {
    /// Subsystem named in status replies.
    pub fn target(&self) -> &'static str {
        match self {
            Command::ChangeLogo { .. } => "logo",
            Command::StartTimer { .. }
            | Command::StartEventTimer { .. }
            | Command::Stop
            | Command::ResetTimer => "timer",
            Command::TriggerSync | Command::SetOffline { .. } => "sync",
            Command::SendMessage { .. } | Command::MarkRead { .. } => "message",
        }
    }

    /// Leading OSC argument echoed back in status replies.
    fn osc_subject(&self) -> Option<OscType> {
        match self {
            Command::ChangeLogo { logo_id } => Some(OscType::String(logo_id.clone())),
            Command::StartTimer { duration_ms } => Some(osc_int(*duration_ms)),
            Command::StartEventTimer { event_id } => Some(OscType::String(event_id.clone())),
            Command::Stop => Some(OscType::String("stopped".into())),
            Command::ResetTimer => Some(OscType::String("reset".into())),
            Command::SetOffline { enabled } => Some(OscType::Bool(*enabled)),
            Command::TriggerSync | Command::SendMessage { .. } | Command::MarkRead { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    LogoChanged(LogoChange),
    TimerStarted { duration_ms: u64 },
    Stopped,
    TimerReset { duration_ms: u64 },
    Synced(SyncReport),
    OfflineMode(SyncMode),
    MessageSent(Message),
    MessageRead(ReadReceipt),
}

/// The long-lived components, shared by the bridge and the REST handlers.
#[derive(Clone)]
pub struct Services {
    pub sync: Arc<SyncEngine>,
    pub presence: Arc<PresenceRegistry>,
    pub messaging: Arc<Messaging>,
    pub playback: Arc<PlaybackController>,
    pub capabilities: Arc<Capabilities>,
}

pub struct ControlBridge {
    services: Services,
    events: broadcast::Sender<ServerEvent>,
    osc_out: mpsc::UnboundedSender<OscMessage>,
}

impl ControlBridge {
    pub fn new(services: Services, osc_out: mpsc::UnboundedSender<OscMessage>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            services,
            events,
            osc_out,
        })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Receive every event broadcast to WebSocket clients.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ServerEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Queue a message for the OSC client.  Dropped while `osc` is disabled.
    pub fn send_osc(&self, addr: &str, args: Vec<OscType>) {
        if !self.services.capabilities.is_enabled(capabilities::OSC) {
            return;
        }
        let msg = OscMessage {
            addr: addr.to_string(),
            args,
        };
        if self.osc_out.send(msg).is_err() {
            debug!(addr, "OSC sender gone, message dropped");
        }
    }

    /// Report a failure to an OSC origin on the status address of `target`.
    ///
    /// Replies are always `[subject, "error", message]`; a missing subject is
    /// sent as an empty string.
    pub fn osc_error(&self, target: &str, subject: Option<OscType>, message: &str) {
        let Some(addr) = status_address(target) else {
            return;
        };
        let args = vec![
            subject.unwrap_or_else(|| OscType::String(String::new())),
            OscType::String(Status::Error.as_str().into()),
            OscType::String(message.to_string()),
        ];
        self.send_osc(addr, args);
    }

    /// Run a command and announce its result.
    pub async fn execute(&self, origin: Origin, command: Command) -> Result<Outcome, ServerError> {
        let target = command.target();
        let subject = command.osc_subject();

        match self.dispatch(command).await {
            Ok(outcome) => {
                self.announce(origin, &outcome);
                Ok(outcome)
            }
            Err(e) => {
                warn!(target, ?origin, error = %e, "Command failed");
                if origin == Origin::Osc {
                    self.osc_error(target, subject, &e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn dispatch(&self, command: Command) -> Result<Outcome, ServerError> {
        let s = &self.services;
        match command {
            Command::ChangeLogo { logo_id } => {
                Ok(Outcome::LogoChanged(s.playback.change_logo(&logo_id).await?))
            }
            Command::StartTimer { duration_ms } => Ok(Outcome::TimerStarted {
                duration_ms: s.playback.start_timer(duration_ms).await?,
            }),
            Command::StartEventTimer { event_id } => Ok(Outcome::TimerStarted {
                duration_ms: s.playback.start_timer_for_event(&event_id).await?,
            }),
            Command::Stop => {
                s.playback.stop().await?;
                Ok(Outcome::Stopped)
            }
            Command::ResetTimer => Ok(Outcome::TimerReset {
                duration_ms: s.playback.reset_timer().await?,
            }),
            Command::TriggerSync => Ok(Outcome::Synced(s.sync.pull_and_reconcile().await?)),
            Command::SetOffline { enabled } => {
                Ok(Outcome::OfflineMode(s.sync.set_offline_mode(enabled).await?))
            }
            Command::SendMessage {
                conversation_id,
                sender_id,
                content,
            } => Ok(Outcome::MessageSent(
                s.messaging
                    .send_message(&conversation_id, &sender_id, &content)
                    .await?,
            )),
            Command::MarkRead {
                message_id,
                conversation_id,
            } => Ok(Outcome::MessageRead(
                s.messaging.mark_read(&message_id, &conversation_id).await?,
            )),
        }
    }

    fn announce(&self, origin: Origin, outcome: &Outcome) {
        let success = || OscType::String(Status::Success.as_str().into());
        let from_osc = origin == Origin::Osc;

        match outcome {
            Outcome::LogoChanged(change) => {
                let logo_id = change.logo.id.clone();
                self.emit(ServerEvent::new(
                    EVENT_LOGO_UPDATED,
                    &json!({ "logoId": logo_id, "status": Status::Success, "logo": change.logo }),
                ));
                self.send_osc(osc::LOGO_UPDATE, vec![OscType::String(logo_id.clone()), success()]);
                if from_osc {
                    self.send_osc(osc::LOGO_STATUS, vec![OscType::String(logo_id), success()]);
                }
                if let Some(ms) = change.auto_timer_ms {
                    self.announce_timer_started(ms, false);
                }
            }
            Outcome::TimerStarted { duration_ms } => {
                self.announce_timer_started(*duration_ms, from_osc);
            }
            Outcome::Stopped => {
                self.emit(ServerEvent::new(
                    EVENT_TIMER_STOPPED,
                    &json!({ "status": Status::Success }),
                ));
                let args = vec![OscType::String("stopped".into()), success()];
                self.send_osc(osc::TIMER_UPDATE, args.clone());
                if from_osc {
                    self.send_osc(osc::TIMER_STATUS, args);
                }
            }
            Outcome::TimerReset { duration_ms } => {
                self.emit(ServerEvent::new(
                    EVENT_TIMER_RESET,
                    &json!({ "duration": duration_ms, "status": Status::Success }),
                ));
                let args = vec![OscType::String("reset".into()), success()];
                self.send_osc(osc::TIMER_UPDATE, args.clone());
                if from_osc {
                    self.send_osc(osc::TIMER_STATUS, args);
                }
            }
            Outcome::Synced(report) => {
                self.emit(ServerEvent::new(
                    EVENT_SYNC_STATUS,
                    &json!({
                        "status": Status::Success,
                        "events": report.events,
                        "logos": report.logos,
                        "lastSync": report.synced_at,
                    }),
                ));
                self.send_osc(osc::SYNC_STATUS, vec![success()]);
            }
            Outcome::OfflineMode(mode) => {
                self.emit(ServerEvent::new(
                    EVENT_SYNC_STATUS,
                    &json!({
                        "status": Status::Success,
                        "offlineMode": mode.offline_mode,
                        "isOnline": mode.is_online,
                        "lastSync": mode.last_sync,
                    }),
                ));
                self.send_osc(osc::SYNC_STATUS, vec![success(), OscType::Bool(mode.offline_mode)]);
            }
            Outcome::MessageSent(message) => {
                self.emit(ServerEvent::new(
                    protocol::conversation_channel(&message.conversation_id),
                    message,
                ));
            }
            Outcome::MessageRead(receipt) => {
                self.emit(ServerEvent::new(
                    protocol::read_receipt_channel(&receipt.message_id),
                    receipt,
                ));
            }
        }
    }

    fn announce_timer_started(&self, duration_ms: u64, from_osc: bool) {
        self.emit(ServerEvent::new(
            EVENT_TIMER_STARTED,
            &json!({ "duration": duration_ms, "status": Status::Success }),
        ));
        let args = vec![
            osc_int(duration_ms as i64),
            OscType::String(Status::Success.as_str().into()),
        ];
        self.send_osc(osc::TIMER_UPDATE, args.clone());
        if from_osc {
            self.send_osc(osc::TIMER_STATUS, args);
        }
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Register an authenticated surface.  Returns the user id to use.
    pub async fn user_connected(
        &self,
        connection: ConnectionId,
        profile: &AuthPayload,
    ) -> Result<String, ServerError> {
        let user_id = match profile.user_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => PresenceRegistry::new_user_id(),
        };
        self.services
            .presence
            .connect(&user_id, connection, profile)
            .await?;
        self.broadcast_presence().await;
        Ok(user_id)
    }

    pub async fn user_disconnected(&self, user_id: &str, connection: ConnectionId) {
        if self.services.presence.disconnect(user_id, connection).await {
            self.broadcast_presence().await;
        }
    }

    async fn broadcast_presence(&self) {
        let users = self.services.presence.online_users().await;
        self.emit(ServerEvent::new(EVENT_USERS_STATUS, &users));
    }

    /// Forward playback notices (timer expiry) to every surface.
    pub fn spawn_notice_relay(self: &Arc<Self>) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        let mut notices = self.services.playback.subscribe();
        tokio::spawn(async move {
            loop {
                match notices.recv().await {
                    Ok(PlaybackNotice::TimerEnded { duration_ms }) => {
                        bridge.emit(ServerEvent::new(
                            EVENT_TIMER_ENDED,
                            &json!({ "duration": duration_ms, "status": Status::Ended }),
                        ));
                        bridge.send_osc(
                            osc::TIMER_UPDATE,
                            vec![
                                osc_int(duration_ms as i64),
                                OscType::String(Status::Ended.as_str().into()),
                            ],
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Playback notices lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

/// OSC status address for a command target.
fn status_address(target: &str) -> Option<&'static str> {
    match target {
        "logo" => Some(osc::LOGO_STATUS),
        "timer" => Some(osc::TIMER_STATUS),
        "sync" => Some(osc::SYNC_STATUS),
        _ => None,
    }
}

/// 32-bit OSC int when the value fits, 64-bit otherwise.
pub fn osc_int(value: i64) -> OscType {
    match i32::try_from(value) {
        Ok(v) => OscType::Int(v),
        Err(_) => OscType::Long(value),
    }
}
