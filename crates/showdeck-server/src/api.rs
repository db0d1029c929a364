use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, State},
    http::{Method, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use showdeck_shared::types::{SyncMode, TimerSettings};
use showdeck_store::{Conversation, ConversationSummary, EventWithLogos, Logo, Message};

use crate::bridge::{Command, ControlBridge, Origin, Outcome, Services};
use crate::capabilities::CapabilityView;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::playback::{EventTimerStatus, PlaybackSnapshot};
use crate::presence::{OnlineUser, UserStatus};
use crate::sync::{EventPatch, NewLogo, SyncReport};
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<ControlBridge>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    fn services(&self) -> &Services {
        self.bridge.services()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/ws", get(ws_handler))
        // Events
        .route("/events", get(list_events))
        .route("/events/sync", post(trigger_sync))
        .route("/events/offline", post(set_offline))
        .route("/events/:id", get(get_event).put(update_event))
        .route("/sync/status", get(sync_status))
        // Logos
        .route("/logos", get(list_logos))
        .route("/logos/change", post(change_logo))
        .route("/logos/event/:event_id", get(list_event_logos).post(add_logo))
        .route("/logos/:id", delete(delete_logo))
        .route("/playback", get(playback_state))
        // Timers
        .route("/timers/start", post(start_timer))
        .route("/timers/stop", post(stop_playback))
        .route("/timers/reset", post(reset_timer))
        .route("/timers/settings", put(update_timer_settings))
        .route("/timers/event/:event_id", get(event_timer_status))
        // Messaging
        .route("/messages/conversations", post(create_conversation))
        .route("/messages/conversations/:id", get(conversation_history))
        .route("/messages/users/online", get(online_users))
        .route("/messages/users/:id/status", get(user_status))
        .route("/messages/users/:id/conversations", get(user_conversations))
        // Capabilities
        .route("/capabilities", get(list_capabilities))
        .route("/capabilities/:id", put(set_capability))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// JSON body whose rejections are reported as `{error}` like every other failure.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ServerError))]
struct ApiJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ServerError))]
struct ApiPath<T>(T);

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    version: &'static str,
    osc_listen_addr: String,
    osc_client_addr: String,
    sync_interval_secs: u64,
}

#[derive(Deserialize)]
struct OfflineRequest {
    enabled: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeLogoRequest {
    logo_id: String,
}

/// Either an explicit duration or an event whose configured length is used.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartTimerRequest {
    duration: Option<i64>,
    event_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimerSettingsRequest {
    event_id: String,
    settings: TimerSettings,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateConversationRequest {
    participant_a: String,
    participant_b: String,
}

#[derive(Deserialize)]
struct CapabilityRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TimerResponse {
    status: &'static str,
    duration: u64,
}

const OK: StatusResponse = StatusResponse { status: "success" };

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let config = &state.config;
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION"),
        osc_listen_addr: config.osc_listen_addr.to_string(),
        osc_client_addr: config.osc_client_addr.to_string(),
        sync_interval_secs: config.sync_interval.as_secs(),
    })
}

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<EventWithLogos>>, ServerError> {
    Ok(Json(state.services().sync.get_events().await?))
}

async fn get_event(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<EventWithLogos>, ServerError> {
    Ok(Json(state.services().sync.get_event(&id).await?))
}

async fn update_event(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<EventPatch>,
) -> Result<Json<EventWithLogos>, ServerError> {
    Ok(Json(state.services().sync.update_event(&id, patch).await?))
}

async fn trigger_sync(State(state): State<AppState>) -> Result<Json<SyncReport>, ServerError> {
    match state.bridge.execute(Origin::Http, Command::TriggerSync).await? {
        Outcome::Synced(report) => Ok(Json(report)),
        other => Err(unexpected(other)),
    }
}

async fn set_offline(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<OfflineRequest>,
) -> Result<Json<SyncMode>, ServerError> {
    let command = Command::SetOffline {
        enabled: req.enabled,
    };
    match state.bridge.execute(Origin::Http, command).await? {
        Outcome::OfflineMode(mode) => Ok(Json(mode)),
        other => Err(unexpected(other)),
    }
}

async fn sync_status(State(state): State<AppState>) -> Json<SyncMode> {
    Json(state.services().sync.mode().await)
}

async fn list_logos(State(state): State<AppState>) -> Result<Json<Vec<Logo>>, ServerError> {
    Ok(Json(state.services().sync.get_logos().await?))
}

async fn list_event_logos(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<String>,
) -> Result<Json<Vec<Logo>>, ServerError> {
    Ok(Json(state.services().sync.get_logos_by_event(&event_id).await?))
}

async fn add_logo(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<String>,
    ApiJson(logo): ApiJson<NewLogo>,
) -> Result<(StatusCode, Json<Logo>), ServerError> {
    let logo = state.services().sync.add_logo(&event_id, logo).await?;
    Ok((StatusCode::CREATED, Json(logo)))
}

async fn delete_logo(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<StatusCode, ServerError> {
    state.services().sync.delete_logo(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_logo(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ChangeLogoRequest>,
) -> Result<Json<PlaybackSnapshot>, ServerError> {
    let command = Command::ChangeLogo {
        logo_id: req.logo_id,
    };
    state.bridge.execute(Origin::Http, command).await?;
    Ok(Json(state.services().playback.snapshot()))
}

async fn playback_state(State(state): State<AppState>) -> Json<PlaybackSnapshot> {
    Json(state.services().playback.snapshot())
}

async fn start_timer(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<StartTimerRequest>,
) -> Result<Json<TimerResponse>, ServerError> {
    let command = match (req.duration, req.event_id) {
        (Some(duration_ms), _) => Command::StartTimer { duration_ms },
        (None, Some(event_id)) => Command::StartEventTimer { event_id },
        (None, None) => {
            return Err(ServerError::Validation(
                "either duration or eventId is required".into(),
            ))
        }
    };
    match state.bridge.execute(Origin::Http, command).await? {
        Outcome::TimerStarted { duration_ms } => Ok(Json(TimerResponse {
            status: "success",
            duration: duration_ms,
        })),
        other => Err(unexpected(other)),
    }
}

async fn stop_playback(State(state): State<AppState>) -> Result<Json<StatusResponse>, ServerError> {
    state.bridge.execute(Origin::Http, Command::Stop).await?;
    Ok(Json(OK))
}

async fn reset_timer(State(state): State<AppState>) -> Result<Json<TimerResponse>, ServerError> {
    match state.bridge.execute(Origin::Http, Command::ResetTimer).await? {
        Outcome::TimerReset { duration_ms } => Ok(Json(TimerResponse {
            status: "success",
            duration: duration_ms,
        })),
        other => Err(unexpected(other)),
    }
}

async fn update_timer_settings(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TimerSettingsRequest>,
) -> Result<Json<TimerSettings>, ServerError> {
    Ok(Json(
        state
            .services()
            .playback
            .update_timer_settings(&req.event_id, req.settings)
            .await?,
    ))
}

async fn event_timer_status(
    State(state): State<AppState>,
    ApiPath(event_id): ApiPath<String>,
) -> Result<Json<EventTimerStatus>, ServerError> {
    Ok(Json(state.services().playback.timer_status(&event_id).await?))
}

async fn create_conversation(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ServerError> {
    let conversation = state
        .services()
        .messaging
        .create_conversation(&req.participant_a, &req.participant_b)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn conversation_history(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Vec<Message>>, ServerError> {
    Ok(Json(state.services().messaging.history(&id).await?))
}

async fn online_users(State(state): State<AppState>) -> Json<Vec<OnlineUser>> {
    Json(state.services().presence.online_users().await)
}

async fn user_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<UserStatus>, ServerError> {
    Ok(Json(state.services().presence.user_status(&id).await?))
}

async fn user_conversations(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Vec<ConversationSummary>>, ServerError> {
    Ok(Json(state.services().messaging.conversations_for_user(&id).await?))
}

async fn list_capabilities(State(state): State<AppState>) -> Json<Vec<CapabilityView>> {
    Json(state.services().capabilities.list())
}

async fn set_capability(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<CapabilityRequest>,
) -> Result<Json<CapabilityView>, ServerError> {
    Ok(Json(state.services().capabilities.set_enabled(&id, req.enabled)?))
}

fn unexpected(outcome: Outcome) -> ServerError {
    ServerError::Internal(format!("unexpected outcome {outcome:?}"))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
