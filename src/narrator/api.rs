//! HTTP bridge between the host (editor panel, hooks, scripts) and the
//! narration service.
//!
//! Every request is turned into a [`Command`] and answered immediately;
//! playback progress is observable through `GET /status`.

use axum::extract::State;
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::engine::Voice;
use super::sequencer::Status;
use super::settings::SettingsUpdate;
use crate::service::{Command, NarrationHandle};

#[derive(Deserialize)]
struct TextRequest {
    text: String,
}

#[derive(Serialize)]
struct VoicesResponse {
    voices: Vec<Voice>,
    selected: Option<String>,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
        }
    }
}

/// Build the axum router.
pub fn router(state: NarrationHandle) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/voices", get(handle_voices))
        .route("/speak", post(handle_speak))
        .route("/force-speech", post(handle_force_speech))
        .route("/response", post(handle_response))
        .route("/stop", command_route(Command::Stop, "stopped"))
        .route("/pause", command_route(Command::Pause, "paused"))
        .route("/resume", command_route(Command::Resume, "resumed"))
        .route("/settings", post(handle_settings))
        .route("/settings/save", post(handle_save_settings))
        .route("/read-last", command_route(Command::ReadLastResponse, "ok"))
        .route("/reload-voices", command_route(Command::ReloadVoices, "ok"))
        .route("/test-voice", command_route(Command::TestVoice, "speaking"))
        .route("/enable", command_route(Command::SetEnabled(true), "enabled"))
        .route("/disable", command_route(Command::SetEnabled(false), "disabled"))
        .with_state(state)
}

/// Start the bridge as a background tokio task. A bind failure is logged
/// and narration carries on without the bridge.
pub async fn start_api(state: NarrationHandle, port: u16) {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind narration API on {addr}: {e}");
            return;
        }
    };
    info!("Narration API listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Narration API server error: {e}");
        }
    });
}

async fn dispatch(state: &NarrationHandle, command: Command, status: &str) -> Json<SimpleResponse> {
    match state.commands.send(command).await {
        Ok(()) => Json(SimpleResponse::ok(status)),
        Err(_) => Json(SimpleResponse::err("narration service stopped")),
    }
}

/// Route for a body-less request that maps to a fixed command.
fn command_route(command: Command, status: &'static str) -> MethodRouter<NarrationHandle> {
    post(move |State(state): State<NarrationHandle>| async move {
        dispatch(&state, command, status).await
    })
}

fn log_text(route: &str, text: &str) {
    let preview: String = text.chars().take(80).collect();
    info!(
        "HTTP {route}: \"{}{}\" ({} chars)",
        preview.replace('\n', " "),
        if text.chars().count() > 80 { "..." } else { "" },
        text.len(),
    );
}

async fn handle_status(State(state): State<NarrationHandle>) -> Json<Status> {
    Json(state.status.borrow().clone())
}

async fn handle_voices(State(state): State<NarrationHandle>) -> Json<VoicesResponse> {
    Json(VoicesResponse {
        voices: state.voices.borrow().clone(),
        selected: state.status.borrow().voice.clone(),
    })
}

async fn handle_speak(
    State(state): State<NarrationHandle>,
    Json(req): Json<TextRequest>,
) -> Json<SimpleResponse> {
    if req.text.trim().is_empty() {
        return Json(SimpleResponse::err("empty text"));
    }
    log_text("/speak", &req.text);
    dispatch(&state, Command::Speak { text: req.text }, "speaking").await
}

async fn handle_force_speech(
    State(state): State<NarrationHandle>,
    Json(req): Json<TextRequest>,
) -> Json<SimpleResponse> {
    if req.text.trim().is_empty() {
        return Json(SimpleResponse::err("empty text"));
    }
    log_text("/force-speech", &req.text);
    dispatch(&state, Command::ForceSpeech { text: req.text }, "speaking").await
}

async fn handle_response(
    State(state): State<NarrationHandle>,
    Json(req): Json<TextRequest>,
) -> Json<SimpleResponse> {
    if req.text.trim().is_empty() {
        return Json(SimpleResponse::err("empty text"));
    }
    log_text("/response", &req.text);
    dispatch(&state, Command::ResponseDetected { text: req.text }, "received").await
}

async fn handle_settings(
    State(state): State<NarrationHandle>,
    Json(update): Json<SettingsUpdate>,
) -> Json<SimpleResponse> {
    dispatch(&state, Command::UpdateSettings(update), "ok").await
}

async fn handle_save_settings(
    State(state): State<NarrationHandle>,
    Json(update): Json<SettingsUpdate>,
) -> Json<SimpleResponse> {
    dispatch(&state, Command::SaveSettings(update), "saved").await
}
