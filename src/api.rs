//! HTTP control API.
//!
//! Mirrors the announcement board: one play/pause and stop button per
//! player, voice and speed settings, and the name translator.
//! Runs on port 8780 (configurable) using axum.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::script::{BroadcastConfig, ScriptInputs, Source};
use crate::segmenter::Lang;
use crate::service::{PreviewKind, ServiceHandle, ServiceStatus, TransportReply};
use crate::sink::{PlayerBoard, PlayerStatus};
use crate::translator::Translator;

/// Player id of the free-text announcement.
pub const CUSTOM_PLAYER: &str = "custom";

#[derive(Clone)]
pub struct ApiState {
    pub service: ServiceHandle,
    pub board: PlayerBoard,
    pub translator: Arc<Translator>,
    pub broadcasts: Arc<Vec<BroadcastConfig>>,
}

// --- Request/Response types ---

#[derive(Deserialize, Default)]
struct ToggleRequest {
    /// Announcement text for the custom player.
    text: Option<String>,
    #[serde(flatten)]
    inputs: ScriptInputs,
}

#[derive(Deserialize)]
struct PreviewRequest {
    kind: PreviewKind,
}

#[derive(Deserialize)]
struct VoicesRequest {
    korean: Option<String>,
    english: Option<String>,
}

#[derive(Deserialize)]
struct SettingsRequest {
    rate: Option<f32>,
    pitch: Option<f32>,
    flight: Option<String>,
    destination: Option<String>,
}

#[derive(Deserialize)]
struct TranslateRequest {
    text: String,
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    service: ServiceStatus,
    players: BTreeMap<String, PlayerStatus>,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transport: Option<TransportReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    translation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            transport: None,
            translation: None,
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
            transport: None,
            translation: None,
        }
    }

    fn from_result(result: Result<(), String>, status: &str) -> Self {
        match result {
            Ok(()) => Self::ok(status),
            Err(e) => Self::err(e),
        }
    }
}

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/broadcasts", get(handle_broadcasts))
        .route("/players/{id}/toggle", post(handle_toggle))
        .route("/players/{id}/stop", post(handle_stop_player))
        .route("/stop", post(handle_stop))
        .route("/preview", post(handle_preview))
        .route("/voices", post(handle_voices))
        .route("/settings", post(handle_settings))
        .route("/translate", post(handle_translate))
        .with_state(state)
}

/// Serve the API until the listener fails. Bind errors are returned to the caller.
pub async fn serve(state: ApiState, port: u16) -> std::io::Result<()> {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Announcer API listening on {addr}");

    axum::serve(listener, app).await
}

// --- Handlers ---

async fn handle_status(State(state): State<ApiState>) -> Json<serde_json::Value> {
    match state.service.status().await {
        Ok(service) => {
            let response = StatusResponse {
                service,
                players: state.board.snapshot(),
            };
            Json(serde_json::to_value(response).unwrap_or_default())
        }
        Err(e) => Json(serde_json::json!({ "status": "error", "error": e })),
    }
}

async fn handle_broadcasts(State(state): State<ApiState>) -> Json<Vec<BroadcastConfig>> {
    Json(state.broadcasts.as_ref().clone())
}

async fn handle_toggle(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<ToggleRequest>>,
) -> Json<SimpleResponse> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let source = if id == CUSTOM_PLAYER {
        Source::Custom(req.text.unwrap_or_default())
    } else if state.broadcasts.iter().any(|b| b.id == id) {
        Source::Broadcast {
            id: id.clone(),
            inputs: req.inputs,
        }
    } else {
        return Json(SimpleResponse::err(format!("Unknown player: {id}")));
    };

    info!("HTTP toggle [{id}]");
    match state.service.toggle(&id, source).await {
        Ok(transport) => Json(SimpleResponse {
            transport: Some(transport),
            ..SimpleResponse::ok("ok")
        }),
        Err(e) => Json(SimpleResponse::err(e)),
    }
}

async fn handle_stop_player(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Json<SimpleResponse> {
    let result = state.service.stop(Some(&id)).await;
    Json(SimpleResponse::from_result(result, "stopped"))
}

async fn handle_stop(State(state): State<ApiState>) -> Json<SimpleResponse> {
    let result = state.service.stop(None).await;
    Json(SimpleResponse::from_result(result, "stopped"))
}

async fn handle_preview(
    State(state): State<ApiState>,
    Json(req): Json<PreviewRequest>,
) -> Json<SimpleResponse> {
    let result = state.service.preview(req.kind).await;
    Json(SimpleResponse::from_result(result, "speaking"))
}

async fn handle_voices(
    State(state): State<ApiState>,
    Json(req): Json<VoicesRequest>,
) -> Json<SimpleResponse> {
    for (lang, name) in [(Lang::Korean, req.korean), (Lang::English, req.english)] {
        let Some(name) = name else { continue };
        if let Err(e) = state.service.select_voice(lang, &name).await {
            warn!("Voice selection failed: {e}");
            return Json(SimpleResponse::err(e));
        }
    }
    Json(SimpleResponse::ok("ok"))
}

async fn handle_settings(
    State(state): State<ApiState>,
    Json(req): Json<SettingsRequest>,
) -> Json<SimpleResponse> {
    if req.rate.is_some() || req.pitch.is_some() {
        if let Err(e) = state.service.adjust(req.rate, req.pitch).await {
            return Json(SimpleResponse::err(e));
        }
    }
    if req.flight.is_some() || req.destination.is_some() {
        if let Err(e) = state.service.select_flight(req.flight, req.destination).await {
            return Json(SimpleResponse::err(e));
        }
    }
    Json(SimpleResponse::ok("ok"))
}

async fn handle_translate(
    State(state): State<ApiState>,
    Json(req): Json<TranslateRequest>,
) -> Json<SimpleResponse> {
    match state.translator.translate(&req.text).await {
        Ok(translation) => Json(SimpleResponse {
            translation: Some(translation),
            ..SimpleResponse::ok("ok")
        }),
        // Already alerted by the translator
        Err(e) => Json(SimpleResponse::err(e.to_string())),
    }
}
