// src/server/rest.rs
//
// JSON REST facade over the channel runtime and the persistent stores.
// Every response uses the `{success, ...}` envelope.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::MonitorError;
use crate::export::{export_entries, ExportOptions};
use crate::macros::{Macro, MacroExecutor, MacroRequest};
use crate::ports;
use crate::store::{Profile, ProfileRequest};
use crate::types::{PortConfigRequest, DEFAULT_CHANNEL};

use super::AppState;

fn ok(mut body: Value) -> Response {
    body["success"] = json!(true);
    Json(body).into_response()
}

fn fail(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(json!({"success": false, "error": error.to_string()})),
    )
        .into_response()
}

fn fail_from(error: MonitorError) -> Response {
    let status = match &error {
        MonitorError::NotFound { .. } => StatusCode::NOT_FOUND,
        MonitorError::InvalidConfig { .. } | MonitorError::InvalidEncoding { .. } => {
            StatusCode::BAD_REQUEST
        }
        MonitorError::NotConnected { .. } => StatusCode::CONFLICT,
        MonitorError::DeviceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, error)
}

fn parse_id(id: &str, kind: &'static str) -> Result<Uuid, Response> {
    Uuid::parse_str(id).map_err(|_| fail_from(MonitorError::not_found(kind, id)))
}

// ============================================================================
// Ports and channels
// ============================================================================

pub async fn list_ports() -> Response {
    let listed = tokio::task::spawn_blocking(ports::list_ports).await;
    match listed {
        Ok(Ok(ports)) => ok(json!({"ports": ports})),
        Ok(Err(e)) => fail_from(e),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectBody {
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(flatten)]
    config: PortConfigRequest,
}

pub async fn connect(State(state): State<AppState>, Json(body): Json<ConnectBody>) -> Response {
    let channel_id = body.channel_id.unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
    let config = match body.config.build() {
        Ok(config) => config,
        Err(e) => return fail_from(e),
    };
    match state.manager.connect(&channel_id, config).await {
        Ok(()) => ok(json!({"channelId": channel_id})),
        Err(e) => fail_from(e),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelBody {
    channel_id: Option<String>,
}

impl ChannelBody {
    fn channel_id(&self) -> &str {
        self.channel_id.as_deref().filter(|id| !id.is_empty()).unwrap_or(DEFAULT_CHANNEL)
    }
}

pub async fn disconnect(State(state): State<AppState>, Json(body): Json<ChannelBody>) -> Response {
    state.manager.disconnect(body.channel_id()).await;
    ok(json!({"channelId": body.channel_id()}))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusQuery {
    channel_id: Option<String>,
}

pub async fn status(State(state): State<AppState>, Query(query): Query<StatusQuery>) -> Response {
    match query.channel_id.as_deref().filter(|id| !id.is_empty()) {
        Some(channel_id) => ok(json!({
            "channelId": channel_id,
            "status": state.manager.get_status(channel_id),
        })),
        None => ok(json!({"channels": state.manager.status_all()})),
    }
}

pub async fn clear(State(state): State<AppState>, Json(body): Json<ChannelBody>) -> Response {
    state.manager.clear_buffer(body.channel_id());
    ok(json!({"channelId": body.channel_id()}))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferQuery {
    channel_id: Option<String>,
    start: Option<usize>,
    count: Option<usize>,
}

/// History pull: buffer-relative slice of one channel's entries.
pub async fn get_buffer(State(state): State<AppState>, Query(query): Query<BufferQuery>) -> Response {
    let channel_id = query
        .channel_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(DEFAULT_CHANNEL);
    let entries = state
        .manager
        .get_buffer(channel_id, query.start.unwrap_or(0), query.count);
    ok(json!({"channelId": channel_id, "entries": entries}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBody {
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(flatten)]
    options: ExportOptions,
}

pub async fn export(State(state): State<AppState>, Json(body): Json<ExportBody>) -> Response {
    let channel_id = body.channel_id.as_deref().filter(|id| !id.is_empty()).unwrap_or(DEFAULT_CHANNEL);
    let entries = state.manager.get_buffer(channel_id, 0, None);
    match export_entries(&entries, &body.options) {
        Ok(content) => ok(json!({
            "channelId": channel_id,
            "format": body.options.format,
            "content": content,
        })),
        Err(e) => fail_from(e),
    }
}

pub async fn plugins(State(state): State<AppState>) -> Response {
    ok(json!({"plugins": state.decoders.list()}))
}

// ============================================================================
// Macros
// ============================================================================

pub async fn list_macros(State(state): State<AppState>) -> Response {
    ok(json!({"macros": state.macros.all()}))
}

pub async fn create_macro(
    State(state): State<AppState>,
    Json(request): Json<MacroRequest>,
) -> Response {
    let created = Macro::create(request);
    match state.macros.add(created.clone()) {
        Ok(()) => ok(json!({"macro": created})),
        Err(e) => {
            error!("[rest] macro save failed: {}", e);
            fail_from(e)
        }
    }
}

pub async fn get_macro(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id, "macro") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.macros.get(id) {
        Some(found) => ok(json!({"macro": found})),
        None => fail_from(MonitorError::not_found("macro", id.to_string())),
    }
}

pub async fn update_macro(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MacroRequest>,
) -> Response {
    let id = match parse_id(&id, "macro") {
        Ok(id) => id,
        Err(response) => return response,
    };
    let existing = match state.macros.get(id) {
        Some(existing) => existing,
        None => return fail_from(MonitorError::not_found("macro", id.to_string())),
    };
    let updated = existing.update(request);
    match state.macros.replace(updated.clone()) {
        Ok(()) => ok(json!({"macro": updated})),
        Err(e) => fail_from(e),
    }
}

pub async fn delete_macro(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id, "macro") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.macros.remove(id) {
        Ok(true) => ok(json!({})),
        Ok(false) => fail_from(MonitorError::not_found("macro", id.to_string())),
        Err(e) => fail_from(e),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RunMacroBody {
    channel_id: Option<String>,
    params: HashMap<String, String>,
}

pub async fn run_macro(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RunMacroBody>,
) -> Response {
    let id = match parse_id(&id, "macro") {
        Ok(id) => id,
        Err(response) => return response,
    };
    let macro_def = match state.macros.get(id) {
        Some(found) => found,
        None => return fail_from(MonitorError::not_found("macro", id.to_string())),
    };
    let channel_id = body.channel_id.as_deref().filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CHANNEL);

    let executor = MacroExecutor::new(state.manager.clone());
    match executor.run(&macro_def, channel_id, &body.params).await {
        Ok(()) => ok(json!({"macroId": id, "channelId": channel_id})),
        Err(e) => fail_from(e),
    }
}

// ============================================================================
// Profiles
// ============================================================================

pub async fn list_profiles(State(state): State<AppState>) -> Response {
    ok(json!({"profiles": state.profiles.all()}))
}

pub async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileRequest>,
) -> Response {
    let created = Profile::create(request);
    match state.profiles.add(created.clone()) {
        Ok(()) => ok(json!({"profile": created})),
        Err(e) => {
            error!("[rest] profile save failed: {}", e);
            fail_from(e)
        }
    }
}

pub async fn get_profile(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id, "profile") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.profiles.get(id) {
        Some(found) => ok(json!({"profile": found})),
        None => fail_from(MonitorError::not_found("profile", id.to_string())),
    }
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProfileRequest>,
) -> Response {
    let id = match parse_id(&id, "profile") {
        Ok(id) => id,
        Err(response) => return response,
    };
    let existing = match state.profiles.get(id) {
        Some(existing) => existing,
        None => return fail_from(MonitorError::not_found("profile", id.to_string())),
    };
    let updated = existing.update(request);
    match state.profiles.replace(updated.clone()) {
        Ok(()) => ok(json!({"profile": updated})),
        Err(e) => fail_from(e),
    }
}

pub async fn delete_profile(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id, "profile") {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.profiles.remove(id) {
        Ok(true) => ok(json!({})),
        Ok(false) => fail_from(MonitorError::not_found("profile", id.to_string())),
        Err(e) => fail_from(e),
    }
}

// ============================================================================
// Shutdown
// ============================================================================

pub async fn shutdown(State(state): State<AppState>) -> Response {
    info!("[rest] shutdown requested");
    let _ = state.shutdown.send(()).await;
    ok(json!({}))
}
