// src/server/mod.rs
//
// HTTP surface: one WebSocket endpoint for the live stream plus a JSON REST
// facade. Handlers receive explicitly constructed runtime components
// through shared state; nothing here is a process-wide singleton.

pub mod rest;
pub mod ws;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::prelude::{Engine, BASE64_STANDARD};
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::channel::manager::ChannelManager;
use crate::config::ServerConfig;
use crate::decode::DecoderRegistry;
use crate::store::{MacroStore, ProfileStore};

/// Shared handles for the WS/REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub manager: Arc<ChannelManager>,
    pub decoders: Arc<DecoderRegistry>,
    pub macros: Arc<MacroStore>,
    pub profiles: Arc<ProfileStore>,
    /// Signals the entry point to begin graceful shutdown
    pub shutdown: mpsc::Sender<()>,
}

pub fn router(state: AppState) -> Router {
    let rest = Router::new()
        .route("/ports", get(rest::list_ports))
        .route("/connect", post(rest::connect))
        .route("/disconnect", post(rest::disconnect))
        .route("/status", get(rest::status))
        .route("/clear", post(rest::clear))
        .route("/buffer", get(rest::get_buffer))
        .route("/export", post(rest::export))
        .route("/plugins", get(rest::plugins))
        .route("/macros", get(rest::list_macros).post(rest::create_macro))
        .route(
            "/macros/:id",
            get(rest::get_macro)
                .put(rest::update_macro)
                .delete(rest::delete_macro),
        )
        .route("/macros/:id/run", post(rest::run_macro))
        .route(
            "/profiles",
            get(rest::list_profiles).post(rest::create_profile),
        )
        .route(
            "/profiles/:id",
            get(rest::get_profile)
                .put(rest::update_profile)
                .delete(rest::delete_profile),
        )
        .route("/shutdown", post(rest::shutdown))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ));

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(rest)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP Basic check on the REST surface, active only when configured.
async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.auth_enabled {
        return next.run(request).await;
    }

    let expected = format!(
        "{}:{}",
        state.config.auth_user.as_deref().unwrap_or(""),
        state.config.auth_pass.as_deref().unwrap_or("")
    );
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|value| BASE64_STANDARD.decode(value).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .map(|credentials| credentials == expected)
        .unwrap_or(false);

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic realm=\"portscope\"")],
            Json(json!({"success": false, "error": "unauthorized"})),
        )
            .into_response()
    }
}
