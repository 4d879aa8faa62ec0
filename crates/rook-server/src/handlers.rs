//! HTTP route handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Redirect, Response};
use futures::StreamExt;
use rook_core::{GameKind, SessionId};
use rook_rules::{Board, STARTING_FEN};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bootstrap::{run_session, SessionContext};
use crate::computer::{self, EngineLimits, PlayResponse};
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::server::AppState;

/// One game as shown to a browser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameView {
    pub position: String,
    pub id: String,
}

/// GET /: every computer game, keyed by id.
pub async fn index(State(state): State<AppState>) -> Result<Json<BTreeMap<String, String>>, ServerError> {
    let games = state
        .repo
        .list(GameKind::Computer)?
        .into_iter()
        .map(|g| (g.id.to_string(), g.position))
        .collect();
    Ok(Json(games))
}

/// GET /new/{player}: start a computer game with the human as `player`.
pub async fn new_game(
    State(state): State<AppState>,
    Path(player): Path<String>,
) -> Result<Redirect, ServerError> {
    let mut board = Board::new();
    match player.as_str() {
        "white" => {}
        "black" => {
            let _ = board
                .play_squares("e2", "e4")
                .map_err(|e| ServerError::Internal(e.to_string()))?;
        }
        other => {
            return Err(ServerError::BadRequest(format!(
                "player must be white or black, got {other:?}"
            )))
        }
    }
    let record = state.repo.create(GameKind::Computer, &board.to_fen())?;
    info!(session_id = %record.id, player = %player, "computer game created");
    Ok(Redirect::to(&format!("/view/{}", record.id)))
}

/// GET /view/{id}
pub async fn view_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GameView>, ServerError> {
    view(&state, GameKind::Computer, id)
}

/// GET /play/{id}/{orig}/{dest}: human move plus engine reply.
pub async fn play_game(
    State(state): State<AppState>,
    Path((id, origin, destination)): Path<(String, String, String)>,
) -> Result<Json<PlayResponse>, ServerError> {
    let limits = EngineLimits {
        depth: state.config.search_depth,
        think_timeout: state.config.think_timeout,
    };
    let id = SessionId::from_raw(id);
    let resp = computer::play(&state.repo, &id, &origin, &destination, limits).await?;
    Ok(Json(resp))
}

/// GET /challenge/new: open a two-seat session.
pub async fn new_challenge(State(state): State<AppState>) -> Result<Redirect, ServerError> {
    let record = state.repo.create(GameKind::Challenge, STARTING_FEN)?;
    info!(session_id = %record.id, "challenge created");
    Ok(Redirect::to(&format!("/challenge/{}", record.id)))
}

/// GET /challenge/{id}
pub async fn view_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<GameView>, ServerError> {
    view(&state, GameKind::Challenge, id)
}

/// GET /connect/{id}: upgrade and attach to challenge `id`.
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let limits = state.config.limits.clone();
    let ctx = SessionContext {
        hub: state.hub.clone(),
        store: Arc::new(state.repo.positions(GameKind::Challenge)),
        limits: limits.clone(),
        scope: state.config.hub_scope,
    };
    ws.max_message_size(limits.max_message_size)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            run_session::<Board, _, _, _>(sink, stream, SessionId::from_raw(id), ctx).await;
        })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (participants, sessions) = state
        .hub
        .snapshot()
        .await
        .map_or((0, 0), |s| (s.participants(), s.sessions()));
    Json(health::health_check(state.start_time, participants, sessions))
}

/// GET /metrics: Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => rook_telemetry::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

fn view(state: &AppState, kind: GameKind, id: String) -> Result<Json<GameView>, ServerError> {
    let record = state.repo.get(kind, &SessionId::from_raw(id))?;
    Ok(Json(GameView {
        position: record.position,
        id: record.id.to_string(),
    }))
}
