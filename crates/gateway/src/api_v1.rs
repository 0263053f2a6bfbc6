//! v1 API: turn handling and context inspection.
//!
//! - `POST /v1/turn` runs a turn and returns its envelope. The HTTP status
//!   follows the envelope's error code (400, 500, 503) and is 200 otherwise.
//! - `POST /v1/context/preview` returns the context pack a turn would send,
//!   without calling the LLM.
//! - `GET /v1/context/{hash}` returns a recently assembled pack by context hash.

use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use decisionflow_agent::{ContextPack, TurnOrchestrator};
use decisionflow_core::{ErrorCode, ResponseEnvelope, TurnRequest};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct ApiV1State {
    pub orchestrator: TurnOrchestrator,
}

pub type SharedApiState = Arc<ApiV1State>;

pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/turn", post(turn_handler))
        .route("/context/preview", post(preview_handler))
        .route("/context/{hash}", get(cached_context_handler))
        .with_state(state)
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn envelope_response(envelope: ResponseEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

/// Malformed bodies still get an envelope-shaped answer.
fn rejection_envelope(rejection: &JsonRejection) -> Response {
    let mut envelope = ResponseEnvelope::failure(
        "",
        ErrorCode::InvalidRequest,
        format!("invalid request body: {}", rejection.body_text()),
    );
    envelope.observability.request_id = uuid::Uuid::new_v4().to_string();
    let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(envelope)).into_response()
}

async fn turn_handler(
    State(state): State<SharedApiState>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected turn body");
            return rejection_envelope(&rejection);
        }
    };

    info!(
        turn_id = %request.client_turn_id,
        scenario_id = %request.scenario_id,
        system_event = request.system_event.as_ref().map(|e| e.kind.as_str()),
        "Turn received"
    );

    // Dropping this handler (client went away) cancels the run.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let envelope = state.orchestrator.handle_turn(request, cancel).await;
    guard.disarm();

    envelope_response(envelope)
}

async fn preview_handler(
    State(state): State<SharedApiState>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<ContextPack>, (StatusCode, Json<ErrorResponse>)> {
    let Json(request) = payload.map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: rejection.body_text(),
            }),
        )
    })?;

    state
        .orchestrator
        .preview(&request)
        .map(Json)
        .map_err(|error| (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })))
}

async fn cached_context_handler(
    State(state): State<SharedApiState>,
    Path(hash): Path<String>,
) -> Result<Json<ContextPack>, (StatusCode, Json<ErrorResponse>)> {
    state.orchestrator.cached_pack(&hash).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no cached context pack for hash '{hash}'"),
            }),
        )
    })
}
