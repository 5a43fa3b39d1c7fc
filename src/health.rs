use crate::main_helper::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub credential: String,
    pub model: String,
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "ok" })
}

/// Ready only when the gateway credential is configured; without it every
/// chat request would fail with a configuration error.
pub async fn readiness(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let credential_ok = state.config.has_credential();
    if !credential_ok {
        tracing::error!("Readiness check: gateway credential missing");
    }

    let status_code = if credential_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: if credential_ok { "ready" } else { "unready" }.to_string(),
            credential: if credential_ok { "ok" } else { "missing" }.to_string(),
            model: state.config.model.clone(),
        }),
    )
}
