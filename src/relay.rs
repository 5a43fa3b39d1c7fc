use crate::config::RelayConfig;
use crate::constants::{
    CORS_ALLOWED_HEADERS, EVENT_STREAM_CONTENT_TYPE, RELAY_CHAT_PATH,
};
use crate::logging::{request_id_middleware, StreamMetric};
use crate::main_helper::AppState;
use crate::prompt::build_completion_request;
use crate::types::*;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures_util::StreamExt;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(RELAY_CHAT_PATH, post(medical_chat_handler))
        .route("/health", get(crate::health::liveness))
        .route("/readyz", get(crate::health::readiness))
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(cors_layer())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Any origin, fixed header list. Preflight `OPTIONS` is answered here with
/// an empty body and never reaches a handler.
pub fn cors_layer() -> CorsLayer {
    let headers: Vec<HeaderName> = CORS_ALLOWED_HEADERS
        .iter()
        .copied()
        .map(HeaderName::from_static)
        .collect();
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(headers)
}

#[tracing::instrument(
    name = "relay.request",
    skip_all,
    fields(
        language = tracing::field::Empty,
        messages = tracing::field::Empty,
        http.status = tracing::field::Empty,
        relay.outcome = tracing::field::Empty,
    )
)]
pub async fn medical_chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let span = tracing::Span::current();

    let response = match relay_chat(&state, &headers, body).await {
        Ok(response) => {
            span.record("relay.outcome", "streaming");
            response
        }
        Err(e) => {
            span.record("relay.outcome", e.inner.outcome());
            e.into_response()
        }
    };
    span.record("http.status", response.status().as_u16());
    response
}

async fn relay_chat(
    state: &AppState,
    headers: &HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    authorize(&state.config, headers)?;

    let body = body.map_err(|rejection| body_rejected(rejection, state.config.max_body_size))?;
    let request = ChatRequest::from_slice(&body)?;
    let language = request.language();
    let span = tracing::Span::current();
    span.record("language", language.as_str());
    span.record("messages", request.messages.len());

    let api_key = match state.config.upstream_api_key.as_deref() {
        Some(k) => k,
        None => {
            return Err(VaidyaError::Config(format!(
                "{} is not configured",
                crate::constants::ENV_GATEWAY_API_KEY
            ))
            .into())
        }
    };

    let outgoing = build_completion_request(&state.config.model, &request.messages, language);
    tracing::info!(
        "[📱 -> ☁️ ] Relaying {} messages ({}) to {}",
        request.messages.len(),
        language,
        state.config.model
    );

    let response = state
        .client
        .post(&state.config.upstream_url)
        .bearer_auth(api_key)
        .json(&outgoing)
        .send()
        .await?;

    let status = response.status();
    tracing::info!("[☁️  -> ⚙️ ] Status: {}", status);
    if !status.is_success() {
        return Err(classify_upstream_failure(response).await);
    }

    let mut metric = StreamMetric::new(crate::logging::request_id(headers));
    let passthrough = response.bytes_stream().inspect(move |chunk| metric.record(chunk));

    Ok((
        [(header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE)],
        Body::from_stream(passthrough),
    )
        .into_response())
}

/// Rejects callers without the configured bearer token. No token configured
/// means the relay is open.
fn authorize(config: &RelayConfig, headers: &HeaderMap) -> Result<()> {
    let expected = match config.client_key.as_deref() {
        Some(k) => k,
        None => return Ok(()),
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(VaidyaError::Unauthorized("invalid bearer token".to_string()).into()),
        None => Err(VaidyaError::Unauthorized("missing bearer token".to_string()).into()),
    }
}

/// Body extraction failures, including the size limit, rendered as relay errors.
fn body_rejected(rejection: BytesRejection, limit: usize) -> ObservedError {
    tracing::warn!("Request body rejected: {}", rejection.body_text());
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        VaidyaError::PayloadTooLarge(limit).into()
    } else {
        VaidyaError::InvalidRequest(rejection.body_text()).into()
    }
}

/// 429 and 402 keep their meaning for the client; everything else is a
/// generic failure whose body stays in the log.
pub async fn classify_upstream_failure(response: reqwest::Response) -> ObservedError {
    let status = response.status();
    let body = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Failed to read upstream error body: {}", e);
            format!("Upstream error (body unreadable): {}", e)
        }
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!("[☁️  -> ⚙️ ] Upstream rate limited: {}", body);
            VaidyaError::RateLimited(body).into()
        }
        StatusCode::PAYMENT_REQUIRED => {
            tracing::warn!("[☁️  -> ⚙️ ] Upstream credits exhausted: {}", body);
            VaidyaError::QuotaExhausted(body).into()
        }
        _ => {
            tracing::error!("[☁️  -> ⚙️ ] AI gateway error {}: {}", status, body);
            VaidyaError::Upstream(status, body).into()
        }
    }
}
