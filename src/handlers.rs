use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, header::HOST},
    response::Response,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::{
    config::non_empty,
    error::{ApiError, ConvertError},
    job::DownloadJob,
    request::ConversionRequest,
    response::build_audio_response,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    url: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/convert", get(convert))
        .route("/api/auth/start", get(auth_start))
        .route("/api/auth/callback", get(auth_callback))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend": state.backend.name(),
        "formats": state.backend.supported_formats(),
    }))
}

async fn convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> Result<Response, ApiError> {
    let request = ConversionRequest::validate(
        query.url.as_deref(),
        query.format.as_deref(),
        &state.backend.supported_formats(),
    )?;
    state.backend.validate_source(&request.source_url)?;

    let job = DownloadJob::new();
    info!(
        "Job {} converting {:?} to {} via {}",
        job.token(),
        request.source_url,
        request.format,
        state.backend.name()
    );

    let bearer_token = state.credentials.get_valid_token().await;
    let artifact = state
        .backend
        .fetch_audio(&request, &job, bearer_token.as_deref())
        .await
        .map_err(|error| {
            warn!("Job {} failed: {error}", job.token());
            error
        })?;

    info!(
        "Job {} sending {} bytes (.{}) after {}ms",
        job.token(),
        artifact.bytes.len(),
        artifact.extension,
        (Utc::now() - job.created_at).num_milliseconds()
    );
    build_audio_response(artifact)
}

async fn auth_start(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let redirect_uri = callback_uri(&state, &headers);
    let url = state
        .credentials
        .authorization_url(&redirect_uri)
        .ok_or(ConvertError::OAuthNotConfigured)?;

    Ok(Json(json!({ "url": url, "redirect_uri": redirect_uri })))
}

async fn auth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuthCallbackQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(oauth_error) = query.error.as_deref().and_then(non_empty) {
        return Err(ConvertError::OAuthDenied(oauth_error.to_string()).into());
    }

    let code = query
        .code
        .as_deref()
        .and_then(non_empty)
        .ok_or(ConvertError::MissingAuthorizationCode)?;

    let settings = state.credentials.settings();
    let (Some(client_id), Some(client_secret)) = (
        settings.client_id.as_deref(),
        settings.client_secret.as_deref(),
    ) else {
        return Err(ConvertError::OAuthNotConfigured.into());
    };

    let redirect_uri = callback_uri(&state, &headers);
    let tokens = state
        .credentials
        .exchange_code_for_tokens(code, client_id, client_secret, &redirect_uri)
        .await
        .map_err(|exchange_error| {
            error!("OAuth code exchange failed: {exchange_error}");
            exchange_error
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "OAuth successful! Save these tokens as environment variables:",
        "tokens": {
            "GOOGLE_REFRESH_TOKEN": tokens.refresh_token,
            "GOOGLE_CLIENT_ID": client_id,
            "GOOGLE_CLIENT_SECRET": client_secret,
            "YOUTUBE_OAUTH_TOKEN": tokens.access_token,
        },
        "instructions": [
            "1. Set these as environment variables for the server",
            "2. Restart the server",
            "3. Access tokens are now refreshed automatically",
            "",
            "IMPORTANT: Save GOOGLE_REFRESH_TOKEN now, it will not be shown again!",
        ],
    })))
}

fn callback_uri(state: &AppState, headers: &HeaderMap) -> String {
    format!("{}/api/auth/callback", request_origin(state, headers))
}

fn request_origin(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.public_base_url {
        return base.clone();
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(non_empty)
            .map(ToString::to_string)
    };
    let scheme = header("x-forwarded-proto")
        .and_then(|value| value.split(',').next().map(|first| first.trim().to_string()))
        .unwrap_or_else(|| "http".to_string());
    let host = header("x-forwarded-host")
        .or_else(|| header(HOST.as_str()))
        .unwrap_or_else(|| "localhost".to_string());

    format!("{scheme}://{host}")
}
