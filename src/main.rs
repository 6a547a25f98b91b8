mod backend;
mod config;
mod credentials;
mod error;
mod format;
mod handlers;
mod job;
mod locator;
mod request;
mod response;
mod state;

use std::{collections::HashSet, sync::Arc};

use axum::http::{HeaderValue, Method, header::CONTENT_DISPOSITION};
use tokio::{net::TcpListener, time::Duration};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    backend::build_backend,
    config::{BackendKind, Config},
    credentials::{CredentialProvider, spawn_background_refresh},
    error::ApiError,
    handlers::build_router,
    locator::sweep_stale_artifacts,
    state::AppState,
};

const HTTP_CLIENT_TIMEOUT_SECONDS: u64 = 15;
const TOKEN_REFRESH_INTERVAL_SECONDS: u64 = 45 * 60;
const STALE_ARTIFACT_SECONDS: u64 = 2 * 60 * 60;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "yt_audio_converter=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    let backend = build_backend(&config)?;

    if config.backend == BackendKind::YtDlp {
        let temp_dir = &config.ytdlp.temp_dir;
        tokio::fs::create_dir_all(temp_dir).await.map_err(|error| {
            ApiError::internal(format!(
                "Could not create download directory {}: {error}",
                temp_dir.display()
            ))
        })?;

        let removed =
            sweep_stale_artifacts(temp_dir, Duration::from_secs(STALE_ARTIFACT_SECONDS)).await;
        if removed > 0 {
            info!("Removed {removed} stale artifact(s) from {}", temp_dir.display());
        }
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECONDS))
        .build()
        .map_err(|error| ApiError::internal(format!("Could not build HTTP client: {error}")))?;
    let credentials = Arc::new(CredentialProvider::new(config.oauth.clone(), http_client));

    if credentials.auto_refresh_enabled() {
        spawn_background_refresh(
            Arc::clone(&credentials),
            Duration::from_secs(TOKEN_REFRESH_INTERVAL_SECONDS),
        );
    } else if config.oauth.static_token.is_some() {
        info!("Using static YOUTUBE_OAUTH_TOKEN without auto-refresh.");
    } else {
        warn!("No OAuth credentials configured. Downloads run unauthenticated.");
    }

    let state = AppState {
        backend,
        credentials,
        public_base_url: config.public_base_url.clone(),
    };

    let cors = build_cors_layer(&config.allowed_origins)?;
    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = &config.bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|error| ApiError::internal(format!("Could not bind {addr}: {error}")))?;

    info!("Audio converter listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {error}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections.");
}

fn build_cors_layer(configured: &[String]) -> Result<CorsLayer, ApiError> {
    let origins = if configured.is_empty() {
        warn!("ALLOWED_ORIGINS is not set. Falling back to local development origins.");
        vec![
            "http://127.0.0.1:5173".to_string(),
            "http://localhost:5173".to_string(),
            "http://localhost:3000".to_string(),
        ]
    } else {
        configured.to_vec()
    };

    let allowed_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Expected values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    info!("CORS allow-list: {:?}", allowed_origins);

    let allowed_origins = Arc::new(allowed_origins);
    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let normalized = origin.to_str().ok().and_then(normalize_origin);
        let allowed = normalized
            .as_ref()
            .is_some_and(|value| allowed_origins.contains(value));
        debug!("CORS origin {:?} allowed={}", origin, allowed);
        allowed
    });

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers([CONTENT_DISPOSITION]))
}

/// Canonical `scheme://host[:port]` form, dropping default ports. Anything
/// with a path, query or fragment is not an origin.
fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    if !matches!(scheme, "http" | "https") {
        return None;
    }
    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_normalized() {
        assert_eq!(
            normalize_origin("HTTPS://Audio.Example.com"),
            Some("https://audio.example.com".to_string())
        );
        assert_eq!(
            normalize_origin("https://audio.example.com:443"),
            Some("https://audio.example.com".to_string())
        );
        assert_eq!(
            normalize_origin("http://localhost:5173/"),
            Some("http://localhost:5173".to_string())
        );
    }

    #[test]
    fn non_origins_are_refused() {
        assert_eq!(normalize_origin("https://audio.example.com/app"), None);
        assert_eq!(normalize_origin("ftp://audio.example.com"), None);
        assert_eq!(normalize_origin("audio.example.com"), None);
    }

    #[test]
    fn invalid_configured_origin_fails_startup() {
        let error = build_cors_layer(&["not an origin".to_string()]).unwrap_err();
        assert!(error.message.contains("ALLOWED_ORIGINS"));
    }

    #[test]
    fn defaults_apply_without_configuration() {
        assert!(build_cors_layer(&[]).is_ok());
    }
}
