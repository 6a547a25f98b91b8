use std::path::PathBuf;

use tokio::time::Duration;
use tracing::warn;

use crate::{
    backend::ytdlp::{DEFAULT_DOWNLOAD_TIMEOUT_SECONDS, DEFAULT_METADATA_TIMEOUT_SECONDS, YtDlpOptions},
    credentials::OAuthSettings,
    error::ApiError,
};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    YtDlp,
    Library,
}

impl BackendKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yt-dlp" | "ytdlp" | "subprocess" => Some(Self::YtDlp),
            "library" | "rusty_ytdl" | "rusty-ytdl" => Some(Self::Library),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub backend: BackendKind,
    pub ytdlp: YtDlpOptions,
    pub allowed_origins: Vec<String>,
    pub public_base_url: Option<String>,
    pub oauth: OAuthSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let read = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(ToString::to_string));
        let read_bool = |name: &str| read(name).and_then(|value| parse_bool(&value));
        let read_u64 = |name: &str| read(name).and_then(|value| value.parse::<u64>().ok());

        let backend = match read("AUDIO_BACKEND") {
            None => BackendKind::YtDlp,
            Some(value) => BackendKind::parse(&value).ok_or_else(|| {
                ApiError::internal(format!(
                    "Unknown AUDIO_BACKEND {value:?}. Use \"yt-dlp\" or \"library\"."
                ))
            })?,
        };

        let mut mp3_enabled = read_bool("ENABLE_MP3").unwrap_or(false);
        if mp3_enabled && backend == BackendKind::Library {
            warn!("ENABLE_MP3 ignored: the library backend cannot transcode to MP3.");
            mp3_enabled = false;
        }

        let ytdlp = YtDlpOptions {
            binary: read("YT_DLP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_binary_path),
            temp_dir: read("DOWNLOAD_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            ffmpeg_location: read("FFMPEG_PATH").map(PathBuf::from),
            mp3_enabled,
            metadata_timeout: Duration::from_secs(
                read_u64("YT_DLP_METADATA_TIMEOUT_SECONDS")
                    .filter(|value| *value > 0)
                    .unwrap_or(DEFAULT_METADATA_TIMEOUT_SECONDS),
            ),
            download_timeout: Duration::from_secs(
                read_u64("YT_DLP_DOWNLOAD_TIMEOUT_SECONDS")
                    .filter(|value| *value > 0)
                    .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECONDS),
            ),
        };

        let allowed_origins = read("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let oauth = OAuthSettings {
            client_id: read("GOOGLE_CLIENT_ID"),
            client_secret: read("GOOGLE_CLIENT_SECRET"),
            refresh_token: read("GOOGLE_REFRESH_TOKEN"),
            static_token: read("YOUTUBE_OAUTH_TOKEN"),
        };

        Ok(Self {
            bind_addr: resolve_bind_addr(read("APP_ADDR"), read("PORT")),
            backend,
            ytdlp,
            allowed_origins,
            public_base_url: read("PUBLIC_BASE_URL")
                .map(|value| value.trim_end_matches('/').to_string()),
            oauth,
        })
    }
}

fn default_binary_path() -> PathBuf {
    let name = if cfg!(windows) { "yt-dlp.exe" } else { "yt-dlp" };
    PathBuf::from("bin").join(name)
}

fn resolve_bind_addr(app_addr: Option<String>, port: Option<String>) -> String {
    if let Some(configured) = app_addr {
        return configured;
    }

    if let Some(port) = port.and_then(|value| value.parse::<u16>().ok()) {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
