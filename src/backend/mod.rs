//! Audio download strategies.
//!
//! Exactly one [`AudioBackend`] is built at startup from configuration and
//! shared by every request. Strategies differ in what they can produce
//! (only the yt-dlp strategy can transcode to MP3), so format validation
//! asks the active backend for its supported list.

#[cfg(feature = "library-backend")]
pub mod library;
pub mod ytdlp;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    config::{BackendKind, Config},
    error::{ApiError, ConvertError},
    format::{AudioFormat, describe_formats},
    job::DownloadJob,
    request::ConversionRequest,
};

/// Downloaded audio, held fully in memory until the response is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    /// Without the leading dot.
    pub extension: String,
    pub display_name: String,
}

#[async_trait]
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_formats(&self) -> Vec<AudioFormat>;

    /// Backend-specific source check run before any download work.
    fn validate_source(&self, _url: &str) -> Result<(), ConvertError> {
        Ok(())
    }

    async fn fetch_audio(
        &self,
        request: &ConversionRequest,
        job: &DownloadJob,
        bearer_token: Option<&str>,
    ) -> Result<AudioArtifact, ConvertError>;
}

pub fn build_backend(config: &Config) -> Result<Arc<dyn AudioBackend>, ApiError> {
    let backend: Arc<dyn AudioBackend> = match config.backend {
        BackendKind::YtDlp => Arc::new(ytdlp::YtDlpBackend::new(config.ytdlp.clone())),
        #[cfg(feature = "library-backend")]
        BackendKind::Library => Arc::new(library::RustyYtdlBackend::new()),
        #[cfg(not(feature = "library-backend"))]
        BackendKind::Library => {
            return Err(ApiError::internal(
                "AUDIO_BACKEND=library requires the library-backend feature".to_string(),
            ));
        }
    };

    info!(
        "Audio backend {} serving formats: {}",
        backend.name(),
        describe_formats(&backend.supported_formats())
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(pairs: &[(&str, &str)]) -> Config {
        let pairs = pairs.to_vec();
        Config::from_lookup(move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
        .unwrap()
    }

    #[test]
    fn subprocess_backend_is_the_default() {
        let backend = build_backend(&config_with(&[])).unwrap();
        assert_eq!(backend.name(), "yt-dlp");
        assert_eq!(
            backend.supported_formats(),
            vec![AudioFormat::Webm, AudioFormat::M4a]
        );
    }

    #[test]
    fn subprocess_backend_offers_mp3_when_enabled() {
        let backend = build_backend(&config_with(&[("ENABLE_MP3", "true")])).unwrap();
        assert!(backend.supported_formats().contains(&AudioFormat::Mp3));
    }

    #[cfg(feature = "library-backend")]
    #[test]
    fn library_backend_is_selectable() {
        let backend = build_backend(&config_with(&[("AUDIO_BACKEND", "library")])).unwrap();
        assert_eq!(backend.name(), "library");
    }
}
