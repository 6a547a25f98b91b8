use url::Url;

use crate::{
    error::ConvertError,
    format::{AudioFormat, describe_formats},
};

const SUPPORTED_DOMAINS: [&str; 3] = ["youtube.com", "youtu.be", "youtube-nocookie.com"];

/// A validated `/api/convert` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source_url: String,
    pub format: AudioFormat,
}

impl ConversionRequest {
    /// Validates the raw query values against the active backend's formats.
    /// Nothing external is touched here.
    pub fn validate(
        url: Option<&str>,
        format: Option<&str>,
        supported: &[AudioFormat],
    ) -> Result<Self, ConvertError> {
        let source_url = url
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ConvertError::MissingParameter)?;

        if !is_youtube_url(source_url) {
            return Err(ConvertError::InvalidSource);
        }

        let format = match format.map(str::trim).filter(|value| !value.is_empty()) {
            None => AudioFormat::default(),
            Some(raw) => AudioFormat::parse(raw)
                .filter(|parsed| supported.contains(parsed))
                .ok_or_else(|| ConvertError::InvalidFormat {
                    value: raw.to_string(),
                    supported: describe_formats(supported),
                })?,
        };

        Ok(Self {
            source_url: source_url.to_string(),
            format,
        })
    }
}

pub fn is_youtube_url(input: &str) -> bool {
    let parsed = match Url::parse(input) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            match Url::parse(&format!("https://{input}")) {
                Ok(url) => url,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let host = match parsed.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return false,
    };

    SUPPORTED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[AudioFormat] = &AudioFormat::ALL;

    #[test]
    fn accepts_common_youtube_urls() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/shorts/abc",
            "www.youtube.com/watch?v=dQw4w9WgXcQ",
        ] {
            assert!(is_youtube_url(url), "{url} should be accepted");
        }
    }

    #[test]
    fn rejects_other_hosts() {
        for url in [
            "https://invalid.com",
            "https://notyoutube.com/watch?v=x",
            "https://youtube.com.evil.test/watch",
            "ftp://youtube.com/watch?v=x",
            "not a url",
        ] {
            assert!(!is_youtube_url(url), "{url} should be rejected");
        }
    }

    #[test]
    fn missing_url_is_rejected_first() {
        let error = ConversionRequest::validate(None, Some("bogus"), ALL).unwrap_err();
        assert!(matches!(error, ConvertError::MissingParameter));
        assert_eq!(error.to_string(), "Missing url parameter");

        let blank = ConversionRequest::validate(Some("  "), None, ALL).unwrap_err();
        assert!(matches!(blank, ConvertError::MissingParameter));
    }

    #[test]
    fn invalid_host_is_rejected_before_format() {
        let error =
            ConversionRequest::validate(Some("https://invalid.com"), Some("bogus"), ALL)
                .unwrap_err();
        assert_eq!(error.to_string(), "Invalid YouTube URL");
    }

    #[test]
    fn format_defaults_to_webm() {
        let request =
            ConversionRequest::validate(Some("https://youtu.be/abc"), None, ALL).unwrap();
        assert_eq!(request.format, AudioFormat::Webm);
        assert_eq!(request.source_url, "https://youtu.be/abc");
    }

    #[test]
    fn unknown_format_is_rejected() {
        let error =
            ConversionRequest::validate(Some("https://youtu.be/abc"), Some("invalid"), ALL)
                .unwrap_err();
        assert!(error.to_string().contains("Invalid format"));
    }

    #[test]
    fn unsupported_format_for_backend_is_rejected() {
        let supported = [AudioFormat::Webm, AudioFormat::M4a];
        let error =
            ConversionRequest::validate(Some("https://youtu.be/abc"), Some("mp3"), &supported)
                .unwrap_err();
        assert!(matches!(error, ConvertError::InvalidFormat { .. }));
        assert!(error.to_string().contains("webm, m4a"));
    }
}
