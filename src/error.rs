use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Everything that can stop a conversion or an OAuth setup request.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Missing url parameter")]
    MissingParameter,

    #[error("Invalid YouTube URL")]
    InvalidSource,

    #[error("Invalid format: {value}. Supported formats: {supported}")]
    InvalidFormat { value: String, supported: String },

    #[error(
        "yt-dlp binary not found at {0}. Place the yt-dlp executable there or set YT_DLP_PATH."
    )]
    BinaryNotFound(String),

    #[error("Operation timed out after {seconds}s ({operation})")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("No suitable audio stream found for {0}")]
    NoSuitableFormat(String),

    #[error("Downloaded file not found")]
    ArtifactNotFound,

    #[error("{0}")]
    ConversionFailed(String),

    #[error("OAuth error: {0}")]
    OAuthDenied(String),

    #[error("No authorization code provided")]
    MissingAuthorizationCode,

    #[error(
        "OAuth not configured. Set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET environment variables."
    )]
    OAuthNotConfigured,

    #[error("{0}")]
    TokenExchange(String),
}

impl ConvertError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter
            | Self::InvalidSource
            | Self::InvalidFormat { .. }
            | Self::OAuthDenied(_)
            | Self::MissingAuthorizationCode => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameter => "MISSING_PARAMETER",
            Self::InvalidSource => "INVALID_SOURCE",
            Self::InvalidFormat { .. } => "INVALID_FORMAT",
            Self::BinaryNotFound(_) => "BINARY_NOT_FOUND",
            Self::Timeout { .. } => "TIMEOUT",
            Self::NoSuitableFormat(_) => "NO_SUITABLE_FORMAT",
            Self::ArtifactNotFound => "ARTIFACT_NOT_FOUND",
            Self::ConversionFailed(_) => "CONVERSION_FAILED",
            Self::OAuthDenied(_) => "OAUTH_DENIED",
            Self::MissingAuthorizationCode => "MISSING_AUTHORIZATION_CODE",
            Self::OAuthNotConfigured => "OAUTH_NOT_CONFIGURED",
            Self::TokenExchange(_) => "TOKEN_EXCHANGE_FAILED",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

/// JSON error response returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: None,
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(error: ConvertError) -> Self {
        Self {
            status: error.status(),
            message: error.to_string(),
            code: Some(error.code()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code,
        });

        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_client_errors() {
        assert_eq!(ConvertError::MissingParameter.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ConvertError::InvalidSource.status(), StatusCode::BAD_REQUEST);
        let invalid_format = ConvertError::InvalidFormat {
            value: "flac".to_string(),
            supported: "webm, m4a".to_string(),
        };
        assert_eq!(invalid_format.status(), StatusCode::BAD_REQUEST);
        assert!(invalid_format.to_string().starts_with("Invalid format"));
    }

    #[test]
    fn downstream_failures_are_server_errors() {
        let failures = [
            ConvertError::BinaryNotFound("bin/yt-dlp".to_string()),
            ConvertError::Timeout {
                operation: "download",
                seconds: 300,
            },
            ConvertError::NoSuitableFormat("m4a".to_string()),
            ConvertError::ArtifactNotFound,
            ConvertError::ConversionFailed("boom".to_string()),
        ];

        for failure in failures {
            assert_eq!(failure.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn conversion_failure_passes_message_through() {
        let api_error = ApiError::from(ConvertError::ConversionFailed(
            "ERROR: Video unavailable".to_string(),
        ));
        assert_eq!(api_error.message, "ERROR: Video unavailable");
        assert_eq!(api_error.code, Some("CONVERSION_FAILED"));
    }
}
