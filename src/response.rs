use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};

use crate::{backend::AudioArtifact, error::ApiError};

const MAX_TITLE_CHARS: usize = 100;
const FALLBACK_TITLE: &str = "audio";

/// Turns a video title into a filename stem: word characters, spaces and
/// hyphens survive, whitespace runs become one underscore.
pub fn sanitize_title(title: &str) -> String {
    let mut collapsed = String::with_capacity(title.len());
    let mut in_whitespace = false;
    for character in title.chars() {
        if character.is_whitespace() {
            if !in_whitespace {
                collapsed.push('_');
            }
            in_whitespace = true;
        } else if character.is_ascii_alphanumeric() || matches!(character, '_' | '-') {
            collapsed.push(character);
            in_whitespace = false;
        }
    }

    let truncated: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();

    if truncated.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        truncated
    }
}

pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "m4a" => "audio/mp4",
        "webm" => "audio/webm",
        _ => "audio/mpeg",
    }
}

pub fn build_content_disposition(display_name: &str, extension: &str) -> String {
    format!(
        "attachment; filename=\"{}.{}\"",
        sanitize_title(display_name),
        extension.trim_start_matches('.')
    )
}

pub fn build_audio_response(artifact: AudioArtifact) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_extension(&artifact.extension)),
    );
    headers.insert(
        CONTENT_LENGTH,
        HeaderValue::from_str(&artifact.bytes.len().to_string())
            .map_err(|_| ApiError::internal("Could not build Content-Length header."))?,
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(
            &artifact.display_name,
            &artifact.extension,
        ))
        .map_err(|_| ApiError::internal("Could not build Content-Disposition header."))?,
    );

    Ok((headers, Body::from(artifact.bytes)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    #[test]
    fn sanitizes_spaces_to_underscores() {
        assert_eq!(
            sanitize_title("Test Video Title - Amazing Song"),
            "Test_Video_Title_-_Amazing_Song"
        );
    }

    #[test]
    fn strips_punctuation_and_collapses_whitespace() {
        assert_eq!(sanitize_title("Hello,   World!! (Live)"), "Hello_World_Live");
        assert_eq!(sanitize_title("a\t\nb"), "a_b");
        assert_eq!(sanitize_title("a , b"), "a_b");
    }

    #[test]
    fn edge_whitespace_becomes_underscores() {
        assert_eq!(sanitize_title(" Song "), "_Song_");
        assert_eq!(sanitize_title("  Hello,   World!! (Live) "), "_Hello_World_Live_");
    }

    #[test]
    fn falls_back_when_nothing_survives() {
        assert_eq!(sanitize_title(""), "audio");
        assert_eq!(sanitize_title("!!!???***"), "audio");
        assert_eq!(sanitize_title("!!! ???"), "_");
        assert_eq!(sanitize_title("日本語"), "audio");
    }

    #[test]
    fn truncates_to_one_hundred_chars() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_title(&long).len(), 100);
    }

    #[test]
    fn maps_extensions_to_content_types() {
        assert_eq!(content_type_for_extension("m4a"), "audio/mp4");
        assert_eq!(content_type_for_extension(".webm"), "audio/webm");
        assert_eq!(content_type_for_extension("mp3"), "audio/mpeg");
        assert_eq!(content_type_for_extension("opus"), "audio/mpeg");
    }

    #[test]
    fn content_disposition_uses_sanitized_title() {
        assert_eq!(
            build_content_disposition("My \"quoted\" song", "webm"),
            "attachment; filename=\"My_quoted_song.webm\""
        );
    }

    #[tokio::test]
    async fn builds_binary_response_with_headers() {
        let response = build_audio_response(AudioArtifact {
            bytes: b"fake-audio-data".to_vec(),
            extension: "m4a".to_string(),
            display_name: "Song".to_string(),
        })
        .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "audio/mp4");
        assert_eq!(headers[CONTENT_LENGTH], "15");
        assert_eq!(headers[CONTENT_DISPOSITION], "attachment; filename=\"Song.m4a\"");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"fake-audio-data");
    }
}
