use std::sync::Arc;

use async_trait::async_trait;
use rusty_ytdl::{Video, VideoFormat, VideoOptions, VideoQuality, VideoSearchOptions};
use tracing::{debug, info};

use super::{AudioArtifact, AudioBackend};
use crate::{
    error::ConvertError,
    format::{AudioFormat, describe_formats},
    job::DownloadJob,
    request::ConversionRequest,
};

const SUPPORTED: [AudioFormat; 2] = [AudioFormat::Webm, AudioFormat::M4a];

/// Streams audio in-process through `rusty_ytdl`. No transcoder is bundled,
/// so MP3 is never offered.
#[derive(Debug, Clone, Default)]
pub struct RustyYtdlBackend;

impl RustyYtdlBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Container name the library reports for streams of `format`.
fn container_for(format: AudioFormat) -> Option<&'static str> {
    match format {
        AudioFormat::Webm => Some("webm"),
        AudioFormat::M4a => Some("mp4"),
        AudioFormat::Mp3 => None,
    }
}

pub(crate) fn is_audio_stream_for(
    container: &str,
    has_audio: bool,
    has_video: bool,
    wanted: AudioFormat,
) -> bool {
    has_audio
        && !has_video
        && container_for(wanted).is_some_and(|expected| container.eq_ignore_ascii_case(expected))
}

/// The parts of a stream description that decide whether it can serve a
/// requested audio format.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamShape<'a> {
    pub container: &'a str,
    pub has_audio: bool,
    pub has_video: bool,
}

impl<'a> From<&'a VideoFormat> for StreamShape<'a> {
    fn from(format: &'a VideoFormat) -> Self {
        Self {
            container: &format.mime_type.container,
            has_audio: format.has_audio,
            has_video: format.has_video,
        }
    }
}

fn accepts(format: &VideoFormat, wanted: AudioFormat) -> bool {
    let shape = StreamShape::from(format);
    is_audio_stream_for(shape.container, shape.has_audio, shape.has_video, wanted)
}

/// Number of streams able to serve `wanted`; none at all is an error.
pub(crate) fn count_candidates<'a>(
    streams: impl IntoIterator<Item = StreamShape<'a>>,
    wanted: AudioFormat,
) -> Result<usize, ConvertError> {
    let candidates = streams
        .into_iter()
        .filter(|shape| {
            is_audio_stream_for(shape.container, shape.has_audio, shape.has_video, wanted)
        })
        .count();

    if candidates == 0 {
        return Err(ConvertError::NoSuitableFormat(wanted.to_string()));
    }
    Ok(candidates)
}

#[async_trait]
impl AudioBackend for RustyYtdlBackend {
    fn name(&self) -> &'static str {
        "library"
    }

    fn supported_formats(&self) -> Vec<AudioFormat> {
        SUPPORTED.to_vec()
    }

    fn validate_source(&self, url: &str) -> Result<(), ConvertError> {
        Video::new(url)
            .map(|_| ())
            .map_err(|_| ConvertError::InvalidSource)
    }

    async fn fetch_audio(
        &self,
        request: &ConversionRequest,
        job: &DownloadJob,
        bearer_token: Option<&str>,
    ) -> Result<AudioArtifact, ConvertError> {
        let wanted = request.format;
        if container_for(wanted).is_none() {
            return Err(ConvertError::InvalidFormat {
                value: wanted.to_string(),
                supported: describe_formats(&SUPPORTED),
            });
        }
        if bearer_token.is_some() {
            debug!("Job {}: library backend has no header hook, token unused", job.token());
        }

        let options = VideoOptions {
            quality: VideoQuality::HighestAudio,
            filter: VideoSearchOptions::Custom(Arc::new(move |format: &VideoFormat| {
                accepts(format, wanted)
            })),
            ..Default::default()
        };
        let video = Video::new_with_options(request.source_url.as_str(), options)
            .map_err(|_| ConvertError::InvalidSource)?;

        let video_info = video
            .get_info()
            .await
            .map_err(|error| ConvertError::ConversionFailed(error.to_string()))?;
        let title = video_info.video_details.title.clone();
        let candidates =
            count_candidates(video_info.formats.iter().map(StreamShape::from), wanted)?;
        info!(
            "Job {} found {candidates} {wanted} stream(s) for {:?}",
            job.token(),
            title
        );

        let stream = video
            .stream()
            .await
            .map_err(|error| ConvertError::ConversionFailed(error.to_string()))?;

        let mut buffer = Vec::new();
        while let Some(chunk) = stream
            .chunk()
            .await
            .map_err(|error| ConvertError::ConversionFailed(error.to_string()))?
        {
            buffer.extend_from_slice(&chunk);
        }
        debug!("Job {} buffered {} bytes", job.token(), buffer.len());

        Ok(AudioArtifact {
            bytes: buffer,
            extension: wanted.as_str().to_string(),
            display_name: title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_offers_mp3() {
        let formats = RustyYtdlBackend::new().supported_formats();
        assert_eq!(formats, vec![AudioFormat::Webm, AudioFormat::M4a]);
    }

    #[test]
    fn webm_selects_audio_only_webm_streams() {
        assert!(is_audio_stream_for("webm", true, false, AudioFormat::Webm));
        assert!(!is_audio_stream_for("webm", true, true, AudioFormat::Webm));
        assert!(!is_audio_stream_for("mp4", true, false, AudioFormat::Webm));
        assert!(!is_audio_stream_for("webm", false, true, AudioFormat::Webm));
    }

    #[test]
    fn m4a_selects_mp4_container_audio() {
        assert!(is_audio_stream_for("mp4", true, false, AudioFormat::M4a));
        assert!(!is_audio_stream_for("webm", true, false, AudioFormat::M4a));
    }

    #[test]
    fn mp3_matches_nothing() {
        assert!(!is_audio_stream_for("mp4", true, false, AudioFormat::Mp3));
        assert!(!is_audio_stream_for("mp3", true, false, AudioFormat::Mp3));
    }

    fn shape(container: &str, has_audio: bool, has_video: bool) -> StreamShape<'_> {
        StreamShape {
            container,
            has_audio,
            has_video,
        }
    }

    #[test]
    fn counts_matching_audio_streams() {
        let streams = [
            shape("webm", true, false),
            shape("webm", true, true),
            shape("mp4", true, false),
            shape("webm", true, false),
        ];
        assert_eq!(count_candidates(streams, AudioFormat::Webm).unwrap(), 2);
        assert_eq!(count_candidates(streams, AudioFormat::M4a).unwrap(), 1);
    }

    #[test]
    fn video_without_audio_only_streams_has_no_candidates() {
        let streams = [shape("mp4", true, true), shape("webm", false, true)];
        let error = count_candidates(streams, AudioFormat::Webm).unwrap_err();
        assert!(matches!(error, ConvertError::NoSuitableFormat(_)));
        assert_eq!(error.to_string(), "No suitable audio stream found for webm");

        assert!(matches!(
            count_candidates(Vec::new(), AudioFormat::M4a),
            Err(ConvertError::NoSuitableFormat(_))
        ));
    }

    #[test]
    fn rejects_urls_the_library_cannot_parse() {
        let backend = RustyYtdlBackend::new();
        assert!(matches!(
            backend.validate_source("https://www.youtube.com/"),
            Err(ConvertError::InvalidSource)
        ));
        assert!(
            backend
                .validate_source("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
                .is_ok()
        );
    }

    #[tokio::test]
    async fn mp3_request_is_rejected_explicitly() {
        let request = ConversionRequest {
            source_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            format: AudioFormat::Mp3,
        };
        let error = RustyYtdlBackend::new()
            .fetch_audio(&request, &DownloadJob::new(), None)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("Invalid format"));
    }
}
