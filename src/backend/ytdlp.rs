use std::{
    io::ErrorKind,
    path::PathBuf,
    process::Stdio,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    process::Command,
    time::{Duration, timeout},
};
use tracing::{debug, info, warn};

use super::{AudioArtifact, AudioBackend};
use crate::{
    error::ConvertError,
    format::{AudioFormat, describe_formats},
    job::DownloadJob,
    locator::{cleanup_job_files, locate_artifact, remove_file_quietly},
    request::ConversionRequest,
};

pub const DEFAULT_METADATA_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct YtDlpOptions {
    pub binary: PathBuf,
    pub temp_dir: PathBuf,
    pub ffmpeg_location: Option<PathBuf>,
    pub mp3_enabled: bool,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,
}

/// Runs a local yt-dlp executable that writes into a shared temp directory.
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    options: YtDlpOptions,
}

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
}

impl YtDlpBackend {
    pub fn new(options: YtDlpOptions) -> Self {
        Self { options }
    }

    /// A bare command name is resolved through `PATH` at spawn time, so only
    /// explicit paths are checked up front.
    async fn ensure_binary(&self) -> Result<(), ConvertError> {
        let binary = &self.options.binary;
        if binary.components().count() <= 1 && !binary.is_absolute() {
            return Ok(());
        }

        match tokio::fs::metadata(binary).await {
            Ok(metadata) if metadata.is_file() => Ok(()),
            _ => Err(ConvertError::BinaryNotFound(binary.display().to_string())),
        }
    }

    async fn run(
        &self,
        args: Vec<String>,
        limit: Duration,
        operation: &'static str,
    ) -> Result<std::process::Output, ConvertError> {
        debug!("Running yt-dlp ({operation}) with {} args", args.len());

        let command_future = Command::new(&self.options.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = timeout(limit, command_future)
            .await
            .map_err(|_| ConvertError::Timeout {
                operation,
                seconds: limit.as_secs(),
            })?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ConvertError::BinaryNotFound(self.options.binary.display().to_string())
                } else {
                    ConvertError::ConversionFailed(format!("Could not run yt-dlp: {error}"))
                }
            })?;

        if !output.status.success() {
            return Err(ConvertError::ConversionFailed(run_error_message(
                &output.stderr,
            )));
        }

        Ok(output)
    }

    async fn fetch_title(
        &self,
        url: &str,
        bearer_token: Option<&str>,
    ) -> Result<Option<String>, ConvertError> {
        let mut args = vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        push_auth_header(&mut args, bearer_token);
        args.push(url.to_string());

        let output = self
            .run(args, self.options.metadata_timeout, "metadata")
            .await?;

        match serde_json::from_slice::<YtDlpVideoInfo>(&output.stdout) {
            Ok(info) => Ok(info.title.filter(|title| !title.trim().is_empty())),
            Err(error) => {
                warn!("Could not parse yt-dlp metadata for {url:?}: {error}");
                Ok(None)
            }
        }
    }

    fn download_args(
        &self,
        request: &ConversionRequest,
        job: &DownloadJob,
        bearer_token: Option<&str>,
    ) -> Vec<String> {
        let output_template = job.output_template(&self.options.temp_dir);

        let mut args = vec![
            "-f".to_string(),
            format_selector(request.format).to_string(),
            "-o".to_string(),
            output_template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--quiet".to_string(),
        ];

        if request.format == AudioFormat::Mp3 {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                "0".to_string(),
            ]);
            if let Some(ffmpeg) = &self.options.ffmpeg_location {
                args.push("--ffmpeg-location".to_string());
                args.push(ffmpeg.to_string_lossy().into_owned());
            }
        }

        push_auth_header(&mut args, bearer_token);
        args.push(request.source_url.clone());
        args
    }

    async fn download_and_read(
        &self,
        request: &ConversionRequest,
        job: &DownloadJob,
        bearer_token: Option<&str>,
    ) -> Result<(Vec<u8>, String), ConvertError> {
        let args = self.download_args(request, job, bearer_token);
        self.run(args, self.options.download_timeout, "download")
            .await?;

        let path = locate_artifact(&self.options.temp_dir, &job.file_prefix()).await?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| request.format.as_str().to_string());

        let bytes = tokio::fs::read(&path).await.map_err(|error| {
            ConvertError::ConversionFailed(format!("Could not read downloaded file: {error}"))
        })?;
        remove_file_quietly(&path).await;

        Ok((bytes, extension))
    }
}

#[async_trait]
impl AudioBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn supported_formats(&self) -> Vec<AudioFormat> {
        let mut formats = vec![AudioFormat::Webm, AudioFormat::M4a];
        if self.options.mp3_enabled {
            formats.push(AudioFormat::Mp3);
        }
        formats
    }

    async fn fetch_audio(
        &self,
        request: &ConversionRequest,
        job: &DownloadJob,
        bearer_token: Option<&str>,
    ) -> Result<AudioArtifact, ConvertError> {
        if !self.supported_formats().contains(&request.format) {
            return Err(ConvertError::InvalidFormat {
                value: request.format.to_string(),
                supported: describe_formats(&self.supported_formats()),
            });
        }

        self.ensure_binary().await?;

        let title = self.fetch_title(&request.source_url, bearer_token).await?;
        info!(
            "Job {} metadata fetched, title={:?}",
            job.token(),
            title.as_deref()
        );

        let result = self.download_and_read(request, job, bearer_token).await;
        cleanup_job_files(&self.options.temp_dir, &job.file_prefix()).await;

        let (bytes, extension) = result?;
        info!(
            "Job {} produced {} bytes of .{extension}",
            job.token(),
            bytes.len()
        );

        Ok(AudioArtifact {
            bytes,
            extension,
            display_name: title.unwrap_or_default(),
        })
    }
}

pub fn format_selector(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Webm | AudioFormat::Mp3 => "bestaudio",
        AudioFormat::M4a => "bestaudio[ext=m4a]/bestaudio",
    }
}

fn push_auth_header(args: &mut Vec<String>, bearer_token: Option<&str>) {
    if let Some(token) = bearer_token.map(str::trim).filter(|token| !token.is_empty()) {
        args.push("--add-header".to_string());
        args.push(format!("Authorization:Bearer {token}"));
    }
}

fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the download")
        .to_string()
}
