use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};

use crate::{error::ConvertError, job::ARTIFACT_PREFIX};

const PARTIAL_SUFFIXES: [&str; 3] = [".part", ".ytdl", ".temp"];

fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Finds the finished file whose name starts with `prefix` in `dir`.
pub async fn locate_artifact(dir: &Path, prefix: &str) -> Result<PathBuf, ConvertError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|error| {
        ConvertError::ConversionFailed(format!("Could not open temp directory: {error}"))
    })?;

    while let Some(entry) = entries.next_entry().await.map_err(|error| {
        ConvertError::ConversionFailed(format!("Could not read temp directory: {error}"))
    })? {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) || is_partial(name) {
            continue;
        }

        match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => {
                debug!("Located artifact {:?}", entry.path());
                return Ok(entry.path());
            }
            Ok(_) => continue,
            Err(error) if error.kind() == ErrorKind::NotFound => continue,
            Err(error) => {
                return Err(ConvertError::ConversionFailed(format!(
                    "Could not inspect downloaded file: {error}"
                )));
            }
        }
    }

    Err(ConvertError::ArtifactNotFound)
}

/// Removes every file belonging to a job. Failures are logged and swallowed.
pub async fn cleanup_job_files(dir: &Path, prefix: &str) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            debug!("Skipping cleanup, temp directory unreadable: {error}");
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let matches_job = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(prefix));
        if !matches_job {
            continue;
        }

        remove_file_quietly(&entry.path()).await;
    }
}

pub async fn remove_file_quietly(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != ErrorKind::NotFound
    {
        info!("Could not remove temp file {:?}: {error}", path);
    }
}

/// Deletes artifacts older than `older_than` left behind by earlier runs.
pub async fn sweep_stale_artifacts(dir: &Path, older_than: Duration) -> usize {
    if older_than.is_zero() {
        return 0;
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open temp directory for cleanup: {error}");
            }
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    loop {
        let maybe_entry = match entries.next_entry().await {
            Ok(value) => value,
            Err(error) => {
                warn!("Could not iterate temp directory for cleanup: {error}");
                break;
            }
        };

        let Some(entry) = maybe_entry else {
            break;
        };

        let is_artifact = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(ARTIFACT_PREFIX));
        if !is_artifact {
            continue;
        }

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", path);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified_at| now.duration_since(modified_at).ok())
            .unwrap_or_default();
        if age < older_than {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("Could not remove stale artifact {:?}: {error}", path),
        }
    }

    removed
}
