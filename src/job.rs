use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const ARTIFACT_PREFIX: &str = "yt_";

/// One conversion's scratch identity. The token scopes the temp file (or
/// buffer) so it can be found again after the external tool exits.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl DownloadJob {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    pub fn token(&self) -> String {
        self.id.simple().to_string()
    }

    /// Every file this job produces starts with this prefix.
    pub fn file_prefix(&self) -> String {
        format!("{ARTIFACT_PREFIX}{}.", self.token())
    }

    /// yt-dlp output template; the tool picks the extension.
    pub fn output_template(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}%(ext)s", self.file_prefix()))
    }
}

impl Default for DownloadJob {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_per_job() {
        let first = DownloadJob::new();
        let second = DownloadJob::new();
        assert_ne!(first.token(), second.token());
        assert_ne!(first.file_prefix(), second.file_prefix());
    }

    #[test]
    fn output_template_embeds_prefix_and_ext_placeholder() {
        let job = DownloadJob::new();
        let template = job.output_template(Path::new("/tmp"));
        let name = template.file_name().and_then(|name| name.to_str()).unwrap();
        assert!(name.starts_with(&job.file_prefix()));
        assert!(name.ends_with("%(ext)s"));
        assert!(name.starts_with(ARTIFACT_PREFIX));
    }
}
