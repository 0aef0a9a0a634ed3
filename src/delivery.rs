use std::fs;
use std::io::Write;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use directories::UserDirs;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::archive::ArchiveBlob;
use crate::error::AdxError;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub path: String,
    pub bytes: u64,
    pub delivered_at: String,
}

/// Receives a finished archive. Called at most once per job.
pub trait DeliverySink: Send + Sync {
    fn deliver(&self, blob: &ArchiveBlob, filename: &str) -> Result<Delivery, AdxError>;
}

/// Persists archives into a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: Utf8PathBuf,
}

impl DirectorySink {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// The user's Downloads directory, or the current directory when the
    /// platform does not define one.
    pub fn downloads() -> Result<Self, AdxError> {
        let download_dir = UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|dir| dir.to_path_buf()));
        let dir = match download_dir {
            Some(dir) => dir,
            None => {
                std::env::current_dir().map_err(|err| AdxError::Filesystem(err.to_string()))?
            }
        };
        let root = Utf8PathBuf::from_path_buf(dir)
            .map_err(|_| AdxError::Filesystem("invalid download directory".to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn target_path(&self, filename: &str) -> Utf8PathBuf {
        self.root.join(sanitize_filename(filename))
    }
}

impl DeliverySink for DirectorySink {
    fn deliver(&self, blob: &ArchiveBlob, filename: &str) -> Result<Delivery, AdxError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| AdxError::Delivery(err.to_string()))?;
        let target = self.target_path(filename);

        let mut temp = tempfile::Builder::new()
            .prefix("adx-dl")
            .suffix(".part")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| AdxError::Delivery(err.to_string()))?;
        temp.write_all(blob.as_bytes())
            .map_err(|err| AdxError::Delivery(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| AdxError::Delivery(err.to_string()))?;
        temp.persist(target.as_std_path())
            .map_err(|err| AdxError::Delivery(err.to_string()))?;

        info!(path = %target, bytes = blob.len(), "archive delivered");
        Ok(Delivery {
            path: target.to_string(),
            bytes: blob.len() as u64,
            delivered_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// On-disk form of a suggested filename. Separators and characters rejected
/// by common filesystems become `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(filename.trim(), "_");
    match cleaned.as_ref() {
        "" | "." | ".." => "download.adx".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_ordinary_names() {
        assert_eq!(sanitize_filename("xi - Halcyon.adx"), "xi - Halcyon.adx");
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_filename("AC/DC - T.N.T?.adx"), "AC_DC - T.N.T_.adx");
        assert_eq!(sanitize_filename(".."), "download.adx");
    }
}
